use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// How a ballot in an election is filled in.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionType {
    /// Exactly one candidate per ballot.
    #[default]
    SingleChoice,
    /// Up to `max_votes_per_voter` distinct candidates, unranked.
    MultipleChoice,
    /// Up to `max_votes_per_voter` distinct candidates, each with a distinct rank.
    RankedChoice,
}

/// Whether an election shows up in the public listing.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl From<ElectionType> for Bson {
    fn from(kind: ElectionType) -> Self {
        to_bson(&kind).expect("Serialisation is infallible")
    }
}

impl From<Visibility> for Bson {
    fn from(visibility: Visibility) -> Self {
        to_bson(&visibility).expect("Serialisation is infallible")
    }
}
