use std::fmt::Display;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// The closed set of actions recorded in an election's audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    ElectionCreated,
    ElectionUpdated,
    VoteCast,
    VoterAdded,
    CandidateAdded,
    ElectionStarted,
    ElectionEnded,
}

impl Display for LogAction {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bson = Bson::from(*self);
        write!(formatter, "{}", bson.as_str().unwrap_or_default())
    }
}

impl From<LogAction> for Bson {
    fn from(action: LogAction) -> Self {
        to_bson(&action).expect("Serialisation is infallible")
    }
}
