use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionState {
    /// Not yet launched. Hidden from the public listing.
    Draft,
    /// Launched; accepts votes inside its time window.
    Active,
    /// Closed by an admin after launch. Results stay visible.
    Closed,
}

impl ElectionState {
    /// The state a freshly created election starts in, given the `is_active` flag of the request.
    pub fn initial(is_active: bool) -> Self {
        if is_active {
            Self::Active
        } else {
            Self::Draft
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
