use std::ops::{Deref, DerefMut};

use chrono::{DateTime, NaiveTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{
    election::{ElectionId, ElectionState, ElectionType, Visibility},
    UserId,
};

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// How ballots are filled in.
    pub election_type: ElectionType,
    /// Whether the election is publicly listed.
    pub visibility: Visibility,
    /// Election start time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Election end time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Daily opening time of the polls, in local time.
    pub voting_start_time: NaiveTime,
    /// Daily closing time of the polls, in local time. May be earlier than the
    /// opening time, in which case the window wraps past midnight.
    pub voting_end_time: NaiveTime,
    /// Maximum number of choices on one ballot.
    pub max_votes_per_voter: u32,
    pub require_confirmation: bool,
    /// Lifecycle state.
    pub state: ElectionState,
    /// The admin who created the election.
    pub created_by: Option<UserId>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}
