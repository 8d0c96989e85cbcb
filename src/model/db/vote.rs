use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{
    election::{CandidateId, ElectionId},
    UserId, VoteId,
};

/// A single vote row. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: VoteId,
    pub voter_id: UserId,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    /// Preference rank, starting at 1. Always 1 outside ranked-choice elections.
    pub rank: u32,
    /// Reserved for encrypted ballots; always empty.
    #[serde(default)]
    pub encrypted_vote: String,
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

/// Marker recording that a voter has cast their ballot in an election.
/// Unique per (voter, election); written in the same transaction as the ballot's votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter_id: UserId,
    pub election_id: ElectionId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}
