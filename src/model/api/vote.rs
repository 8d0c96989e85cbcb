use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{
    election::{CandidateId, ElectionId},
    VoteId,
};

use super::election::{CandidateSummary, ElectionSummary};

/// A single choice, optionally ranked.
///
/// Missing fields are reported as "not found" rather than as malformed input,
/// so every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub election: Option<ElectionId>,
    #[serde(default)]
    pub candidate: Option<CandidateId>,
    #[serde(default)]
    pub rank: Option<u32>,
}

/// One entry on a multi-choice or ranked ballot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub candidate: CandidateId,
    #[serde(default)]
    pub rank: Option<u32>,
}

/// A complete ballot for one election.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRequest {
    #[serde(default)]
    pub election: Option<ElectionId>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCreated {
    pub detail: String,
    pub vote_id: VoteId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCreated {
    pub detail: String,
    pub vote_ids: Vec<VoteId>,
}

/// One of the caller's own votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyVote {
    pub id: VoteId,
    pub election: ElectionSummary,
    pub candidate: CandidateSummary,
    pub rank: u32,
    pub timestamp: DateTime<Utc>,
}
