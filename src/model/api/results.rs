use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId};

/// The vote count of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub id: CandidateId,
    pub name: String,
    pub votes: u64,
}

/// Per-candidate vote counts of an election, in candidate display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub id: ElectionId,
    pub name: String,
    pub candidates: Vec<CandidateResult>,
}

impl ElectionResults {
    /// Total number of vote rows counted.
    pub fn total(&self) -> u64 {
        self.candidates.iter().map(|c| c.votes).sum()
    }
}
