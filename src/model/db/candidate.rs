use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId};

/// Core candidate data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CandidateCore {
    /// Foreign key: the owning election.
    pub election_id: ElectionId,
    pub name: String,
    pub description: String,
    /// Position label, e.g. "Treasurer".
    pub position: String,
    /// Display order; ties are broken by name.
    pub order: i32,
    pub is_active: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A candidate from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: CandidateId,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Candidate {
    /// Sort candidates into display order: by `order`, then by `name`.
    pub fn sort_for_display(candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| (a.order, &a.name).cmp(&(b.order, &b.name)));
    }
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_order_is_order_then_name() {
        let mut candidates = vec![
            Candidate::example(1, 1, "Zed", 0),
            Candidate::example(2, 1, "Amy", 1),
            Candidate::example(3, 1, "Bob", 0),
        ];
        Candidate::sort_for_display(&mut candidates);
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Zed", "Amy"]);
    }
}
