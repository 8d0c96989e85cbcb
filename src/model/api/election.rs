use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        election::{CandidateId, ElectionId, ElectionState, ElectionType, Visibility},
        UserId,
    },
    db::{
        candidate::{Candidate, CandidateCore},
        election::{Election, ElectionCore},
    },
};

fn yes() -> bool {
    true
}

fn one() -> u32 {
    1
}

fn midnight() -> NaiveTime {
    NaiveTime::default()
}

fn last_second() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()
}

/// A candidate as submitted by an admin.
///
/// Candidates carrying the ID of an existing candidate of the same election
/// update it; all others are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    #[serde(default)]
    pub id: Option<CandidateId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "yes")]
    pub is_active: bool,
}

impl CandidateSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(
                "Candidate name must not be empty.".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a new candidate in the given election.
    pub fn into_core(self, election_id: ElectionId, now: DateTime<Utc>) -> CandidateCore {
        CandidateCore {
            election_id,
            name: self.name,
            description: self.description,
            position: self.position,
            order: self.order,
            is_active: self.is_active,
            created_at: now,
        }
    }

    /// Overwrite the editable fields of an existing candidate.
    pub fn apply_to(self, candidate: &mut CandidateCore) {
        candidate.name = self.name;
        candidate.description = self.description;
        candidate.position = self.position;
        candidate.order = self.order;
        candidate.is_active = self.is_active;
    }
}

/// An election as submitted by an admin, for creation or replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub election_type: ElectionType,
    #[serde(default)]
    pub visibility: Visibility,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "midnight")]
    pub voting_start_time: NaiveTime,
    #[serde(default = "last_second")]
    pub voting_end_time: NaiveTime,
    #[serde(default = "one")]
    pub max_votes_per_voter: u32,
    #[serde(default = "yes")]
    pub require_confirmation: bool,
    /// Only consulted on creation: whether the election opens immediately
    /// or starts as a draft.
    #[serde(default = "yes")]
    pub is_active: bool,
    /// When present, the complete desired set of candidates.
    #[serde(default)]
    pub candidates: Option<Vec<CandidateSpec>>,
}

impl ElectionSpec {
    /// Check the field-level constraints.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(
                "Election name must not be empty.".to_string(),
            ));
        }
        if self.start_time >= self.end_time {
            return Err(Error::Validation(
                "Start time must be before end time.".to_string(),
            ));
        }
        if self.voting_start_time == self.voting_end_time {
            return Err(Error::Validation(
                "Daily voting start and end times must differ.".to_string(),
            ));
        }
        if self.max_votes_per_voter < 1 {
            return Err(Error::Validation(
                "Max votes per voter must be at least 1.".to_string(),
            ));
        }
        self.candidates
            .iter()
            .flatten()
            .try_for_each(CandidateSpec::validate)
    }

    /// Build a new election, splitting off its candidates.
    pub fn into_core(
        self,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> (ElectionCore, Vec<CandidateSpec>) {
        let core = ElectionCore {
            name: self.name,
            description: self.description,
            election_type: self.election_type,
            visibility: self.visibility,
            start_time: self.start_time,
            end_time: self.end_time,
            voting_start_time: self.voting_start_time,
            voting_end_time: self.voting_end_time,
            max_votes_per_voter: self.max_votes_per_voter,
            require_confirmation: self.require_confirmation,
            state: ElectionState::initial(self.is_active),
            created_by: Some(created_by),
            created_at: now,
            updated_at: now,
        };
        (core, self.candidates.unwrap_or_default())
    }

    /// Overwrite the editable fields of an existing election, returning the
    /// candidate set if one was given. The lifecycle state is left alone.
    pub fn apply_to(
        self,
        election: &mut ElectionCore,
        now: DateTime<Utc>,
    ) -> Option<Vec<CandidateSpec>> {
        election.name = self.name;
        election.description = self.description;
        election.election_type = self.election_type;
        election.visibility = self.visibility;
        election.start_time = self.start_time;
        election.end_time = self.end_time;
        election.voting_start_time = self.voting_start_time;
        election.voting_end_time = self.voting_end_time;
        election.max_votes_per_voter = self.max_votes_per_voter;
        election.require_confirmation = self.require_confirmation;
        election.updated_at = now;
        self.candidates
    }
}

/// A candidate as shown to voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub id: CandidateId,
    pub name: String,
}

impl From<&Candidate> for CandidateSummary {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name.clone(),
        }
    }
}

/// An election as listed publicly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ElectionId,
    pub name: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub voting_start_time: NaiveTime,
    pub voting_end_time: NaiveTime,
}

impl From<&Election> for ElectionSummary {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id,
            name: election.name.clone(),
            description: election.description.clone(),
            start_time: election.start_time,
            end_time: election.end_time,
            voting_start_time: election.voting_start_time,
            voting_end_time: election.voting_end_time,
        }
    }
}

/// A publicly visible election together with its candidates in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDetail {
    #[serde(flatten)]
    pub election: ElectionSummary,
    pub election_type: ElectionType,
    pub max_votes_per_voter: u32,
    pub candidates: Vec<CandidateSummary>,
}

impl ElectionDetail {
    pub fn new(election: &Election, candidates: &[Candidate]) -> Self {
        Self {
            election: election.into(),
            election_type: election.election_type,
            max_votes_per_voter: election.max_votes_per_voter,
            candidates: candidates.iter().map(CandidateSummary::from).collect(),
        }
    }
}

/// Full candidate details for admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCandidate {
    pub id: CandidateId,
    pub name: String,
    pub description: String,
    pub position: String,
    pub order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Candidate> for AdminCandidate {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.candidate.name,
            description: candidate.candidate.description,
            position: candidate.candidate.position,
            order: candidate.candidate.order,
            is_active: candidate.candidate.is_active,
            created_at: candidate.candidate.created_at,
        }
    }
}

/// Full election details for admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminElectionDescription {
    pub id: ElectionId,
    pub name: String,
    pub description: String,
    pub election_type: ElectionType,
    pub visibility: Visibility,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub voting_start_time: NaiveTime,
    pub voting_end_time: NaiveTime,
    pub max_votes_per_voter: u32,
    pub require_confirmation: bool,
    pub state: ElectionState,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub candidates: Vec<AdminCandidate>,
}

impl AdminElectionDescription {
    pub fn new(election: Election, candidates: Vec<Candidate>) -> Self {
        let core = election.election;
        Self {
            id: election.id,
            name: core.name,
            description: core.description,
            election_type: core.election_type,
            visibility: core.visibility,
            start_time: core.start_time,
            end_time: core.end_time,
            voting_start_time: core.voting_start_time,
            voting_end_time: core.voting_end_time,
            max_votes_per_voter: core.max_votes_per_voter,
            require_confirmation: core.require_confirmation,
            is_active: core.state.is_active(),
            state: core.state,
            created_by: core.created_by,
            created_at: core.created_at,
            updated_at: core.updated_at,
            candidates: candidates.into_iter().map(AdminCandidate::from).collect(),
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    use chrono::TimeZone;

    impl CandidateSpec {
        pub fn example(name: &str) -> Self {
            Self {
                id: None,
                name: name.to_string(),
                description: String::new(),
                position: "President".to_string(),
                order: 0,
                is_active: true,
            }
        }
    }

    impl ElectionSpec {
        /// A single-choice election running all of 2099, with polls open all day.
        pub fn example() -> Self {
            Self {
                name: "Referendum".to_string(),
                description: "Yes or no".to_string(),
                election_type: ElectionType::SingleChoice,
                visibility: Visibility::Public,
                start_time: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2099, 12, 31, 23, 0, 0).unwrap(),
                voting_start_time: midnight(),
                voting_end_time: last_second(),
                max_votes_per_voter: 1,
                require_confirmation: true,
                is_active: true,
                candidates: Some(vec![
                    CandidateSpec::example("Yes"),
                    CandidateSpec::example("No"),
                ]),
            }
        }
    }
}
