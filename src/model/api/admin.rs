use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{audit::LogAction, election::ElectionId, LogId, UserId},
    db::{eligibility::VoterEligibility, log::ElectionLog},
};

/// A voter to add to an election's invitation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilitySpec {
    pub voter: UserId,
    #[serde(default)]
    pub is_invited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDescription {
    pub election: ElectionId,
    pub voter: UserId,
    pub is_invited: bool,
    pub invitation_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<VoterEligibility> for EligibilityDescription {
    fn from(eligibility: VoterEligibility) -> Self {
        Self {
            election: eligibility.election_id,
            voter: eligibility.voter_id,
            is_invited: eligibility.is_invited,
            invitation_sent_at: eligibility.invitation_sent_at.map(|at| at.to_chrono()),
            created_at: eligibility.created_at,
        }
    }
}

/// An audit log entry, newest first when listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDescription {
    pub id: LogId,
    pub election: ElectionId,
    pub user: Option<UserId>,
    pub action: LogAction,
    pub details: String,
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<ElectionLog> for LogDescription {
    fn from(log: ElectionLog) -> Self {
        Self {
            id: log.id,
            election: log.election_id,
            user: log.user_id,
            action: log.action,
            details: log.details,
            ip_address: log.ip_address,
            timestamp: log.timestamp,
        }
    }
}
