use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::model::common::{election::ElectionId, UserId};

/// Invitation status of a voter for an election. Unique per (election, voter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterEligibility {
    pub election_id: ElectionId,
    pub voter_id: UserId,
    pub is_invited: bool,
    pub invitation_sent_at: Option<BsonDateTime>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
