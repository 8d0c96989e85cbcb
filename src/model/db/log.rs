use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{audit::LogAction, election::ElectionId, LogId, UserId};

/// An audit log entry. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionLog {
    #[serde(rename = "_id")]
    pub id: LogId,
    pub election_id: ElectionId,
    /// The acting principal, if any.
    pub user_id: Option<UserId>,
    pub action: LogAction,
    pub details: String,
    pub ip_address: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}
