use chrono::Utc;
use mongodb::{bson::doc, options::FindOptions};
use rocket::futures::TryStreamExt;

use crate::error::Result;
use crate::model::{
    common::{audit::LogAction, election::ElectionId, UserId},
    db::log::ElectionLog,
    mongodb::{Counter, CounterId},
};

use super::Store;

/// Who did something, and from where.
#[derive(Debug, Clone, Copy, Default)]
pub struct Actor<'a> {
    pub user_id: Option<UserId>,
    pub ip_address: Option<&'a str>,
}

/// Append an entry to an election's audit log.
///
/// Failures are logged and otherwise ignored: the action being audited has
/// already happened.
pub async fn record(
    store: &Store,
    election_id: ElectionId,
    actor: Actor<'_>,
    action: LogAction,
    details: impl Into<String>,
) {
    if let Err(e) = try_record(store, election_id, actor, action, details.into()).await {
        error!("Failed to record {action} for election {election_id}: {e}");
    }
}

async fn try_record(
    store: &Store,
    election_id: ElectionId,
    actor: Actor<'_>,
    action: LogAction,
    details: String,
) -> Result<()> {
    let id = Counter::next(&store.coll(), CounterId::Logs).await?;
    let entry = ElectionLog {
        id,
        election_id,
        user_id: actor.user_id,
        action,
        details,
        ip_address: actor.ip_address.map(str::to_string),
        timestamp: Utc::now(),
    };
    store.coll::<ElectionLog>().insert_one(entry, None).await?;
    Ok(())
}

/// All audit entries of an election, newest first.
pub async fn history(store: &Store, election_id: ElectionId) -> Result<Vec<ElectionLog>> {
    let options = FindOptions::builder()
        .sort(doc! { "timestamp": -1, "_id": -1 })
        .build();
    let entries = store
        .coll::<ElectionLog>()
        .find(doc! { "election_id": election_id }, options)
        .await?
        .try_collect()
        .await?;
    Ok(entries)
}
