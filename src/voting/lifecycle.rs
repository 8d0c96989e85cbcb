use chrono::{DateTime, Utc};
use mongodb::bson::doc;

use crate::error::{Error, Result};
use crate::model::{
    api::auth::{ClientMeta, Principal},
    common::{
        audit::LogAction,
        election::{ElectionId, ElectionState},
    },
    db::{candidate::Candidate, election::Election},
    mongodb::u32_id_filter,
};

use super::{
    audit::{self, Actor},
    catalog, Store,
};

/// Check whether an election may be launched. Failures are reported in the
/// order: permission, existence, candidates, end time.
pub fn check_launch(
    principal: &Principal,
    election: Option<&Election>,
    election_id: ElectionId,
    candidate_count: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    principal.require_admin("launch elections")?;
    let Some(election) = election else {
        return Err(Error::not_found(format!("Election {election_id}")));
    };
    if candidate_count == 0 {
        return Err(Error::NoCandidate);
    }
    if election.end_time <= now {
        return Err(Error::EndTimeInPast);
    }
    Ok(())
}

/// Move an election to a new lifecycle state.
async fn set_state(
    store: &Store,
    election: &mut Election,
    state: ElectionState,
    now: DateTime<Utc>,
) -> Result<()> {
    election.state = state;
    election.updated_at = now;
    let update = doc! {
        "$set": {
            "state": state,
            "updated_at": now,
        }
    };
    store
        .coll::<Election>()
        .update_one(u32_id_filter(election.id), update, None)
        .await?;
    Ok(())
}

/// Launch an election, opening it for votes within its time window.
pub async fn launch(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    meta: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<Election> {
    principal.require_admin("launch elections")?;
    let election = store
        .coll::<Election>()
        .find_one(u32_id_filter(election_id), None)
        .await?;
    let candidate_count = store
        .coll::<Candidate>()
        .count_documents(doc! { "election_id": election_id }, None)
        .await?;
    check_launch(principal, election.as_ref(), election_id, candidate_count, now)?;
    let Some(mut election) = election else {
        return Err(Error::not_found(format!("Election {election_id}")));
    };

    set_state(store, &mut election, ElectionState::Active, now).await?;
    info!("Admin {} launched election {election_id}", principal.id);
    audit::record(
        store,
        election_id,
        Actor {
            user_id: Some(principal.id),
            ip_address: meta.ip_address.as_deref(),
        },
        LogAction::ElectionStarted,
        "Election started",
    )
    .await;
    Ok(election)
}

/// Close an election. It stops accepting votes; its results stay visible.
pub async fn close(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    meta: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<Election> {
    principal.require_admin("close elections")?;
    let mut election = catalog::find_election(store, election_id).await?;

    set_state(store, &mut election, ElectionState::Closed, now).await?;
    info!("Admin {} closed election {election_id}", principal.id);
    audit::record(
        store,
        election_id,
        Actor {
            user_id: Some(principal.id),
            ip_address: meta.ip_address.as_deref(),
        },
        LogAction::ElectionEnded,
        "Election ended",
    )
    .await;
    Ok(election)
}
