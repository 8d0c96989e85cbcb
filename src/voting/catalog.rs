//! Elections, their candidates and their invited voters, as seen by the
//! public and as managed by admins.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::FindOptions,
    ClientSession,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    api::{
        admin::EligibilitySpec,
        auth::{ClientMeta, Principal},
        election::{CandidateSpec, ElectionSpec},
    },
    common::{
        audit::LogAction,
        election::{CandidateId, ElectionId, ElectionState, Visibility},
    },
    db::{
        candidate::Candidate,
        election::Election,
        eligibility::VoterEligibility,
        log::ElectionLog,
        user::User,
        vote::{Ballot, Vote},
    },
    mongodb::{is_duplicate_key_error, u32_id_filter, Counter, CounterId},
};

use super::{
    audit::{self, Actor},
    Store,
};

const MANAGE_ELECTIONS: &str = "manage elections";

fn actor<'a>(principal: &Principal, meta: &'a ClientMeta) -> Actor<'a> {
    Actor {
        user_id: Some(principal.id),
        ip_address: meta.ip_address.as_deref(),
    }
}

/// Get an election by ID, or fail with [`Error::NotFound`].
pub async fn find_election(store: &Store, election_id: ElectionId) -> Result<Election> {
    store
        .coll::<Election>()
        .find_one(u32_id_filter(election_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

/// All candidates of an election, in display order.
pub async fn candidates_of(store: &Store, election_id: ElectionId) -> Result<Vec<Candidate>> {
    let options = FindOptions::builder()
        .sort(doc! { "order": 1, "name": 1 })
        .build();
    let mut candidates: Vec<Candidate> = store
        .coll::<Candidate>()
        .find(doc! { "election_id": election_id }, options)
        .await?
        .try_collect()
        .await?;
    // The server collation may differ from ours.
    Candidate::sort_for_display(&mut candidates);
    Ok(candidates)
}

/// Launched, public elections, newest first.
pub async fn public_elections(store: &Store) -> Result<Vec<Election>> {
    let filter = doc! {
        "state": { "$ne": ElectionState::Draft },
        "visibility": Visibility::Public,
    };
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build();
    let elections = store
        .coll::<Election>()
        .find(filter, options)
        .await?
        .try_collect()
        .await?;
    Ok(elections)
}

/// A launched election and its candidates. Drafts are not found.
///
/// Private elections are unlisted rather than hidden: invited voters reach
/// them by ID.
pub async fn public_election(
    store: &Store,
    election_id: ElectionId,
) -> Result<(Election, Vec<Candidate>)> {
    let election = find_election(store, election_id).await?;
    if election.state == ElectionState::Draft {
        return Err(Error::not_found(format!("Election {election_id}")));
    }
    let candidates = candidates_of(store, election_id).await?;
    Ok((election, candidates))
}

/// Every election with its candidates, newest first.
pub async fn admin_elections(
    store: &Store,
    principal: &Principal,
) -> Result<Vec<(Election, Vec<Candidate>)>> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build();
    let elections: Vec<Election> = store
        .coll::<Election>()
        .find(None, options)
        .await?
        .try_collect()
        .await?;

    let mut by_election: HashMap<ElectionId, Vec<Candidate>> = HashMap::new();
    let mut candidates = store.coll::<Candidate>().find(None, None).await?;
    while let Some(candidate) = candidates.try_next().await? {
        by_election
            .entry(candidate.election_id)
            .or_default()
            .push(candidate);
    }

    Ok(elections
        .into_iter()
        .map(|election| {
            let mut candidates = by_election.remove(&election.id).unwrap_or_default();
            Candidate::sort_for_display(&mut candidates);
            (election, candidates)
        })
        .collect())
}

pub async fn admin_election(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
) -> Result<(Election, Vec<Candidate>)> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    let election = find_election(store, election_id).await?;
    let candidates = candidates_of(store, election_id).await?;
    Ok((election, candidates))
}

/// Allocate IDs for new candidates of an election.
async fn new_candidates(
    store: &Store,
    election_id: ElectionId,
    specs: Vec<CandidateSpec>,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>> {
    if specs.is_empty() {
        return Ok(Vec::new());
    }
    let ids = Counter::reserve(&store.coll(), CounterId::Candidates, specs.len() as u32).await?;
    Ok(ids
        .zip(specs)
        .map(|(id, spec)| Candidate {
            id,
            candidate: spec.into_core(election_id, now),
        })
        .collect())
}

/// Create an election together with its initial candidates.
pub async fn create_election(
    store: &Store,
    principal: &Principal,
    spec: ElectionSpec,
    meta: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<(Election, Vec<Candidate>)> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    spec.validate()?;

    let (core, specs) = spec.into_core(principal.id, now);
    let id = Counter::next(&store.coll(), CounterId::Elections).await?;
    let election = Election { id, election: core };
    let mut candidates = new_candidates(store, id, specs, now).await?;

    // Atomically insert the election and its candidates.
    {
        let mut session = store.client.start_session(None).await?;
        session.start_transaction(None).await?;
        store
            .coll::<Election>()
            .insert_one_with_session(&election, None, &mut session)
            .await?;
        if !candidates.is_empty() {
            store
                .coll::<Candidate>()
                .insert_many_with_session(&candidates, None, &mut session)
                .await?;
        }
        session.commit_transaction().await?;
    }

    info!("Admin {} created election {}", principal.id, election.id);
    let details = format!(
        "Created election '{}' with {} candidate(s)",
        election.name,
        candidates.len()
    );
    audit::record(
        store,
        election.id,
        actor(principal, meta),
        LogAction::ElectionCreated,
        details,
    )
    .await;

    Candidate::sort_for_display(&mut candidates);
    Ok((election, candidates))
}

/// What applying a candidate list to an election changes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CandidatePlan {
    /// Existing candidates, with their new fields applied.
    pub update: Vec<Candidate>,
    pub create: Vec<CandidateSpec>,
    pub delete: Vec<CandidateId>,
}

/// Work out how to replace an election's candidates with the given list.
///
/// Entries whose ID matches an existing candidate update it, all other
/// entries are created, and existing candidates not mentioned are deleted.
pub fn plan_candidate_replacement(
    existing: Vec<Candidate>,
    specs: Vec<CandidateSpec>,
) -> CandidatePlan {
    let mut remaining: HashMap<_, _> = existing
        .into_iter()
        .map(|candidate| (candidate.id, candidate))
        .collect();
    let mut plan = CandidatePlan::default();
    for spec in specs {
        match spec.id.and_then(|id| remaining.remove(&id)) {
            Some(mut candidate) => {
                spec.apply_to(&mut candidate.candidate);
                plan.update.push(candidate);
            }
            None => plan.create.push(spec),
        }
    }
    plan.delete = remaining.into_keys().collect();
    plan.delete.sort_unstable();
    plan
}

/// Delete candidates within the session's transaction, failing if any of
/// them has received votes.
///
/// The vote count runs after the delete in the same transaction, so a ballot
/// committed concurrently either shows up in the count or conflicts with the
/// delete. On failure the transaction is aborted.
async fn remove_unvoted(
    store: &Store,
    session: &mut ClientSession,
    candidate_ids: &[CandidateId],
) -> Result<()> {
    if candidate_ids.is_empty() {
        return Ok(());
    }
    let filter = doc! { "_id": { "$in": candidate_ids.to_vec() } };
    store
        .coll::<Candidate>()
        .delete_many_with_session(filter, None, session)
        .await?;
    let voted = store
        .coll::<Vote>()
        .count_documents_with_session(
            doc! { "candidate_id": { "$in": candidate_ids.to_vec() } },
            None,
            session,
        )
        .await?;
    if voted > 0 {
        session.abort_transaction().await?;
        return Err(Error::Validation(
            "Cannot remove a candidate that has already received votes.".to_string(),
        ));
    }
    Ok(())
}

/// Replace an election's fields, and its candidates if a list is given.
pub async fn update_election(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    spec: ElectionSpec,
    meta: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<(Election, Vec<Candidate>)> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    spec.validate()?;
    let mut election = find_election(store, election_id).await?;
    let specs = spec.apply_to(&mut election.election, now);

    let plan = match specs {
        Some(specs) => {
            let existing = candidates_of(store, election_id).await?;
            plan_candidate_replacement(existing, specs)
        }
        None => CandidatePlan::default(),
    };
    let created = new_candidates(store, election_id, plan.create, now).await?;

    // Atomically apply every change.
    {
        let mut session = store.client.start_session(None).await?;
        session.start_transaction(None).await?;
        store
            .coll::<Election>()
            .replace_one_with_session(u32_id_filter(election_id), &election, None, &mut session)
            .await?;
        for candidate in &plan.update {
            store
                .coll::<Candidate>()
                .replace_one_with_session(u32_id_filter(candidate.id), candidate, None, &mut session)
                .await?;
        }
        if !created.is_empty() {
            store
                .coll::<Candidate>()
                .insert_many_with_session(&created, None, &mut session)
                .await?;
        }
        remove_unvoted(store, &mut session, &plan.delete).await?;
        session.commit_transaction().await?;
    }

    info!(
        "Admin {} updated election {election_id}: {} candidate(s) updated, {} created, {} deleted",
        principal.id,
        plan.update.len(),
        created.len(),
        plan.delete.len()
    );
    audit::record(
        store,
        election_id,
        actor(principal, meta),
        LogAction::ElectionUpdated,
        format!("Updated election '{}'", election.name),
    )
    .await;

    let candidates = candidates_of(store, election_id).await?;
    Ok((election, candidates))
}

/// Delete an election and everything that belongs to it.
pub async fn delete_election(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
) -> Result<()> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    find_election(store, election_id).await?;

    let mut session = store.client.start_session(None).await?;
    session.start_transaction(None).await?;
    store
        .coll::<Election>()
        .delete_one_with_session(u32_id_filter(election_id), None, &mut session)
        .await?;
    let filter = doc! { "election_id": election_id };
    store
        .coll::<Candidate>()
        .delete_many_with_session(filter.clone(), None, &mut session)
        .await?;
    store
        .coll::<Vote>()
        .delete_many_with_session(filter.clone(), None, &mut session)
        .await?;
    store
        .coll::<Ballot>()
        .delete_many_with_session(filter.clone(), None, &mut session)
        .await?;
    store
        .coll::<VoterEligibility>()
        .delete_many_with_session(filter.clone(), None, &mut session)
        .await?;
    store
        .coll::<ElectionLog>()
        .delete_many_with_session(filter, None, &mut session)
        .await?;
    session.commit_transaction().await?;

    warn!("Admin {} deleted election {election_id}", principal.id);
    Ok(())
}

async fn find_candidate(
    store: &Store,
    election_id: ElectionId,
    candidate_id: CandidateId,
) -> Result<Candidate> {
    store
        .coll::<Candidate>()
        .find_one(
            doc! { "_id": candidate_id, "election_id": election_id },
            None,
        )
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))
}

pub async fn add_candidate(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    spec: CandidateSpec,
    meta: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<Candidate> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    spec.validate()?;
    find_election(store, election_id).await?;

    let id = Counter::next(&store.coll(), CounterId::Candidates).await?;
    let candidate = Candidate {
        id,
        candidate: spec.into_core(election_id, now),
    };
    store
        .coll::<Candidate>()
        .insert_one(&candidate, None)
        .await?;

    audit::record(
        store,
        election_id,
        actor(principal, meta),
        LogAction::CandidateAdded,
        format!("Added candidate '{}'", candidate.name),
    )
    .await;
    Ok(candidate)
}

pub async fn update_candidate(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    candidate_id: CandidateId,
    spec: CandidateSpec,
) -> Result<Candidate> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    spec.validate()?;
    let mut candidate = find_candidate(store, election_id, candidate_id).await?;
    spec.apply_to(&mut candidate.candidate);
    store
        .coll::<Candidate>()
        .replace_one(u32_id_filter(candidate_id), &candidate, None)
        .await?;
    Ok(candidate)
}

/// Remove a candidate that has not received any votes.
pub async fn delete_candidate(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    candidate_id: CandidateId,
) -> Result<()> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    find_candidate(store, election_id, candidate_id).await?;
    let mut session = store.client.start_session(None).await?;
    session.start_transaction(None).await?;
    remove_unvoted(store, &mut session, &[candidate_id]).await?;
    session.commit_transaction().await?;
    Ok(())
}

/// Record a voter as eligible for (and optionally invited to) an election.
pub async fn add_voter(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
    spec: EligibilitySpec,
    meta: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<VoterEligibility> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    find_election(store, election_id).await?;
    let voter = store
        .coll::<User>()
        .find_one(u32_id_filter(spec.voter), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", spec.voter)))?;

    let eligibility = VoterEligibility {
        election_id,
        voter_id: voter.id,
        is_invited: spec.is_invited,
        invitation_sent_at: spec.is_invited.then(|| BsonDateTime::from_chrono(now)),
        created_at: now,
    };
    if let Err(err) = store
        .coll::<VoterEligibility>()
        .insert_one(&eligibility, None)
        .await
    {
        return Err(if is_duplicate_key_error(&err) {
            Error::Validation(format!(
                "Voter {} is already registered for this election.",
                voter.id
            ))
        } else {
            err.into()
        });
    }

    audit::record(
        store,
        election_id,
        actor(principal, meta),
        LogAction::VoterAdded,
        format!("Added voter '{}'", voter.username),
    )
    .await;
    Ok(eligibility)
}

pub async fn voters_of(
    store: &Store,
    principal: &Principal,
    election_id: ElectionId,
) -> Result<Vec<VoterEligibility>> {
    principal.require_admin(MANAGE_ELECTIONS)?;
    find_election(store, election_id).await?;
    let options = FindOptions::builder().sort(doc! { "voter_id": 1 }).build();
    let voters = store
        .coll::<VoterEligibility>()
        .find(doc! { "election_id": election_id }, options)
        .await?
        .try_collect()
        .await?;
    Ok(voters)
}
