use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use mongodb::{bson::doc, error::Error as DbError, options::FindOptions};
use rocket::{futures::TryStreamExt, tokio::time::sleep};

use crate::error::{Rejection, Result};
use crate::model::{
    api::{
        auth::{ClientMeta, Principal},
        election::{CandidateSummary, ElectionSummary},
        vote::MyVote,
    },
    common::{
        audit::LogAction,
        election::{CandidateId, ElectionId, ElectionType},
        VoteId,
    },
    db::{
        candidate::Candidate,
        election::Election,
        vote::{Ballot, Vote},
    },
    mongodb::{is_duplicate_key_error, is_transient_transaction_error, Counter, CounterId},
};

use super::{
    audit::{self, Actor},
    eligibility::{self, Choice},
    Store,
};

/// How many times a ballot transaction is attempted before giving up.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(20);

/// Cast a single-choice vote. The rank defaults to 1.
#[allow(clippy::too_many_arguments)]
pub async fn cast_vote(
    store: &Store,
    principal: Option<&Principal>,
    election_id: Option<ElectionId>,
    candidate_id: Option<CandidateId>,
    rank: Option<u32>,
    meta: &ClientMeta,
    now: DateTime<Utc>,
    local: FixedOffset,
) -> Result<VoteId> {
    if principal.is_none() {
        return Err(Rejection::AuthRequired.into());
    }
    let Some(candidate_id) = candidate_id else {
        return Err(Rejection::NotFound.into());
    };
    let choice = Choice { candidate_id, rank };
    let ids = cast_ballot(store, principal, election_id, &[choice], meta, now, local).await?;
    ids.first()
        .copied()
        .ok_or_else(|| Rejection::NotFound.into())
}

/// Cast a full ballot: check every choice, then record the ballot marker and
/// one vote row per choice atomically.
pub async fn cast_ballot(
    store: &Store,
    principal: Option<&Principal>,
    election_id: Option<ElectionId>,
    choices: &[Choice],
    meta: &ClientMeta,
    now: DateTime<Utc>,
    local: FixedOffset,
) -> Result<Vec<VoteId>> {
    let Some(principal) = principal else {
        return Err(Rejection::AuthRequired.into());
    };
    let candidate_ids: Vec<_> = choices.iter().map(|choice| choice.candidate_id).collect();
    let loaded = eligibility::load(store, Some(principal), election_id, &candidate_ids).await?;
    eligibility::check_all(Some(principal), &loaded, choices, now, local)?;
    let Some(election) = loaded.election.as_ref() else {
        return Err(Rejection::NotFound.into());
    };
    eligibility::check_ballot_shape(election, choices)?;

    // Shape checks guarantee a small, non-empty ballot.
    let count = choices.len() as u32;
    let ids = Counter::reserve(&store.coll(), CounterId::Votes, count).await?;
    let ballot = Ballot {
        voter_id: principal.id,
        election_id: election.id,
        cast_at: now,
    };
    let votes: Vec<Vote> = ids
        .clone()
        .zip(choices)
        .map(|(id, choice)| Vote {
            id,
            voter_id: principal.id,
            election_id: election.id,
            candidate_id: choice.candidate_id,
            rank: choice.rank.unwrap_or(1),
            encrypted_vote: String::new(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            timestamp: now,
        })
        .collect();

    let mut attempt = 1;
    loop {
        match insert_ballot(store, &ballot, &votes).await {
            Ok(Insertion::Recorded) => break,
            Ok(Insertion::CandidateRemoved) => return Err(Rejection::NotFound.into()),
            Err(e) if is_duplicate_key_error(&e) => return Err(Rejection::AlreadyVoted.into()),
            Err(e) if is_transient_transaction_error(&e) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                debug!(
                    "Retrying ballot of voter {} in election {} (attempt {attempt}): {e}",
                    principal.id, election.id
                );
                sleep(RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(
        "Voter {} cast a ballot of {count} choice(s) in election {}",
        principal.id, election.id
    );

    let actor = Actor {
        user_id: Some(principal.id),
        ip_address: meta.ip_address.as_deref(),
    };
    for vote in &votes {
        let name = loaded
            .candidate(vote.candidate_id)
            .map_or("unknown candidate", |candidate| candidate.name.as_str());
        let details = match election.election_type {
            ElectionType::RankedChoice => format!("Voted for {name} (rank {})", vote.rank),
            ElectionType::SingleChoice | ElectionType::MultipleChoice => {
                format!("Voted for {name}")
            }
        };
        audit::record(store, election.id, actor, LogAction::VoteCast, details).await;
    }

    Ok(ids.collect())
}

/// Outcome of a ballot transaction that reached the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Insertion {
    Recorded,
    /// A chosen candidate was deleted after the eligibility check.
    CandidateRemoved,
}

/// Insert the ballot marker and its votes in one transaction.
///
/// Every chosen candidate document is written first, bumping its `ballots`
/// marker, so that a concurrent candidate removal conflicts with this
/// transaction instead of orphaning its votes.
///
/// Dropping the session without committing aborts the transaction.
async fn insert_ballot(
    store: &Store,
    ballot: &Ballot,
    votes: &[Vote],
) -> std::result::Result<Insertion, DbError> {
    let mut session = store.client.start_session(None).await?;
    session.start_transaction(None).await?;

    let mut candidate_ids: Vec<_> = votes.iter().map(|vote| vote.candidate_id).collect();
    candidate_ids.sort_unstable();
    candidate_ids.dedup();
    let touched = store
        .coll::<Candidate>()
        .update_many_with_session(
            doc! { "_id": { "$in": candidate_ids.clone() }, "election_id": ballot.election_id },
            doc! { "$inc": { "ballots": 1 } },
            None,
            &mut session,
        )
        .await?;
    if touched.matched_count != candidate_ids.len() as u64 {
        session.abort_transaction().await?;
        return Ok(Insertion::CandidateRemoved);
    }

    store
        .coll::<Ballot>()
        .insert_one_with_session(ballot, None, &mut session)
        .await?;
    store
        .coll::<Vote>()
        .insert_many_with_session(votes, None, &mut session)
        .await?;
    session.commit_transaction().await?;
    Ok(Insertion::Recorded)
}

/// The principal's own votes, newest first.
pub async fn my_votes(store: &Store, principal: &Principal) -> Result<Vec<MyVote>> {
    let options = FindOptions::builder()
        .sort(doc! { "timestamp": -1, "_id": -1 })
        .build();
    let votes: Vec<Vote> = store
        .coll::<Vote>()
        .find(doc! { "voter_id": principal.id }, options)
        .await?
        .try_collect()
        .await?;

    let election_ids: Vec<_> = votes.iter().map(|vote| vote.election_id).collect();
    let candidate_ids: Vec<_> = votes.iter().map(|vote| vote.candidate_id).collect();
    let elections: HashMap<_, _> = store
        .coll::<Election>()
        .find(doc! { "_id": { "$in": election_ids } }, None)
        .await?
        .map_ok(|election| (election.id, election))
        .try_collect()
        .await?;
    let candidates: HashMap<_, _> = store
        .coll::<Candidate>()
        .find(doc! { "_id": { "$in": candidate_ids } }, None)
        .await?
        .map_ok(|candidate| (candidate.id, candidate))
        .try_collect()
        .await?;

    // Skip rows whose election or candidate has since been removed.
    Ok(votes
        .into_iter()
        .filter_map(|vote| {
            let election = elections.get(&vote.election_id)?;
            let candidate = candidates.get(&vote.candidate_id)?;
            Some(MyVote {
                id: vote.id,
                election: ElectionSummary::from(election),
                candidate: CandidateSummary::from(candidate),
                rank: vote.rank,
                timestamp: vote.timestamp,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use rocket::futures::join;

    use crate::error::Error;
    use crate::model::mongodb::Coll;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 20, h, m, 0).unwrap()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    async fn seed(store: &Store, election: &Election, candidates: &[Candidate]) {
        store
            .coll::<Election>()
            .insert_one(election, None)
            .await
            .unwrap();
        store
            .coll::<Candidate>()
            .insert_many(candidates, None)
            .await
            .unwrap();
    }

    #[backend_test]
    async fn second_vote_is_rejected(store: Store, votes: Coll<Vote>, ballots: Coll<Ballot>) {
        let election = Election::example();
        seed(&store, &election, &[Candidate::example(1, election.id, "Alice", 0)]).await;
        let voter = Principal::example_voter(2);
        let meta = ClientMeta::default();

        let vote_id = cast_vote(&store, Some(&voter), Some(1), Some(1), None, &meta, at(10, 0), utc())
            .await
            .unwrap();
        let stored = votes.find_one(doc! { "_id": vote_id }, None).await.unwrap().unwrap();
        assert_eq!(stored.rank, 1);
        assert_eq!(stored.voter_id, 2);

        let again = cast_vote(&store, Some(&voter), Some(1), Some(1), None, &meta, at(10, 5), utc()).await;
        assert!(matches!(again, Err(Error::Rejected(Rejection::AlreadyVoted))));
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
        assert_eq!(ballots.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn concurrent_ballots_record_once(store: Store, votes: Coll<Vote>) {
        let election = Election::example();
        seed(&store, &election, &[Candidate::example(1, election.id, "Alice", 0)]).await;
        let voter = Principal::example_voter(2);
        let meta = ClientMeta::default();

        let (first, second) = join!(
            cast_vote(&store, Some(&voter), Some(1), Some(1), None, &meta, at(10, 0), utc()),
            cast_vote(&store, Some(&voter), Some(1), Some(1), None, &meta, at(10, 0), utc()),
        );
        let outcomes = [first, second];
        let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(Error::Rejected(Rejection::AlreadyVoted)))));
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn ranked_ballot_records_every_choice(store: Store, votes: Coll<Vote>) {
        let mut election = Election::example();
        election.election_type = ElectionType::RankedChoice;
        election.max_votes_per_voter = 3;
        seed(
            &store,
            &election,
            &[
                Candidate::example(1, election.id, "Alice", 0),
                Candidate::example(2, election.id, "Bob", 1),
                Candidate::example(3, election.id, "Carol", 2),
            ],
        )
        .await;
        let voter = Principal::example_voter(2);
        let meta = ClientMeta::default();

        // Ranks are required.
        let unranked = [Choice { candidate_id: 1, rank: None }];
        let result = cast_ballot(&store, Some(&voter), Some(1), &unranked, &meta, at(10, 0), utc()).await;
        assert!(matches!(result, Err(Error::Rejected(Rejection::RankRequired))));

        let choices = [
            Choice { candidate_id: 3, rank: Some(1) },
            Choice { candidate_id: 1, rank: Some(2) },
        ];
        let ids = cast_ballot(&store, Some(&voter), Some(1), &choices, &meta, at(10, 0), utc())
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        let carol = votes
            .find_one(doc! { "candidate_id": 3 }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(carol.rank, 1);

        let mine = my_votes(&store, &voter).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|vote| vote.election.id == 1));
    }

    #[backend_test]
    async fn removed_candidates_abort_the_ballot(
        store: Store,
        votes: Coll<Vote>,
        ballots: Coll<Ballot>,
    ) {
        let election = Election::example();
        seed(&store, &election, &[Candidate::example(1, election.id, "Alice", 0)]).await;
        let ballot = Ballot {
            voter_id: 2,
            election_id: election.id,
            cast_at: at(10, 0),
        };
        let vote = |id, candidate_id| Vote {
            id,
            voter_id: 2,
            election_id: election.id,
            candidate_id,
            rank: 1,
            encrypted_vote: String::new(),
            ip_address: None,
            user_agent: String::new(),
            timestamp: at(10, 0),
        };

        // Candidate 2 passed the check but has since been deleted.
        let outcome = insert_ballot(&store, &ballot, &[vote(1, 1), vote(2, 2)]).await.unwrap();
        assert_eq!(outcome, Insertion::CandidateRemoved);
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(ballots.count_documents(None, None).await.unwrap(), 0);

        let outcome = insert_ballot(&store, &ballot, &[vote(3, 1)]).await.unwrap();
        assert_eq!(outcome, Insertion::Recorded);
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn rejected_ballots_leave_no_trace(store: Store, votes: Coll<Vote>) {
        let election = Election::example();
        let other = Election {
            id: 2,
            ..Election::example()
        };
        seed(&store, &election, &[Candidate::example(1, election.id, "Alice", 0)]).await;
        seed(&store, &other, &[Candidate::example(2, other.id, "Mallory", 0)]).await;
        let voter = Principal::example_voter(2);
        let meta = ClientMeta::default();

        let wrong = cast_vote(&store, Some(&voter), Some(1), Some(2), None, &meta, at(10, 0), utc()).await;
        assert!(matches!(wrong, Err(Error::Rejected(Rejection::InvalidCandidate))));
        let anonymous = cast_vote(&store, None, Some(1), Some(1), None, &meta, at(10, 0), utc()).await;
        assert!(matches!(anonymous, Err(Error::Rejected(Rejection::AuthRequired))));
        let missing = cast_vote(&store, Some(&voter), None, Some(1), None, &meta, at(10, 0), utc()).await;
        assert!(matches!(missing, Err(Error::Rejected(Rejection::NotFound))));
        let late = cast_vote(&store, Some(&voter), Some(1), Some(1), None, &meta, at(18, 0), utc()).await;
        assert!(matches!(late, Err(Error::Rejected(Rejection::ElectionNotActive))));
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 0);
    }
}
