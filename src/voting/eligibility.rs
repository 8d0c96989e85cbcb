use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};
use mongodb::bson::doc;
use rocket::futures::TryStreamExt;

use crate::error::{Error, Rejection, Result};
use crate::model::{
    api::auth::Principal,
    common::election::{CandidateId, ElectionId, ElectionType},
    db::{candidate::Candidate, election::Election, vote::Ballot},
    mongodb::u32_id_filter,
};

use super::Store;

/// A time-of-day window, inclusive at both ends.
///
/// When `start > end` the window wraps past midnight.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DailyWindow {
    pub fn of(election: &Election) -> Self {
        Self {
            start: election.voting_start_time,
            end: election.voting_end_time,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Everything a single eligibility decision depends on, already loaded.
#[derive(Debug, Clone, Copy)]
pub struct VoteAttempt<'a> {
    pub principal: Option<&'a Principal>,
    pub election: Option<&'a Election>,
    pub candidate: Option<&'a Candidate>,
    pub rank: Option<u32>,
    pub already_voted: bool,
}

/// Decide whether a vote may be cast. The first failing check wins.
pub fn check(
    attempt: VoteAttempt<'_>,
    now: DateTime<Utc>,
    local: FixedOffset,
) -> std::result::Result<(), Rejection> {
    if attempt.principal.is_none() {
        return Err(Rejection::AuthRequired);
    }
    let (Some(election), Some(candidate)) = (attempt.election, attempt.candidate) else {
        return Err(Rejection::NotFound);
    };
    if candidate.election_id != election.id {
        return Err(Rejection::InvalidCandidate);
    }
    if attempt.already_voted {
        return Err(Rejection::AlreadyVoted);
    }
    if !election.state.is_active() || now < election.start_time || now > election.end_time {
        return Err(Rejection::ElectionNotActive);
    }
    // Windows are configured to the second.
    let local_time = now.with_timezone(&local).time();
    let local_time = local_time.with_nanosecond(0).unwrap_or(local_time);
    if !DailyWindow::of(election).contains(local_time) {
        return Err(Rejection::OutsideVotingWindow);
    }
    if election.election_type == ElectionType::RankedChoice && attempt.rank.is_none() {
        return Err(Rejection::RankRequired);
    }
    Ok(())
}

/// One entry of a ballot, before it has been checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Choice {
    pub candidate_id: CandidateId,
    pub rank: Option<u32>,
}

/// Check that a ballot has the right number and combination of choices for
/// its election's type.
pub fn check_ballot_shape(election: &Election, choices: &[Choice]) -> Result<()> {
    if choices.is_empty() {
        return Err(Error::Validation(
            "A ballot must contain at least one choice.".to_string(),
        ));
    }
    if choices.iter().any(|choice| choice.rank == Some(0)) {
        return Err(Error::Validation("Ranks start at 1.".to_string()));
    }
    let limit = match election.election_type {
        ElectionType::SingleChoice => 1,
        ElectionType::MultipleChoice | ElectionType::RankedChoice => {
            election.max_votes_per_voter as usize
        }
    };
    if choices.len() > limit {
        return Err(Error::Validation(format!(
            "This election allows at most {limit} choice(s) per ballot."
        )));
    }
    let mut candidates = HashSet::new();
    if !choices.iter().all(|choice| candidates.insert(choice.candidate_id)) {
        return Err(Error::Validation(
            "Each candidate may appear on a ballot only once.".to_string(),
        ));
    }
    if election.election_type == ElectionType::RankedChoice {
        let mut ranks = HashSet::new();
        if !choices.iter().filter_map(|choice| choice.rank).all(|rank| ranks.insert(rank)) {
            return Err(Error::Validation(
                "Each rank may be used only once.".to_string(),
            ));
        }
    }
    Ok(())
}

/// The stored state a vote attempt is checked against.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub election: Option<Election>,
    pub candidates: Vec<Candidate>,
    pub already_voted: bool,
}

impl Loaded {
    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|candidate| candidate.id == id)
    }
}

/// Load the election, the named candidates, and whether the principal has
/// already cast a ballot there.
pub async fn load(
    store: &Store,
    principal: Option<&Principal>,
    election_id: Option<ElectionId>,
    candidate_ids: &[CandidateId],
) -> Result<Loaded> {
    let mut loaded = Loaded::default();
    if let Some(election_id) = election_id {
        loaded.election = store
            .coll::<Election>()
            .find_one(u32_id_filter(election_id), None)
            .await?;
    }
    if !candidate_ids.is_empty() {
        loaded.candidates = store
            .coll::<Candidate>()
            .find(doc! { "_id": { "$in": candidate_ids.to_vec() } }, None)
            .await?
            .try_collect()
            .await?;
    }
    if let (Some(principal), Some(election)) = (principal, &loaded.election) {
        loaded.already_voted = store
            .coll::<Ballot>()
            .find_one(
                doc! { "voter_id": principal.id, "election_id": election.id },
                None,
            )
            .await?
            .is_some();
    }
    Ok(loaded)
}

/// Check every choice of a ballot against the loaded state.
pub fn check_all(
    principal: Option<&Principal>,
    loaded: &Loaded,
    choices: &[Choice],
    now: DateTime<Utc>,
    local: FixedOffset,
) -> std::result::Result<(), Rejection> {
    choices.iter().try_for_each(|choice| {
        check(
            VoteAttempt {
                principal,
                election: loaded.election.as_ref(),
                candidate: loaded.candidate(choice.candidate_id),
                rank: choice.rank,
                already_voted: loaded.already_voted,
            },
            now,
            local,
        )
    })
}

/// Whether the principal may vote for the given candidate.
///
/// A missing election or candidate ID is reported as [`Rejection::NotFound`].
pub async fn can_vote(
    store: &Store,
    principal: Option<&Principal>,
    election_id: Option<ElectionId>,
    candidate_id: Option<CandidateId>,
    rank: Option<u32>,
    now: DateTime<Utc>,
    local: FixedOffset,
) -> Result<()> {
    let Some(principal) = principal else {
        return Err(Rejection::AuthRequired.into());
    };
    let candidate_ids: Vec<_> = candidate_id.into_iter().collect();
    let loaded = load(store, Some(principal), election_id, &candidate_ids).await?;
    let attempt = VoteAttempt {
        principal: Some(principal),
        election: loaded.election.as_ref(),
        candidate: candidate_id.and_then(|id| loaded.candidate(id)),
        rank,
        already_voted: loaded.already_voted,
    };
    Ok(check(attempt, now, local)?)
}
