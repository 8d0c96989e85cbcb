use std::collections::HashMap;

use mongodb::bson::{doc, from_document};
use rocket::futures::TryStreamExt;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    api::results::{CandidateResult, ElectionResults},
    common::election::{CandidateId, ElectionId},
    db::{candidate::Candidate, election::Election, vote::Vote},
    mongodb::u32_id_filter,
};

use super::{catalog, Store};

/// One row of the counting aggregation.
#[derive(Debug, Deserialize)]
struct CandidateCount {
    #[serde(rename = "_id")]
    candidate_id: CandidateId,
    votes: i64,
}

/// Count the vote rows of an election, grouped by candidate.
///
/// Candidates without votes are absent from the result.
async fn count_votes(store: &Store, election_id: ElectionId) -> Result<HashMap<CandidateId, u64>> {
    let pipeline = [
        doc! { "$match": { "election_id": election_id } },
        doc! { "$group": { "_id": "$candidate_id", "votes": { "$sum": 1 } } },
    ];
    let mut counts = HashMap::new();
    let mut cursor = store.coll::<Vote>().aggregate(pipeline, None).await?;
    while let Some(row) = cursor.try_next().await? {
        let row: CandidateCount = from_document(row).map_err(mongodb::error::Error::from)?;
        counts.insert(row.candidate_id, u64::try_from(row.votes).unwrap_or_default());
    }
    Ok(counts)
}

/// Pair every candidate with its count, in display order. Candidates without
/// votes get 0.
pub fn merge_counts(
    candidates: &[Candidate],
    counts: &HashMap<CandidateId, u64>,
) -> Vec<CandidateResult> {
    candidates
        .iter()
        .map(|candidate| CandidateResult {
            id: candidate.id,
            name: candidate.name.clone(),
            votes: counts.get(&candidate.id).copied().unwrap_or(0),
        })
        .collect()
}

/// Vote counts of every candidate of an election.
pub async fn tally(store: &Store, election_id: ElectionId) -> Result<HashMap<CandidateId, u64>> {
    let candidates = catalog::candidates_of(store, election_id).await?;
    let counts = count_votes(store, election_id).await?;
    Ok(merge_counts(&candidates, &counts)
        .into_iter()
        .map(|result| (result.id, result.votes))
        .collect())
}

/// Results of an election, available at any time.
pub async fn results(store: &Store, election_id: ElectionId) -> Result<ElectionResults> {
    let election = store
        .coll::<Election>()
        .find_one(u32_id_filter(election_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    let candidates = catalog::candidates_of(store, election_id).await?;
    let counts = count_votes(store, election_id).await?;
    Ok(ElectionResults {
        id: election.id,
        name: election.election.name,
        candidates: merge_counts(&candidates, &counts),
    })
}
