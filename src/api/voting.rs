use chrono::Utc;
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::api::{
    auth::{ClientMeta, Principal},
    vote::{BallotCreated, BallotRequest, MyVote, VoteCreated, VoteRequest},
};
use crate::voting::{eligibility::Choice, ledger, Store};
use crate::Config;

pub fn routes() -> Vec<Route> {
    routes![vote, ballot, my_votes]
}

/// The caller of a voting request, if authenticated.
///
/// Anonymous callers reach the handler so that the rejection carries the
/// voting-specific reason. Any other guard failure is passed on as is.
fn voter(principal: std::result::Result<Principal, Error>) -> Result<Option<Principal>> {
    match principal {
        Ok(principal) => Ok(Some(principal)),
        Err(Error::AuthRequired) => Ok(None),
        Err(e) => Err(e),
    }
}

#[post("/vote/", data = "<request>", format = "json")]
async fn vote(
    principal: std::result::Result<Principal, Error>,
    request: Json<VoteRequest>,
    meta: ClientMeta,
    store: Store,
    config: &State<Config>,
) -> Result<(Status, Json<VoteCreated>)> {
    let principal = voter(principal)?;
    let vote_id = ledger::cast_vote(
        &store,
        principal.as_ref(),
        request.election,
        request.candidate,
        request.rank,
        &meta,
        Utc::now(),
        config.local_offset(),
    )
    .await?;
    Ok((
        Status::Created,
        Json(VoteCreated {
            detail: "Vote cast successfully.".to_string(),
            vote_id,
        }),
    ))
}

#[post("/ballot/", data = "<request>", format = "json")]
async fn ballot(
    principal: std::result::Result<Principal, Error>,
    request: Json<BallotRequest>,
    meta: ClientMeta,
    store: Store,
    config: &State<Config>,
) -> Result<(Status, Json<BallotCreated>)> {
    let principal = voter(principal)?;
    let choices: Vec<_> = request
        .choices
        .iter()
        .map(|choice| Choice {
            candidate_id: choice.candidate,
            rank: choice.rank,
        })
        .collect();
    let vote_ids = ledger::cast_ballot(
        &store,
        principal.as_ref(),
        request.election,
        &choices,
        &meta,
        Utc::now(),
        config.local_offset(),
    )
    .await?;
    Ok((
        Status::Created,
        Json(BallotCreated {
            detail: "Ballot cast successfully.".to_string(),
            vote_ids,
        }),
    ))
}

#[get("/my-votes/")]
async fn my_votes(principal: Principal, store: Store) -> Result<Json<Vec<MyVote>>> {
    Ok(Json(ledger::my_votes(&store, &principal).await?))
}
