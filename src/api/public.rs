use rocket::{serde::json::Json, Route};

use crate::error::Result;
use crate::model::{
    api::{
        election::{ElectionDetail, ElectionSummary},
        results::ElectionResults,
    },
    common::election::ElectionId,
};
use crate::voting::{catalog, tally, Store};

pub fn routes() -> Vec<Route> {
    routes![elections, election, results]
}

#[get("/elections/")]
async fn elections(store: Store) -> Result<Json<Vec<ElectionSummary>>> {
    let elections = catalog::public_elections(&store).await?;
    Ok(Json(elections.iter().map(ElectionSummary::from).collect()))
}

#[get("/elections/<election_id>/")]
async fn election(election_id: ElectionId, store: Store) -> Result<Json<ElectionDetail>> {
    let (election, candidates) = catalog::public_election(&store, election_id).await?;
    Ok(Json(ElectionDetail::new(&election, &candidates)))
}

/// Results are never time-gated.
#[get("/results/<election_id>/")]
async fn results(election_id: ElectionId, store: Store) -> Result<Json<ElectionResults>> {
    Ok(Json(tally::results(&store, election_id).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use super::*;
    use crate::model::{
        api::{auth::Principal, election::ElectionSpec},
        common::election::Visibility,
    };

    #[backend_test]
    async fn only_launched_public_elections_are_listed(client: Client, store: Store) {
        let admin = Principal::example_admin();
        let meta = Default::default();
        let now = chrono::Utc::now();
        let draft = ElectionSpec {
            is_active: false,
            ..ElectionSpec::example()
        };
        let private = ElectionSpec {
            visibility: Visibility::Private,
            ..ElectionSpec::example()
        };
        let (draft, _) = catalog::create_election(&store, &admin, draft, &meta, now)
            .await
            .unwrap();
        let (open, _) = catalog::create_election(&store, &admin, ElectionSpec::example(), &meta, now)
            .await
            .unwrap();
        let (private, _) = catalog::create_election(&store, &admin, private, &meta, now)
            .await
            .unwrap();

        let response = client.get(uri!(elections)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let listed = response.into_json::<Vec<ElectionSummary>>().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open.id);
        assert_eq!(listed[0].name, "Referendum");

        let response = client.get(uri!(election(open.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let detail = response.into_json::<ElectionDetail>().await.unwrap();
        let names: Vec<_> = detail.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["No", "Yes"]);

        let response = client.get(uri!(election(draft.id))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        // Private elections are unlisted but still reachable by ID.
        let response = client.get(uri!(election(private.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let detail = response.into_json::<ElectionDetail>().await.unwrap();
        assert_eq!(detail.election.id, private.id);
    }

    #[backend_test]
    async fn results_include_empty_candidates(client: Client, store: Store) {
        let admin = Principal::example_admin();
        let (open, _) = catalog::create_election(
            &store,
            &admin,
            ElectionSpec::example(),
            &Default::default(),
            chrono::Utc::now(),
        )
        .await
        .unwrap();

        let response = client.get(uri!(results(open.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let empty = response.into_json::<ElectionResults>().await.unwrap();
        assert_eq!(empty.id, open.id);
        assert_eq!(empty.candidates.len(), 2);
        assert_eq!(empty.total(), 0);

        let response = client.get(uri!(results(999_u32))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
