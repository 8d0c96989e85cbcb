use chrono::Utc;
use rocket::{http::Status, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        account::{RoleUpdate, UserDetails},
        admin::{EligibilityDescription, EligibilitySpec, LogDescription},
        auth::{ClientMeta, Principal},
        election::{AdminCandidate, AdminElectionDescription, CandidateSpec, ElectionSpec},
    },
    common::{
        election::{CandidateId, ElectionId},
        UserId,
    },
    db::{profile::Profile, user::User},
    mongodb::{u32_id_filter, Coll},
};
use crate::voting::{audit, catalog, lifecycle, Store};

pub fn routes() -> Vec<Route> {
    routes![
        elections,
        create_election,
        election,
        update_election,
        delete_election,
        launch_election,
        close_election,
        add_candidate,
        update_candidate,
        delete_candidate,
        voters,
        add_voter,
        logs,
        set_role,
    ]
}

#[get("/admin/elections/")]
async fn elections(
    principal: Principal,
    store: Store,
) -> Result<Json<Vec<AdminElectionDescription>>> {
    let elections = catalog::admin_elections(&store, &principal).await?;
    Ok(Json(
        elections
            .into_iter()
            .map(|(election, candidates)| AdminElectionDescription::new(election, candidates))
            .collect(),
    ))
}

#[post("/admin/elections/", data = "<spec>", format = "json")]
async fn create_election(
    principal: Principal,
    spec: Json<ElectionSpec>,
    meta: ClientMeta,
    store: Store,
) -> Result<(Status, Json<AdminElectionDescription>)> {
    let (election, candidates) =
        catalog::create_election(&store, &principal, spec.into_inner(), &meta, Utc::now()).await?;
    Ok((
        Status::Created,
        Json(AdminElectionDescription::new(election, candidates)),
    ))
}

#[get("/admin/elections/<election_id>/")]
async fn election(
    principal: Principal,
    election_id: ElectionId,
    store: Store,
) -> Result<Json<AdminElectionDescription>> {
    let (election, candidates) = catalog::admin_election(&store, &principal, election_id).await?;
    Ok(Json(AdminElectionDescription::new(election, candidates)))
}

#[put("/admin/elections/<election_id>/", data = "<spec>", format = "json")]
async fn update_election(
    principal: Principal,
    election_id: ElectionId,
    spec: Json<ElectionSpec>,
    meta: ClientMeta,
    store: Store,
) -> Result<Json<AdminElectionDescription>> {
    let (election, candidates) = catalog::update_election(
        &store,
        &principal,
        election_id,
        spec.into_inner(),
        &meta,
        Utc::now(),
    )
    .await?;
    Ok(Json(AdminElectionDescription::new(election, candidates)))
}

#[delete("/admin/elections/<election_id>/")]
async fn delete_election(
    principal: Principal,
    election_id: ElectionId,
    store: Store,
) -> Result<Status> {
    catalog::delete_election(&store, &principal, election_id).await?;
    Ok(Status::NoContent)
}

#[post("/admin/elections/<election_id>/launch/")]
async fn launch_election(
    principal: Principal,
    election_id: ElectionId,
    meta: ClientMeta,
    store: Store,
) -> Result<Json<AdminElectionDescription>> {
    let election = lifecycle::launch(&store, &principal, election_id, &meta, Utc::now()).await?;
    let candidates = catalog::candidates_of(&store, election_id).await?;
    Ok(Json(AdminElectionDescription::new(election, candidates)))
}

#[post("/admin/elections/<election_id>/close/")]
async fn close_election(
    principal: Principal,
    election_id: ElectionId,
    meta: ClientMeta,
    store: Store,
) -> Result<Json<AdminElectionDescription>> {
    let election = lifecycle::close(&store, &principal, election_id, &meta, Utc::now()).await?;
    let candidates = catalog::candidates_of(&store, election_id).await?;
    Ok(Json(AdminElectionDescription::new(election, candidates)))
}

#[post("/admin/elections/<election_id>/candidates/", data = "<spec>", format = "json")]
async fn add_candidate(
    principal: Principal,
    election_id: ElectionId,
    spec: Json<CandidateSpec>,
    meta: ClientMeta,
    store: Store,
) -> Result<(Status, Json<AdminCandidate>)> {
    let candidate = catalog::add_candidate(
        &store,
        &principal,
        election_id,
        spec.into_inner(),
        &meta,
        Utc::now(),
    )
    .await?;
    Ok((Status::Created, Json(candidate.into())))
}

#[put(
    "/admin/elections/<election_id>/candidates/<candidate_id>/",
    data = "<spec>",
    format = "json"
)]
async fn update_candidate(
    principal: Principal,
    election_id: ElectionId,
    candidate_id: CandidateId,
    spec: Json<CandidateSpec>,
    store: Store,
) -> Result<Json<AdminCandidate>> {
    let candidate = catalog::update_candidate(
        &store,
        &principal,
        election_id,
        candidate_id,
        spec.into_inner(),
    )
    .await?;
    Ok(Json(candidate.into()))
}

#[delete("/admin/elections/<election_id>/candidates/<candidate_id>/")]
async fn delete_candidate(
    principal: Principal,
    election_id: ElectionId,
    candidate_id: CandidateId,
    store: Store,
) -> Result<Status> {
    catalog::delete_candidate(&store, &principal, election_id, candidate_id).await?;
    Ok(Status::NoContent)
}

#[get("/admin/elections/<election_id>/voters/")]
async fn voters(
    principal: Principal,
    election_id: ElectionId,
    store: Store,
) -> Result<Json<Vec<EligibilityDescription>>> {
    let voters = catalog::voters_of(&store, &principal, election_id).await?;
    Ok(Json(voters.into_iter().map(Into::into).collect()))
}

#[post("/admin/elections/<election_id>/voters/", data = "<spec>", format = "json")]
async fn add_voter(
    principal: Principal,
    election_id: ElectionId,
    spec: Json<EligibilitySpec>,
    meta: ClientMeta,
    store: Store,
) -> Result<(Status, Json<EligibilityDescription>)> {
    let eligibility = catalog::add_voter(
        &store,
        &principal,
        election_id,
        spec.into_inner(),
        &meta,
        Utc::now(),
    )
    .await?;
    Ok((Status::Created, Json(eligibility.into())))
}

#[get("/admin/elections/<election_id>/logs/")]
async fn logs(
    principal: Principal,
    election_id: ElectionId,
    store: Store,
) -> Result<Json<Vec<LogDescription>>> {
    principal.require_admin("view audit logs")?;
    catalog::find_election(&store, election_id).await?;
    let entries = audit::history(&store, election_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

#[put("/admin/users/<user_id>/role/", data = "<update>", format = "json")]
async fn set_role(
    principal: Principal,
    user_id: UserId,
    update: Json<RoleUpdate>,
    users: Coll<User>,
    profiles: Coll<Profile>,
) -> Result<Json<UserDetails>> {
    principal.require_admin("change roles")?;
    let user = users
        .find_one(u32_id_filter(user_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {user_id}")))?;
    let profile = Profile::set_role(&profiles, user_id, update.role)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile of user {user_id}")))?;
    info!(
        "Admin {} set role of user {user_id} to {}",
        principal.id, profile.role
    );
    Ok(Json(UserDetails::new(&user, &profile)))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Header},
        local::asynchronous::Client,
        serde::json::json,
    };

    use super::*;
    use crate::api::testing::{login, login_admin, register_voter};
    use crate::error::ErrorBody;
    use crate::model::common::{
        audit::LogAction, election::ElectionState, role::Role,
    };

    async fn create(client: &Client, auth: &Header<'static>, spec: &ElectionSpec) -> AdminElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test]
    async fn voters_cannot_manage_elections(client: Client) {
        let (_, auth) = register_voter(&client, "mallory").await;
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!(ElectionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.detail, "You do not have permission to manage elections.");

        let response = client.get(uri!(elections)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        // Permission is checked before existence.
        let response = client
            .post(uri!(launch_election(999_u32)))
            .header(auth)
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn election_lifecycle(client: Client) {
        let auth = login_admin(&client).await;
        let spec = ElectionSpec {
            is_active: false,
            candidates: None,
            ..ElectionSpec::example()
        };
        let created = create(&client, &auth, &spec).await;
        assert_eq!(created.state, ElectionState::Draft);
        assert!(!created.is_active);

        // No candidates yet.
        let response = client
            .post(uri!(launch_election(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.detail, Error::NoCandidate.to_string());

        let response = client
            .post(uri!(add_candidate(created.id)))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!(CandidateSpec::example("Alice")).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let response = client
            .post(uri!(launch_election(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let launched = response.into_json::<AdminElectionDescription>().await.unwrap();
        assert_eq!(launched.state, ElectionState::Active);
        assert_eq!(launched.candidates.len(), 1);

        let response = client
            .post(uri!(close_election(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        let closed = response.into_json::<AdminElectionDescription>().await.unwrap();
        assert_eq!(closed.state, ElectionState::Closed);

        let response = client
            .get(uri!(logs(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        let actions: Vec<_> = response
            .into_json::<Vec<LogDescription>>()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                LogAction::ElectionEnded,
                LogAction::ElectionStarted,
                LogAction::CandidateAdded,
                LogAction::ElectionCreated,
            ]
        );

        let response = client
            .delete(uri!(delete_election(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        assert_eq!(Status::NoContent, response.status());
        let response = client
            .get(uri!(election(created.id)))
            .header(auth)
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn update_replaces_candidates(client: Client) {
        let auth = login_admin(&client).await;
        let spec = ElectionSpec {
            candidates: Some(vec![
                CandidateSpec::example("Alice"),
                CandidateSpec::example("Bob"),
                CandidateSpec::example("Carol"),
            ]),
            ..ElectionSpec::example()
        };
        let created = create(&client, &auth, &spec).await;
        let kept = &created.candidates[0];

        let update = ElectionSpec {
            name: "Renamed".to_string(),
            candidates: Some(vec![
                CandidateSpec {
                    id: Some(kept.id),
                    ..CandidateSpec::example("Alicia")
                },
                CandidateSpec::example("Dan"),
            ]),
            ..ElectionSpec::example()
        };
        let response = client
            .put(uri!(update_election(created.id)))
            .header(ContentType::JSON)
            .header(auth)
            .body(json!(update).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let updated = response.into_json::<AdminElectionDescription>().await.unwrap();
        assert_eq!(updated.name, "Renamed");
        let names: Vec<_> = updated.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alicia", "Dan"]);
        assert!(updated.candidates.iter().any(|c| c.id == kept.id));
    }

    #[backend_test]
    async fn invalid_specs_are_rejected(client: Client) {
        let auth = login_admin(&client).await;
        let mut spec = ElectionSpec::example();
        spec.end_time = spec.start_time;
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .header(auth)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn voters_and_roles(client: Client) {
        let auth = login_admin(&client).await;
        let created = create(&client, &auth, &ElectionSpec::example()).await;
        let (voter_id, _) = register_voter(&client, "dave").await;

        let body = json!({ "voter": voter_id, "is_invited": true }).to_string();
        let response = client
            .post(uri!(add_voter(created.id)))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(body.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let added = response.into_json::<EligibilityDescription>().await.unwrap();
        assert!(added.invitation_sent_at.is_some());

        // Adding the same voter twice fails.
        let response = client
            .post(uri!(add_voter(created.id)))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(body)
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client
            .get(uri!(voters(created.id)))
            .header(auth.clone())
            .dispatch()
            .await;
        let listed = response.into_json::<Vec<EligibilityDescription>>().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].voter, voter_id);

        // Promote the voter to admin; their next request sees the new role.
        let response = client
            .put(uri!(set_role(voter_id)))
            .header(ContentType::JSON)
            .header(auth)
            .body(json!({ "role": "admin" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let details = response.into_json::<UserDetails>().await.unwrap();
        assert_eq!(details.role, Role::Admin);

        let promoted = login(&client, "dave", "correct horse battery").await;
        let response = client.get(uri!(elections)).header(promoted).dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test]
    async fn superusers_cannot_lose_admin(client: Client) {
        let auth = login_admin(&client).await;
        let response = client.get("/user/").header(auth.clone()).dispatch().await;
        let me = response.into_json::<UserDetails>().await.unwrap();
        assert!(me.is_superuser);

        let response = client
            .put(uri!(set_role(me.id)))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(json!({ "role": "voter" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let details = response.into_json::<UserDetails>().await.unwrap();
        assert_eq!(details.role, Role::Admin);

        let response = client.get("/user/").header(auth.clone()).dispatch().await;
        let me = response.into_json::<UserDetails>().await.unwrap();
        assert_eq!(me.role, Role::Admin);
        let response = client.get(uri!(elections)).header(auth).dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }
}
