use chrono::Utc;
use mongodb::bson::doc;
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        account::{Credentials, Registered, Registration, TokenResponse, UserDetails},
        auth::{Claims, Principal},
    },
    db::{
        profile::Profile,
        user::{provision_account, User},
    },
    mongodb::{u32_id_filter, Coll},
};
use crate::voting::Store;
use crate::Config;

pub fn routes() -> Vec<Route> {
    routes![register, token, current_user]
}

#[post("/register/", data = "<registration>", format = "json")]
pub async fn register(
    registration: Json<Registration>,
    store: Store,
) -> Result<(Status, Json<Registered>)> {
    let account = registration
        .into_inner()
        .into_account(Utc::now().date_naive())?;
    let (user, profile) = provision_account(
        &store.client,
        &store.coll(),
        &store.coll(),
        &store.coll(),
        account,
    )
    .await?;

    Ok((
        Status::Created,
        Json(Registered {
            success: true,
            message: "User registered successfully.".to_string(),
            user: UserDetails::new(&user, &profile),
        }),
    ))
}

fn invalid_credentials() -> Error {
    Error::Status(
        Status::Unauthorized,
        "No active account found with the given credentials.".to_string(),
    )
}

#[post("/token/", data = "<credentials>", format = "json")]
pub async fn token(
    credentials: Json<Credentials>,
    users: Coll<User>,
    profiles: Coll<Profile>,
    config: &State<Config>,
) -> Result<Json<TokenResponse>> {
    let user = users
        .find_one(doc! { "username": &credentials.username }, None)
        .await?
        .ok_or_else(invalid_credentials)?;
    if !user.verify_password(&credentials.password) {
        return Err(invalid_credentials());
    }
    let active = Profile::for_user(&profiles, user.id)
        .await?
        .map_or(false, |profile| profile.is_active);
    if !active {
        return Err(invalid_credentials());
    }

    let access = Claims::new(&user, config).encode(config)?;
    info!("Issued token for user {}", user.id);
    Ok(Json(TokenResponse { access }))
}

#[get("/user/")]
pub async fn current_user(
    principal: Principal,
    users: Coll<User>,
    profiles: Coll<Profile>,
) -> Result<Json<UserDetails>> {
    let user = users
        .find_one(u32_id_filter(principal.id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", principal.id)))?;
    let profile = Profile::for_user(&profiles, principal.id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile of user {}", principal.id)))?;
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
    use crate::api::testing::{login_admin, register_voter};
    use crate::error::ErrorBody;
    use crate::model::{
        api::{account::Registration, auth::AUTHORIZATION_HEADER},
        common::role::Role,
    };

    #[backend_test]
    async fn register_then_fetch_self(client: Client) {
        let (id, auth) = register_voter(&client, "alice").await;

        let response = client.get(uri!(current_user)).header(auth).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let details = response.into_json::<UserDetails>().await.unwrap();
        assert_eq!(details.id, id);
        assert_eq!(details.username, "alice");
        assert_eq!(details.role, Role::Voter);
        assert!(!details.is_superuser);
    }

    #[backend_test]
    async fn admin_token_carries_admin_role(client: Client) {
        let auth = login_admin(&client).await;
        let response = client.get(uri!(current_user)).header(auth).dispatch().await;
        let details = response.into_json::<UserDetails>().await.unwrap();
        assert_eq!(details.role, Role::Admin);
        assert!(details.is_superuser);
    }

    #[backend_test]
    async fn underage_registration_fails(client: Client) {
        let registration = Registration {
            date_of_birth: Utc::now().date_naive(),
            ..Registration::example("baby")
        };
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(registration).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert!(body.detail.contains("18"));
    }

    #[backend_test]
    async fn wrong_password_is_unauthorized(client: Client) {
        register_voter(&client, "bob").await;
        let response = client
            .post(uri!(token))
            .header(ContentType::JSON)
            .body(json!({ "username": "bob", "password": "wrong password" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .post(uri!(token))
            .header(ContentType::JSON)
            .body(json!({ "username": "nobody", "password": "wrong password" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn bad_tokens_are_unauthorized(client: Client) {
        let response = client.get(uri!(current_user)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert!(!body.detail.is_empty());

        let forged = Header::new(AUTHORIZATION_HEADER, "Bearer not.a.token");
        let response = client.get(uri!(current_user)).header(forged).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
