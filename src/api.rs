use rocket::{Catcher, Route};

mod accounts;
mod admin;
mod catchers;
mod public;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(accounts::routes());
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voting::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers::catchers()
}

/// Helpers for driving the API from tests.
#[cfg(test)]
pub(crate) mod testing {
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::Client,
        serde::json::json,
    };

    use crate::config::BootstrapConfig;
    use crate::model::{
        api::{
            account::{Registered, Registration, TokenResponse},
            auth::{AUTHORIZATION_HEADER, BEARER_PREFIX},
        },
        common::UserId,
    };

    /// Log in, returning the `Authorization` header to send with later requests.
    pub async fn login(client: &Client, username: &str, password: &str) -> Header<'static> {
        let response = client
            .post(uri!(super::accounts::token))
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": password }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let token = response.into_json::<TokenResponse>().await.unwrap();
        Header::new(AUTHORIZATION_HEADER, format!("{BEARER_PREFIX}{}", token.access))
    }

    /// Log in as the bootstrap superuser.
    pub async fn login_admin(client: &Client) -> Header<'static> {
        let bootstrap = client
            .rocket()
            .figment()
            .extract::<BootstrapConfig>()
            .unwrap();
        login(client, bootstrap.admin_username(), bootstrap.admin_password()).await
    }

    /// Register a new voter and log them in.
    pub async fn register_voter(client: &Client, username: &str) -> (UserId, Header<'static>) {
        let registration = Registration::example(username);
        let response = client
            .post(uri!(super::accounts::register))
            .header(ContentType::JSON)
            .body(json!(registration).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let registered = response.into_json::<Registered>().await.unwrap();
        let auth = login(client, username, &registration.password).await;
        (registered.user.id, auth)
    }
}
