//! JSON bodies for requests that never reach a handler, or whose guards fail.

use rocket::{http::Status, serde::json::Json, Catcher, Request};

use crate::error::{Error, ErrorBody};

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        internal_error,
        default_catcher
    ]
}

fn body(status: Status, detail: impl Into<String>) -> (Status, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

#[catch(400)]
fn bad_request() -> (Status, Json<ErrorBody>) {
    body(Status::BadRequest, "Malformed request.")
}

#[catch(401)]
fn unauthorized() -> (Status, Json<ErrorBody>) {
    body(Status::Unauthorized, Error::AuthRequired.to_string())
}

#[catch(403)]
fn forbidden() -> (Status, Json<ErrorBody>) {
    body(
        Status::Forbidden,
        "You do not have permission to perform this action.",
    )
}

#[catch(404)]
fn not_found(req: &Request) -> (Status, Json<ErrorBody>) {
    body(Status::NotFound, format!("No route for {}.", req.uri()))
}

/// Bodies that parse but do not match the expected shape are reported as
/// plain bad requests.
#[catch(422)]
fn unprocessable() -> (Status, Json<ErrorBody>) {
    body(Status::BadRequest, "Malformed request body.")
}

#[catch(500)]
fn internal_error() -> (Status, Json<ErrorBody>) {
    body(Status::InternalServerError, "Internal server error.")
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ErrorBody>) {
    body(status, status.reason().unwrap_or("Unknown error."))
}

#[cfg(test)]
mod tests {
    use rocket::{http::ContentType, local::asynchronous::Client};

    use super::*;

    #[backend_test]
    async fn malformed_bodies_are_bad_requests(client: Client) {
        let response = client
            .post("/token/")
            .header(ContentType::JSON)
            .body(r#"{"username": 7}"#)
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.detail, "Malformed request body.");
    }

    #[backend_test]
    async fn unknown_routes_are_json(client: Client) {
        let response = client.get("/nowhere/").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
        assert!(response.into_json::<ErrorBody>().await.is_some());
    }
}
