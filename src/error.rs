use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons for refusing a vote, in the order they are checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Authentication required to vote.")]
    AuthRequired,
    #[error("Invalid election or candidate.")]
    NotFound,
    #[error("Invalid candidate for this election.")]
    InvalidCandidate,
    #[error("You have already voted in this election.")]
    AlreadyVoted,
    #[error("Election is not active.")]
    ElectionNotActive,
    #[error("Voting is closed at this time of day.")]
    OutsideVotingWindow,
    #[error("Rank is required for ranked choice elections.")]
    RankRequired,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Authentication credentials were not provided or are invalid.")]
    AuthRequired,
    #[error("You do not have permission to {0}.")]
    Forbidden(String),
    #[error("{0} not found.")]
    NotFound(String),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("{0}")]
    Validation(String),
    #[error("Cannot launch an election without at least one candidate.")]
    NoCandidate,
    #[error("Cannot launch an election with an end time in the past.")]
    EndTimeInPast,
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden(action.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Jwt(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::AuthRequired | Self::Rejected(Rejection::AuthRequired) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::Rejected(_) | Self::Validation(_) | Self::NoCandidate | Self::EndTimeInPast => {
                Status::BadRequest
            }
            Self::Status(status, _) => *status,
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let detail = if status.class() == StatusClass::ServerError {
            error!("{self}");
            // Raw storage errors are only exposed when explicitly configured.
            let debug_errors = req
                .rocket()
                .state::<Config>()
                .map(Config::debug_errors)
                .unwrap_or(false);
            if debug_errors {
                self.to_string()
            } else {
                "Internal server error.".to_string()
            }
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { detail })).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_bad_requests_except_auth() {
        assert_eq!(Error::from(Rejection::AuthRequired).status(), Status::Unauthorized);
        for rejection in [
            Rejection::NotFound,
            Rejection::InvalidCandidate,
            Rejection::AlreadyVoted,
            Rejection::ElectionNotActive,
            Rejection::OutsideVotingWindow,
            Rejection::RankRequired,
        ] {
            assert_eq!(Error::from(rejection).status(), Status::BadRequest);
        }
    }

    #[test]
    fn lifecycle_errors_map_to_statuses() {
        assert_eq!(Error::NoCandidate.status(), Status::BadRequest);
        assert_eq!(Error::EndTimeInPast.status(), Status::BadRequest);
        assert_eq!(Error::forbidden("launch elections").status(), Status::Forbidden);
        assert_eq!(Error::not_found("Election 4").status(), Status::NotFound);
        assert_eq!(
            Error::forbidden("launch elections").to_string(),
            "You do not have permission to launch elections."
        );
    }
}
