use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use mongodb::Database;
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    common::{role::Role, UserId},
    db::{profile::Profile, user::User},
    mongodb::Coll,
};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const BEARER_PREFIX: &str = "Bearer ";

/// Token claims: who the bearer is, plus an expiry datetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "uid")]
    pub user_id: UserId,
    #[serde(rename = "su")]
    pub is_superuser: bool,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
}

impl Claims {
    /// Claims for the given user, valid for the configured lifetime.
    pub fn new(user: &User, config: &Config) -> Self {
        Self {
            user_id: user.id,
            is_superuser: user.is_superuser,
            expire_at: Utc::now() + config.auth_ttl(),
        }
    }

    /// Sign these claims into a bearer token.
    pub fn encode(&self, config: &Config) -> Result<String> {
        Ok(jsonwebtoken::encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?)
    }

    /// Verify a bearer token and extract its claims.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| data.claims)?;
        Ok(claims)
    }
}

/// The authenticated caller of a request.
///
/// Resolved once per request from the bearer token and the caller's profile,
/// then passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub is_superuser: bool,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with [`Error::Forbidden`] unless this principal is an admin.
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden(action))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = Error;

    /// Get the principal from the bearer token, checking their profile is still active.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let token = req
            .headers()
            .get_one(AUTHORIZATION_HEADER)
            .and_then(|header| header.strip_prefix(BEARER_PREFIX));
        let Some(token) = token else {
            return Outcome::Failure((Status::Unauthorized, Error::AuthRequired));
        };
        let claims = match Claims::decode(token, config) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Rejected bearer token: {e}");
                return Outcome::Failure((Status::Unauthorized, Error::AuthRequired));
            }
        };

        let db = req.guard::<&State<Database>>().await.unwrap();
        match Profile::for_user(&Coll::from_db(db), claims.user_id).await {
            Ok(Some(profile)) if profile.is_active => Outcome::Success(Self {
                id: claims.user_id,
                is_superuser: claims.is_superuser,
                role: profile.role.effective(claims.is_superuser),
            }),
            Ok(_) => Outcome::Failure((Status::Unauthorized, Error::AuthRequired)),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}

/// Where a request came from, recorded alongside votes and audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientMeta {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(Self {
            ip_address: req.client_ip().map(|ip| ip.to_string()),
            user_agent: req
                .headers()
                .get_one("User-Agent")
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl Principal {
        pub fn example_admin() -> Self {
            Self {
                id: 1,
                is_superuser: true,
                role: Role::Admin,
            }
        }

        pub fn example_voter(id: UserId) -> Self {
            Self {
                id,
                is_superuser: false,
                role: Role::Voter,
            }
        }
    }
}
