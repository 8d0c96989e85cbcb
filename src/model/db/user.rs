use chrono::{DateTime, NaiveDate, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    Client,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BootstrapConfig;
use crate::error::{Error, Result};
use crate::model::{
    common::UserId,
    db::profile::Profile,
    mongodb::{is_duplicate_key_error, Coll, Counter, CounterId},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// An account from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password_hash: String,
    pub is_superuser: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// Hash a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    Ok(argon2::hash_encoded(
        password.as_bytes(),
        &salt,
        &argon2::Config::default(),
    )?)
}

/// Everything needed to provision a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub is_superuser: bool,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
}

/// Create an account and its profile in a single transaction.
///
/// The profile is written here, as an explicit step of provisioning, with the
/// admin role for superusers and the voter role for everyone else.
pub async fn provision_account(
    db_client: &Client,
    users: &Coll<User>,
    profiles: &Coll<Profile>,
    counters: &Coll<Counter>,
    account: NewAccount,
) -> Result<(User, Profile)> {
    if account.username.trim().is_empty() {
        return Err(Error::Validation("Username must not be empty.".to_string()));
    }
    if account.password.len() < MIN_PASSWORD_LENGTH {
        return Err(Error::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters."
        )));
    }
    let taken = users
        .find_one(doc! { "username": &account.username }, None)
        .await?;
    if taken.is_some() {
        return Err(username_taken());
    }

    let id = Counter::next(counters, CounterId::Users).await?;
    let user = User {
        id,
        username: account.username,
        email: account.email,
        password_hash: hash_password(&account.password)?,
        is_superuser: account.is_superuser,
        date_joined: Utc::now(),
    };
    let profile = Profile::new(
        id,
        account.is_superuser,
        account.phone,
        account.date_of_birth,
    );

    // Dropping the session without committing aborts the transaction.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    if let Err(err) = users
        .insert_one_with_session(&user, None, &mut session)
        .await
    {
        return Err(if is_duplicate_key_error(&err) {
            username_taken()
        } else {
            err.into()
        });
    }
    profiles
        .insert_one_with_session(&profile, None, &mut session)
        .await?;
    session.commit_transaction().await?;

    info!(
        "Provisioned account {} ({}) with role {}",
        user.id, user.username, profile.role
    );
    Ok((user, profile))
}

fn username_taken() -> Error {
    Error::Validation("A user with that username already exists.".to_string())
}

/// Ensure that at least one superuser exists, provisioning the bootstrap
/// account from the config if none does.
pub async fn ensure_superuser_exists(
    db_client: &Client,
    users: &Coll<User>,
    profiles: &Coll<Profile>,
    counters: &Coll<Counter>,
    bootstrap: &BootstrapConfig,
) -> Result<()> {
    let superusers = users
        .count_documents(doc! { "is_superuser": true }, None)
        .await?;
    if superusers > 0 {
        return Ok(());
    }

    warn!(
        "No superuser found, provisioning bootstrap admin '{}'",
        bootstrap.admin_username()
    );
    let account = NewAccount {
        username: bootstrap.admin_username().to_string(),
        password: bootstrap.admin_password().to_string(),
        email: String::new(),
        is_superuser: true,
        phone: String::new(),
        date_of_birth: None,
    };
    provision_account(db_client, users, profiles, counters, account).await?;
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl NewAccount {
        pub fn example_voter(username: &str) -> Self {
            Self {
                username: username.to_string(),
                password: "correct horse battery".to_string(),
                email: format!("{username}@example.com"),
                is_superuser: false,
                phone: String::new(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
            }
        }
    }
}
