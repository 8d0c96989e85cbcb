use chrono::{DateTime, NaiveDate, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::{role::Role, UserId},
    mongodb::Coll,
};

/// Per-principal profile, attached 1:1 to a user. Holds the principal's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Foreign key: the owning user. Unique.
    pub user_id: UserId,
    pub role: Role,
    /// E.164 phone number, or empty.
    #[serde(default)]
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub is_active: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Create a new, active profile for the given account.
    pub fn new(
        user_id: UserId,
        is_superuser: bool,
        phone: String,
        date_of_birth: Option<NaiveDate>,
    ) -> Self {
        Self {
            user_id,
            role: Role::for_new_account(is_superuser),
            phone,
            date_of_birth,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Look up the profile of the given user.
    pub async fn for_user(profiles: &Coll<Profile>, user_id: UserId) -> Result<Option<Profile>> {
        Ok(profiles.find_one(doc! { "user_id": user_id }, None).await?)
    }

    /// Change the role of the given user, returning the updated profile.
    pub async fn set_role(
        profiles: &Coll<Profile>,
        user_id: UserId,
        role: Role,
    ) -> Result<Option<Profile>> {
        let update = doc! {
            "$set": { "role": role }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(profiles
            .find_one_and_update(doc! { "user_id": user_id }, update, options)
            .await?)
    }
}
