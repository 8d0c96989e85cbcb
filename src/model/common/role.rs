use std::fmt::Display;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Different privilege levels. Every principal has exactly one.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ElectionManager,
    Voter,
}

impl Role {
    /// The role a freshly provisioned account receives.
    pub fn for_new_account(is_superuser: bool) -> Self {
        if is_superuser {
            Self::Admin
        } else {
            Self::Voter
        }
    }

    /// The role a principal acts with. Superusers are admins whatever their
    /// stored profile says.
    pub fn effective(self, is_superuser: bool) -> Self {
        if is_superuser {
            Self::Admin
        } else {
            self
        }
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Admin => "admin",
                Self::ElectionManager => "election_manager",
                Self::Voter => "voter",
            }
        )
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        to_bson(&role).expect("Serialisation is infallible")
    }
}
