use chrono::{Datelike, NaiveDate};
use phonenumber::Mode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{role::Role, UserId},
    db::{profile::Profile, user::NewAccount, user::User},
};

/// Voters must be at least this old to register.
pub const MIN_AGE: i32 = 18;

/// A self-service registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    /// Phone number in international format, e.g. `+447700900123`.
    #[serde(default)]
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
}

impl Registration {
    /// Validate the registration as of `today`, producing an account to provision.
    pub fn into_account(self, today: NaiveDate) -> Result<NewAccount> {
        if age_on(self.date_of_birth, today) < MIN_AGE {
            return Err(Error::Validation(format!(
                "You must be at least {MIN_AGE} years old to register."
            )));
        }
        let phone = match self.phone.as_deref().map(str::trim) {
            None | Some("") => String::new(),
            Some(raw) => normalise_phone(raw)?,
        };
        Ok(NewAccount {
            username: self.username.trim().to_string(),
            password: self.password,
            email: self.email,
            is_superuser: false,
            phone,
            date_of_birth: Some(self.date_of_birth),
        })
    }
}

/// Whole years between `born` and `today`.
pub fn age_on(born: NaiveDate, today: NaiveDate) -> i32 {
    let before_birthday = (today.month(), today.day()) < (born.month(), born.day());
    today.year() - born.year() - i32::from(before_birthday)
}

/// Parse a phone number and render it in E.164 form.
fn normalise_phone(raw: &str) -> Result<String> {
    let invalid =
        || Error::Validation("Enter a valid phone number in international format.".to_string());
    let number = phonenumber::parse(None, raw).map_err(|_| invalid())?;
    Ok(number.format().mode(Mode::E164).to_string())
}

/// Login credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A freshly issued bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access: String,
}

/// Public details of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_superuser: bool,
    pub role: Role,
}

impl UserDetails {
    pub fn new(user: &User, profile: &Profile) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_superuser: user.is_superuser,
            role: profile.role.effective(user.is_superuser),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registered {
    pub success: bool,
    pub message: String,
    pub user: UserDetails,
}

/// A change of role for some principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl Registration {
        pub fn example(username: &str) -> Self {
            Self {
                username: username.to_string(),
                password: "correct horse battery".to_string(),
                email: format!("{username}@example.com"),
                phone: Some("+44 7700 900123".to_string()),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_whole_years() {
        assert_eq!(age_on(date(2000, 6, 15), date(2018, 6, 14)), 17);
        assert_eq!(age_on(date(2000, 6, 15), date(2018, 6, 15)), 18);
        assert_eq!(age_on(date(2000, 2, 29), date(2018, 3, 1)), 18);
    }

    #[test]
    fn minors_cannot_register() {
        let registration = Registration {
            date_of_birth: date(2010, 1, 1),
            ..Registration::example("kid")
        };
        let result = registration.into_account(date(2025, 9, 20));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn phone_is_normalised() {
        let account = Registration::example("dave")
            .into_account(date(2025, 9, 20))
            .unwrap();
        assert_eq!(account.phone, "+447700900123");
        assert!(!account.is_superuser);

        let registration = Registration {
            phone: Some("not a number".to_string()),
            ..Registration::example("erin")
        };
        assert!(registration.into_account(date(2025, 9, 20)).is_err());

        let registration = Registration {
            phone: None,
            ..Registration::example("frank")
        };
        let account = registration.into_account(date(2025, 9, 20)).unwrap();
        assert_eq!(account.phone, "");
    }
}
