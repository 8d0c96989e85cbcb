use chrono::{Duration, FixedOffset};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::error::Result;
use crate::model::{
    db::user::ensure_superuser_exists,
    mongodb::{ensure_counters_exist, ensure_indexes_exist, Coll},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default)]
    utc_offset_minutes: i32,
    #[serde(default)]
    debug_errors: bool,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of bearer tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// The local timezone that daily voting windows are expressed in.
    /// Out-of-range offsets fall back to UTC.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }

    /// Whether internal error text may be returned to clients.
    pub fn debug_errors(&self) -> bool {
        self.debug_errors
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// Credentials of the superuser provisioned when the database has none.
#[derive(Deserialize)]
pub struct BootstrapConfig {
    admin_username: String,
    admin_password: String,
}

impl BootstrapConfig {
    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let figment = rocket.figment();
        let configs = figment
            .extract::<DbConfig>()
            .and_then(|db| Ok((db, figment.extract::<BootstrapConfig>()?)));
        let (config, bootstrap) = match configs {
            Ok(configs) => configs,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        if let Err(e) = prepare_database(&client, &db, &bootstrap).await {
            error!("Failed to prepare database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Create indexes and counters, and make sure a superuser exists.
///
/// This operation is idempotent.
pub async fn prepare_database(
    client: &MongoClient,
    db: &Database,
    bootstrap: &BootstrapConfig,
) -> Result<()> {
    ensure_indexes_exist(db).await?;
    ensure_counters_exist(&Coll::from_db(db)).await?;
    ensure_superuser_exists(
        client,
        &Coll::from_db(db),
        &Coll::from_db(db),
        &Coll::from_db(db),
        bootstrap,
    )
    .await
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "ballotd".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}
