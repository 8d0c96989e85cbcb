#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod voting;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;

/// Assemble the server: fairings for logging, config and the database, every
/// API route, and the JSON error catchers.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Connect to the database named by `db_uri` in the active figment.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .unwrap();
    mongodb::Client::with_uri_str(db_uri).await.unwrap()
}

#[cfg(test)]
fn database() -> String {
    config::get_database_name()
}

/// A server wired to an already-connected database, prepared exactly as the
/// production fairing would prepare it.
#[cfg(test)]
async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let rocket = rocket::build();
    let db = client.database(db_name);
    let bootstrap = rocket
        .figment()
        .extract::<config::BootstrapConfig>()
        .unwrap();
    config::prepare_database(&client, &db, &bootstrap)
        .await
        .unwrap();

    rocket
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
