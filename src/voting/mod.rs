//! The voting workflow: who may vote, recording ballots, counting them, and
//! managing elections through their lifecycle.

pub mod audit;
pub mod catalog;
pub mod eligibility;
pub mod ledger;
pub mod lifecycle;
pub mod tally;

use mongodb::{Client, Database};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::mongodb::{Coll, MongoCollection};

/// Handles on the database, for operations spanning several collections.
#[derive(Clone)]
pub struct Store {
    pub client: Client,
    pub db: Database,
}

impl Store {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    /// Get a handle on the collection of the given type.
    pub fn coll<T: MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Panics iff the [`Client`] or [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let client = req.guard::<&State<Client>>().await.unwrap();
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Self::new(client.inner().clone(), db.inner().clone()))
    }
}
