use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    candidate::Candidate,
    election::Election,
    eligibility::VoterEligibility,
    log::ElectionLog,
    profile::Profile,
    user::User,
    vote::{Ballot, Vote},
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

impl MongoCollection for User {
    const NAME: &'static str = "users";
}

impl MongoCollection for Profile {
    const NAME: &'static str = "profiles";
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for VoterEligibility {
    const NAME: &'static str = "voter_eligibility";
}

impl MongoCollection for Vote {
    const NAME: &'static str = "votes";
}

impl MongoCollection for Ballot {
    const NAME: &'static str = "ballots";
}

impl MongoCollection for ElectionLog {
    const NAME: &'static str = "election_logs";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Usernames identify accounts at login.
    let user_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(unique.clone())
        .build();
    Coll::<User>::from_db(db)
        .create_index(user_index, None)
        .await?;

    // One profile per principal; the first write wins.
    let profile_index = IndexModel::builder()
        .keys(doc! {"user_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Profile>::from_db(db)
        .create_index(profile_index, None)
        .await?;

    // Candidates are always listed per election in display order.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "order": 1, "name": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    let eligibility_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "voter_id": 1})
        .options(unique.clone())
        .build();
    Coll::<VoterEligibility>::from_db(db)
        .create_index(eligibility_index, None)
        .await?;

    // The vote row key.
    let vote_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1, "candidate_id": 1, "rank": 1})
        .options(unique.clone())
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // One ballot per voter per election. This is the authoritative duplicate-vote guard.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "election_id": 1})
        .options(unique)
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    let log_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "timestamp": 1})
        .build();
    Coll::<ElectionLog>::from_db(db)
        .create_index(log_index, None)
        .await?;

    Ok(())
}
