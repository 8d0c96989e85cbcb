use std::ops::Range;

use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::{is_duplicate_key_error, Coll};

/// The auto-increment sequences backing our integer IDs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CounterId {
    Users,
    Elections,
    Candidates,
    Votes,
    Logs,
}

impl CounterId {
    pub const ALL: [CounterId; 5] = [
        Self::Users,
        Self::Elections,
        Self::Candidates,
        Self::Votes,
        Self::Logs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Elections => "elections",
            Self::Candidates => "candidates",
            Self::Votes => "votes",
            Self::Logs => "election_logs",
        }
    }
}

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Create a new `Counter` starting at the given value.
    pub fn new(id: CounterId, start: u32) -> Self {
        Self {
            id: id.name().to_string(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the given counter.
    pub async fn next(counters: &Coll<Counter>, id: CounterId) -> Result<u32> {
        Ok(Self::reserve(counters, id, 1).await?.start)
    }

    /// Atomically reserve `count` consecutive values of the given counter.
    pub async fn reserve(counters: &Coll<Counter>, id: CounterId, count: u32) -> Result<Range<u32>> {
        let update = doc! {
            "$inc": { "next": count }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id.name() }, update, options)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to find counter {}", id.name()),
                )
            })?;
        Ok(counter.next..counter.next + count)
    }
}

/// Ensure every ID counter exists, starting at 1.
///
/// This operation is idempotent.
pub async fn ensure_counters_exist(counters: &Coll<Counter>) -> Result<()> {
    for id in CounterId::ALL {
        let existing = counters.find_one(doc! { "_id": id.name() }, None).await?;
        if existing.is_none() {
            if let Err(err) = counters.insert_one(Counter::new(id, 1), None).await {
                // Another instance created it first.
                if !is_duplicate_key_error(&err) {
                    return Err(err.into());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[backend_test]
    async fn counter_increment(counters: Coll<Counter>) {
        // The test harness already created the counters.
        let first = Counter::next(&counters, CounterId::Votes).await.unwrap();
        let second = Counter::next(&counters, CounterId::Votes).await.unwrap();
        assert_eq!(second, first + 1);

        // Reserving a block skips ahead by the block size.
        let block = Counter::reserve(&counters, CounterId::Votes, 3).await.unwrap();
        assert_eq!(block, second + 1..second + 4);
        let after = Counter::next(&counters, CounterId::Votes).await.unwrap();
        assert_eq!(after, second + 4);

        // Other counters are independent.
        let other = Counter::next(&counters, CounterId::Logs).await.unwrap();
        assert_eq!(other, 1);
    }

    #[backend_test]
    async fn ensure_counters_is_idempotent(counters: Coll<Counter>) {
        Counter::next(&counters, CounterId::Users).await.unwrap();
        ensure_counters_exist(&counters).await.unwrap();
        let count = counters.count_documents(None, None).await.unwrap();
        assert_eq!(count, CounterId::ALL.len() as u64);
    }
}
