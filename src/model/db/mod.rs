//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - Datetimes are serialised in MongoDB's own format.
//! - IDs are the integers handed out by the `counters` collection.

pub mod candidate;
pub mod election;
pub mod eligibility;
pub mod log;
pub mod profile;
pub mod user;
pub mod vote;
