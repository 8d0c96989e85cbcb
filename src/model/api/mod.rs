//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Datetimes are serialised as RFC 3339 strings.
//! - Foreign keys are named after the entity, e.g. `election` rather than `election_id`.

pub mod account;
pub mod admin;
pub mod auth;
pub mod election;
pub mod results;
pub mod vote;
