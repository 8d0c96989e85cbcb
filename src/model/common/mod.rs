//! Types shared between the database and API representations.

pub mod audit;
pub mod election;
pub mod role;

/// Our user (principal) IDs are integers.
pub type UserId = u32;
/// Our vote IDs are integers.
pub type VoteId = u32;
/// Our audit log entry IDs are integers.
pub type LogId = u32;
