mod kind;
mod state;

pub use kind::{ElectionType, Visibility};
pub use state::ElectionState;

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our candidate IDs are integers.
pub type CandidateId = u32;
