//! S1AP task module
//!
//! eNB-facing signaling termination.

mod task;

pub use task::{EnbAssociation, S1apTask};
