//! MME_APP task module
//!
//! UE context management on top of the S1AP relay.

mod context;
mod task;

pub use context::{TimerPurpose, UeContext};
pub use task::MmeAppTask;
