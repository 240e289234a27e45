//! SCTP task module
//!
//! Transport association management for the S1 interface.

mod notifier;
mod task;

pub use notifier::AssociationNotifier;
pub use task::{OutboundPdu, SctpStats, SctpTask, TransportClosed, TransportEvent, TransportLink};
