//! Error types of the inter-task bus

use thiserror::Error;

use crate::envelope::{Destination, TaskId};
use crate::timer::TimerId;

/// Registration failures. Fatal before start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("task {id} is already registered")]
    DuplicateIdentity { id: TaskId },

    #[error("registry is full ({max} tasks)")]
    CapacityExceeded { max: usize },

    #[error("task identity {id} is reserved by the bus")]
    ReservedIdentity { id: TaskId },

    #[error("cannot register task {id}: the bus is already started")]
    AlreadyStarted { id: TaskId },
}

/// Send failures. Never fatal to either side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Destination is unknown or its mailbox is gone; the envelope was dropped
    #[error("no live task for destination {destination}, envelope dropped")]
    Routing { destination: Destination },

    /// Destination lane stayed full for the whole send timeout
    #[error("mailbox of {destination} is full (waited {waited_ms} ms)")]
    MailboxFull { destination: TaskId, waited_ms: u64 },
}

impl SendError {
    /// Returns true for routing drops.
    pub fn is_routing(&self) -> bool {
        matches!(self, SendError::Routing { .. })
    }
}

/// Timer service failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("unknown timer {0}")]
    UnknownTimer(TimerId),

    #[error("timer owner {0} is not registered")]
    UnknownOwner(TaskId),

    #[error("timer duration must be non-zero")]
    InvalidDuration,
}

/// Lifecycle coordinator failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),

    #[error("bus already started")]
    AlreadyStarted,

    #[error("bus not started")]
    NotStarted,

    #[error("task {id} did not report RUNNING in time")]
    StartTimeout { id: TaskId },

    #[error("tasks panicked: {}", format_ids(.tasks))]
    TaskPanicked { tasks: Vec<TaskId> },
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
