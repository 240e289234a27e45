//! Configuration structures for the MME node
//!
//! The configuration is read once at process start-up and handed to the bus
//! and to each task's constructor before any task execution context exists.
//! Every field has a default so a partial YAML file is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Default bound of the NORMAL lane of every mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default bound of the CONTROL lane of every mailbox.
pub const DEFAULT_CONTROL_CAPACITY: usize = 16;

/// Default maximum number of registered tasks.
pub const DEFAULT_MAX_TASKS: usize = 32;

/// Default time a sender waits on a full mailbox before giving up.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 500;

/// Default idle time after which a task loop runs its housekeeping hook.
pub const DEFAULT_HOUSEKEEPING_INTERVAL_MS: u64 = 100;

/// Default start-up readiness timeout in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Inter-task bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum number of tasks the registry accepts
    pub max_tasks: usize,
    /// Capacity of the NORMAL lane of each mailbox
    pub mailbox_capacity: usize,
    /// Capacity of the CONTROL lane of each mailbox
    pub control_capacity: usize,
    /// How long `send` blocks on a full lane before failing
    pub send_timeout_ms: u64,
    /// Dequeue timeout used by every task loop
    pub housekeeping_interval_ms: u64,
    /// How long `start()` waits for every task to report RUNNING. Shutdown
    /// itself is not bounded: `wait()` joins every task.
    pub shutdown_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            control_capacity: DEFAULT_CONTROL_CAPACITY,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            housekeeping_interval_ms: DEFAULT_HOUSEKEEPING_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl BusConfig {
    /// Returns the full-mailbox send timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Returns the idle dequeue timeout of task loops.
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }

    /// Returns the start-up readiness timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// S1AP task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S1apConfig {
    /// Maximum number of eNB associations tracked at once
    pub max_associations: usize,
}

impl Default for S1apConfig {
    fn default() -> Self {
        Self {
            max_associations: 64,
        }
    }
}

/// SCTP task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SctpConfig {
    /// Number of inbound streams requested per association
    pub in_streams: u16,
    /// Number of outbound streams requested per association
    pub out_streams: u16,
    /// Capacity of the transport event queue feeding the task
    pub event_queue_capacity: usize,
}

impl Default for SctpConfig {
    fn default() -> Self {
        Self {
            in_streams: 32,
            out_streams: 32,
            event_queue_capacity: 1024,
        }
    }
}

/// MME_APP task configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmeAppConfig {
    /// Guard timer armed when an association is established (milliseconds)
    pub guard_timer_ms: u64,
    /// Periodic update timer (T3412) assigned to UEs, in minutes (1-31)
    pub t3412_minutes: u8,
}

impl Default for MmeAppConfig {
    fn default() -> Self {
        // T3450 default
        Self {
            guard_timer_ms: 6000,
            t3412_minutes: 30,
        }
    }
}

impl MmeAppConfig {
    /// Returns the guard timer duration.
    pub fn guard_timer(&self) -> Duration {
        Duration::from_millis(self.guard_timer_ms)
    }

    /// Returns the periodic update timer duration.
    pub fn t3412(&self) -> Duration {
        Duration::from_secs(u64::from(self.t3412_minutes) * 60)
    }
}

/// Top-level MME configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmeConfig {
    /// Default log level (overridden by `RUST_LOG`)
    pub log_level: LogLevel,
    /// Bus parameters
    pub bus: BusConfig,
    /// S1AP task parameters
    pub s1ap: S1apConfig,
    /// SCTP task parameters
    pub sctp: SctpConfig,
    /// MME_APP task parameters
    pub mme_app: MmeAppConfig,
}
