//! Integration test framework for nextmme
#![allow(missing_docs)]
//!
//! Test utilities and mock tasks for exercising the bus and the MME node
//! across crate boundaries.
//!
//! # Components
//!
//! - [`mock_task`] - Recording task standing in for a peer
//! - [`test_fixtures`] - Bus and node configurations tuned for tests
//! - [`test_utils`] - Logging setup and polling helpers
//!
//! # Test Categories
//!
//! 1. **Bus Properties** - ordering, routing drops, shutdown, timers, priority
//! 2. **E2E Scenario** - association notification through SCTP, S1AP and MME_APP

pub mod mock_task;
pub mod test_fixtures;
pub mod test_utils;

pub use mock_task::{MockTask, MockTaskEvent};
pub use test_fixtures::{test_bus_config, test_mme_config};
pub use test_utils::{
    init_test_logging, wait_for_condition, TestResult, DEFAULT_POLL_INTERVAL,
    DEFAULT_TEST_TIMEOUT,
};
