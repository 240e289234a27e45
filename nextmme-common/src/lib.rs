//! Common types and utilities for nextmme
//!
//! This crate provides the configuration structures and logging setup
//! shared by the bus core, the codecs and the MME node.

pub mod config;
pub mod logging;

pub use config::{BusConfig, MmeAppConfig, MmeConfig, S1apConfig, SctpConfig};
pub use logging::{
    init_logging, init_logging_with_filter, log_protocol_message, Direction, HexDump, LogLevel,
};
