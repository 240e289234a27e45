//! Configuration loading for the MME node
//!
//! Wraps [`MmeConfig`] from `nextmme-common` with file loading and the
//! validation the node needs before any task is registered.
//!
//! # Example
//!
//! ```rust,ignore
//! use nextmme_mme::app::{load_mme_config, validate_mme_config};
//!
//! let config = load_mme_config("config/mme.yaml")?;
//! validate_mme_config(&config)?;
//! ```

use std::path::Path;

use nextmme_common::config::MmeConfig;
use thiserror::Error;

/// Number of tasks the node registers.
const NODE_TASK_COUNT: usize = 3;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Invalid bus parameters
    #[error("Invalid bus configuration: {0}")]
    InvalidBusConfig(String),

    /// Invalid SCTP parameters
    #[error("Invalid SCTP configuration: {0}")]
    InvalidSctpConfig(String),

    /// Invalid S1AP parameters
    #[error("Invalid S1AP configuration: {0}")]
    InvalidS1apConfig(String),

    /// Invalid timer value
    #[error("Invalid timer: {0}")]
    InvalidTimer(String),
}

/// Loads an MME configuration from a YAML file.
///
/// Missing fields take their defaults. Call [`validate_mme_config`] after
/// loading, or use [`load_and_validate_mme_config`].
pub fn load_mme_config<P: AsRef<Path>>(path: P) -> Result<MmeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    load_mme_config_from_str(&contents)
}

/// Loads an MME configuration from a YAML string.
pub fn load_mme_config_from_str(yaml: &str) -> Result<MmeConfig, ConfigError> {
    let config: MmeConfig =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    Ok(config)
}

/// Validates an MME configuration.
///
/// # Validation Rules
///
/// - the bus must accept at least the node's three tasks
/// - mailbox lanes, housekeeping interval and shutdown timeout must be non-zero
/// - SCTP stream counts and the transport event queue must be non-zero
/// - at least one S1AP association must be allowed
/// - the guard timer must be non-zero and T3412 must fit a 5-bit minute value
pub fn validate_mme_config(config: &MmeConfig) -> Result<(), ConfigValidationError> {
    let bus = &config.bus;
    if bus.max_tasks < NODE_TASK_COUNT {
        return Err(ConfigValidationError::InvalidBusConfig(format!(
            "max_tasks {} is below the {} node tasks",
            bus.max_tasks, NODE_TASK_COUNT
        )));
    }
    if bus.mailbox_capacity == 0 || bus.control_capacity == 0 {
        return Err(ConfigValidationError::InvalidBusConfig(
            "mailbox capacities must be non-zero".to_string(),
        ));
    }
    if bus.housekeeping_interval_ms == 0 {
        return Err(ConfigValidationError::InvalidBusConfig(
            "housekeeping_interval_ms must be non-zero".to_string(),
        ));
    }
    if bus.shutdown_timeout_ms == 0 {
        return Err(ConfigValidationError::InvalidBusConfig(
            "shutdown_timeout_ms must be non-zero".to_string(),
        ));
    }

    let sctp = &config.sctp;
    if sctp.in_streams == 0 || sctp.out_streams == 0 {
        return Err(ConfigValidationError::InvalidSctpConfig(format!(
            "stream counts must be non-zero (in={}, out={})",
            sctp.in_streams, sctp.out_streams
        )));
    }
    if sctp.event_queue_capacity == 0 {
        return Err(ConfigValidationError::InvalidSctpConfig(
            "event_queue_capacity must be non-zero".to_string(),
        ));
    }

    if config.s1ap.max_associations == 0 {
        return Err(ConfigValidationError::InvalidS1apConfig(
            "max_associations must be non-zero".to_string(),
        ));
    }

    let mme_app = &config.mme_app;
    if mme_app.guard_timer_ms == 0 {
        return Err(ConfigValidationError::InvalidTimer(
            "guard_timer_ms must be non-zero".to_string(),
        ));
    }
    if !(1..=31).contains(&mme_app.t3412_minutes) {
        return Err(ConfigValidationError::InvalidTimer(format!(
            "t3412_minutes {} out of range 1-31",
            mme_app.t3412_minutes
        )));
    }

    Ok(())
}

/// Loads and validates an MME configuration from a YAML file.
pub fn load_and_validate_mme_config<P: AsRef<Path>>(path: P) -> Result<MmeConfig, ConfigError> {
    let config = load_mme_config(path)?;
    validate_mme_config(&config)?;
    Ok(config)
}
