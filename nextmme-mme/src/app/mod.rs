//! MME Application Module
//!
//! Configuration loading and validation, plus [`MmeNode`] which registers the
//! node's tasks on the bus and drives their lifecycle.

mod config_loader;
mod node;

pub use config_loader::{
    load_and_validate_mme_config, load_mme_config, load_mme_config_from_str, validate_mme_config,
    ConfigError, ConfigValidationError,
};

pub use node::{InitError, MmeNode};
