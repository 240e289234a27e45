//! Common test fixtures
//!
//! Configurations with short housekeeping intervals so task loops react
//! quickly under test.

use nextmme_common::config::{BusConfig, MmeConfig};

/// Bus configuration for tests.
pub fn test_bus_config() -> BusConfig {
    BusConfig {
        send_timeout_ms: 50,
        housekeeping_interval_ms: 5,
        shutdown_timeout_ms: 1000,
        ..BusConfig::default()
    }
}

/// Node configuration for tests.
pub fn test_mme_config() -> MmeConfig {
    MmeConfig {
        bus: test_bus_config(),
        ..MmeConfig::default()
    }
}
