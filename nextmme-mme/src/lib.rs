//! nextmme-mme - MME node on the inter-task bus
#![allow(missing_docs)]
//!
//! The node runs three tasks on one [`nextmme_itti`] bus:
//!
//! - SCTP: transport associations towards the eNBs
//! - S1AP: eNB signaling termination, relays associations and NAS PDUs
//! - MME_APP: UE contexts, DRX parameters and the periodic update timer
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                    MME                     │
//! │  ┌─────────┐   ┌─────────┐   ┌─────────┐   │
//! │  │  SCTP   │──▶│  S1AP   │──▶│ MME_APP │   │
//! │  │  Task   │◀──│  Task   │◀──│  Task   │   │
//! │  └────┬────┘   └─────────┘   └─────────┘   │
//! │       │          inter-task bus            │
//! └───────┼────────────────────────────────────┘
//!         ▼
//!     TransportLink
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use nextmme_mme::app::{load_and_validate_mme_config, MmeNode};
//!
//! let config = load_and_validate_mme_config("config/mme.yaml")?;
//! let mut node = MmeNode::init(&config)?;
//! let transport = node.take_transport();
//! node.start().await?;
//! // ...
//! node.shutdown().await?;
//! ```

pub mod app;
pub mod mme_app;
pub mod s1ap;
pub mod sctp;
pub mod tasks;

#[cfg(test)]
mod test_support;

pub use app::{
    load_and_validate_mme_config, load_mme_config, load_mme_config_from_str, validate_mme_config,
    ConfigError, ConfigValidationError, InitError, MmeNode,
};
pub use mme_app::{MmeAppTask, TimerPurpose, UeContext};
pub use s1ap::{EnbAssociation, S1apTask};
pub use sctp::{
    AssociationNotifier, OutboundPdu, SctpStats, SctpTask, TransportClosed, TransportEvent,
    TransportLink,
};
pub use tasks::{
    task_name, MME_APP_TASK_ID, MME_APP_TASK_NAME, S1AP_TASK_ID, S1AP_TASK_NAME, SCTP_TASK_ID,
    SCTP_TASK_NAME,
};
