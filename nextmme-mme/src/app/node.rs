//! MME node assembly
//!
//! [`MmeNode`] validates the configuration, registers the S1AP, MME_APP and
//! SCTP tasks on a [`LifecycleCoordinator`] and hands out the transport side
//! of the SCTP task. Registration is fail-fast: the first error aborts
//! initialization and nothing is spawned.

use nextmme_common::config::MmeConfig;
use nextmme_itti::{
    Bus, LifecycleCoordinator, LifecycleError, RegistrationError, TaskId, TaskState,
};
use thiserror::Error;
use tracing::info;

use super::config_loader::{validate_mme_config, ConfigError};
use crate::mme_app::MmeAppTask;
use crate::s1ap::S1apTask;
use crate::sctp::{SctpStats, SctpTask, TransportLink};
use crate::tasks::{
    MME_APP_TASK_ID, MME_APP_TASK_NAME, S1AP_TASK_ID, S1AP_TASK_NAME, SCTP_TASK_ID,
    SCTP_TASK_NAME,
};

/// Errors that abort node initialization.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Task registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// The MME node: its tasks, the bus they share and the transport link.
pub struct MmeNode {
    coordinator: LifecycleCoordinator,
    transport: Option<TransportLink>,
    sctp_stats: SctpStats,
}

impl MmeNode {
    /// Validates `config` and registers the node's tasks.
    pub fn init(config: &MmeConfig) -> Result<Self, InitError> {
        validate_mme_config(config).map_err(ConfigError::from)?;

        let mut coordinator = LifecycleCoordinator::new(config.bus.clone())?;

        coordinator.register(
            S1AP_TASK_ID,
            S1AP_TASK_NAME,
            S1apTask::new(config.s1ap.clone()),
        )?;
        coordinator.register(
            MME_APP_TASK_ID,
            MME_APP_TASK_NAME,
            MmeAppTask::new(config.mme_app.clone()),
        )?;

        let (sctp, transport) = SctpTask::new(config.sctp.clone(), S1AP_TASK_ID);
        let sctp_stats = sctp.stats();
        coordinator.register(SCTP_TASK_ID, SCTP_TASK_NAME, sctp)?;

        info!("MME node initialized with 3 tasks");
        Ok(Self {
            coordinator,
            transport: Some(transport),
            sctp_stats,
        })
    }

    /// Starts every task and returns the bus once all are RUNNING.
    pub async fn start(&mut self) -> Result<Bus, InitError> {
        Ok(self.coordinator.start().await?)
    }

    /// Takes the transport side of the SCTP task. Only the first call returns it.
    pub fn take_transport(&mut self) -> Option<TransportLink> {
        self.transport.take()
    }

    /// SCTP counters.
    pub fn sctp_stats(&self) -> &SctpStats {
        &self.sctp_stats
    }

    /// Bus handle, once started.
    pub fn bus(&self) -> Option<&Bus> {
        self.coordinator.bus()
    }

    /// State of every task.
    pub fn status_summary(&self) -> Vec<(TaskId, String, TaskState)> {
        self.coordinator.status_summary()
    }

    /// Terminates every task and waits for them.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        self.coordinator.shutdown().await
    }
}
