//! S1AP Task Implementation
//!
//! The S1AP task terminates eNB signaling. It tracks the associations the
//! SCTP task reports and relays them to MME_APP:
//!
//! | received           | sent to MME_APP |
//! |--------------------|-----------------|
//! | ASSOCIATION_UP     | ESTABLISH       |
//! | DATA_RECEIVED      | UPLINK_NAS      |
//! | ASSOCIATION_DOWN   | RELEASE         |
//!
//! DOWNLINK_DATA from MME_APP is forwarded to the SCTP task.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use nextmme_common::config::S1apConfig;
use nextmme_common::logging::{log_protocol_message, Direction};
use nextmme_itti::{Envelope, Payload, Task, TaskContext, TaskId};
use tracing::{debug, info, warn};

use crate::tasks::{MME_APP_TASK_ID, SCTP_TASK_ID};

/// eNB association as seen by S1AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnbAssociation {
    /// Number of inbound streams
    pub in_streams: u16,
    /// Number of outbound streams
    pub out_streams: u16,
}

/// S1AP task.
pub struct S1apTask {
    config: S1apConfig,
    associations: HashMap<i32, EnbAssociation>,
    mme_app: TaskId,
    sctp: TaskId,
}

impl S1apTask {
    /// Creates the task relaying to the node's MME_APP and SCTP tasks.
    pub fn new(config: S1apConfig) -> Self {
        Self::with_peers(config, MME_APP_TASK_ID, SCTP_TASK_ID)
    }

    /// Creates the task relaying to explicit peers.
    pub fn with_peers(config: S1apConfig, mme_app: TaskId, sctp: TaskId) -> Self {
        Self {
            config,
            associations: HashMap::new(),
            mme_app,
            sctp,
        }
    }

    async fn handle_association_up(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        in_streams: u16,
        out_streams: u16,
    ) {
        if !self.associations.contains_key(&association_id)
            && self.associations.len() >= self.config.max_associations
        {
            warn!(
                association_id,
                max = self.config.max_associations,
                "Association limit reached, eNB rejected"
            );
            return;
        }

        info!(association_id, in_streams, out_streams, "eNB association up");
        self.associations.insert(
            association_id,
            EnbAssociation {
                in_streams,
                out_streams,
            },
        );

        let payload = Payload::Establish {
            association_id,
            in_streams,
            out_streams,
        };
        if let Err(e) = ctx.send(self.mme_app, payload).await {
            warn!(association_id, "Failed to relay ESTABLISH: {}", e);
        }
    }

    async fn handle_data_received(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        stream: u16,
        data: Bytes,
    ) {
        if !self.associations.contains_key(&association_id) {
            warn!(association_id, stream, "Data on unknown association rejected");
            return;
        }
        log_protocol_message("S1AP", Direction::Rx, "uplink", &data);

        let payload = Payload::UplinkNas {
            association_id,
            stream,
            pdu: data,
        };
        if let Err(e) = ctx.send(self.mme_app, payload).await {
            warn!(association_id, "Failed to relay UPLINK_NAS: {}", e);
        }
    }

    async fn handle_association_down(&mut self, ctx: &TaskContext, association_id: i32) {
        if self.associations.remove(&association_id).is_none() {
            debug!(association_id, "Down for unknown association ignored");
            return;
        }
        info!(association_id, "eNB association down");

        if let Err(e) = ctx
            .send(self.mme_app, Payload::Release { association_id })
            .await
        {
            warn!(association_id, "Failed to relay RELEASE: {}", e);
        }
    }

    async fn handle_downlink(
        &mut self,
        ctx: &TaskContext,
        association_id: i32,
        stream: u16,
        data: Bytes,
    ) {
        if !self.associations.contains_key(&association_id) {
            warn!(association_id, "Downlink for unknown association dropped");
            return;
        }
        log_protocol_message("S1AP", Direction::Tx, "downlink", &data);

        let payload = Payload::DownlinkData {
            association_id,
            stream,
            data,
        };
        if let Err(e) = ctx.send(self.sctp, payload).await {
            warn!(association_id, "Failed to forward DOWNLINK_DATA: {}", e);
        }
    }
}

#[async_trait]
impl Task for S1apTask {
    async fn handle(&mut self, ctx: &TaskContext, envelope: Envelope) {
        match envelope.into_payload() {
            Payload::AssociationUp {
                association_id,
                in_streams,
                out_streams,
            } => {
                self.handle_association_up(ctx, association_id, in_streams, out_streams)
                    .await
            }
            Payload::DataReceived {
                association_id,
                stream,
                data,
                ..
            } => {
                self.handle_data_received(ctx, association_id, stream, data)
                    .await
            }
            Payload::AssociationDown { association_id } => {
                self.handle_association_down(ctx, association_id).await
            }
            Payload::DownlinkData {
                association_id,
                stream,
                data,
            } => {
                self.handle_downlink(ctx, association_id, stream, data)
                    .await
            }
            other => debug!(kind = %other.kind(), "S1AP task ignoring envelope"),
        }
    }

    async fn on_shutdown(&mut self, _ctx: &TaskContext) {
        info!(associations = self.associations.len(), "S1AP task stopping");
        self.associations.clear();
    }
}
