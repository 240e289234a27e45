//! SCTP Task Implementation
//!
//! The SCTP task owns the transport side of the eNB associations:
//! - consumes [`TransportEvent`]s from the transport through its [`TransportLink`]
//! - keeps the association table with the negotiated stream counts
//! - notifies the S1AP task through an [`AssociationNotifier`]
//! - hands DOWNLINK_DATA for known associations back to the transport
//!
//! # Message Flow
//!
//! ```text
//! eNB <--transport--> TransportLink <--> SCTP Task <--bus--> S1AP Task
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use nextmme_common::config::SctpConfig;
use nextmme_common::logging::{log_protocol_message, Direction};
use nextmme_itti::{Envelope, Payload, Task, TaskContext, TaskId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::notifier::AssociationNotifier;
use crate::tasks::SCTP_TASK_ID;

/// Event reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Association established with the given stream counts
    AssociationUp {
        association_id: i32,
        in_streams: u16,
        out_streams: u16,
    },
    /// Data received on an association
    DataReceived {
        association_id: i32,
        stream: u16,
        data: Bytes,
    },
    /// Association lost
    AssociationDown { association_id: i32 },
}

/// Data the transport must send on an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPdu {
    pub association_id: i32,
    pub stream: u16,
    pub data: Bytes,
}

/// Transport-side end of the SCTP task.
#[derive(Debug)]
pub struct TransportLink {
    events: mpsc::Sender<TransportEvent>,
    outbound: mpsc::Receiver<OutboundPdu>,
}

impl TransportLink {
    /// Queues a transport event for the SCTP task.
    pub async fn report(&self, event: TransportEvent) -> Result<(), TransportClosed> {
        self.events.send(event).await.map_err(|_| TransportClosed)
    }

    /// Reports a new association.
    pub async fn association_up(
        &self,
        association_id: i32,
        in_streams: u16,
        out_streams: u16,
    ) -> Result<(), TransportClosed> {
        self.report(TransportEvent::AssociationUp {
            association_id,
            in_streams,
            out_streams,
        })
        .await
    }

    /// Reports data received on an association.
    pub async fn data_received(
        &self,
        association_id: i32,
        stream: u16,
        data: Bytes,
    ) -> Result<(), TransportClosed> {
        self.report(TransportEvent::DataReceived {
            association_id,
            stream,
            data,
        })
        .await
    }

    /// Reports a lost association.
    pub async fn association_down(&self, association_id: i32) -> Result<(), TransportClosed> {
        self.report(TransportEvent::AssociationDown { association_id })
            .await
    }

    /// Waits for the next PDU to transmit. `None` once the SCTP task is gone.
    pub async fn recv_outbound(&mut self) -> Option<OutboundPdu> {
        self.outbound.recv().await
    }

    /// Takes the next PDU to transmit, if any.
    pub fn try_recv_outbound(&mut self) -> Option<OutboundPdu> {
        self.outbound.try_recv().ok()
    }
}

/// The SCTP task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("SCTP task is no longer running")]
pub struct TransportClosed;

/// Counters readable while the task runs.
#[derive(Debug, Clone, Default)]
pub struct SctpStats {
    associations: Arc<AtomicUsize>,
    dropped_downlink: Arc<AtomicU64>,
}

impl SctpStats {
    /// Number of associations currently up.
    pub fn associations(&self) -> usize {
        self.associations.load(Ordering::Relaxed)
    }

    /// Downlink PDUs dropped (unknown association, bad stream, transport full).
    pub fn dropped_downlink(&self) -> u64 {
        self.dropped_downlink.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Association {
    in_streams: u16,
    out_streams: u16,
}

/// SCTP task managing eNB associations.
pub struct SctpTask {
    config: SctpConfig,
    notifier: AssociationNotifier,
    events_rx: mpsc::Receiver<TransportEvent>,
    outbound_tx: mpsc::Sender<OutboundPdu>,
    associations: HashMap<i32, Association>,
    stats: SctpStats,
}

impl SctpTask {
    /// Creates the task and the transport link feeding it.
    ///
    /// Notifications go to `owner`.
    pub fn new(config: SctpConfig, owner: TaskId) -> (Self, TransportLink) {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.event_queue_capacity);

        let task = Self {
            config,
            notifier: AssociationNotifier::new(SCTP_TASK_ID, owner),
            events_rx,
            outbound_tx,
            associations: HashMap::new(),
            stats: SctpStats::default(),
        };
        let link = TransportLink {
            events: events_tx,
            outbound: outbound_rx,
        };
        (task, link)
    }

    /// Counter handle, valid after the task has been moved to the bus.
    pub fn stats(&self) -> SctpStats {
        self.stats.clone()
    }

    async fn drain_transport_events(&mut self, ctx: &TaskContext) {
        // Bounded so the mailbox is not starved by a busy transport
        for _ in 0..self.config.event_queue_capacity {
            match self.events_rx.try_recv() {
                Ok(event) => self.handle_transport_event(ctx, event).await,
                Err(_) => break,
            }
        }
    }

    async fn handle_transport_event(&mut self, ctx: &TaskContext, event: TransportEvent) {
        match event {
            TransportEvent::AssociationUp {
                association_id,
                in_streams,
                out_streams,
            } => {
                let association = Association {
                    in_streams: in_streams.min(self.config.in_streams),
                    out_streams: out_streams.min(self.config.out_streams),
                };
                info!(
                    association_id,
                    in_streams = association.in_streams,
                    out_streams = association.out_streams,
                    "SCTP association up"
                );
                self.associations.insert(association_id, association);
                self.sync_stats();

                if let Err(e) = self
                    .notifier
                    .association_up(
                        ctx.bus(),
                        association_id,
                        association.in_streams,
                        association.out_streams,
                    )
                    .await
                {
                    warn!(association_id, "Failed to notify association up: {}", e);
                }
            }
            TransportEvent::DataReceived {
                association_id,
                stream,
                data,
            } => {
                let Some(association) = self.associations.get(&association_id).copied() else {
                    warn!(association_id, "Data on unknown association dropped");
                    return;
                };
                log_protocol_message("SCTP", Direction::Rx, "DATA", &data);

                if let Err(e) = self
                    .notifier
                    .data_received(
                        ctx.bus(),
                        association_id,
                        stream,
                        association.in_streams,
                        association.out_streams,
                        data,
                    )
                    .await
                {
                    warn!(association_id, "Failed to deliver received data: {}", e);
                }
            }
            TransportEvent::AssociationDown { association_id } => {
                if self.associations.remove(&association_id).is_none() {
                    debug!(association_id, "Down event for unknown association");
                    return;
                }
                info!(association_id, "SCTP association down");
                self.sync_stats();

                if let Err(e) = self
                    .notifier
                    .association_down(ctx.bus(), association_id)
                    .await
                {
                    warn!(association_id, "Failed to notify association down: {}", e);
                }
            }
        }
    }

    fn handle_downlink(&mut self, association_id: i32, stream: u16, data: Bytes) {
        let Some(association) = self.associations.get(&association_id) else {
            warn!(association_id, "Downlink for unknown association dropped");
            self.stats.dropped_downlink.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if stream >= association.out_streams {
            warn!(
                association_id,
                stream,
                out_streams = association.out_streams,
                "Downlink on invalid stream dropped"
            );
            self.stats.dropped_downlink.fetch_add(1, Ordering::Relaxed);
            return;
        }

        log_protocol_message("SCTP", Direction::Tx, "DATA", &data);
        let pdu = OutboundPdu {
            association_id,
            stream,
            data,
        };
        match self.outbound_tx.try_send(pdu) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(association_id, "Transport queue full, downlink dropped");
                self.stats.dropped_downlink.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {
                warn!(association_id, "Transport gone, downlink dropped");
                self.stats.dropped_downlink.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn sync_stats(&self) {
        self.stats
            .associations
            .store(self.associations.len(), Ordering::Relaxed);
    }
}

#[async_trait]
impl Task for SctpTask {
    async fn handle(&mut self, ctx: &TaskContext, envelope: Envelope) {
        match envelope.into_payload() {
            Payload::DownlinkData {
                association_id,
                stream,
                data,
            } => self.handle_downlink(association_id, stream, data),
            other => debug!(kind = %other.kind(), "SCTP task ignoring envelope"),
        }
        self.drain_transport_events(ctx).await;
    }

    async fn housekeeping(&mut self, ctx: &TaskContext) {
        self.drain_transport_events(ctx).await;
    }

    async fn on_shutdown(&mut self, _ctx: &TaskContext) {
        info!(
            associations = self.associations.len(),
            "SCTP task stopping"
        );
        self.associations.clear();
        self.sync_stats();
    }
}
