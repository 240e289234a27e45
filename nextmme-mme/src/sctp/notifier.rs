//! Association notifications towards the owning protocol task
//!
//! The transport side reports three events: a new association, data received
//! on an association, and a lost association. Each becomes one envelope sent
//! to the protocol task that owns the associations.

use bytes::Bytes;
use nextmme_itti::{Bus, Envelope, Payload, SendError, TaskId};
use tracing::debug;

/// Emits ASSOCIATION_UP, DATA_RECEIVED and ASSOCIATION_DOWN envelopes.
#[derive(Debug, Clone, Copy)]
pub struct AssociationNotifier {
    origin: TaskId,
    owner: TaskId,
}

impl AssociationNotifier {
    /// Notifications are sent from `origin` to `owner`.
    pub fn new(origin: TaskId, owner: TaskId) -> Self {
        Self { origin, owner }
    }

    /// Task receiving the notifications.
    pub fn owner(&self) -> TaskId {
        self.owner
    }

    /// Reports a new association.
    pub async fn association_up(
        &self,
        bus: &Bus,
        association_id: i32,
        in_streams: u16,
        out_streams: u16,
    ) -> Result<(), SendError> {
        debug!(association_id, in_streams, out_streams, "Notifying new association");
        self.notify(
            bus,
            Payload::AssociationUp {
                association_id,
                in_streams,
                out_streams,
            },
        )
        .await
    }

    /// Reports data received on an association.
    pub async fn data_received(
        &self,
        bus: &Bus,
        association_id: i32,
        stream: u16,
        in_streams: u16,
        out_streams: u16,
        data: Bytes,
    ) -> Result<(), SendError> {
        self.notify(
            bus,
            Payload::DataReceived {
                association_id,
                stream,
                in_streams,
                out_streams,
                data,
            },
        )
        .await
    }

    /// Reports a lost association.
    pub async fn association_down(&self, bus: &Bus, association_id: i32) -> Result<(), SendError> {
        debug!(association_id, "Notifying association down");
        self.notify(bus, Payload::AssociationDown { association_id })
            .await
    }

    async fn notify(&self, bus: &Bus, payload: Payload) -> Result<(), SendError> {
        bus.send(Envelope::new(self.origin, self.owner, payload))
            .await
    }
}
