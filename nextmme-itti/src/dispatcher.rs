//! Envelope routing
//!
//! The dispatcher resolves an envelope's destination in the frozen registry
//! and enqueues it on the destination mailbox. Unknown destinations and
//! destinations whose task already terminated are dropped, counted and logged;
//! the sender gets a [`SendError::Routing`] and carries on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::envelope::{Destination, Envelope, TaskId};
use crate::error::SendError;
use crate::mailbox::{EnqueueError, MailboxSender};
use crate::registry::{TaskDescriptor, TaskRegistry};

#[derive(Debug)]
struct Inner {
    registry: Arc<TaskRegistry>,
    send_timeout: Duration,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Routes envelopes to task mailboxes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    pub fn new(registry: Arc<TaskRegistry>, send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                send_timeout,
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Registry the dispatcher routes over.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    /// Envelopes dropped because no live task matched their destination.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Envelopes enqueued successfully.
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Resolves the mailbox for a single-task destination.
    pub fn route(&self, envelope: &Envelope) -> Result<&MailboxSender, SendError> {
        match envelope.destination() {
            Destination::Task(id) => self.resolve(envelope, id).map(TaskDescriptor::mailbox),
            Destination::Broadcast => Err(self.drop_envelope(envelope)),
        }
    }

    fn resolve(&self, envelope: &Envelope, id: TaskId) -> Result<&TaskDescriptor, SendError> {
        match self.inner.registry.get(id) {
            Some(descriptor) if descriptor.state().is_live() && !descriptor.mailbox().is_closed() => {
                Ok(descriptor)
            }
            _ => Err(self.drop_envelope(envelope)),
        }
    }

    fn drop_envelope(&self, envelope: &Envelope) -> SendError {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            kind = %envelope.kind(),
            origin = %envelope.origin(),
            destination = %envelope.destination(),
            "Dropping envelope: no live destination"
        );
        SendError::Routing {
            destination: envelope.destination(),
        }
    }

    /// Sends an envelope, waiting up to the send timeout on a full lane.
    ///
    /// A broadcast is copied to every live task except its origin. Every copy
    /// is attempted; the first failure is returned.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        match envelope.destination() {
            Destination::Task(_) => self.send_one(envelope).await,
            Destination::Broadcast => {
                let targets: Vec<TaskId> = self
                    .inner
                    .registry
                    .iter()
                    .filter(|d| d.id() != envelope.origin() && d.state().is_live())
                    .map(TaskDescriptor::id)
                    .collect();

                let mut result = Ok(());
                for id in targets {
                    let outcome = self.send_one(envelope.readdressed(id)).await;
                    if result.is_ok() {
                        result = outcome;
                    }
                }
                result
            }
        }
    }

    async fn send_one(&self, envelope: Envelope) -> Result<(), SendError> {
        let mailbox = self.route(&envelope)?;
        let kind = envelope.kind();
        let origin = envelope.origin();
        let destination = envelope.destination();

        match mailbox.enqueue(envelope, self.inner.send_timeout).await {
            Ok(()) => {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(%kind, %origin, %destination, "Envelope enqueued");
                Ok(())
            }
            Err(err) => Err(self.enqueue_failed(err, self.inner.send_timeout)),
        }
    }

    /// Sends an envelope without waiting. A full lane fails immediately.
    ///
    /// Broadcast is not supported here and counts as a routing drop.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), SendError> {
        let mailbox = self.route(&envelope)?;
        let kind = envelope.kind();
        let origin = envelope.origin();
        let destination = envelope.destination();

        match mailbox.try_enqueue(envelope) {
            Ok(()) => {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(%kind, %origin, %destination, "Envelope enqueued");
                Ok(())
            }
            Err(err) => Err(self.enqueue_failed(err, Duration::ZERO)),
        }
    }

    fn enqueue_failed(&self, err: EnqueueError, waited: Duration) -> SendError {
        match err {
            EnqueueError::Full(envelope) => {
                let destination = match envelope.destination() {
                    Destination::Task(id) => id,
                    Destination::Broadcast => TaskId::LIFECYCLE,
                };
                warn!(
                    kind = %envelope.kind(),
                    origin = %envelope.origin(),
                    %destination,
                    "Mailbox full, envelope not delivered"
                );
                SendError::MailboxFull {
                    destination,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                }
            }
            // The task terminated between lookup and enqueue
            EnqueueError::Closed(envelope) => self.drop_envelope(&envelope),
        }
    }
}
