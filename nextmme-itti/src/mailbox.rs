//! Two-lane bounded mailbox
//!
//! Every task owns one mailbox made of two bounded tokio mpsc lanes. The
//! CONTROL lane is always drained before the NORMAL lane; each lane is FIFO.
//! The sender half lives in the task registry, the receiver half in the task's
//! execution context, so a mailbox is destroyed together with its task loop.
//!
//! The lifecycle coordinator's TERMINATE does not go through either lane: it
//! is parked in a one-envelope slot ahead of the CONTROL lane, so a full lane
//! can never keep a task from stopping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError, TrySendError};

use crate::envelope::{Envelope, Priority};

/// Why an envelope could not be enqueued. The envelope is handed back.
#[derive(Debug)]
pub enum EnqueueError {
    /// The lane stayed full
    Full(Envelope),
    /// The receiving task is gone
    Closed(Envelope),
}

impl EnqueueError {
    /// Returns the envelope that was not enqueued.
    pub fn into_envelope(self) -> Envelope {
        match self {
            EnqueueError::Full(env) | EnqueueError::Closed(env) => env,
        }
    }
}

/// Snapshot of mailbox counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxStats {
    /// Envelopes accepted since creation
    pub enqueued: u64,
    /// Envelopes handed to the task since creation
    pub dequeued: u64,
    /// Envelopes currently waiting in both lanes
    pub queued: usize,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

/// Unbounded slot holding the pending TERMINATE, if any.
#[derive(Debug, Default)]
struct TerminateSlot {
    envelope: Mutex<Option<Envelope>>,
    notify: Notify,
}

impl TerminateSlot {
    fn take(&self) -> Option<Envelope> {
        self.envelope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_pending(&self) -> bool {
        self.envelope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Creates a mailbox with the given lane bounds.
///
/// Both capacities must be non-zero; the lifecycle coordinator validates the
/// bus configuration before any mailbox is created.
pub fn channel(capacity: usize, control_capacity: usize) -> (MailboxSender, MailboxReceiver) {
    let (normal_tx, normal_rx) = mpsc::channel(capacity);
    let (control_tx, control_rx) = mpsc::channel(control_capacity);
    let counters = Arc::new(Counters::default());
    let terminate = Arc::new(TerminateSlot::default());

    let sender = MailboxSender {
        normal: normal_tx,
        control: control_tx,
        terminate: terminate.clone(),
        counters: counters.clone(),
    };
    let receiver = MailboxReceiver {
        normal: normal_rx,
        control: control_rx,
        terminate,
        counters,
    };
    (sender, receiver)
}

/// Sending half of a mailbox.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    normal: mpsc::Sender<Envelope>,
    control: mpsc::Sender<Envelope>,
    terminate: Arc<TerminateSlot>,
    counters: Arc<Counters>,
}

impl MailboxSender {
    fn lane(&self, priority: Priority) -> &mpsc::Sender<Envelope> {
        match priority {
            Priority::Normal => &self.normal,
            Priority::Control => &self.control,
        }
    }

    /// Enqueues an envelope, waiting up to `timeout` while its lane is full.
    pub async fn enqueue(&self, envelope: Envelope, timeout: Duration) -> Result<(), EnqueueError> {
        let lane = self.lane(envelope.priority());
        match lane.send_timeout(envelope, timeout).await {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(env)) => Err(EnqueueError::Full(env)),
            Err(SendTimeoutError::Closed(env)) => Err(EnqueueError::Closed(env)),
        }
    }

    /// Enqueues an envelope without waiting.
    pub fn try_enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let lane = self.lane(envelope.priority());
        match lane.try_send(envelope) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(env)) => Err(EnqueueError::Full(env)),
            Err(TrySendError::Closed(env)) => Err(EnqueueError::Closed(env)),
        }
    }

    /// Parks a TERMINATE ahead of both lanes. Never waits.
    ///
    /// A second TERMINATE before the first is dequeued replaces it.
    pub fn terminate(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed(envelope));
        }
        let replaced = self
            .terminate
            .envelope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(envelope);
        if replaced.is_none() {
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        self.terminate.notify.notify_one();
        Ok(())
    }

    /// Returns true once the receiving half is closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.normal.is_closed()
    }

    /// Number of envelopes waiting, pending TERMINATE included.
    pub fn len(&self) -> usize {
        queued(&self.normal) + queued(&self.control) + usize::from(self.terminate.is_pending())
    }

    /// Returns true when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a counter snapshot.
    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dequeued: self.counters.dequeued.load(Ordering::Relaxed),
            queued: self.len(),
        }
    }
}

fn queued(lane: &mpsc::Sender<Envelope>) -> usize {
    lane.max_capacity() - lane.capacity()
}

/// Receiving half of a mailbox, owned by the task loop.
#[derive(Debug)]
pub struct MailboxReceiver {
    normal: mpsc::Receiver<Envelope>,
    control: mpsc::Receiver<Envelope>,
    terminate: Arc<TerminateSlot>,
    counters: Arc<Counters>,
}

impl MailboxReceiver {
    /// Waits for the next envelope: a parked TERMINATE, then CONTROL, then
    /// NORMAL.
    ///
    /// Returns `None` once both lanes are closed and empty and no TERMINATE
    /// is parked.
    pub async fn recv(&mut self) -> Option<Envelope> {
        let envelope = loop {
            if let Some(env) = self.terminate.take() {
                break Some(env);
            }
            let open = !(self.control.is_closed() && self.normal.is_closed());
            tokio::select! {
                biased;
                // The permit only wakes the loop; the slot is read above
                _ = self.terminate.notify.notified(), if open => continue,
                Some(env) = self.control.recv() => break Some(env),
                Some(env) = self.normal.recv() => break Some(env),
                else => break self.terminate.take(),
            }
        };
        if envelope.is_some() {
            self.counters.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        envelope
    }

    /// Waits up to `timeout` for the next envelope. `None` on timeout.
    pub async fn dequeue(&mut self, timeout: Duration) -> Option<Envelope> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .ok()
            .flatten()
    }

    /// Takes the next envelope if one is already waiting.
    pub fn try_dequeue(&mut self) -> Option<Envelope> {
        let envelope = match self.terminate.take() {
            Some(env) => Some(env),
            None => match self.control.try_recv() {
                Ok(env) => Some(env),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                    self.normal.try_recv().ok()
                }
            },
        };
        if envelope.is_some() {
            self.counters.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        envelope
    }

    /// Closes both lanes and drops whatever is still queued.
    ///
    /// Returns the number of discarded envelopes.
    pub fn close(&mut self) -> usize {
        self.control.close();
        self.normal.close();
        let mut discarded = usize::from(self.terminate.take().is_some());
        while self.control.try_recv().is_ok() {
            discarded += 1;
        }
        while self.normal.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
