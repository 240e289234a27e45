//! Timer service
//!
//! Timers never call back into a task. On expiry the service enqueues a
//! TIMER_EXPIRED envelope (origin [`TaskId::TIMER_SERVICE`]) into the owner's
//! mailbox, and the owner handles it like any other envelope.
//!
//! Each timer carries a generation. The worker that fires a timer and
//! [`TimerService::cancel`] both go through a per-timer delivery lock and an
//! atomic compare-and-swap on the armed generation, so a given generation is
//! enqueued at most once and nothing is enqueued after `cancel` returns. An
//! expiry that was already queued when the timer got cancelled is discarded by
//! the owner's loop (see [`TimerService::consume`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, TaskId};
use crate::error::TimerError;

/// Generation value of a disarmed timer.
const DISARMED: u64 = 0;

/// Timer identity, unique for the lifetime of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub const fn new(raw: u64) -> Self {
        TimerId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Timer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires once, then is forgotten when the expiry is consumed
    OneShot,
    /// Fires every period until cancelled
    Periodic,
}

/// Handle returned by [`TimerService::arm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: TimerId,
    owner: TaskId,
    kind: TimerKind,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn owner(&self) -> TaskId {
        self.owner
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

#[derive(Debug)]
struct TimerEntry {
    owner: TaskId,
    kind: TimerKind,
    period: Duration,
    /// Generation the worker will fire next, `DISARMED` once cancelled or spent
    armed: AtomicU64,
    /// One-shot generation enqueued but not yet consumed by the owner
    pending: AtomicU64,
    delivery: tokio::sync::Mutex<()>,
    worker: Mutex<Option<AbortHandle>>,
}

impl TimerEntry {
    fn abort_worker(&self) {
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
    }
}

#[derive(Debug)]
struct Shared {
    dispatcher: Dispatcher,
    timers: Mutex<HashMap<TimerId, Arc<TimerEntry>>>,
    next_id: AtomicU64,
}

impl Shared {
    fn lookup(&self, id: TimerId) -> Option<Arc<TimerEntry>> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn remove(&self, id: TimerId) -> Option<Arc<TimerEntry>> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

/// Arms, cancels and delivers timers.
#[derive(Debug)]
pub struct TimerService {
    shared: Arc<Shared>,
}

impl TimerService {
    /// Creates a timer service delivering through `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                timers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Arms a timer for `owner`.
    ///
    /// A periodic timer fires every `duration`. Must be called from within a
    /// tokio runtime.
    pub fn arm(
        &self,
        owner: TaskId,
        kind: TimerKind,
        duration: Duration,
    ) -> Result<TimerHandle, TimerError> {
        if duration.is_zero() {
            return Err(TimerError::InvalidDuration);
        }
        if !self.shared.dispatcher.registry().contains(owner) {
            return Err(TimerError::UnknownOwner(owner));
        }

        let id = TimerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(TimerEntry {
            owner,
            kind,
            period: duration,
            armed: AtomicU64::new(1),
            pending: AtomicU64::new(DISARMED),
            delivery: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
        });

        self.shared
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry.clone());

        let worker = tokio::spawn(run_timer(self.shared.clone(), id, entry.clone()));
        *entry.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker.abort_handle());

        debug!(timer = %id, %owner, ?kind, ?duration, "Timer armed");
        Ok(TimerHandle { id, owner, kind })
    }

    /// Cancels a timer.
    ///
    /// After this returns, no expiry of the timer is enqueued anymore and a
    /// queued one-shot expiry is discarded before reaching the owner's
    /// handler. Fails with `UnknownTimer` if the timer never existed, was
    /// already cancelled, or its one-shot expiry was already consumed.
    pub async fn cancel(&self, handle: &TimerHandle) -> Result<(), TimerError> {
        let entry = self
            .shared
            .lookup(handle.id)
            .ok_or(TimerError::UnknownTimer(handle.id))?;

        let _delivery = entry.delivery.lock().await;
        let armed = entry.armed.swap(DISARMED, Ordering::AcqRel);
        let pending = entry.pending.swap(DISARMED, Ordering::AcqRel);
        self.shared.remove(handle.id);
        entry.abort_worker();

        if armed == DISARMED && pending == DISARMED {
            // Lost the race against consume()
            return Err(TimerError::UnknownTimer(handle.id));
        }
        debug!(timer = %handle.id, owner = %handle.owner, "Timer cancelled");
        Ok(())
    }

    /// Marks an expiry as consumed by its owner.
    ///
    /// Returns false for a stale expiry (timer cancelled, or this generation
    /// already consumed); the owner must discard it.
    pub fn consume(&self, id: TimerId, generation: u64) -> bool {
        let Some(entry) = self.shared.lookup(id) else {
            return false;
        };
        match entry.kind {
            TimerKind::OneShot => {
                let consumed = entry
                    .pending
                    .compare_exchange(generation, DISARMED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if consumed {
                    self.shared.remove(id);
                }
                consumed
            }
            TimerKind::Periodic => generation != DISARMED,
        }
    }

    /// Number of timers armed or awaiting consumption.
    pub fn active_count(&self) -> usize {
        self.shared
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops every timer.
    pub fn shutdown(&self) {
        let timers: Vec<_> = self
            .shared
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, entry) in &timers {
            entry.armed.store(DISARMED, Ordering::Release);
            entry.abort_worker();
        }
        if !timers.is_empty() {
            debug!(count = timers.len(), "Timers dropped");
        }
    }
}

async fn run_timer(shared: Arc<Shared>, id: TimerId, entry: Arc<TimerEntry>) {
    let mut generation = 1;
    let mut deadline = Instant::now() + entry.period;

    loop {
        sleep_until(deadline).await;

        {
            let _delivery = entry.delivery.lock().await;
            let next = match entry.kind {
                TimerKind::OneShot => DISARMED,
                TimerKind::Periodic => generation + 1,
            };
            if entry
                .armed
                .compare_exchange(generation, next, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                trace!(timer = %id, generation, "Timer cancelled before expiry");
                return;
            }
            if entry.kind == TimerKind::OneShot {
                entry.pending.store(generation, Ordering::Release);
            }

            // Never block on the owner's mailbox while holding the delivery lock
            let envelope = Envelope::timer_expired(entry.owner, id, generation);
            match shared.dispatcher.try_send(envelope) {
                Ok(()) => trace!(timer = %id, generation, owner = %entry.owner, "Timer expired"),
                Err(err) => {
                    warn!(timer = %id, generation, owner = %entry.owner, "Timer expiry lost: {}", err);
                    if entry.kind == TimerKind::OneShot {
                        entry.pending.store(DISARMED, Ordering::Release);
                        shared.remove(id);
                    }
                }
            }
        }

        match entry.kind {
            TimerKind::OneShot => return,
            TimerKind::Periodic => {
                generation += 1;
                deadline += entry.period;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;
    use crate::mailbox::{self, MailboxReceiver};
    use crate::registry::TaskRegistry;

    const OWNER: TaskId = TaskId(1);

    fn setup() -> (TimerService, MailboxReceiver) {
        let mut registry = TaskRegistry::new(4);
        let (tx, rx) = mailbox::channel(16, 1);
        registry.register(OWNER, "owner", tx).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry), Duration::from_millis(10));
        (TimerService::new(dispatcher), rx)
    }

    fn expiry(env: Envelope) -> (TimerId, u64) {
        assert_eq!(env.origin(), TaskId::TIMER_SERVICE);
        match env.into_payload() {
            Payload::TimerExpired {
                timer_id,
                generation,
            } => (timer_id, generation),
            other => panic!("expected TimerExpired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_one_shot_fires_once() {
        let (timers, mut rx) = setup();
        let handle = timers
            .arm(OWNER, TimerKind::OneShot, Duration::from_millis(10))
            .unwrap();
        assert_eq!(timers.active_count(), 1);

        let env = rx.dequeue(Duration::from_millis(500)).await.unwrap();
        let (id, generation) = expiry(env);
        assert_eq!(id, handle.id());
        assert_eq!(generation, 1);

        assert!(timers.consume(id, generation));
        assert!(!timers.consume(id, generation));
        assert_eq!(timers.active_count(), 0);
        assert_eq!(
            timers.cancel(&handle).await,
            Err(TimerError::UnknownTimer(handle.id()))
        );
        assert!(rx.dequeue(Duration::from_millis(30)).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_expiry() {
        let (timers, mut rx) = setup();
        let handle = timers
            .arm(OWNER, TimerKind::OneShot, Duration::from_millis(30))
            .unwrap();
        timers.cancel(&handle).await.unwrap();

        assert!(rx.dequeue(Duration::from_millis(90)).await.is_none());
        assert_eq!(timers.active_count(), 0);
        assert!(timers.cancel(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_after_enqueue_discards_expiry() {
        let (timers, mut rx) = setup();
        let handle = timers
            .arm(OWNER, TimerKind::OneShot, Duration::from_millis(5))
            .unwrap();

        let env = rx.dequeue(Duration::from_millis(500)).await.unwrap();
        timers.cancel(&handle).await.unwrap();

        let (id, generation) = expiry(env);
        assert!(!timers.consume(id, generation));
    }

    #[tokio::test]
    async fn test_periodic_generations() {
        let (timers, mut rx) = setup();
        let handle = timers
            .arm(OWNER, TimerKind::Periodic, Duration::from_millis(10))
            .unwrap();

        for expected in 1..=3 {
            let env = rx.dequeue(Duration::from_millis(500)).await.unwrap();
            let (id, generation) = expiry(env);
            assert_eq!(generation, expected);
            assert!(timers.consume(id, generation));
        }

        timers.cancel(&handle).await.unwrap();
        // Drain an expiry that may have been queued before the cancel
        while let Some(env) = rx.try_dequeue() {
            let (id, generation) = expiry(env);
            assert!(!timers.consume(id, generation));
        }
        assert!(rx.dequeue(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn test_arm_validation() {
        let (timers, _rx) = setup();
        assert_eq!(
            timers.arm(OWNER, TimerKind::OneShot, Duration::ZERO),
            Err(TimerError::InvalidDuration)
        );
        assert_eq!(
            timers.arm(TaskId(42), TimerKind::OneShot, Duration::from_millis(5)),
            Err(TimerError::UnknownOwner(TaskId(42)))
        );
        assert_eq!(timers.active_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drops_timers() {
        let (timers, mut rx) = setup();
        timers
            .arm(OWNER, TimerKind::Periodic, Duration::from_millis(10))
            .unwrap();
        timers
            .arm(OWNER, TimerKind::OneShot, Duration::from_millis(10))
            .unwrap();
        timers.shutdown();

        assert_eq!(timers.active_count(), 0);
        assert!(rx.dequeue(Duration::from_millis(50)).await.is_none());
    }
}
