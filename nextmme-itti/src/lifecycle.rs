//! Task model and lifecycle coordinator
//!
//! Tasks implement [`Task`] and are registered with the
//! [`LifecycleCoordinator`] before start. `start()` freezes the registry,
//! spawns one tokio task per registered task and waits until each of them
//! reports RUNNING. Every task loop is:
//!
//! ```text
//! loop {
//!     dequeue(housekeeping interval)
//!       None      -> housekeeping hook
//!       TERMINATE -> TERMINATING, shutdown hook, break
//!       other     -> handler
//! }
//! mailbox destroyed, TERMINATED
//! ```
//!
//! Tasks reach the rest of the process only through the [`Bus`] handle in
//! their [`TaskContext`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nextmme_common::config::BusConfig;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::envelope::{Destination, Envelope, Payload, TaskId};
use crate::error::{LifecycleError, RegistrationError, SendError, TimerError};
use crate::mailbox::{self, MailboxReceiver, MailboxStats};
use crate::registry::{TaskDescriptor, TaskRegistry, TaskState};
use crate::timer::{TimerHandle, TimerKind, TimerService};

// ============================================================================
// Task Trait
// ============================================================================

/// Behaviour of a task running on the bus.
///
/// Hooks are never called concurrently for the same task.
#[async_trait]
pub trait Task: Send + 'static {
    /// Handles one envelope. TERMINATE never reaches this method.
    async fn handle(&mut self, ctx: &TaskContext, envelope: Envelope);

    /// Called whenever the mailbox stayed empty for a housekeeping interval.
    async fn housekeeping(&mut self, _ctx: &TaskContext) {}

    /// Called once after TERMINATE, before the mailbox is destroyed.
    async fn on_shutdown(&mut self, _ctx: &TaskContext) {}
}

// ============================================================================
// Bus Handle
// ============================================================================

/// Handle to the running bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Bus {
    dispatcher: Dispatcher,
    timers: Arc<TimerService>,
    config: Arc<BusConfig>,
}

impl Bus {
    /// Sends an envelope, waiting up to the send timeout on a full lane.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.dispatcher.send(envelope).await
    }

    /// Sends an envelope without waiting.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.dispatcher.try_send(envelope)
    }

    /// Arms a timer owned by `owner`.
    pub fn arm_timer(
        &self,
        owner: TaskId,
        kind: TimerKind,
        duration: Duration,
    ) -> Result<TimerHandle, TimerError> {
        self.timers.arm(owner, kind, duration)
    }

    /// Cancels a timer.
    pub async fn cancel_timer(&self, handle: &TimerHandle) -> Result<(), TimerError> {
        self.timers.cancel(handle).await
    }

    /// The frozen task registry.
    pub fn registry(&self) -> &TaskRegistry {
        self.dispatcher.registry()
    }

    /// Current state of a task.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.registry().get(id).map(TaskDescriptor::state)
    }

    /// Number of envelopes dropped for lack of a live destination.
    pub fn dropped_count(&self) -> u64 {
        self.dispatcher.dropped_count()
    }

    /// Mailbox counters of a task.
    pub fn mailbox_stats(&self, id: TaskId) -> Option<MailboxStats> {
        self.registry().get(id).map(|d| d.mailbox().stats())
    }

    /// The timer service.
    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// The bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

/// What a task sees of the bus.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    bus: Bus,
}

impl TaskContext {
    /// Identity of the task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Registered name of the task.
    pub fn name(&self) -> &str {
        self.bus.registry().name_of(self.id).unwrap_or("unknown")
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Sends a NORMAL envelope originating from this task.
    pub async fn send(
        &self,
        destination: impl Into<Destination>,
        payload: Payload,
    ) -> Result<(), SendError> {
        self.bus
            .send(Envelope::new(self.id, destination, payload))
            .await
    }

    /// Sends a prepared envelope.
    pub async fn send_envelope(&self, envelope: Envelope) -> Result<(), SendError> {
        self.bus.send(envelope).await
    }

    /// Sends a NORMAL envelope originating from this task without waiting.
    pub fn try_send(
        &self,
        destination: impl Into<Destination>,
        payload: Payload,
    ) -> Result<(), SendError> {
        self.bus
            .try_send(Envelope::new(self.id, destination, payload))
    }

    /// Sends a copy of `payload` to every other live task.
    pub async fn broadcast(&self, payload: Payload) -> Result<(), SendError> {
        self.send(Destination::Broadcast, payload).await
    }

    /// Arms a timer owned by this task.
    pub fn arm_timer(&self, kind: TimerKind, duration: Duration) -> Result<TimerHandle, TimerError> {
        self.bus.arm_timer(self.id, kind, duration)
    }

    /// Cancels a timer.
    pub async fn cancel_timer(&self, handle: &TimerHandle) -> Result<(), TimerError> {
        self.bus.cancel_timer(handle).await
    }
}

// ============================================================================
// Lifecycle Coordinator
// ============================================================================

struct PendingTask {
    id: TaskId,
    mailbox: MailboxReceiver,
    task: Box<dyn Task>,
}

/// Owns process-wide task start and stop.
pub struct LifecycleCoordinator {
    config: Arc<BusConfig>,
    /// Present until `start()`
    registry: Option<TaskRegistry>,
    pending: Vec<PendingTask>,
    /// Present from `start()` on
    bus: Option<Bus>,
    contexts: Vec<(TaskId, JoinHandle<()>)>,
}

impl LifecycleCoordinator {
    /// Creates a coordinator, validating the bus configuration.
    pub fn new(config: BusConfig) -> Result<Self, LifecycleError> {
        validate_bus_config(&config)?;
        Ok(Self {
            registry: Some(TaskRegistry::new(config.max_tasks)),
            config: Arc::new(config),
            pending: Vec::new(),
            bus: None,
            contexts: Vec::new(),
        })
    }

    /// Registers a task. Only possible before `start()`.
    pub fn register(
        &mut self,
        id: TaskId,
        name: impl Into<String>,
        task: impl Task,
    ) -> Result<&TaskDescriptor, RegistrationError> {
        let Some(registry) = self.registry.as_mut() else {
            return Err(RegistrationError::AlreadyStarted { id });
        };

        let (sender, receiver) =
            mailbox::channel(self.config.mailbox_capacity, self.config.control_capacity);
        let descriptor = registry.register(id, name, sender)?;
        self.pending.push(PendingTask {
            id,
            mailbox: receiver,
            task: Box::new(task),
        });
        Ok(descriptor)
    }

    /// Spawns every registered task and waits until all report RUNNING.
    pub async fn start(&mut self) -> Result<Bus, LifecycleError> {
        let registry = Arc::new(self.registry.take().ok_or(LifecycleError::AlreadyStarted)?);
        let dispatcher = Dispatcher::new(registry.clone(), self.config.send_timeout());
        let bus = Bus {
            timers: Arc::new(TimerService::new(dispatcher.clone())),
            dispatcher,
            config: self.config.clone(),
        };
        self.bus = Some(bus.clone());

        let mut ready = Vec::with_capacity(self.pending.len());
        for PendingTask { id, mailbox, task } in self.pending.drain(..) {
            if let Some(descriptor) = registry.get(id) {
                ready.push((id, descriptor.subscribe_state()));
            }
            let ctx = TaskContext {
                id,
                bus: bus.clone(),
            };
            self.contexts.push((id, tokio::spawn(run_task(ctx, mailbox, task))));
        }

        let timeout = self.config.shutdown_timeout();
        for (id, mut state_rx) in ready {
            let running = tokio::time::timeout(
                timeout,
                state_rx.wait_for(|state| *state != TaskState::Registered),
            )
            .await
            .map(|changed| changed.is_ok())
            .unwrap_or(false);
            if !running {
                error!(task = %id, "Task did not start in time");
                return Err(LifecycleError::StartTimeout { id });
            }
        }

        info!(tasks = registry.len(), "All tasks running");
        Ok(bus)
    }

    /// Delivers one TERMINATE to every live task.
    ///
    /// TERMINATE bypasses the mailbox lanes, so it is delivered even when the
    /// CONTROL lane is full. Tasks whose mailbox is already gone (a panicked
    /// context) are skipped. Returns the number of tasks that were notified.
    pub async fn broadcast_terminate(&self) -> Result<usize, LifecycleError> {
        let bus = self.bus.as_ref().ok_or(LifecycleError::NotStarted)?;

        let mut notified = 0;
        for descriptor in bus
            .registry()
            .iter()
            .filter(|d| d.state().is_live() && !d.mailbox().is_closed())
        {
            match descriptor
                .mailbox()
                .terminate(Envelope::terminate(descriptor.id()))
            {
                Ok(()) => notified += 1,
                // The context exited between the check and the delivery
                Err(_) => debug!(task = %descriptor.name(), "Mailbox closed, TERMINATE skipped"),
            }
        }
        info!(tasks = notified, "TERMINATE broadcast");
        Ok(notified)
    }

    /// Blocks until every task context has exited.
    ///
    /// A context that panicked is forced to TERMINATED and reported once all
    /// other contexts have been joined. All timers are dropped afterwards.
    pub async fn wait(&mut self) -> Result<(), LifecycleError> {
        let bus = self.bus.clone().ok_or(LifecycleError::NotStarted)?;

        let mut panicked = Vec::new();
        for (id, handle) in self.contexts.drain(..) {
            if let Err(e) = handle.await {
                error!(task = %id, "Task context failed: {}", e);
                if let Some(descriptor) = bus.registry().get(id) {
                    descriptor.set_state(TaskState::Terminated);
                }
                panicked.push(id);
            }
        }

        bus.timers().shutdown();

        if panicked.is_empty() {
            info!("All tasks terminated");
            Ok(())
        } else {
            Err(LifecycleError::TaskPanicked { tasks: panicked })
        }
    }

    /// Broadcasts TERMINATE and waits for every task to finish.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        self.broadcast_terminate().await?;
        self.wait().await
    }

    /// Bus handle, once started.
    pub fn bus(&self) -> Option<&Bus> {
        self.bus.as_ref()
    }

    /// Returns true once `start()` has run.
    pub fn is_started(&self) -> bool {
        self.bus.is_some()
    }

    fn registry(&self) -> Option<&TaskRegistry> {
        self.registry
            .as_ref()
            .or_else(|| self.bus.as_ref().map(Bus::registry))
    }

    /// Current state of a task.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.registry()?.get(id).map(TaskDescriptor::state)
    }

    /// Returns true when every registered task is TERMINATED.
    pub fn all_terminated(&self) -> bool {
        self.registry()
            .map(|r| r.iter().all(|d| d.state() == TaskState::Terminated))
            .unwrap_or(true)
    }

    /// Returns a summary of all task states.
    pub fn status_summary(&self) -> Vec<(TaskId, String, TaskState)> {
        self.registry()
            .map(|r| {
                r.iter()
                    .map(|d| (d.id(), d.name().to_string(), d.state()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn validate_bus_config(config: &BusConfig) -> Result<(), LifecycleError> {
    let invalid = |field: &str| Err(LifecycleError::InvalidConfig(format!("{field} must be non-zero")));
    if config.max_tasks == 0 {
        return invalid("max_tasks");
    }
    if config.mailbox_capacity == 0 {
        return invalid("mailbox_capacity");
    }
    if config.control_capacity == 0 {
        return invalid("control_capacity");
    }
    if config.housekeeping_interval_ms == 0 {
        return invalid("housekeeping_interval_ms");
    }
    Ok(())
}

async fn run_task(ctx: TaskContext, mut mailbox: MailboxReceiver, mut task: Box<dyn Task>) {
    let Some(descriptor) = ctx.bus.registry().get(ctx.id) else {
        return;
    };
    descriptor.set_state(TaskState::Running);
    let interval = ctx.bus.config.housekeeping_interval();

    loop {
        let Some(envelope) = mailbox.dequeue(interval).await else {
            task.housekeeping(&ctx).await;
            continue;
        };

        if envelope.is_terminate() {
            descriptor.set_state(TaskState::Terminating);
            task.on_shutdown(&ctx).await;
            break;
        }

        if let Payload::TimerExpired {
            timer_id,
            generation,
        } = *envelope.payload()
        {
            if envelope.origin() == TaskId::TIMER_SERVICE
                && !ctx.bus.timers.consume(timer_id, generation)
            {
                debug!(task = %descriptor.name(), timer = %timer_id, generation, "Discarding stale timer expiry");
                continue;
            }
        }

        debug!(
            task = %descriptor.name(),
            kind = %envelope.kind(),
            origin = %envelope.origin(),
            "Handling envelope"
        );
        task.handle(&ctx, envelope).await;
    }

    let discarded = mailbox.close();
    if discarded > 0 {
        debug!(task = %descriptor.name(), discarded, "Pending envelopes discarded");
    }
    drop(mailbox);
    descriptor.set_state(TaskState::Terminated);
}
