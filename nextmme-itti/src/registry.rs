//! Task registry
//!
//! One [`TaskDescriptor`] per task identity. The registry is filled while the
//! bus is being set up, then frozen into an `Arc` by the lifecycle coordinator
//! and only read afterwards. Task state lives in a `watch` channel so the
//! coordinator can wait on transitions without locking.

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::envelope::TaskId;
use crate::error::RegistrationError;
use crate::mailbox::MailboxSender;

// ============================================================================
// Task Lifecycle State
// ============================================================================

/// Task lifecycle state.
///
/// REGISTERED -> RUNNING -> TERMINATING -> TERMINATED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    /// Registered, execution context not running yet
    #[default]
    Registered,
    /// Processing envelopes
    Running,
    /// TERMINATE received, running the shutdown hook
    Terminating,
    /// Loop exited and mailbox destroyed
    Terminated,
}

impl TaskState {
    /// Returns true if the task still accepts envelopes.
    pub fn is_live(self) -> bool {
        self != TaskState::Terminated
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Registered => write!(f, "REGISTERED"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Terminating => write!(f, "TERMINATING"),
            TaskState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

// ============================================================================
// Task Descriptor
// ============================================================================

/// Registry entry of one task.
#[derive(Debug)]
pub struct TaskDescriptor {
    id: TaskId,
    name: String,
    mailbox: MailboxSender,
    state_tx: watch::Sender<TaskState>,
}

impl TaskDescriptor {
    fn new(id: TaskId, name: String, mailbox: MailboxSender) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Registered);
        Self {
            id,
            name,
            mailbox,
            state_tx,
        }
    }

    /// Task identity.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Human-readable task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *self.state_tx.borrow()
    }

    /// Sending half of the task's mailbox.
    pub fn mailbox(&self) -> &MailboxSender {
        &self.mailbox
    }

    /// Subscribes to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<TaskState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(task = %self.name, id = %self.id, "{} -> {}", previous, state);
        }
    }
}

// ============================================================================
// Task Registry
// ============================================================================

/// Table of registered tasks, ordered by identity.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, TaskDescriptor>,
    max_tasks: usize,
}

impl TaskRegistry {
    /// Creates an empty registry accepting at most `max_tasks` entries.
    pub fn new(max_tasks: usize) -> Self {
        Self {
            tasks: BTreeMap::new(),
            max_tasks,
        }
    }

    /// Adds a task.
    ///
    /// Fails on a reserved or already used identity, or when the registry is
    /// full.
    pub fn register(
        &mut self,
        id: TaskId,
        name: impl Into<String>,
        mailbox: MailboxSender,
    ) -> Result<&TaskDescriptor, RegistrationError> {
        if id.is_reserved() {
            return Err(RegistrationError::ReservedIdentity { id });
        }
        if self.tasks.contains_key(&id) {
            return Err(RegistrationError::DuplicateIdentity { id });
        }
        if self.tasks.len() >= self.max_tasks {
            return Err(RegistrationError::CapacityExceeded {
                max: self.max_tasks,
            });
        }

        let descriptor = TaskDescriptor::new(id, name.into(), mailbox);
        info!(task = %descriptor.name, id = %id, "task registered");
        Ok(self.tasks.entry(id).or_insert(descriptor))
    }

    /// Looks up a task.
    pub fn get(&self, id: TaskId) -> Option<&TaskDescriptor> {
        self.tasks.get(&id)
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Name of a task, if registered.
    pub fn name_of(&self, id: TaskId) -> Option<&str> {
        self.tasks.get(&id).map(TaskDescriptor::name)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Configured capacity.
    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Iterates over descriptors in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.values()
    }

    /// Registered identities in ascending order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }
}
