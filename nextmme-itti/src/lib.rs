//! Inter-task message bus
//!
//! Independently scheduled tasks inside one process exchange [`Envelope`]s
//! through bounded per-task mailboxes. The crate provides:
//!
//! - [`envelope`]: task identities, message kinds, payloads
//! - [`mailbox`]: two-lane (CONTROL, NORMAL) bounded mailboxes
//! - [`registry`]: task descriptors and lifecycle states
//! - [`dispatcher`]: routing with counted drops
//! - [`timer`]: one-shot and periodic timers delivered as envelopes
//! - [`lifecycle`]: the [`Task`] trait, the [`Bus`] handle and the
//!   [`LifecycleCoordinator`]
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use nextmme_common::config::BusConfig;
//! use nextmme_itti::{Envelope, LifecycleCoordinator, Task, TaskContext, TaskId};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Task for Echo {
//!     async fn handle(&mut self, ctx: &TaskContext, envelope: Envelope) {
//!         let _ = ctx.send(envelope.origin(), envelope.into_payload()).await;
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut coordinator = LifecycleCoordinator::new(BusConfig::default())?;
//! coordinator.register(TaskId::new(1), "ECHO", Echo)?;
//! let _bus = coordinator.start().await?;
//! coordinator.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod mailbox;
pub mod registry;
pub mod timer;

pub use dispatcher::Dispatcher;
pub use envelope::{Destination, Envelope, MessageKind, Payload, Priority, TaskId};
pub use error::{LifecycleError, RegistrationError, SendError, TimerError};
pub use lifecycle::{Bus, LifecycleCoordinator, Task, TaskContext};
pub use mailbox::{MailboxReceiver, MailboxSender, MailboxStats};
pub use nextmme_common::config::BusConfig;
pub use registry::{TaskDescriptor, TaskRegistry, TaskState};
pub use timer::{TimerHandle, TimerId, TimerKind, TimerService};
