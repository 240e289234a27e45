//! Mock task for integration testing
//!
//! [`MockTask`] stands in for any peer on the bus. It reports every envelope
//! it handles and its shutdown through an event channel, optionally taking a
//! fixed time per envelope to simulate a slow consumer.

use std::time::Duration;

use async_trait::async_trait;
use nextmme_itti::{Envelope, Task, TaskContext};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Events reported by a [`MockTask`]
#[derive(Debug)]
pub enum MockTaskEvent {
    /// An envelope reached the handler
    Handled(Envelope),
    /// The shutdown hook ran
    Shutdown,
}

/// Recording task
pub struct MockTask {
    events: mpsc::UnboundedSender<MockTaskEvent>,
    delay: Option<Duration>,
}

impl MockTask {
    /// Creates a mock task and the receiver of its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockTaskEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events, delay: None }, rx)
    }

    /// Makes the handler take `delay` per envelope.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Next handled envelope, `None` after one second or on shutdown.
    pub async fn next_envelope(
        rx: &mut mpsc::UnboundedReceiver<MockTaskEvent>,
    ) -> Option<Envelope> {
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(MockTaskEvent::Handled(envelope))) => Some(envelope),
            _ => None,
        }
    }
}

#[async_trait]
impl Task for MockTask {
    async fn handle(&mut self, _ctx: &TaskContext, envelope: Envelope) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let _ = self.events.send(MockTaskEvent::Handled(envelope));
    }

    async fn on_shutdown(&mut self, _ctx: &TaskContext) {
        let _ = self.events.send(MockTaskEvent::Shutdown);
    }
}
