//! Helpers shared by the task tests

use std::time::Duration;

use async_trait::async_trait;
use nextmme_common::config::BusConfig;
use nextmme_itti::{Envelope, Task, TaskContext};
use tokio::sync::mpsc;

/// Stands in for a peer task and forwards everything it handles.
pub struct Recorder {
    seen: mpsc::UnboundedSender<Envelope>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (seen, rx) = mpsc::unbounded_channel();
        (Self { seen }, rx)
    }
}

#[async_trait]
impl Task for Recorder {
    async fn handle(&mut self, _ctx: &TaskContext, envelope: Envelope) {
        let _ = self.seen.send(envelope);
    }
}

pub fn bus_config() -> BusConfig {
    BusConfig {
        housekeeping_interval_ms: 5,
        shutdown_timeout_ms: 1000,
        ..BusConfig::default()
    }
}

/// Next envelope seen by a recorder, failing the test after one second.
pub async fn next_envelope(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(envelope)) => envelope,
        _ => panic!("Expected an envelope"),
    }
}

/// Asserts a recorder sees nothing for a short while.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Envelope>) {
    if let Ok(Some(envelope)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        panic!("Unexpected envelope {envelope:?}");
    }
}

/// Polls `condition` until it holds, failing the test after one second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
