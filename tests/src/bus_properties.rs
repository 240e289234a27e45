//! Bus Property Tests
//!
//! Exercises the inter-task bus from the outside, through the public
//! `nextmme-itti` API only:
//! - per-pair FIFO ordering
//! - drops of envelopes for unknown destinations
//! - shutdown completeness
//! - timer cancellation racing with expiry
//! - CONTROL priority and NORMAL lane backpressure

use std::time::Duration;

use bytes::Bytes;
use integration_tests::{
    init_test_logging, test_bus_config, wait_for_condition, MockTask, MockTaskEvent,
    DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
};
use nextmme_common::config::BusConfig;
use nextmme_itti::{
    Envelope, LifecycleCoordinator, Payload, SendError, TaskId, TaskState, TimerError, TimerKind,
};
use tokio::sync::mpsc;

const SENDER: TaskId = TaskId::new(10);
const RECEIVER: TaskId = TaskId::new(11);

fn tagged(tag: u32) -> Payload {
    Payload::Application {
        tag,
        data: Bytes::new(),
    }
}

fn tag_of(envelope: &Envelope) -> Option<u32> {
    match envelope.payload() {
        Payload::Application { tag, .. } => Some(*tag),
        _ => None,
    }
}

/// Collects every envelope handled within `window`.
async fn drain_handled(
    rx: &mut mpsc::UnboundedReceiver<MockTaskEvent>,
    window: Duration,
) -> Vec<Envelope> {
    let mut handled = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        if let MockTaskEvent::Handled(envelope) = event {
            handled.push(envelope);
        }
    }
    handled
}

async fn start_pair(
    config: BusConfig,
    receiver: MockTask,
) -> (LifecycleCoordinator, nextmme_itti::Bus) {
    let (sender, _sender_rx) = MockTask::new();
    let mut coordinator = LifecycleCoordinator::new(config).expect("valid bus config");
    coordinator.register(SENDER, "SENDER", sender).expect("register sender");
    coordinator
        .register(RECEIVER, "RECEIVER", receiver)
        .expect("register receiver");
    let bus = coordinator.start().await.expect("start");
    (coordinator, bus)
}

/// Sequentially tagged envelopes arrive in the order they were sent
#[tokio::test]
async fn test_fifo_per_pair() {
    init_test_logging();
    let (receiver, mut rx) = MockTask::new();
    let (mut coordinator, bus) = start_pair(test_bus_config(), receiver).await;

    for tag in 0..200 {
        bus.send(Envelope::new(SENDER, RECEIVER, tagged(tag)))
            .await
            .expect("send");
    }

    let mut tags = Vec::with_capacity(200);
    while tags.len() < 200 {
        let envelope = MockTask::next_envelope(&mut rx)
            .await
            .expect("envelope in time");
        assert_eq!(envelope.origin(), SENDER);
        tags.extend(tag_of(&envelope));
    }
    assert_eq!(tags, (0..200).collect::<Vec<_>>());

    coordinator.shutdown().await.expect("shutdown");
}

/// Unknown destinations fail fast and are counted once per send
#[tokio::test]
async fn test_unknown_destination_dropped() {
    init_test_logging();
    let (receiver, mut rx) = MockTask::new();
    let (mut coordinator, bus) = start_pair(test_bus_config(), receiver).await;

    let unknown = TaskId::new(99);
    for expected in 1..=3u64 {
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            bus.send(Envelope::new(SENDER, unknown, tagged(0))),
        )
        .await
        .expect("send to unknown destination must not block");
        assert!(matches!(result, Err(ref e) if e.is_routing()));
        assert_eq!(bus.dropped_count(), expected);
    }

    // The bus keeps working for registered tasks
    bus.send(Envelope::new(SENDER, RECEIVER, tagged(1)))
        .await
        .expect("send");
    let envelope = MockTask::next_envelope(&mut rx).await.expect("delivered");
    assert_eq!(tag_of(&envelope), Some(1));
    assert_eq!(bus.dropped_count(), 3);

    coordinator.shutdown().await.expect("shutdown");
}

/// wait() returns only once every task is TERMINATED
#[tokio::test]
async fn test_shutdown_completeness() {
    init_test_logging();
    let mut coordinator = LifecycleCoordinator::new(test_bus_config()).expect("valid bus config");
    let mut receivers = Vec::new();
    for raw in 1..=4u16 {
        let (task, rx) = MockTask::new();
        let task = task.with_delay(Duration::from_millis(20));
        coordinator
            .register(TaskId::new(raw), format!("TASK_{raw}"), task)
            .expect("register");
        receivers.push(rx);
    }
    let bus = coordinator.start().await.expect("start");

    // Keep every task busy in its handler while TERMINATE arrives
    for raw in 1..=4u16 {
        bus.send(Envelope::new(SENDER, TaskId::new(raw), tagged(0)))
            .await
            .expect("send");
    }

    let notified = coordinator.broadcast_terminate().await.expect("broadcast");
    assert_eq!(notified, 4);
    coordinator.wait().await.expect("wait");

    assert!(coordinator.all_terminated());
    for (_, name, state) in coordinator.status_summary() {
        assert_eq!(state, TaskState::Terminated, "{name} not terminated");
    }
    for rx in &mut receivers {
        let mut shutdowns = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MockTaskEvent::Shutdown) {
                shutdowns += 1;
            }
        }
        assert_eq!(shutdowns, 1);
    }

    let result = bus.send(Envelope::new(SENDER, TaskId::new(1), tagged(0))).await;
    assert!(matches!(result, Err(SendError::Routing { .. })));
}

/// A cancel returning before the expiry instant prevents delivery
#[tokio::test]
async fn test_timer_cancelled_before_expiry() {
    init_test_logging();
    let (receiver, mut rx) = MockTask::new();
    let (mut coordinator, bus) = start_pair(test_bus_config(), receiver).await;

    for kind in [TimerKind::OneShot, TimerKind::Periodic] {
        let handle = bus
            .arm_timer(RECEIVER, kind, Duration::from_millis(50))
            .expect("arm");
        bus.cancel_timer(&handle).await.expect("cancel");
    }

    assert!(drain_handled(&mut rx, Duration::from_millis(120)).await.is_empty());
    assert_eq!(bus.timers().active_count(), 0);

    coordinator.shutdown().await.expect("shutdown");
}

/// A cancel racing with expiry yields zero or one delivery, never two
#[tokio::test]
async fn test_timer_cancel_race() {
    init_test_logging();
    let (receiver, mut rx) = MockTask::new();
    let (mut coordinator, bus) = start_pair(test_bus_config(), receiver).await;

    for offset_ms in [0u64, 1, 2, 3, 4, 5, 6, 8, 10, 15] {
        let handle = bus
            .arm_timer(RECEIVER, TimerKind::OneShot, Duration::from_millis(5))
            .expect("arm");
        tokio::time::sleep(Duration::from_millis(offset_ms)).await;
        let cancelled = bus.cancel_timer(&handle).await;

        let deliveries = drain_handled(&mut rx, Duration::from_millis(40))
            .await
            .into_iter()
            .filter(|e| matches!(e.payload(), Payload::TimerExpired { timer_id, .. } if *timer_id == handle.id()))
            .count();

        match cancelled {
            // Cancel won: the expiry, even if queued, never reaches the handler
            Ok(()) => assert_eq!(deliveries, 0, "offset {offset_ms} ms"),
            // Expiry was consumed first
            Err(TimerError::UnknownTimer(_)) => assert_eq!(deliveries, 1, "offset {offset_ms} ms"),
            Err(e) => panic!("unexpected cancel error: {e}"),
        }
    }
    assert_eq!(bus.timers().active_count(), 0);

    coordinator.shutdown().await.expect("shutdown");
}

/// A periodic timer keeps firing until cancelled
#[tokio::test]
async fn test_periodic_timer_fires_repeatedly() {
    init_test_logging();
    let (receiver, mut rx) = MockTask::new();
    let (mut coordinator, bus) = start_pair(test_bus_config(), receiver).await;

    let handle = bus
        .arm_timer(RECEIVER, TimerKind::Periodic, Duration::from_millis(10))
        .expect("arm");
    let fired = drain_handled(&mut rx, Duration::from_millis(100)).await;
    assert!(fired.len() >= 3, "only {} expiries", fired.len());
    assert!(fired
        .iter()
        .all(|e| e.origin() == TaskId::TIMER_SERVICE));

    bus.cancel_timer(&handle).await.expect("cancel");
    // At most one expiry was already in flight
    drain_handled(&mut rx, Duration::from_millis(30)).await;
    assert!(drain_handled(&mut rx, Duration::from_millis(50)).await.is_empty());

    coordinator.shutdown().await.expect("shutdown");
}

/// CONTROL envelopes overtake queued NORMAL ones
#[tokio::test]
async fn test_control_priority() {
    init_test_logging();
    let (receiver, mut rx) = MockTask::new();
    let receiver = receiver.with_delay(Duration::from_millis(20));
    let (mut coordinator, bus) = start_pair(test_bus_config(), receiver).await;

    for tag in 0..5 {
        bus.send(Envelope::new(SENDER, RECEIVER, tagged(tag)))
            .await
            .expect("send");
    }
    bus.send(Envelope::control(SENDER, RECEIVER, tagged(100)))
        .await
        .expect("send control");

    let handled = drain_handled(&mut rx, Duration::from_millis(300)).await;
    let tags: Vec<u32> = handled.iter().filter_map(tag_of).collect();
    assert_eq!(tags.len(), 6);
    let position = tags
        .iter()
        .position(|tag| *tag == 100)
        .expect("control envelope handled");
    // At most the envelope already in the handler precedes it
    assert!(position <= 1, "control handled at position {position}: {tags:?}");

    let normal: Vec<u32> = tags.into_iter().filter(|tag| *tag != 100).collect();
    assert_eq!(normal, vec![0, 1, 2, 3, 4]);

    coordinator.shutdown().await.expect("shutdown");
}

/// A full NORMAL lane blocks the sender up to the send timeout
#[tokio::test]
async fn test_full_mailbox_times_out() {
    init_test_logging();
    let config = BusConfig {
        mailbox_capacity: 2,
        ..test_bus_config()
    };
    let (receiver, _rx) = MockTask::new();
    let receiver = receiver.with_delay(Duration::from_millis(300));
    let (mut coordinator, bus) = start_pair(config, receiver).await;

    // One envelope in the handler, two queued
    for tag in 0..3 {
        bus.send(Envelope::new(SENDER, RECEIVER, tagged(tag)))
            .await
            .expect("send");
    }
    wait_for_condition(
        || async { bus.mailbox_stats(RECEIVER).map(|s| s.queued) == Some(2) },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .expect("two envelopes queued");

    let result = bus.send(Envelope::new(SENDER, RECEIVER, tagged(3))).await;
    assert!(matches!(
        result,
        Err(SendError::MailboxFull { destination, waited_ms: 50 }) if destination == RECEIVER
    ));

    let result = bus.try_send(Envelope::new(SENDER, RECEIVER, tagged(4)));
    assert!(matches!(result, Err(SendError::MailboxFull { waited_ms: 0, .. })));
    assert_eq!(bus.dropped_count(), 0);

    coordinator.shutdown().await.expect("shutdown");
}
