//! End-to-End Scenario Tests for nextmme
//!
//! These tests run the real S1AP, MME_APP and SCTP tasks on one bus and
//! drive them from the transport side:
//! - association notification relayed as ESTABLISH
//! - DRX parameter answered with the assigned T3412 value
//! - association loss releasing the UE context and its timers

use std::time::Duration;

use bytes::Bytes;
use integration_tests::{
    init_test_logging, test_bus_config, test_mme_config, wait_for_condition, MockTask,
    MockTaskEvent, DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
};
use nextmme_common::config::{S1apConfig, SctpConfig};
use nextmme_itti::{LifecycleCoordinator, Payload, TaskId, TaskState};
use nextmme_mme::{MmeNode, S1apTask, SctpTask};
use nextmme_nas::{DrxParameter, GprsTimer, InformationElement3, DRX_PARAMETER_IEI, T3412_VALUE_IEI};
use tokio::time::timeout;

const SIGNALING_TERM: TaskId = TaskId::new(1);
const MOBILITY_MGR: TaskId = TaskId::new(2);
const ASSOC_MGR: TaskId = TaskId::new(3);

/// E2E Test: association notification reaches the mobility manager once
///
/// 1. AssocMgr learns of association 7 from the transport
/// 2. AssocMgr -> SignalingTerm: ASSOCIATION_UP
/// 3. SignalingTerm -> MobilityMgr: ESTABLISH
#[tokio::test]
async fn test_e2e_association_up_relayed_once() {
    init_test_logging();

    let (mobility, mut mobility_rx) = MockTask::new();
    let (assoc_mgr, transport) = SctpTask::new(SctpConfig::default(), SIGNALING_TERM);

    let mut coordinator = LifecycleCoordinator::new(test_bus_config()).expect("valid bus config");
    coordinator
        .register(
            SIGNALING_TERM,
            "SignalingTerm",
            S1apTask::with_peers(S1apConfig::default(), MOBILITY_MGR, ASSOC_MGR),
        )
        .expect("register SignalingTerm");
    coordinator
        .register(MOBILITY_MGR, "MobilityMgr", mobility)
        .expect("register MobilityMgr");
    coordinator
        .register(ASSOC_MGR, "AssocMgr", assoc_mgr)
        .expect("register AssocMgr");
    let bus = coordinator.start().await.expect("start");

    tracing::info!("[ENB] association 7 up, 32/32 streams");
    transport
        .association_up(7, 32, 32)
        .await
        .expect("transport open");

    let envelope = MockTask::next_envelope(&mut mobility_rx)
        .await
        .expect("ESTABLISH relayed");
    assert_eq!(envelope.origin(), SIGNALING_TERM);
    match envelope.into_payload() {
        Payload::Establish {
            association_id,
            in_streams,
            out_streams,
        } => {
            assert_eq!(association_id, 7);
            assert_eq!((in_streams, out_streams), (32, 32));
        }
        other => panic!("Expected ESTABLISH, got {other:?}"),
    }

    // Exactly one envelope
    assert!(timeout(Duration::from_millis(100), mobility_rx.recv())
        .await
        .is_err());
    assert_eq!(
        bus.mailbox_stats(MOBILITY_MGR).map(|s| s.enqueued),
        Some(1)
    );

    coordinator.shutdown().await.expect("shutdown");
    match mobility_rx.recv().await {
        Some(MockTaskEvent::Shutdown) => {}
        other => panic!("Expected shutdown, got {other:?}"),
    }
}

/// E2E Test: DRX parameter exchange through the full node
///
/// 1. eNB association up, UE context created with its guard timer
/// 2. Uplink DRX parameter, guard stopped, T3412 started
/// 3. Downlink T3412 value on the uplink stream
/// 4. Association down, context and timers released
#[tokio::test]
async fn test_e2e_drx_exchange_and_release() {
    init_test_logging();

    let mut node = MmeNode::init(&test_mme_config()).expect("node init");
    let mut transport = node.take_transport().expect("transport link");
    let bus = node.start().await.expect("node start");

    for (_, name, state) in node.status_summary() {
        assert_eq!(state, TaskState::Running, "{name} not running");
    }

    tracing::info!("[ENB] association 7 up");
    transport
        .association_up(7, 32, 32)
        .await
        .expect("transport open");

    let drx = DrxParameter::new(0x0A, 6, true, 0);
    let mut uplink = [0u8; DrxParameter::MAX_LENGTH];
    let len = drx.encode(DRX_PARAMETER_IEI, &mut uplink).expect("encode DRX");
    tracing::info!("[ENB] uplink DRX parameter on stream 2");
    transport
        .data_received(7, 2, Bytes::copy_from_slice(&uplink[..len]))
        .await
        .expect("transport open");

    let pdu = timeout(DEFAULT_TEST_TIMEOUT, transport.recv_outbound())
        .await
        .expect("downlink in time")
        .expect("SCTP task running");
    assert_eq!(pdu.association_id, 7);
    assert_eq!(pdu.stream, 2);
    let t3412 = GprsTimer::decode(T3412_VALUE_IEI, &pdu.data).expect("decode T3412");
    assert_eq!(t3412.duration(), Some(Duration::from_secs(30 * 60)));

    // Only the periodic update timer remains
    assert_eq!(bus.timers().active_count(), 1);

    tracing::info!("[ENB] association 7 down");
    transport
        .association_down(7)
        .await
        .expect("transport open");
    wait_for_condition(
        || async { bus.timers().active_count() == 0 && node.sctp_stats().associations() == 0 },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await
    .expect("context released");

    node.shutdown().await.expect("shutdown");
    for (_, name, state) in node.status_summary() {
        assert_eq!(state, TaskState::Terminated, "{name} not terminated");
    }
    assert!(transport.recv_outbound().await.is_none());
}
