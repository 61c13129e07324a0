//! Live stream sessions fed by the lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use crew_core::domains::events::{ALL_CHANNELS, GROUP_CREATED, JOIN_REQUEST_CREATED, JOIN_REQUEST_UPDATED};
use crew_core::domains::join_requests::actions::{decide, scan};
use crew_core::domains::join_requests::Decision;
use crew_core::kernel::stream_session::{Frame, CONNECTED_EVENT, HEARTBEAT_EVENT};
use crew_core::kernel::test_dependencies::RecordingTransport;
use crew_core::kernel::{SessionConfig, StreamSession};

fn event_names(frames: &[Frame]) -> Vec<&str> {
    frames
        .iter()
        .map(|f| f.event.as_str())
        .filter(|e| *e != HEARTBEAT_EVENT)
        .collect()
}

#[tokio::test]
async fn every_session_sees_events_in_publish_order() {
    let harness = TestHarness::new();
    let sessions: Vec<_> = (0..3).map(|_| harness.open_session()).collect();
    for (_, transport) in &sessions {
        transport.wait_for_frames(1).await;
    }

    // The request references a group that does not exist yet
    submit_request(&harness.deps, MEMBER).await;
    create_test_group(&harness.deps).await;

    for (_, transport) in &sessions {
        let frames = transport.wait_for_frames(3).await;
        assert_eq!(
            event_names(&frames),
            vec![CONNECTED_EVENT, JOIN_REQUEST_CREATED, GROUP_CREATED]
        );
        assert_eq!(frames[1].data["memberEmail"], MEMBER);
        assert_eq!(frames[1].data["status"], "pending");
        assert_eq!(frames[2].data["name"], GROUP);
    }
}

#[tokio::test]
async fn updates_carry_the_full_record() {
    let harness = TestHarness::new();
    create_test_group(&harness.deps).await;
    let request = submit_request(&harness.deps, MEMBER).await;
    let (_session, transport) = harness.open_session();
    transport.wait_for_frames(1).await;

    decide(request.id, Decision::Accepted, OWNER, &harness.deps)
        .await
        .unwrap();
    scan(EVENT, GROUP, MEMBER, OWNER, &harness.deps).await.unwrap();

    let frames = transport.wait_for_frames(4).await;
    let updates: Vec<&Frame> = frames
        .iter()
        .filter(|f| f.event == JOIN_REQUEST_UPDATED)
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].data["status"], "accepted");
    assert_eq!(updates[0].data["payoutReleased"], false);
    assert_eq!(updates[1].data["payoutReleased"], true);
    assert!(!updates[1].data["scannedAt"].is_null());
}

#[tokio::test]
async fn repeated_scan_is_not_broadcast_again() {
    let harness = TestHarness::new();
    create_test_group(&harness.deps).await;
    accepted_request(&harness.deps, MEMBER).await;
    let (_session, transport) = harness.open_session();
    transport.wait_for_frames(1).await;

    scan(EVENT, GROUP, MEMBER, OWNER, &harness.deps).await.unwrap();
    scan(EVENT, GROUP, MEMBER, OWNER, &harness.deps).await.unwrap();
    // A later event to know the stream has caught up
    submit_request(&harness.deps, "late@x.com").await;

    let frames = transport.wait_for_frames(3).await;
    assert_eq!(
        event_names(&frames),
        vec![CONNECTED_EVENT, JOIN_REQUEST_UPDATED, JOIN_REQUEST_CREATED]
    );
}

#[tokio::test]
async fn failed_session_is_closed_without_affecting_others() {
    let harness = TestHarness::new();
    let broken = Arc::new(RecordingTransport::failing_after(1));
    let broken_session = StreamSession::open(
        &harness.deps.bus,
        &ALL_CHANNELS,
        broken.clone(),
        SessionConfig::default(),
    );
    let (_healthy_session, healthy) = harness.open_session();
    broken.wait_for_frames(1).await;
    healthy.wait_for_frames(1).await;

    submit_request(&harness.deps, MEMBER).await;

    tokio::time::timeout(Duration::from_secs(2), broken_session.closed())
        .await
        .expect("broken session closed");
    assert!(broken_session.is_closed());
    assert_eq!(broken.close_calls(), 1);

    create_test_group(&harness.deps).await;
    let frames = healthy.wait_for_frames(3).await;
    assert_eq!(
        event_names(&frames),
        vec![CONNECTED_EVENT, JOIN_REQUEST_CREATED, GROUP_CREATED]
    );
}

#[tokio::test]
async fn closed_session_stops_receiving() {
    let harness = TestHarness::new();
    let (session, transport) = harness.open_session();
    transport.wait_for_frames(1).await;

    session.close();
    session.close();
    submit_request(&harness.deps, MEMBER).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(event_names(&transport.frames()), vec![CONNECTED_EVENT]);
    assert_eq!(transport.close_calls(), 1);
    assert_eq!(harness.deps.bus.subscriber_count(JOIN_REQUEST_CREATED), 0);
}
