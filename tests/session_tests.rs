#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the session controller driven through mock transports.

mod common;

use std::time::Duration;

use common::{fast_config, joined_push, turn_push, wait_for, MockConnector, SharedStore};
use exquisite_client::turn::DrawingFinished;
use exquisite_client::{ConnectionState, RasterPayload, SegmentPhase, SessionController, SessionError, SessionEvent};
use serde_json::json;

fn drawing_at(segment: usize) -> impl FnMut(&SessionEvent) -> bool {
    move |e| matches!(e, SessionEvent::StateUpdated(t) if t.phase == SegmentPhase::Drawing && t.segment_index == segment)
}

#[tokio::test]
async fn join_sends_join_game_and_resumes_after_drop() {
    let connector = MockConnector::new();
    let mut first = connector.accept();
    let mut second = connector.accept();
    let (controller, mut events) = SessionController::start(connector.clone(), SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    let hello = first.next_sent().await;
    assert_eq!(hello, json!({"type": "joinGame", "gameCode": "ABCD", "playerId": null}));

    first.push(joined_push("p-1", "ABCD", 1, 0, false));
    wait_for(&mut events, |e| matches!(e, SessionEvent::StateUpdated(_))).await;
    first.hang_up();

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    assert_eq!(event, SessionEvent::Reconnecting { attempt: 1, max: 5 });

    let resume = second.next_sent().await;
    assert_eq!(resume, json!({"type": "reconnectGame", "gameCode": "ABCD", "playerId": "p-1"}));
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn second_connection_is_rejected_while_open() {
    let connector = MockConnector::new();
    let _server = connector.accept();
    let (controller, _events) = SessionController::start(connector.clone(), SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    let err = controller.join("ABCD").await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyConnected("open")));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(controller.connection_state().await, ConnectionState::Open);
}

#[tokio::test]
async fn handoff_marker_is_sent_in_canonical_units() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector, SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push(joined_push("p-1", "ABCD", 2, 0, true));
    wait_for(&mut events, drawing_at(0)).await;

    let finished = controller.done_drawing(true).await.unwrap();
    assert!(matches!(finished, DrawingFinished::PlacingHandoff { .. }));
    assert_eq!(controller.snapshot().await.phase, SegmentPhase::PlacingHandoff);

    controller.drag_handoff(300.0, 600.0).await.unwrap();
    controller
        .submit_segment(RasterPayload::new("data:image/png;base64,SEG0"), true)
        .await
        .unwrap();

    let submit = server.next_sent().await;
    assert_eq!(submit["type"], "submitSegment");
    assert_eq!(submit["gameRoomId"], "room-1");
    assert_eq!(submit["playerId"], "p-1");
    assert_eq!(submit["currentSegmentIndex"], 0);
    assert_eq!(submit["canvasData"], "data:image/png;base64,SEG0");
    let red = submit["redLineY"].as_f64().unwrap();
    assert!((red - 960.0).abs() < 1e-6);
    assert_eq!(controller.snapshot().await.phase, SegmentPhase::WaitingForPeer);
}

#[tokio::test]
async fn final_segment_submits_without_handoff() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector, SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push(joined_push("p-2", "ABCD", 2, 3, true));
    wait_for(&mut events, drawing_at(3)).await;

    assert_eq!(controller.done_drawing(true).await.unwrap(), DrawingFinished::ReadyToSubmit);
    assert_eq!(controller.snapshot().await.phase, SegmentPhase::Drawing);

    controller.submit_segment(RasterPayload::new("data:feet"), true).await.unwrap();
    let submit = server.next_sent().await;
    assert!(submit["redLineY"].is_null());
    assert_eq!(submit["currentSegmentIndex"], 3);
}

#[tokio::test]
async fn resubmission_fails_without_touching_the_network() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector, SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push(joined_push("p-2", "ABCD", 2, 3, true));
    wait_for(&mut events, drawing_at(3)).await;

    controller.submit_segment(RasterPayload::new("data:feet"), true).await.unwrap();
    server.next_sent().await;

    let err = controller
        .submit_segment(RasterPayload::new("data:feet"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server.drain_sent().is_empty());
}

#[tokio::test]
async fn completion_after_resume_clears_identity() {
    let store = SharedStore::default();
    let connector = MockConnector::new();
    let mut first = connector.accept();
    let mut second = connector.accept();
    let (controller, mut events) = SessionController::start(connector, store.clone(), fast_config());

    controller.join("ABCD").await.unwrap();
    first.next_sent().await;
    first.push(joined_push("p-1", "ABCD", 2, 3, false));
    wait_for(
        &mut events,
        |e| matches!(e, SessionEvent::StateUpdated(t) if t.phase == SegmentPhase::WaitingForPeer),
    )
    .await;
    assert_eq!(store.player_id().as_deref(), Some("p-1"));

    first.fail("connection reset");
    let resume = second.next_sent().await;
    assert_eq!(resume["type"], "reconnectGame");
    assert_eq!(resume["playerId"], "p-1");

    second.push(
        json!({
            "type": "reconnected",
            "status": "completed",
            "playerCount": 2,
            "currentSegmentIndex": 3,
            "finalArtwork1": "data:first",
            "finalArtwork2": "data:second",
        })
        .to_string(),
    );
    let done = wait_for(&mut events, |e| matches!(e, SessionEvent::Completed { .. })).await;
    assert_eq!(
        done,
        SessionEvent::Completed {
            final_artworks: vec![RasterPayload::new("data:first"), RasterPayload::new("data:second")]
        }
    );
    assert!(controller.snapshot().await.is_game_over());
    assert_eq!(store.player_id(), None);
    assert_eq!(store.game_code(), None);
}

#[tokio::test]
async fn game_over_past_last_segment_completes() {
    let store = SharedStore::default();
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector, store.clone(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push(joined_push("p-1", "ABCD", 2, 3, false));
    wait_for(
        &mut events,
        |e| matches!(e, SessionEvent::StateUpdated(t) if t.phase == SegmentPhase::WaitingForPeer),
    )
    .await;

    server.push(
        json!({
            "type": "gameOver",
            "status": "completed",
            "playerCount": 2,
            "currentSegmentIndex": 4,
            "finalArtwork1": "data:first",
            "finalArtwork2": "data:second",
        })
        .to_string(),
    );
    let done = wait_for(&mut events, |e| matches!(e, SessionEvent::Completed { .. })).await;
    assert_eq!(
        done,
        SessionEvent::Completed {
            final_artworks: vec![RasterPayload::new("data:first"), RasterPayload::new("data:second")]
        }
    );
    let snap = controller.snapshot().await;
    assert!(snap.is_game_over());
    assert_eq!(snap.segment_index, 3);
    assert_eq!(store.player_id(), None);
    assert_eq!(store.game_code(), None);
}

#[tokio::test]
async fn reconnect_cap_gives_up() {
    let store = SharedStore::default();
    let connector = MockConnector::new();
    let mut server = connector.accept();
    connector.refuse("down");
    connector.refuse("still down");
    let config = fast_config().with_max_reconnect_attempts(3);
    let (controller, mut events) = SessionController::start(connector.clone(), store.clone(), config);

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.hang_up();

    let gave_up = wait_for(&mut events, |e| matches!(e, SessionEvent::GaveUp { .. })).await;
    assert!(matches!(gave_up, SessionEvent::GaveUp { reason } if reason.contains("Maximum reconnect attempts")));
    assert_eq!(controller.connection_state().await, ConnectionState::Failed);
    assert_eq!(store.game_code(), None);
    assert_eq!(connector.attempts(), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn leave_cancels_pending_reconnect() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let config = fast_config().with_reconnect_delay(Duration::from_millis(100));
    let (controller, mut events) = SessionController::start(connector.clone(), SharedStore::default(), config);

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.hang_up();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;

    controller.leave().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(controller.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn intentional_leave_closes_without_reconnecting() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector.clone(), SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    controller.leave().await.unwrap();

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    assert_eq!(event, SessionEvent::Disconnected { reason: None });
    assert!(server.is_closed());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn foreground_reconnects_immediately() {
    let connector = MockConnector::new();
    let mut first = connector.accept();
    let config = fast_config().with_reconnect_delay(Duration::from_secs(30));
    let (controller, mut events) = SessionController::start(connector.clone(), SharedStore::default(), config);

    controller.join("ABCD").await.unwrap();
    first.next_sent().await;
    first.hang_up();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;

    let mut second = connector.accept();
    controller.notify_foregrounded().unwrap();
    let hello = second.next_sent().await;
    assert_eq!(hello["type"], "joinGame");
    assert_eq!(controller.connection_state().await, ConnectionState::Open);
}

#[tokio::test]
async fn stored_identity_is_resumed_on_start() {
    let store = SharedStore::with_identity("WXYZ", "p-9");
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (_controller, mut events) = SessionController::start(connector, store.clone(), fast_config());

    let resume = server.next_sent().await;
    assert_eq!(resume, json!({"type": "reconnectGame", "gameCode": "WXYZ", "playerId": "p-9"}));

    server.push(r#"{"type":"reconnectFailed","message":"Game not found."}"#);
    let failed = wait_for(&mut events, |e| matches!(e, SessionEvent::ResumeFailed { .. })).await;
    assert_eq!(
        failed,
        SessionEvent::ResumeFailed {
            reason: "Game not found.".into()
        }
    );
    wait_for(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    assert!(server.is_closed());
    assert_eq!(store.player_id(), None);
    assert_eq!(store.game_code(), None);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector, SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push("{ definitely not json");
    server.push(r#"{"type":"teleport","playerCount":2}"#);
    server.push(turn_push("gameStarted", 2, 1, true));

    wait_for(&mut events, drawing_at(1)).await;
    assert_eq!(controller.connection_state().await, ConnectionState::Open);
}

#[tokio::test]
async fn segment_start_carries_prior_artifact() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector, SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push(turn_push("gameStarted", 2, 0, false));
    wait_for(&mut events, |e| matches!(e, SessionEvent::SegmentStarted { segment_index: 0, .. })).await;

    server.push(
        json!({
            "type": "segmentSubmitted",
            "playerCount": 2,
            "currentSegmentIndex": 1,
            "canDraw": true,
            "isWaitingForOthers": false,
            "canvasData": "data:head",
            "previousRedLineY": 1200.0,
        })
        .to_string(),
    );
    let started = wait_for(&mut events, |e| matches!(e, SessionEvent::SegmentStarted { segment_index: 1, .. })).await;
    assert_eq!(
        started,
        SessionEvent::SegmentStarted {
            segment_index: 1,
            prior_artifact: Some(RasterPayload::new("data:head")),
            prior_handoff_y: Some(1200.0),
        }
    );
    assert_eq!(controller.prior_artifact().await, Some(RasterPayload::new("data:head")));
}

#[tokio::test]
async fn permanent_peer_loss_ends_the_session() {
    let store = SharedStore::default();
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (controller, mut events) = SessionController::start(connector.clone(), store.clone(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    server.push(joined_push("p-1", "ABCD", 2, 0, true));
    server.push(r#"{"type":"playerPermanentlyDisconnected","playerCount":1,"message":"Your partner left."}"#);

    wait_for(&mut events, |e| *e == SessionEvent::PeerDisconnected { permanent: true }).await;
    wait_for(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    assert!(server.is_closed());
    assert_eq!(store.player_id(), None);
    assert_eq!(controller.status().await, "Your partner left.");
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn shutdown_closes_transport_and_ends_events() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let (mut controller, mut events) = SessionController::start(connector, SharedStore::default(), fast_config());

    controller.join("ABCD").await.unwrap();
    server.next_sent().await;
    controller.shutdown().await;

    assert!(server.is_closed());
    let mut saw_disconnect = false;
    while let Some(event) = events.recv().await {
        if let SessionEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);
    assert!(matches!(controller.leave().await, Err(SessionError::NotConnected)));
}
