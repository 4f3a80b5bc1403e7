#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the session integration tests.
//!
//! Provides a channel-backed [`MockTransport`], a [`MockConnector`] that hands
//! out scripted connection outcomes, a cloneable [`SharedStore`] and helpers
//! for building server pushes.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use exquisite_client::store::{GAME_CODE_KEY, PLAYER_ID_KEY};
use exquisite_client::{Connector, KeyValueStore, MemoryStore, SessionConfig, SessionError, SessionEvent, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// How long a test waits for anything before failing.
pub const PATIENCE: Duration = Duration::from_secs(2);

// ── MockTransport ───────────────────────────────────────────────────

type Incoming = Option<Result<String, SessionError>>;

/// Client side of a scripted connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Test side of a scripted connection.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<Incoming>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

/// A connected transport and the handle that drives it.
pub fn mock_pair() -> (MockTransport, ServerEnd) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (sent, from_client) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            incoming,
            sent,
            closed: Arc::clone(&closed),
        },
        ServerEnd {
            to_client,
            from_client,
            closed,
        },
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::TransportClosed);
        }
        let _ = self.sent.send(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Test dropped its end; stay quiet until shutdown.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl ServerEnd {
    /// Deliver a JSON text frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        self.to_client.send(Some(Ok(frame.into()))).unwrap();
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        self.to_client.send(None).unwrap();
    }

    /// Fail the connection with a receive error.
    pub fn fail(&self, reason: &str) {
        self.to_client
            .send(Some(Err(SessionError::TransportReceive(reason.to_owned()))))
            .unwrap();
    }

    /// Next frame the client sent, parsed as JSON.
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(PATIENCE, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side dropped");
        serde_json::from_str(&text).unwrap()
    }

    /// Frames sent so far that have not been read.
    pub fn drain_sent(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

enum Plan {
    Accept(MockTransport),
    Refuse(String),
}

/// Connector whose attempts succeed or fail in a scripted order.
///
/// Attempts past the end of the script are refused.
#[derive(Clone, Default)]
pub struct MockConnector {
    plans: Arc<StdMutex<VecDeque<Plan>>>,
    attempts: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next attempt to succeed; returns the server side.
    pub fn accept(&self) -> ServerEnd {
        let (transport, server) = mock_pair();
        self.plans.lock().unwrap().push_back(Plan::Accept(transport));
        server
    }

    /// Script the next attempt to fail.
    pub fn refuse(&self, reason: &str) {
        self.plans.lock().unwrap().push_back(Plan::Refuse(reason.to_owned()));
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport, SessionError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        let plan = self.plans.lock().unwrap().pop_front();
        match plan {
            Some(Plan::Accept(transport)) => Ok(transport),
            Some(Plan::Refuse(reason)) => Err(SessionError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, reason))),
            None => Err(SessionError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no server scripted",
            ))),
        }
    }
}

// ── SharedStore ─────────────────────────────────────────────────────

/// A [`MemoryStore`] the test can inspect after handing it to a controller.
#[derive(Clone, Default)]
pub struct SharedStore(Arc<StdMutex<MemoryStore>>);

impl SharedStore {
    pub fn with_identity(game_code: &str, player_id: &str) -> Self {
        let store = Self::default();
        let mut inner = store.0.lock().unwrap();
        inner.set(GAME_CODE_KEY, game_code).unwrap();
        inner.set(PLAYER_ID_KEY, player_id).unwrap();
        drop(inner);
        store
    }

    pub fn player_id(&self) -> Option<String> {
        self.0.lock().unwrap().get(PLAYER_ID_KEY).unwrap()
    }

    pub fn game_code(&self) -> Option<String> {
        self.0.lock().unwrap().get(GAME_CODE_KEY).unwrap()
    }
}

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        self.0.lock().unwrap().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.0.lock().unwrap().set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        self.0.lock().unwrap().remove(key)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Config with short timers so reconnection tests run quickly.
pub fn fast_config() -> SessionConfig {
    SessionConfig::new()
        .with_reconnect_delay(Duration::from_millis(20))
        .with_connect_timeout(Duration::from_millis(500))
}

/// Wait for the first event satisfying `pred`, discarding the others.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(PATIENCE, async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("event channel closed while waiting");
    })
    .await
    .expect("timed out waiting for event")
}

/// A turn-bearing state push.
pub fn turn_push(kind: &str, player_count: u8, segment: usize, can_draw: bool) -> String {
    json!({
        "type": kind,
        "playerCount": player_count,
        "currentSegmentIndex": segment,
        "canDraw": can_draw,
        "isWaitingForOthers": !can_draw,
    })
    .to_string()
}

/// A push that assigns identity and turn state.
pub fn joined_push(player_id: &str, game_code: &str, player_count: u8, segment: usize, can_draw: bool) -> String {
    json!({
        "type": "gameJoined",
        "playerId": player_id,
        "gameCode": game_code,
        "gameRoomId": "room-1",
        "playerCount": player_count,
        "currentSegmentIndex": segment,
        "canDraw": can_draw,
        "isWaitingForOthers": !can_draw,
    })
    .to_string()
}
