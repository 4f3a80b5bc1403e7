//! # Loopback Session Example
//!
//! Plays a full four-segment game against an in-process referee that also
//! draws the partner's segments. Shows how to:
//!
//! - implement [`Transport`] and [`Connector`] over channels
//! - keep a [`StrokeHistory`] in step with [`SessionEvent::SegmentStarted`]
//! - finish a segment, place the hand-off marker and submit
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_session
//! ```

use std::time::Duration;

use async_trait::async_trait;
use exquisite_client::history::DecodedBase;
use exquisite_client::turn::DrawingFinished;
use exquisite_client::{
    Connector, MemoryStore, Point, RasterDecoder, RasterPayload, SegmentPhase, SessionConfig, SessionController,
    SessionError, SessionEvent, Stroke, StrokeHistory, StrokeStyle, Surface, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Height of the pretend on-screen canvas.
const LOCAL_HEIGHT: f64 = 960.0;

// ── Loopback transport ──────────────────────────────────────────────

struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        self.tx.send(message).map_err(|_| SessionError::TransportClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.rx.close();
        Ok(())
    }
}

/// Starts a fresh referee for every connection.
struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self) -> Result<LoopbackTransport, SessionError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(referee(server_rx, server_tx));
        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

// ── Referee ─────────────────────────────────────────────────────────

/// Plays the server and the partner: we draw even segments, it draws odd.
async fn referee(mut inbox: mpsc::UnboundedReceiver<String>, outbox: mpsc::UnboundedSender<String>) {
    let send = |value: Value| {
        let _ = outbox.send(value.to_string());
    };

    while let Some(frame) = inbox.recv().await {
        let Ok(msg) = serde_json::from_str::<Value>(&frame) else {
            continue;
        };
        match msg["type"].as_str() {
            Some("joinGame" | "reconnectGame") => send(json!({
                "type": "gameJoined",
                "playerId": "demo-player",
                "gameCode": msg["gameCode"],
                "gameRoomId": "loopback",
                "playerCount": 2,
                "currentSegmentIndex": 0,
                "canDraw": true,
                "isWaitingForOthers": false,
                "message": "Partner found. Draw the head!",
            })),
            Some("submitSegment") => {
                let index = msg["currentSegmentIndex"]
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .unwrap_or(0);
                let partner_segment = index + 1;
                send(json!({
                    "type": "segmentSubmitted",
                    "playerCount": 2,
                    "currentSegmentIndex": partner_segment,
                    "canDraw": false,
                    "isWaitingForOthers": true,
                    "message": "Your partner is drawing...",
                }));

                tokio::time::sleep(Duration::from_millis(200)).await;
                if partner_segment + 1 >= exquisite_client::TOTAL_SEGMENTS {
                    send(json!({
                        "type": "gameOver",
                        "status": "completed",
                        "finalArtwork1": "data:demo-figure-1",
                        "finalArtwork2": "data:demo-figure-2",
                        "message": "All four segments are done!",
                    }));
                } else {
                    send(json!({
                        "type": "segmentSubmitted",
                        "playerCount": 2,
                        "currentSegmentIndex": partner_segment + 1,
                        "canDraw": true,
                        "isWaitingForOthers": false,
                        "canvasData": format!("data:partner-segment-{partner_segment}"),
                        "previousRedLineY": msg["redLineY"].as_f64().unwrap_or(1400.0),
                        "message": "Your turn!",
                    }));
                }
            }
            _ => {}
        }
    }
}

// ── Canvas stand-ins ────────────────────────────────────────────────

#[derive(Default)]
struct TextSurface {
    base: Option<String>,
    strokes: usize,
}

impl Surface for TextSurface {
    type Image = String;

    fn clear(&mut self) {
        self.base = None;
        self.strokes = 0;
    }

    fn draw_image(&mut self, image: &String) {
        self.base = Some(image.clone());
    }

    fn draw_stroke(&mut self, _stroke: &Stroke) {
        self.strokes += 1;
    }
}

struct TextDecoder;

#[async_trait]
impl RasterDecoder for TextDecoder {
    type Image = String;

    async fn decode(&self, payload: &RasterPayload) -> Result<String, SessionError> {
        Ok(format!("<{}>", payload.as_str()))
    }
}

/// Scribble one zig-zag stroke.
fn scribble(history: &mut StrokeHistory<String>, surface: &mut TextSurface, phase: SegmentPhase) {
    if !history.begin_stroke(phase, Point::new(100.0, 100.0), StrokeStyle::default()) {
        return;
    }
    for step in 1..=4 {
        let x = 100.0 + f64::from(step) * 50.0;
        let y = if step % 2 == 0 { 100.0 } else { 160.0 };
        if let Some(segment) = history.extend_stroke(Point::new(x, y)) {
            tracing::trace!(?segment, "line segment");
        }
    }
    history.commit_stroke();
    history.replay(surface);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = SessionConfig::new().with_reconnect_delay(Duration::from_millis(200));
    let (mut controller, mut events) = SessionController::start(LoopbackConnector, MemoryStore::new(), config);
    controller.join("LOOP").await?;

    let mut history: StrokeHistory<String> = StrokeHistory::new();
    let mut surface = TextSurface::default();
    let mut drawn_segment: Option<usize> = None;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Status(text) => tracing::info!("status: {text}"),
            SessionEvent::SegmentStarted {
                segment_index,
                prior_artifact,
                prior_handoff_y,
            } => {
                tracing::info!(segment_index, ?prior_handoff_y, "segment started");
                surface.clear();
                if let Some(ticket) = history.reset(prior_artifact) {
                    let decoded: DecodedBase<String> = ticket.decode(&TextDecoder).await?;
                    history.install_base(decoded, &mut surface);
                }
            }
            SessionEvent::StateUpdated(turn) if turn.can_draw() && drawn_segment != Some(turn.segment_index) => {
                drawn_segment = Some(turn.segment_index);
                scribble(&mut history, &mut surface, turn.phase);
                tracing::info!(
                    segment = ?turn.segment(),
                    strokes = surface.strokes,
                    base = ?surface.base,
                    "drew segment"
                );

                if let DrawingFinished::PlacingHandoff { marker_y } = controller.done_drawing(history.has_drawn()).await? {
                    tracing::info!(marker_y, "hand-off marker placed");
                    let canonical = controller.drag_handoff(LOCAL_HEIGHT * 0.7, LOCAL_HEIGHT).await?;
                    tracing::info!(canonical, "hand-off marker dragged");
                }
                let canvas = RasterPayload::new(format!("data:demo-segment-{}", turn.segment_index));
                controller.submit_segment(canvas, history.has_drawn()).await?;
            }
            SessionEvent::Completed { final_artworks } => {
                for (i, art) in final_artworks.iter().enumerate() {
                    tracing::info!("artwork {}: {}", i + 1, art.as_str());
                }
                break;
            }
            SessionEvent::GaveUp { reason } | SessionEvent::ResumeFailed { reason } => {
                tracing::warn!("session ended: {reason}");
                break;
            }
            _ => {}
        }
    }

    controller.shutdown().await;
    Ok(())
}
