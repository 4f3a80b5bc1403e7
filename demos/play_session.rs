//! # Play Session Example
//!
//! Connects to a real game server over WebSocket and plays as a bot: every
//! time it is our turn it "draws" a placeholder segment, places the hand-off
//! marker two thirds down and submits.
//!
//! The identity is kept in `exquisite-identity.json`, so killing and
//! restarting the example resumes the same seat.
//!
//! ## Running
//!
//! ```sh
//! # Create a new game through the lobby API and join it:
//! cargo run --example play_session
//!
//! # Join an existing game:
//! EXQUISITE_GAME_CODE=K7QX cargo run --example play_session
//!
//! # Override the server URL:
//! EXQUISITE_URL=wss://draw.example.com cargo run --example play_session
//! ```

use exquisite_client::turn::DrawingFinished;
use exquisite_client::{
    FileStore, PersistedIdentity, RasterPayload, SessionConfig, SessionController, SessionEvent, WebSocketConnector,
};

/// Default server URL when `EXQUISITE_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080";

/// Where the resumable identity lives between runs.
const IDENTITY_FILE: &str = "exquisite-identity.json";

/// Surface height we pretend to draw on.
const LOCAL_HEIGHT: f64 = 1280.0;

async fn game_code(url: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
    if let Ok(code) = std::env::var("EXQUISITE_GAME_CODE") {
        return Ok(Some(code));
    }
    #[cfg(feature = "lobby-api")]
    {
        let base = exquisite_client::lobby::http_base_from_ws(url);
        let code = exquisite_client::lobby::create_game(&reqwest::Client::new(), &base).await?;
        tracing::info!("created game {code}; share it with your partner");
        Ok(Some(code))
    }
    #[cfg(not(feature = "lobby-api"))]
    {
        let _ = url;
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("EXQUISITE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let store = FileStore::open(IDENTITY_FILE)?;
    let resuming = PersistedIdentity::load(&store)?.game_code.is_some();

    let (mut controller, mut events) =
        SessionController::start(WebSocketConnector::new(url.clone()), store, SessionConfig::default());

    if resuming {
        tracing::info!("resuming the game stored in {IDENTITY_FILE}");
    } else {
        match game_code(&url).await? {
            Some(code) => controller.join(code).await?,
            None => {
                tracing::error!("set EXQUISITE_GAME_CODE or enable the lobby-api feature");
                controller.shutdown().await;
                return Ok(());
            }
        }
    }

    // ── Event loop ──────────────────────────────────────────────────
    let mut submitted: Option<usize> = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Connected => tracing::info!("connected"),
                    SessionEvent::Status(text) => tracing::info!("status: {text}"),
                    SessionEvent::GameCodeAssigned(code) => tracing::info!("game code: {code}"),
                    SessionEvent::Reconnecting { attempt, max } => {
                        tracing::warn!("reconnecting ({attempt}/{max})");
                    }
                    SessionEvent::SegmentStarted { segment_index, prior_artifact, .. } => {
                        tracing::info!(
                            segment_index,
                            has_prior = prior_artifact.is_some(),
                            "segment started"
                        );
                    }
                    SessionEvent::StateUpdated(turn) if turn.can_draw() && submitted != Some(turn.segment_index) => {
                        submitted = Some(turn.segment_index);
                        tracing::info!("drawing the {:?}", turn.segment());
                        if let DrawingFinished::PlacingHandoff { .. } = controller.done_drawing(true).await? {
                            controller.drag_handoff(LOCAL_HEIGHT * 2.0 / 3.0, LOCAL_HEIGHT).await?;
                        }
                        let canvas = RasterPayload::new(format!("data:bot-segment-{}", turn.segment_index));
                        if let Err(e) = controller.submit_segment(canvas, true).await {
                            tracing::warn!("submit failed, will retry on resync: {e}");
                            submitted = None;
                        }
                    }
                    SessionEvent::PeerDisconnected { permanent } => {
                        tracing::warn!(permanent, "partner disconnected");
                    }
                    SessionEvent::Completed { final_artworks } => {
                        tracing::info!("game complete with {} artworks", final_artworks.len());
                        break;
                    }
                    SessionEvent::ResumeFailed { reason } | SessionEvent::GaveUp { reason } => {
                        tracing::warn!("session ended: {reason}");
                        break;
                    }
                    SessionEvent::Disconnected { reason } => {
                        tracing::info!(?reason, "disconnected");
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
