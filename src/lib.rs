//! # Exquisite Client
//!
//! Session and turn synchronization core for a two-player "exquisite corpse"
//! drawing game. Two participants draw a figure in four segments (Head,
//! Torso, Legs, Feet), taking strict turns and seeing only a thin strip of
//! the previous segment above a hand-off marker.
//!
//! The crate is transport-agnostic and render-agnostic:
//!
//! - **Session control**: [`SessionController`] keeps one transport alive,
//!   resumes a persisted identity after disconnects and gives up after a
//!   bounded number of attempts
//! - **Turn state**: [`TurnStateMachine`] models each segment as a single
//!   [`SegmentPhase`]
//! - **Stroke history**: [`StrokeHistory`] records vector strokes and replays
//!   them onto any [`Surface`] for undo and redo
//! - **Normalization**: [`normalize`] converts hand-off markers between local
//!   and canonical coordinates
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exquisite_client::{FileStore, SessionConfig, SessionController, SessionEvent, WebSocketConnector};
//!
//! let store = FileStore::open("identity.json")?;
//! let (controller, mut events) =
//!     SessionController::start(WebSocketConnector::new("ws://localhost:8080"), store, SessionConfig::default());
//! controller.join("K7QX").await?;
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::StateUpdated(turn) = event {
//!         println!("{} on segment {}", turn.phase, turn.segment_index);
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod history;
#[cfg(feature = "lobby-api")]
pub mod lobby;
pub mod normalize;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod transports;
pub mod turn;

// Re-export primary types for ergonomic imports.
pub use client::{SessionConfig, SessionController};
pub use error::SessionError;
pub use event::SessionEvent;
pub use history::{DecodeTicket, RasterDecoder, Stroke, StrokeHistory, StrokeStyle, Surface};
pub use normalize::{Point, SurfaceSize, CANONICAL_SURFACE};
pub use protocol::{ClientMessage, RasterPayload, ServerMessage};
pub use session::{CloseReason, ConnectionState, Session};
pub use store::{FileStore, KeyValueStore, MemoryStore, PersistedIdentity};
pub use transport::{Connector, Transport};
pub use turn::{DrawingFinished, Segment, SegmentPhase, TurnSnapshot, TurnStateMachine, TOTAL_SEGMENTS};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
