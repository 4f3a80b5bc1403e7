//! Events emitted to the consumer of a drawing session.

use crate::protocol::RasterPayload;
use crate::turn::TurnSnapshot;

/// High-level events produced by the session as the game progresses.
///
/// Delivered over the bounded channel returned from
/// [`SessionController::start`](crate::client::SessionController::start).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A transport opened and the join or resume request was sent.
    Connected,

    /// An unexpected close scheduled reconnection attempt `attempt` of `max`.
    Reconnecting { attempt: u32, max: u32 },

    /// Human-readable status text for display.
    Status(String),

    /// The server assigned a game code for a newly created game.
    GameCodeAssigned(String),

    /// Turn state changed.
    StateUpdated(TurnSnapshot),

    /// A new segment began, or the current one must be re-seeded after a
    /// resume. The consumer resets its stroke history with `prior_artifact`.
    SegmentStarted {
        segment_index: usize,
        prior_artifact: Option<RasterPayload>,
        /// Peek boundary in canonical units.
        prior_handoff_y: Option<f64>,
    },

    /// Every segment is done. Persisted identity has been cleared.
    Completed { final_artworks: Vec<RasterPayload> },

    /// The other participant dropped.
    PeerDisconnected { permanent: bool },

    /// The server refused to resume the persisted identity; back to the lobby.
    ResumeFailed { reason: String },

    /// Reconnection attempts are exhausted.
    GaveUp { reason: String },

    /// The transport closed and no reconnection will follow.
    Disconnected { reason: Option<String> },
}
