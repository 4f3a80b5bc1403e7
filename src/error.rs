//! Error types for the exquisite-corpse session client.

use thiserror::Error;

use crate::turn::SegmentPhase;

/// Errors that can occur while driving a drawing session.
///
/// Every variant is recoverable: transport failures lead to a reconnection
/// attempt, everything else leaves the session in a known-safe state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// An operation requires a live transport but none is open.
    #[error("not connected to game server")]
    NotConnected,

    /// A connection attempt was requested while one is already connecting or open.
    #[error("a connection is already {0}")]
    AlreadyConnected(&'static str),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound message was well-formed JSON but made no sense in context.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote counterpart refused to resume the persisted identity.
    #[error("resume failed: {reason}")]
    ResumeFailed {
        /// Reason reported by the remote counterpart.
        reason: String,
    },

    /// Coordinate normalization was requested before the surface was measured.
    #[error("surface dimensions are not available yet")]
    DimensionUnavailable,

    /// An action was requested in a phase that does not permit it.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        /// The rejected action.
        action: &'static str,
        /// The phase the turn state machine was in.
        phase: SegmentPhase,
    },

    /// An operation needs a joined game but there is none.
    #[error("no active game session")]
    NoActiveSession,

    /// The durable key-value store failed.
    #[error("identity store error: {0}")]
    Store(String),

    /// The lobby HTTP API failed.
    #[cfg(feature = "lobby-api")]
    #[error("lobby request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Returns `true` for failures of the connection itself, which the
    /// controller recovers from by reconnecting.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportSend(_)
                | Self::TransportReceive(_)
                | Self::TransportClosed
                | Self::NotConnected
                | Self::Timeout
                | Self::Io(_)
        )
    }
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
