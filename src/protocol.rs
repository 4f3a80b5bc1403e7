//! Wire-compatible protocol types for the drawing-game server.
//!
//! Frames are JSON text, internally tagged by `"type"` with camelCase field
//! names. Every inbound kind shares the [`StatePush`] payload; the closed
//! [`ServerMessage`] union is decoded once at the session boundary and
//! anything it does not recognise is a protocol error.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::turn::RemoteTurn;

// ── Scalars ─────────────────────────────────────────────────────────

/// Encoded raster image (a `data:` URL) exchanged opaquely with the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RasterPayload(String);

impl RasterPayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RasterPayload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Overall game status carried by state pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Playing,
    Completed,
    /// Any status this client does not act on.
    #[serde(other)]
    Other,
}

// ── Client → server ─────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First join of a game. `player_id` is null until the server assigns one.
    #[serde(rename_all = "camelCase")]
    JoinGame {
        game_code: String,
        player_id: Option<String>,
    },
    /// Resume a previously joined game after a reconnect.
    #[serde(rename_all = "camelCase")]
    ReconnectGame { game_code: String, player_id: String },
    /// Hand in the finished segment.
    #[serde(rename_all = "camelCase")]
    SubmitSegment {
        game_room_id: Option<String>,
        player_id: Option<String>,
        canvas_data: RasterPayload,
        /// Hand-off marker in canonical units; null on the final segment.
        red_line_y: Option<f64>,
        current_segment_index: usize,
    },
}

impl ClientMessage {
    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "joinGame",
            Self::ReconnectGame { .. } => "reconnectGame",
            Self::SubmitSegment { .. } => "submitSegment",
        }
    }
}

// ── Server → client ─────────────────────────────────────────────────

/// Payload shared by every inbound message kind.
///
/// The server sends whichever fields are relevant; absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatePush {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_segment_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_draw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_waiting_for_others: Option<bool>,
    /// The previous contributor's artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_data: Option<RasterPayload>,
    /// Peek boundary in canonical units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_red_line_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artwork1: Option<RasterPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artwork2: Option<RasterPayload>,
}

impl StatePush {
    pub fn is_completed(&self) -> bool {
        self.status == Some(GameStatus::Completed)
    }

    /// Turn state carried by this push, if it carries any.
    ///
    /// Pushes without a player count, segment index or terminal status only
    /// update side information (game code, status text) and leave the turn
    /// alone. A push without a segment index stays on `current_segment`.
    pub fn remote_turn(&self, current_segment: usize) -> Option<RemoteTurn> {
        if self.player_count.is_none() && self.current_segment_index.is_none() && !self.is_completed() {
            return None;
        }
        Some(RemoteTurn {
            player_count: self.player_count.unwrap_or(0),
            segment_index: self.current_segment_index.unwrap_or(current_segment),
            can_draw: self.can_draw.unwrap_or(false),
            waiting_for_others: self.is_waiting_for_others.unwrap_or(false),
            completed: self.is_completed(),
            prior_handoff_y: self.previous_red_line_y,
        })
    }

    /// Finished artworks present on a completion push.
    pub fn final_artworks(&self) -> Vec<RasterPayload> {
        self.final_artwork1
            .iter()
            .chain(self.final_artwork2.iter())
            .cloned()
            .collect()
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A new game was created for us.
    GameCodeGenerated(StatePush),
    /// First full state after connecting.
    InitialState(StatePush),
    /// Join accepted.
    GameJoined(StatePush),
    /// Both participants are present.
    GameStarted(StatePush),
    /// Resume accepted.
    Reconnected(StatePush),
    /// Generic turn state update.
    GameStateUpdate(StatePush),
    /// A participant handed in a segment.
    SegmentSubmitted(StatePush),
    /// All segments are done.
    GameOver(StatePush),
    /// The other participant dropped; may come back.
    PlayerDisconnected(StatePush),
    /// The other participant dropped; may come back.
    PlayerTemporarilyDisconnected(StatePush),
    /// The other participant is gone for good.
    PlayerPermanentlyDisconnected(StatePush),
    /// Resume refused.
    ReconnectFailed(StatePush),
    /// Server-side error report.
    Error(StatePush),
}

impl ServerMessage {
    /// Decode one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] for malformed frames and unknown
    /// message kinds.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SessionError::Protocol(format!("undecodable server message: {e}")))
    }

    pub fn push(&self) -> &StatePush {
        match self {
            Self::GameCodeGenerated(p)
            | Self::InitialState(p)
            | Self::GameJoined(p)
            | Self::GameStarted(p)
            | Self::Reconnected(p)
            | Self::GameStateUpdate(p)
            | Self::SegmentSubmitted(p)
            | Self::GameOver(p)
            | Self::PlayerDisconnected(p)
            | Self::PlayerTemporarilyDisconnected(p)
            | Self::PlayerPermanentlyDisconnected(p)
            | Self::ReconnectFailed(p)
            | Self::Error(p) => p,
        }
    }

    pub fn into_push(self) -> StatePush {
        match self {
            Self::GameCodeGenerated(p)
            | Self::InitialState(p)
            | Self::GameJoined(p)
            | Self::GameStarted(p)
            | Self::Reconnected(p)
            | Self::GameStateUpdate(p)
            | Self::SegmentSubmitted(p)
            | Self::GameOver(p)
            | Self::PlayerDisconnected(p)
            | Self::PlayerTemporarilyDisconnected(p)
            | Self::PlayerPermanentlyDisconnected(p)
            | Self::ReconnectFailed(p)
            | Self::Error(p) => p,
        }
    }

    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GameCodeGenerated(_) => "gameCodeGenerated",
            Self::InitialState(_) => "initialState",
            Self::GameJoined(_) => "gameJoined",
            Self::GameStarted(_) => "gameStarted",
            Self::Reconnected(_) => "reconnected",
            Self::GameStateUpdate(_) => "gameStateUpdate",
            Self::SegmentSubmitted(_) => "segmentSubmitted",
            Self::GameOver(_) => "gameOver",
            Self::PlayerDisconnected(_) => "playerDisconnected",
            Self::PlayerTemporarilyDisconnected(_) => "playerTemporarilyDisconnected",
            Self::PlayerPermanentlyDisconnected(_) => "playerPermanentlyDisconnected",
            Self::ReconnectFailed(_) => "reconnectFailed",
            Self::Error(_) => "error",
        }
    }

    /// For peer-disconnect notices, whether the departure is permanent.
    pub fn peer_disconnect(&self) -> Option<bool> {
        match self {
            Self::PlayerDisconnected(_) | Self::PlayerTemporarilyDisconnected(_) => Some(false),
            Self::PlayerPermanentlyDisconnected(_) => Some(true),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn join_sends_null_player_id() {
        let json = ClientMessage::JoinGame {
            game_code: "ABCD".into(),
            player_id: None,
        }
        .encode()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "joinGame");
        assert_eq!(value["gameCode"], "ABCD");
        assert!(value["playerId"].is_null());
    }

    #[test]
    fn push_without_turn_fields_has_no_remote_turn() {
        let msg = ServerMessage::decode(r#"{"type":"gameCodeGenerated","gameCode":"QWER"}"#).unwrap();
        assert!(msg.push().remote_turn(0).is_none());
    }

    #[test]
    fn completion_status_yields_remote_turn() {
        let msg = ServerMessage::decode(r#"{"type":"gameOver","status":"completed"}"#).unwrap();
        let turn = msg.push().remote_turn(0).unwrap();
        assert!(turn.completed);
    }

    #[test]
    fn missing_segment_index_keeps_current_segment() {
        let msg = ServerMessage::decode(r#"{"type":"playerTemporarilyDisconnected","playerCount":1}"#).unwrap();
        let turn = msg.push().remote_turn(2).unwrap();
        assert_eq!(turn.segment_index, 2);
        assert_eq!(turn.player_count, 1);
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let msg = ServerMessage::decode(r#"{"type":"gameStateUpdate","status":"paused"}"#).unwrap();
        assert_eq!(msg.push().status, Some(GameStatus::Other));
    }

    #[test]
    fn unknown_kind_is_a_protocol_error() {
        assert!(matches!(
            ServerMessage::decode(r#"{"type":"teleport"}"#),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn disconnect_permanence() {
        let temp = ServerMessage::PlayerTemporarilyDisconnected(StatePush::default());
        let perm = ServerMessage::PlayerPermanentlyDisconnected(StatePush::default());
        assert_eq!(temp.peer_disconnect(), Some(false));
        assert_eq!(perm.peer_disconnect(), Some(true));
        assert_eq!(ServerMessage::GameStarted(StatePush::default()).peer_disconnect(), None);
    }
}
