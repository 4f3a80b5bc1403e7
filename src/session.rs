//! Synchronous session core.
//!
//! [`Session`] owns everything about a game session that is not I/O: the
//! connection state, the resume identity, the reconnection policy and the
//! turn state machine. The async [`SessionController`](crate::client::SessionController)
//! feeds it transport callbacks (`on_open`, `on_message`, `on_close`) and
//! user actions, sends the messages it returns and forwards the
//! [`SessionEvent`]s it queues.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::SessionConfig;
use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::protocol::{ClientMessage, RasterPayload, ServerMessage};
use crate::store::{KeyValueStore, PersistedIdentity};
use crate::turn::{DrawingFinished, SegmentPhase, TurnSnapshot, TurnStateMachine};

const LOBBY_PROMPT: &str = "Enter a game code to join or create one!";

// ── Connection ──────────────────────────────────────────────────────

/// Lifecycle of the single transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    /// Waiting to retry after unexpected close number `attempt`.
    Reconnecting { attempt: u32 },
    /// Reconnection attempts are exhausted.
    Failed,
}

impl ConnectionState {
    /// A transport exists or is being established.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Why a transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// We closed it on purpose; never followed by a reconnect.
    Intentional,
    /// The remote end closed it.
    Remote,
    /// The transport failed, or could not be established.
    Error(String),
}

impl CloseReason {
    fn describe(&self) -> Option<String> {
        match self {
            Self::Intentional => None,
            Self::Remote => Some("connection closed by server".to_owned()),
            Self::Error(e) => Some(e.clone()),
        }
    }
}

/// What the controller should do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing further.
    Idle,
    /// Connect again after `delay`.
    Reconnect { attempt: u32, delay: Duration },
    /// Attempts are exhausted; the session is back in the lobby.
    GaveUp,
}

// ── Session ─────────────────────────────────────────────────────────

/// Sans-I/O session state.
pub struct Session {
    config: SessionConfig,
    store: Box<dyn KeyValueStore>,
    connection: ConnectionState,
    /// A game has been joined and the connection should be kept alive.
    active: bool,
    game_code: Option<String>,
    player_id: Option<String>,
    game_room_id: Option<String>,
    turn: TurnStateMachine,
    failed_attempts: u32,
    synced_since_open: bool,
    prior_artifact: Option<RasterPayload>,
    final_artworks: Vec<RasterPayload>,
    status: String,
    close_requested: bool,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(config: SessionConfig, store: Box<dyn KeyValueStore>) -> Self {
        let turn = TurnStateMachine::new(config.required_players, config.canonical_surface.height);
        Self {
            config,
            store,
            connection: ConnectionState::Disconnected,
            active: false,
            game_code: None,
            player_id: None,
            game_room_id: None,
            turn,
            failed_attempts: 0,
            synced_since_open: false,
            prior_artifact: None,
            final_artworks: Vec::new(),
            status: LOBBY_PROMPT.to_owned(),
            close_requested: false,
            events: Vec::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn game_code(&self) -> Option<&str> {
        self.game_code.as_deref()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn game_room_id(&self) -> Option<&str> {
        self.game_room_id.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.turn.snapshot()
    }

    pub fn turn(&self) -> &TurnStateMachine {
        &self.turn
    }

    pub fn prior_artifact(&self) -> Option<&RasterPayload> {
        self.prior_artifact.as_ref()
    }

    pub fn final_artworks(&self) -> &[RasterPayload] {
        &self.final_artworks
    }

    /// Unexpected closes since the server last confirmed the session.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Take the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Returns `true` once if an inbound message asked for the live
    /// transport to be closed intentionally.
    pub fn take_close_request(&mut self) -> bool {
        std::mem::take(&mut self.close_requested)
    }

    // ── Lobby actions ───────────────────────────────────────────────

    /// Pick up a persisted identity from a previous run.
    ///
    /// Returns `true` if a game code was found and the session is now
    /// active; the next connection will resume (or join, if no player id
    /// was stored).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] or [`SessionError::Io`] if the store fails.
    pub fn resume_stored(&mut self) -> Result<bool> {
        if self.active {
            return Ok(true);
        }
        let identity = PersistedIdentity::load(self.store.as_ref())?;
        let Some(game_code) = identity.game_code else {
            return Ok(false);
        };
        info!(game_code = %game_code, resumable = identity.player_id.is_some(), "found stored session");
        self.game_code = Some(game_code);
        self.player_id = identity.player_id;
        self.active = true;
        self.failed_attempts = 0;
        Ok(true)
    }

    /// Start a session for `game_code`.
    ///
    /// A stored player id is kept only when it belongs to the same game.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyConnected`] while a transport is live.
    pub fn join(&mut self, game_code: impl Into<String>) -> Result<()> {
        self.reject_if_live()?;
        let game_code = game_code.into();
        if self.game_code.as_deref() != Some(game_code.as_str()) {
            self.player_id = None;
        }
        self.game_code = Some(game_code);
        self.active = true;
        self.failed_attempts = 0;
        self.reset_game();
        self.persist_identity();
        Ok(())
    }

    /// End the session on purpose and forget the persisted identity.
    ///
    /// Returns `true` if a live transport needs to be closed.
    pub fn leave(&mut self) -> bool {
        debug!("leaving session");
        self.active = false;
        self.failed_attempts = 0;
        self.game_code = None;
        self.player_id = None;
        self.game_room_id = None;
        self.clear_identity();
        if matches!(self.connection, ConnectionState::Reconnecting { .. } | ConnectionState::Failed) {
            self.connection = ConnectionState::Disconnected;
        }
        self.set_status(LOBBY_PROMPT.to_owned());
        self.connection.is_live()
    }

    /// Leave and reset everything so a new game can be joined.
    ///
    /// Returns `true` if a live transport needs to be closed.
    pub fn play_again(&mut self) -> bool {
        let live = self.leave();
        self.reset_game();
        self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
        live
    }

    /// The client came back to the foreground.
    ///
    /// Returns `true` if a connection should be attempted right away.
    pub fn on_foreground(&mut self) -> bool {
        let reconnect = self.active && !self.connection.is_live() && !self.turn.snapshot().is_game_over();
        if reconnect {
            debug!(state = %self.connection, "foregrounded without a transport");
        }
        reconnect
    }

    // ── Transport callbacks ─────────────────────────────────────────

    /// A connection attempt is about to start.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveSession`] before a join and
    /// [`SessionError::AlreadyConnected`] while a transport is live.
    pub fn begin_connect(&mut self) -> Result<()> {
        if !self.active {
            return Err(SessionError::NoActiveSession);
        }
        self.reject_if_live()?;
        self.connection = ConnectionState::Connecting;
        Ok(())
    }

    /// The transport opened. Returns the join or resume request to send.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveSession`] if there is no game code.
    pub fn on_open(&mut self) -> Result<ClientMessage> {
        let Some(game_code) = self.game_code.clone() else {
            return Err(SessionError::NoActiveSession);
        };
        self.connection = ConnectionState::Open;
        self.synced_since_open = false;
        self.close_requested = false;
        self.events.push(SessionEvent::Connected);

        let msg = match self.player_id.clone() {
            Some(player_id) => ClientMessage::ReconnectGame { game_code, player_id },
            None => ClientMessage::JoinGame {
                game_code,
                player_id: None,
            },
        };
        info!(kind = msg.kind(), "transport open");
        Ok(msg)
    }

    /// Process one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] for frames that cannot be decoded
    /// or that contradict the current turn state. Such frames leave the turn
    /// state untouched and may be ignored. Returns
    /// [`SessionError::ResumeFailed`] once the server refuses a resume; the
    /// session is already back in the lobby when that happens.
    pub fn on_message(&mut self, text: &str) -> Result<()> {
        let msg = ServerMessage::decode(text)?;
        debug!(kind = msg.kind(), "server message");
        self.apply(msg)
    }

    /// The transport closed.
    pub fn on_close(&mut self, reason: CloseReason) -> CloseOutcome {
        let was = self.connection;
        self.connection = ConnectionState::Disconnected;

        if reason == CloseReason::Intentional {
            debug!(state = %was, "intentional close");
            return CloseOutcome::Idle;
        }

        let description = reason.describe();
        warn!(state = %was, reason = ?description, "unexpected close");

        if !self.active {
            self.player_id = None;
            self.clear_identity();
            self.set_status(LOBBY_PROMPT.to_owned());
            self.events.push(SessionEvent::Disconnected { reason: description });
            return CloseOutcome::Idle;
        }

        if self.turn.phase() == SegmentPhase::Completed {
            self.events.push(SessionEvent::Disconnected { reason: description });
            return CloseOutcome::Idle;
        }

        self.failed_attempts = self.failed_attempts.saturating_add(1);
        let max = self.config.max_reconnect_attempts;
        if self.failed_attempts >= max {
            warn!(attempts = self.failed_attempts, "giving up on reconnection");
            self.connection = ConnectionState::Failed;
            self.active = false;
            self.game_code = None;
            self.player_id = None;
            self.game_room_id = None;
            self.clear_identity();
            let reason = "Maximum reconnect attempts reached. Please create or join a new game.".to_owned();
            self.set_status(reason.clone());
            self.events.push(SessionEvent::GaveUp { reason });
            return CloseOutcome::GaveUp;
        }

        let attempt = self.failed_attempts;
        self.connection = ConnectionState::Reconnecting { attempt };
        self.set_status(format!(
            "Connection lost. Attempting to reconnect... (Attempt {attempt}/{max})"
        ));
        self.events.push(SessionEvent::Reconnecting { attempt, max });
        CloseOutcome::Reconnect {
            attempt,
            delay: self.config.reconnect_delay,
        }
    }

    // ── Turn actions ────────────────────────────────────────────────

    /// The participant finished drawing the current segment.
    ///
    /// `has_drawn` comes from [`StrokeHistory::has_drawn`](crate::history::StrokeHistory::has_drawn).
    ///
    /// # Errors
    ///
    /// See [`TurnStateMachine::finish_drawing`].
    pub fn done_drawing(&mut self, has_drawn: bool) -> Result<DrawingFinished> {
        let finished = self.turn.finish_drawing(has_drawn)?;
        self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
        Ok(finished)
    }

    /// Go back from hand-off placement to drawing.
    ///
    /// # Errors
    ///
    /// See [`TurnStateMachine::cancel_handoff`].
    pub fn cancel_handoff(&mut self) -> Result<()> {
        self.turn.cancel_handoff()?;
        self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
        Ok(())
    }

    /// Move the hand-off marker; returns its canonical position.
    ///
    /// # Errors
    ///
    /// See [`TurnStateMachine::drag_handoff`].
    pub fn drag_handoff(&mut self, local_y: f64, surface_height: f64) -> Result<f64> {
        self.turn.drag_handoff(local_y, surface_height)
    }

    /// Build the submission for the current segment.
    ///
    /// On success the turn is in [`SegmentPhase::Submitted`] until
    /// [`Session::submission_sent`] is called. `has_drawn` comes from
    /// [`StrokeHistory::has_drawn`](crate::history::StrokeHistory::has_drawn).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] without a live transport, or
    /// [`SessionError::InvalidTransition`] when submitting is not enabled.
    pub fn submit(&mut self, canvas: RasterPayload, has_drawn: bool) -> Result<ClientMessage> {
        if self.connection != ConnectionState::Open {
            return Err(SessionError::NotConnected);
        }
        let red_line_y = self.turn.begin_submit(has_drawn)?;
        info!(
            segment = self.turn.segment_index(),
            red_line_y = ?red_line_y,
            "submitting segment"
        );
        self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
        Ok(ClientMessage::SubmitSegment {
            game_room_id: self.game_room_id.clone(),
            player_id: self.player_id.clone(),
            canvas_data: canvas,
            red_line_y,
            current_segment_index: self.turn.segment_index(),
        })
    }

    /// The submission built by [`Session::submit`] went out.
    ///
    /// # Errors
    ///
    /// See [`TurnStateMachine::submission_sent`].
    pub fn submission_sent(&mut self) -> Result<()> {
        self.turn.submission_sent()?;
        self.set_status("Segment submitted! Waiting for other players...".to_owned());
        self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn apply(&mut self, msg: ServerMessage) -> Result<()> {
        if let ServerMessage::ReconnectFailed(push) = &msg {
            let reason = push.message.clone().unwrap_or_else(|| "session not found".to_owned());
            warn!(reason = %reason, "resume refused");
            self.abandon();
            self.set_status(format!(
                "Reconnect failed: {reason} Please try creating or joining a new game."
            ));
            self.events.push(SessionEvent::ResumeFailed { reason: reason.clone() });
            return Err(SessionError::ResumeFailed { reason });
        }

        let peer_disconnect = msg.peer_disconnect();
        let is_generated = matches!(msg, ServerMessage::GameCodeGenerated(_));
        let is_error = matches!(msg, ServerMessage::Error(_));
        let push = msg.into_push();

        if let Some(message) = push.message.clone() {
            if is_error {
                warn!(message = %message, "server reported an error");
            }
            self.set_status(message);
        }

        // Resolve the turn first so a contradictory push changes nothing.
        let change = match push.remote_turn(self.turn.segment_index()) {
            Some(remote) => Some(self.turn.apply_remote(remote)?),
            None => None,
        };

        // Any coherent push confirms the session.
        self.failed_attempts = 0;

        if let Some(player_id) = push.player_id.clone() {
            if self.player_id.as_deref() != Some(player_id.as_str()) {
                info!(player_id = %player_id, "player id assigned");
                self.player_id = Some(player_id);
            }
        }
        if let Some(game_code) = push.game_code.clone() {
            if is_generated {
                self.events.push(SessionEvent::GameCodeAssigned(game_code.clone()));
            }
            self.game_code = Some(game_code);
        }
        if let Some(room) = push.game_room_id.clone() {
            self.game_room_id = Some(room);
        }

        if let Some(change) = change {
            let artifact_changed = push.canvas_data.is_some() && push.canvas_data != self.prior_artifact;
            if change.segment_changed || artifact_changed {
                self.prior_artifact = push.canvas_data.clone();
            }

            if change.current == SegmentPhase::Completed {
                if change.previous != SegmentPhase::Completed {
                    info!("game completed");
                    self.final_artworks = push.final_artworks();
                    self.player_id = None;
                    self.clear_identity();
                    self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
                    self.events.push(SessionEvent::Completed {
                        final_artworks: self.final_artworks.clone(),
                    });
                }
                self.synced_since_open = true;
                return Ok(());
            }

            if change.segment_changed || artifact_changed || !self.synced_since_open {
                self.events.push(SessionEvent::SegmentStarted {
                    segment_index: self.turn.segment_index(),
                    prior_artifact: self.prior_artifact.clone(),
                    prior_handoff_y: self.turn.prior_handoff_y(),
                });
            }
            self.synced_since_open = true;
            self.events.push(SessionEvent::StateUpdated(self.turn.snapshot()));
        }

        if self.active && self.turn.phase() != SegmentPhase::Completed {
            self.persist_identity();
        }

        if let Some(permanent) = peer_disconnect {
            info!(permanent, "peer disconnected");
            self.events.push(SessionEvent::PeerDisconnected { permanent });
            if permanent {
                self.abandon();
            }
        }
        Ok(())
    }

    /// Drop the session and ask for the transport to be closed.
    fn abandon(&mut self) {
        self.active = false;
        self.failed_attempts = 0;
        self.game_code = None;
        self.player_id = None;
        self.game_room_id = None;
        self.clear_identity();
        self.close_requested = self.connection.is_live();
    }

    fn reset_game(&mut self) {
        self.turn.reset();
        self.prior_artifact = None;
        self.final_artworks.clear();
        self.game_room_id = None;
        self.synced_since_open = false;
    }

    fn reject_if_live(&self) -> Result<()> {
        match self.connection {
            ConnectionState::Connecting => Err(SessionError::AlreadyConnected("connecting")),
            ConnectionState::Open => Err(SessionError::AlreadyConnected("open")),
            _ => Ok(()),
        }
    }

    fn set_status(&mut self, status: String) {
        if self.status != status {
            self.status.clone_from(&status);
            self.events.push(SessionEvent::Status(status));
        }
    }

    fn persist_identity(&mut self) {
        let identity = PersistedIdentity {
            game_code: self.game_code.clone(),
            player_id: self.player_id.clone(),
        };
        if let Err(e) = identity.save(self.store.as_mut()) {
            warn!(error = %e, "failed to persist identity");
        }
    }

    fn clear_identity(&mut self) {
        if let Err(e) = PersistedIdentity::clear(self.store.as_mut()) {
            warn!(error = %e, "failed to clear persisted identity");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("active", &self.active)
            .field("game_code", &self.game_code)
            .field("player_id", &self.player_id)
            .field("phase", &self.turn.phase())
            .field("segment_index", &self.turn.segment_index())
            .field("failed_attempts", &self.failed_attempts)
            .finish_non_exhaustive()
    }
}
