//! Async session controller.
//!
//! [`SessionController`] is a thin handle that talks to a background loop
//! task over an unbounded command channel. The loop owns the live transport
//! and the reconnect timer, drives the synchronous [`Session`] core and emits
//! [`SessionEvent`]s on a bounded channel returned from
//! [`SessionController::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:8080");
//! let store = FileStore::open("identity.json")?;
//! let (controller, mut events) = SessionController::start(connector, store, SessionConfig::default());
//!
//! controller.join("K7QX").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::SegmentStarted { prior_artifact, .. } => { /* reset the canvas */ }
//!         SessionEvent::Completed { .. } | SessionEvent::GaveUp { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::normalize::{SurfaceSize, CANONICAL_SURFACE};
use crate::protocol::{ClientMessage, RasterPayload};
use crate::session::{CloseOutcome, CloseReason, ConnectionState, Session};
use crate::store::KeyValueStore;
use crate::transport::{Connector, Transport};
use crate::turn::{DrawingFinished, TurnSnapshot, DEFAULT_REQUIRED_PLAYERS};

/// Default wait before a reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default number of unexpected closes before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionController`].
///
/// # Example
///
/// ```
/// use exquisite_client::client::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new()
///     .with_reconnect_delay(Duration::from_millis(500))
///     .with_max_reconnect_attempts(3);
/// assert_eq!(config.max_reconnect_attempts, 3);
/// assert_eq!(config.required_players, 2);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait between an unexpected close and the next connection attempt.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Consecutive unexpected closes after which the session gives up,
    /// clears its persisted identity and returns to the lobby. The counter
    /// resets whenever the server confirms the session.
    ///
    /// Defaults to **5**. Values below 1 are clamped to 1.
    pub max_reconnect_attempts: u32,
    /// Bound on one connection attempt. Expiry counts as an unexpected close.
    ///
    /// Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// Participants needed before drawing starts.
    ///
    /// Defaults to **2**.
    pub required_players: u8,
    /// Surface the server composites onto; hand-off markers travel in its units.
    ///
    /// Defaults to 1080×1920.
    pub canonical_surface: SurfaceSize,
    /// Capacity of the bounded event channel.
    ///
    /// Events that do not fit are dropped with a warning, except the ones
    /// that end a session, which are always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time [`SessionController::shutdown`] gives the loop to close the
    /// transport before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            required_players: DEFAULT_REQUIRED_PLAYERS,
            canonical_surface: CANONICAL_SURFACE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_required_players(mut self, players: u8) -> Self {
        self.required_players = players.max(1);
        self
    }

    #[must_use]
    pub fn with_canonical_surface(mut self, surface: SurfaceSize) -> Self {
        self.canonical_surface = surface;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// A zero timeout aborts the loop without waiting.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Join { game_code: String, reply: Reply<()> },
    DoneDrawing { has_drawn: bool, reply: Reply<DrawingFinished> },
    CancelHandoff { reply: Reply<()> },
    DragHandoff { local_y: f64, surface_height: f64, reply: Reply<f64> },
    Submit { canvas: RasterPayload, has_drawn: bool, reply: Reply<()> },
    Leave { reply: Reply<()> },
    PlayAgain { reply: Reply<()> },
    Foregrounded,
}

// ── Controller handle ───────────────────────────────────────────────

/// Async handle for one drawing session.
///
/// Created via [`SessionController::start`]. Actions are executed in order
/// by the background loop; each method waits for its result. State accessors
/// read the shared [`Session`] directly.
pub struct SessionController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    session: Arc<Mutex<Session>>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SessionController {
    /// Spawn the session loop and return a handle plus event receiver.
    ///
    /// If `store` already holds an identity from a previous run the loop
    /// connects right away and resumes it.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C: Connector>(
        connector: C,
        store: impl KeyValueStore + 'static,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shutdown_timeout = config.shutdown_timeout;

        let mut session = Session::new(config, Box::new(store));
        if let Err(e) = session.resume_stored() {
            warn!(error = %e, "could not read persisted identity");
        }
        let session = Arc::new(Mutex::new(session));

        let task = tokio::spawn(session_loop(
            connector,
            Arc::clone(&session),
            cmd_rx,
            event_tx,
            shutdown_rx,
        ));

        let controller = Self {
            cmd_tx,
            session,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };
        (controller, event_rx)
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Join `game_code` and connect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyConnected`] while a transport is live.
    pub async fn join(&self, game_code: impl Into<String>) -> Result<()> {
        let game_code = game_code.into();
        self.request(|reply| Command::Join { game_code, reply }).await
    }

    /// Finish drawing the current segment.
    ///
    /// `has_drawn` must be read from [`StrokeHistory::has_drawn`](crate::history::StrokeHistory::has_drawn)
    /// right before the call, not tracked separately by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside the drawing phase
    /// or when `has_drawn` is false.
    pub async fn done_drawing(&self, has_drawn: bool) -> Result<DrawingFinished> {
        self.request(|reply| Command::DoneDrawing { has_drawn, reply }).await
    }

    /// Go back from hand-off placement to drawing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside hand-off placement.
    pub async fn cancel_handoff(&self) -> Result<()> {
        self.request(|reply| Command::CancelHandoff { reply }).await
    }

    /// Move the hand-off marker to `local_y` on a surface `surface_height`
    /// tall. Returns the clamped canonical position.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside hand-off placement
    /// and [`SessionError::DimensionUnavailable`] for an unmeasured surface.
    pub async fn drag_handoff(&self, local_y: f64, surface_height: f64) -> Result<f64> {
        self.request(|reply| Command::DragHandoff {
            local_y,
            surface_height,
            reply,
        })
        .await
    }

    /// Submit the encoded segment.
    ///
    /// `has_drawn` must be read from [`StrokeHistory::has_drawn`](crate::history::StrokeHistory::has_drawn)
    /// right before the call. An undo after [`done_drawing`](Self::done_drawing)
    /// is refused, so the value cannot go stale while the marker is placed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] when submitting is not
    /// enabled (including a second submit while one is in flight),
    /// [`SessionError::NotConnected`] without an open transport, or the
    /// transport's send error.
    pub async fn submit_segment(&self, canvas: RasterPayload, has_drawn: bool) -> Result<()> {
        self.request(|reply| Command::Submit {
            canvas,
            has_drawn,
            reply,
        })
        .await
    }

    /// Leave the game on purpose. Cancels any pending reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub async fn leave(&self) -> Result<()> {
        self.request(|reply| Command::Leave { reply }).await
    }

    /// Leave and reset everything for a fresh game.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub async fn play_again(&self) -> Result<()> {
        self.request(|reply| Command::PlayAgain { reply }).await
    }

    /// The application came back to the foreground; reconnect right away if
    /// the session lost its transport.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn notify_foregrounded(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Foregrounded)
            .map_err(|_| SessionError::NotConnected)
    }

    /// Stop the loop, closing the transport.
    ///
    /// The event receiver yields `None` once the loop exits.
    pub async fn shutdown(&mut self) {
        debug!("session controller: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    pub async fn snapshot(&self) -> TurnSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.session.lock().await.connection_state()
    }

    /// Latest human-readable status text.
    pub async fn status(&self) -> String {
        self.session.lock().await.status().to_owned()
    }

    pub async fn game_code(&self) -> Option<String> {
        self.session.lock().await.game_code().map(str::to_owned)
    }

    pub async fn player_id(&self) -> Option<String> {
        self.session.lock().await.player_id().map(str::to_owned)
    }

    /// Artifact the current segment is drawn on top of.
    pub async fn prior_artifact(&self) -> Option<RasterPayload> {
        self.session.lock().await.prior_artifact().cloned()
    }

    pub async fn final_artworks(&self) -> Vec<RasterPayload> {
        self.session.lock().await.final_artworks().to_vec()
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply))
            .map_err(|_| SessionError::NotConnected)?;
        rx.await.map_err(|_| SessionError::NotConnected)?
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("has_task", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Loop-owned resources.
struct Driver<C: Connector> {
    connector: C,
    session: Arc<Mutex<Session>>,
    event_tx: mpsc::Sender<SessionEvent>,
    transport: Option<C::Transport>,
    reconnect_at: Option<Instant>,
}

/// Background loop multiplexing commands, inbound frames and the reconnect
/// timer via `tokio::select!`.
///
/// Exits on shutdown or when the controller handle is dropped.
async fn session_loop<C: Connector>(
    connector: C,
    session: Arc<Mutex<Session>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<SessionEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session loop started");
    let mut driver = Driver {
        connector,
        session,
        event_tx,
        transport: None,
        reconnect_at: None,
    };

    if driver.session.lock().await.is_active() {
        driver.connect().await;
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => driver.handle_command(cmd).await,
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        driver.stop().await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                driver.stop().await;
                break;
            }

            incoming = recv_opt(&mut driver.transport) => {
                match incoming {
                    Some(Ok(text)) => driver.handle_text(&text).await,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        driver.transport = None;
                        driver.closed(CloseReason::Error(e.to_string())).await;
                    }
                    None => {
                        debug!("transport closed by server");
                        driver.transport = None;
                        driver.closed(CloseReason::Remote).await;
                    }
                }
            }

            () = wait_until(driver.reconnect_at) => {
                driver.reconnect_at = None;
                driver.connect().await;
            }
        }
    }

    debug!("session loop exited");
}

impl<C: Connector> Driver<C> {
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Join { game_code, reply } => {
                let result = self.session.lock().await.join(game_code);
                let joined = result.is_ok();
                let _ = reply.send(result);
                self.flush().await;
                if joined {
                    self.reconnect_at = None;
                    self.connect().await;
                }
            }
            Command::DoneDrawing { has_drawn, reply } => {
                let result = self.session.lock().await.done_drawing(has_drawn);
                let _ = reply.send(result);
                self.flush().await;
            }
            Command::CancelHandoff { reply } => {
                let result = self.session.lock().await.cancel_handoff();
                let _ = reply.send(result);
                self.flush().await;
            }
            Command::DragHandoff {
                local_y,
                surface_height,
                reply,
            } => {
                let result = self.session.lock().await.drag_handoff(local_y, surface_height);
                let _ = reply.send(result);
            }
            Command::Submit {
                canvas,
                has_drawn,
                reply,
            } => {
                let _ = reply.send(self.submit(canvas, has_drawn).await);
            }
            Command::Leave { reply } => {
                let live = self.session.lock().await.leave();
                self.hang_up(live).await;
                let _ = reply.send(Ok(()));
            }
            Command::PlayAgain { reply } => {
                let live = self.session.lock().await.play_again();
                self.hang_up(live).await;
                let _ = reply.send(Ok(()));
            }
            Command::Foregrounded => {
                let reconnect = self.session.lock().await.on_foreground();
                if reconnect {
                    info!("foregrounded without a transport; reconnecting now");
                    self.reconnect_at = None;
                    self.connect().await;
                }
            }
        }
    }

    async fn submit(&mut self, canvas: RasterPayload, has_drawn: bool) -> Result<()> {
        let msg = self.session.lock().await.submit(canvas, has_drawn);
        self.flush().await;
        let msg = msg?;
        match self.send(&msg).await {
            Ok(()) => {
                let sent = self.session.lock().await.submission_sent();
                self.flush().await;
                sent
            }
            Err(e) => {
                let reason = e.to_string();
                self.transport = None;
                self.closed(CloseReason::Error(reason)).await;
                Err(e)
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let close = {
            let mut session = self.session.lock().await;
            match session.on_message(text) {
                Ok(()) => {}
                Err(e @ SessionError::ResumeFailed { .. }) => info!("returning to lobby: {e}"),
                Err(e) => warn!("ignoring server message: {e}"),
            }
            session.take_close_request()
        };
        self.flush().await;
        if close {
            self.hang_up(true).await;
        }
    }

    /// Open a transport and send the join or resume request.
    async fn connect(&mut self) {
        let timeout = {
            let mut session = self.session.lock().await;
            if let Err(e) = session.begin_connect() {
                debug!("not connecting: {e}");
                return;
            }
            session.config().connect_timeout
        };

        let attempt = tokio::time::timeout(timeout, self.connector.connect())
            .await
            .map_err(|_| SessionError::Timeout)
            .and_then(|r| r);
        let transport = match attempt {
            Ok(transport) => transport,
            Err(e) => {
                warn!("connection attempt failed: {e}");
                self.closed(CloseReason::Error(e.to_string())).await;
                return;
            }
        };
        self.transport = Some(transport);

        let hello = self.session.lock().await.on_open();
        self.flush().await;
        match hello {
            Ok(msg) => {
                if let Err(e) = self.send(&msg).await {
                    self.transport = None;
                    self.closed(CloseReason::Error(e.to_string())).await;
                }
            }
            Err(e) => {
                warn!("opened a transport with nothing to join: {e}");
                self.hang_up(true).await;
            }
        }
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        let json = msg.encode()?;
        debug!(kind = msg.kind(), "sending client message");
        transport.send(json).await.map_err(|e| {
            error!("transport send error: {e}");
            e
        })
    }

    /// Feed an unintended close into the session and arm the reconnect timer.
    async fn closed(&mut self, reason: CloseReason) {
        let outcome = self.session.lock().await.on_close(reason);
        self.flush().await;
        self.reconnect_at = match outcome {
            CloseOutcome::Reconnect { attempt, delay } => {
                info!(attempt, ?delay, "reconnect scheduled");
                Some(Instant::now() + delay)
            }
            CloseOutcome::Idle | CloseOutcome::GaveUp => None,
        };
    }

    /// Intentional close of the live transport, if any.
    async fn hang_up(&mut self, live: bool) {
        self.reconnect_at = None;
        if !live {
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("error closing transport: {e}");
            }
        }
        self.session.lock().await.on_close(CloseReason::Intentional);
        self.flush().await;
        emit_final(&self.event_tx, SessionEvent::Disconnected { reason: None }).await;
    }

    async fn stop(&mut self) {
        self.reconnect_at = None;
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
            self.session.lock().await.on_close(CloseReason::Intentional);
        }
        self.flush().await;
        emit_final(
            &self.event_tx,
            SessionEvent::Disconnected {
                reason: Some("client shut down".into()),
            },
        )
        .await;
    }

    /// Forward events queued by the session.
    async fn flush(&mut self) {
        let events = self.session.lock().await.drain_events();
        for event in events {
            match event {
                SessionEvent::GaveUp { .. }
                | SessionEvent::ResumeFailed { .. }
                | SessionEvent::Completed { .. }
                | SessionEvent::Disconnected { .. } => emit_final(&self.event_tx, event).await,
                other => emit_event(&self.event_tx, other),
            }
        }
    }
}

async fn recv_opt<T: Transport>(transport: &mut Option<T>) -> Option<Result<String>> {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Emit an event. If the channel is full, log a warning and drop the event
/// to avoid blocking the loop.
fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit an event that must not be dropped.
async fn emit_final(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}
