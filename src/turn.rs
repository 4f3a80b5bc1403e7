//! Turn and segment state machine.
//!
//! A game is drawn in [`TOTAL_SEGMENTS`] segments, alternating between two
//! participants. [`TurnStateMachine`] tracks which action this participant is
//! expected to take for the current segment as a single [`SegmentPhase`];
//! the `can_draw` / `is_waiting_for_others` style flags that the remote
//! counterpart speaks are derived from the phase, never stored beside it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::normalize;

/// Number of segments in a finished drawing.
pub const TOTAL_SEGMENTS: usize = 4;

/// Participants needed before anyone may draw.
pub const DEFAULT_REQUIRED_PLAYERS: u8 = 2;

// ── Segment ─────────────────────────────────────────────────────────

/// One of the fixed body-part drawing turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Head,
    Torso,
    Legs,
    Feet,
}

impl Segment {
    /// All segments in drawing order.
    pub const ALL: [Segment; TOTAL_SEGMENTS] =
        [Segment::Head, Segment::Torso, Segment::Legs, Segment::Feet];

    /// Segment at `index`, or `None` past the last one.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name used in status messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Head => "Head",
            Self::Torso => "Torso",
            Self::Legs => "Legs",
            Self::Feet => "Feet",
        }
    }

    /// The last segment needs no hand-off marker.
    pub fn is_final(self) -> bool {
        self.index() == TOTAL_SEGMENTS - 1
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Phase ───────────────────────────────────────────────────────────

/// What this participant is expected to do for the current segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPhase {
    /// Not enough participants are connected.
    #[default]
    AwaitingPeers,
    /// It is our turn and strokes are accepted.
    Drawing,
    /// Strokes are done; the hand-off marker is being positioned.
    PlacingHandoff,
    /// A submission has been encoded and is on its way out.
    Submitted,
    /// The other participant is drawing.
    WaitingForPeer,
    /// All segments are done. Terminal until "play again".
    Completed,
}

impl SegmentPhase {
    pub fn accepts_drawing(self) -> bool {
        self == Self::Drawing
    }

    pub fn accepts_handoff_drag(self) -> bool {
        self == Self::PlacingHandoff
    }
}

impl fmt::Display for SegmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingPeers => "awaiting peers",
            Self::Drawing => "drawing",
            Self::PlacingHandoff => "placing hand-off marker",
            Self::Submitted => "submitting",
            Self::WaitingForPeer => "waiting for peer",
            Self::Completed => "completed",
        })
    }
}

// ── Inputs and outputs ──────────────────────────────────────────────

/// Authoritative turn state pushed by the remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteTurn {
    pub player_count: u8,
    pub segment_index: usize,
    pub can_draw: bool,
    pub waiting_for_others: bool,
    pub completed: bool,
    /// Peek boundary in canonical units.
    pub prior_handoff_y: Option<f64>,
}

/// What changed when a [`RemoteTurn`] was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnChange {
    pub previous: SegmentPhase,
    pub current: SegmentPhase,
    pub segment_changed: bool,
}

impl TurnChange {
    pub fn phase_changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Result of signalling "done drawing".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawingFinished {
    /// Entered [`SegmentPhase::PlacingHandoff`] with the marker at its
    /// default position (canonical units).
    PlacingHandoff { marker_y: f64 },
    /// Final segment: there is nothing to hide, submit directly.
    ReadyToSubmit,
}

/// Point-in-time copy of the turn state for consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnSnapshot {
    pub phase: SegmentPhase,
    pub segment_index: usize,
    pub player_count: u8,
    pub required_players: u8,
    /// Hand-off marker in canonical units.
    pub handoff_marker_y: Option<f64>,
    /// Peek boundary inherited from the previous contributor, canonical units.
    pub prior_handoff_y: Option<f64>,
}

impl TurnSnapshot {
    pub fn segment(&self) -> Option<Segment> {
        Segment::from_index(self.segment_index)
    }

    pub fn is_final_segment(&self) -> bool {
        self.segment_index == TOTAL_SEGMENTS - 1
    }

    pub fn can_draw(&self) -> bool {
        matches!(self.phase, SegmentPhase::Drawing | SegmentPhase::PlacingHandoff)
    }

    pub fn is_waiting_for_others(&self) -> bool {
        matches!(self.phase, SegmentPhase::Submitted | SegmentPhase::WaitingForPeer)
    }

    pub fn is_placing_handoff(&self) -> bool {
        self.phase == SegmentPhase::PlacingHandoff
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == SegmentPhase::Completed
    }
}

// ── State machine ───────────────────────────────────────────────────

/// Per-session turn state.
#[derive(Debug, Clone)]
pub struct TurnStateMachine {
    phase: SegmentPhase,
    segment_index: usize,
    player_count: u8,
    required_players: u8,
    canonical_height: f64,
    handoff_marker_y: Option<f64>,
    prior_handoff_y: Option<f64>,
}

impl TurnStateMachine {
    /// Create a state machine for a fresh session.
    pub fn new(required_players: u8, canonical_height: f64) -> Self {
        Self {
            phase: SegmentPhase::AwaitingPeers,
            segment_index: 0,
            player_count: 0,
            required_players: required_players.max(1),
            canonical_height,
            handoff_marker_y: None,
            prior_handoff_y: None,
        }
    }

    pub fn phase(&self) -> SegmentPhase {
        self.phase
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn segment(&self) -> Option<Segment> {
        Segment::from_index(self.segment_index)
    }

    pub fn is_final_segment(&self) -> bool {
        self.segment_index == TOTAL_SEGMENTS - 1
    }

    pub fn player_count(&self) -> u8 {
        self.player_count
    }

    pub fn handoff_marker_y(&self) -> Option<f64> {
        self.handoff_marker_y
    }

    pub fn prior_handoff_y(&self) -> Option<f64> {
        self.prior_handoff_y
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            phase: self.phase,
            segment_index: self.segment_index,
            player_count: self.player_count,
            required_players: self.required_players,
            handoff_marker_y: self.handoff_marker_y,
            prior_handoff_y: self.prior_handoff_y,
        }
    }

    /// Whether a submit would currently be accepted.
    ///
    /// `has_drawn` must come from [`StrokeHistory::has_drawn`](crate::history::StrokeHistory::has_drawn)
    /// at the time of the call; both arms refuse an empty segment.
    pub fn can_submit(&self, has_drawn: bool) -> bool {
        match self.phase {
            SegmentPhase::PlacingHandoff => has_drawn && self.handoff_marker_y.is_some(),
            SegmentPhase::Drawing => self.is_final_segment() && has_drawn,
            _ => false,
        }
    }

    /// Overwrite local state with an authoritative push.
    ///
    /// A push for the same segment that still allows drawing keeps a local
    /// [`SegmentPhase::PlacingHandoff`], since placing the marker is part of
    /// the same turn. Pushes after completion are ignored.
    ///
    /// A completion push is applied whatever its segment index says; the
    /// index is clamped to the last segment and never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] if a non-completion push has a
    /// segment index out of range or moving backwards; local state is left
    /// untouched.
    pub fn apply_remote(&mut self, remote: RemoteTurn) -> Result<TurnChange> {
        let previous = self.phase;
        if previous == SegmentPhase::Completed {
            return Ok(TurnChange {
                previous,
                current: previous,
                segment_changed: false,
            });
        }
        if remote.completed {
            let segment_index = remote.segment_index.min(TOTAL_SEGMENTS - 1).max(self.segment_index);
            let segment_changed = segment_index != self.segment_index;
            self.segment_index = segment_index;
            if remote.player_count > 0 {
                self.player_count = remote.player_count;
            }
            self.handoff_marker_y = None;
            self.phase = SegmentPhase::Completed;
            return Ok(TurnChange {
                previous,
                current: SegmentPhase::Completed,
                segment_changed,
            });
        }
        if remote.segment_index >= TOTAL_SEGMENTS {
            return Err(SessionError::Protocol(format!(
                "segment index {} out of range",
                remote.segment_index
            )));
        }
        if remote.segment_index < self.segment_index {
            return Err(SessionError::Protocol(format!(
                "segment index went backwards from {} to {}",
                self.segment_index, remote.segment_index
            )));
        }

        let segment_changed = remote.segment_index != self.segment_index;
        let current = if remote.player_count < self.required_players {
            SegmentPhase::AwaitingPeers
        } else if remote.can_draw && !remote.waiting_for_others {
            if !segment_changed && previous == SegmentPhase::PlacingHandoff {
                SegmentPhase::PlacingHandoff
            } else {
                SegmentPhase::Drawing
            }
        } else {
            SegmentPhase::WaitingForPeer
        };

        self.segment_index = remote.segment_index;
        self.player_count = remote.player_count;
        self.prior_handoff_y = if remote.segment_index == 0 {
            None
        } else {
            remote.prior_handoff_y
        };
        if current != SegmentPhase::PlacingHandoff {
            self.handoff_marker_y = None;
        }
        self.phase = current;

        Ok(TurnChange {
            previous,
            current,
            segment_changed,
        })
    }

    /// Participant signals that drawing for this segment is done.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside
    /// [`SegmentPhase::Drawing`] or when nothing has been drawn.
    pub fn finish_drawing(&mut self, has_drawn: bool) -> Result<DrawingFinished> {
        if self.phase != SegmentPhase::Drawing {
            return Err(self.rejected("finish drawing"));
        }
        if !has_drawn {
            return Err(self.rejected("finish drawing an empty segment"));
        }
        if self.is_final_segment() {
            return Ok(DrawingFinished::ReadyToSubmit);
        }

        let floor = self.prior_handoff_y.unwrap_or(0.0);
        let marker_y = floor + (self.canonical_height - floor) / 2.0;
        self.handoff_marker_y = Some(marker_y);
        self.phase = SegmentPhase::PlacingHandoff;
        Ok(DrawingFinished::PlacingHandoff { marker_y })
    }

    /// Leave hand-off placement and go back to drawing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside
    /// [`SegmentPhase::PlacingHandoff`].
    pub fn cancel_handoff(&mut self) -> Result<()> {
        if self.phase != SegmentPhase::PlacingHandoff {
            return Err(self.rejected("cancel hand-off"));
        }
        self.handoff_marker_y = None;
        self.phase = SegmentPhase::Drawing;
        Ok(())
    }

    /// Move the hand-off marker to a local y position.
    ///
    /// The position is clamped to `[peek boundary (or 0), surface_height]`
    /// and stored in canonical units, which are returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside
    /// [`SegmentPhase::PlacingHandoff`] and
    /// [`SessionError::DimensionUnavailable`] for an unmeasured surface.
    pub fn drag_handoff(&mut self, local_y: f64, surface_height: f64) -> Result<f64> {
        if !self.phase.accepts_handoff_drag() {
            return Err(self.rejected("move the hand-off marker"));
        }
        let floor = self.prior_handoff_local(surface_height)?.unwrap_or(0.0);
        let clamped = local_y.max(floor).min(surface_height);
        let canonical = normalize::to_canonical(clamped, surface_height, self.canonical_height)?;
        self.handoff_marker_y = Some(canonical);
        Ok(canonical)
    }

    /// Hand-off marker in local units for rendering.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DimensionUnavailable`] for an unmeasured surface.
    pub fn handoff_marker_local(&self, surface_height: f64) -> Result<Option<f64>> {
        self.handoff_marker_y
            .map(|y| normalize::to_local(y, self.canonical_height, surface_height))
            .transpose()
    }

    /// Peek boundary in local units for rendering.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DimensionUnavailable`] for an unmeasured surface.
    pub fn prior_handoff_local(&self, surface_height: f64) -> Result<Option<f64>> {
        self.prior_handoff_y
            .map(|y| normalize::to_local(y, self.canonical_height, surface_height))
            .transpose()
    }

    /// Start a submission, returning the hand-off marker to transmit
    /// (`None` on the final segment).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] when submission is not
    /// enabled, including while a previous submission is in flight.
    pub fn begin_submit(&mut self, has_drawn: bool) -> Result<Option<f64>> {
        if !self.can_submit(has_drawn) {
            return Err(self.rejected("submit"));
        }
        let red_line_y = if self.is_final_segment() {
            None
        } else {
            self.handoff_marker_y
        };
        self.phase = SegmentPhase::Submitted;
        Ok(red_line_y)
    }

    /// The submission left through the transport.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] unless a submission is in flight.
    pub fn submission_sent(&mut self) -> Result<()> {
        if self.phase != SegmentPhase::Submitted {
            return Err(self.rejected("confirm a submission"));
        }
        self.handoff_marker_y = None;
        self.phase = SegmentPhase::WaitingForPeer;
        Ok(())
    }

    /// Forget everything; used when a new session begins.
    pub fn reset(&mut self) {
        *self = Self::new(self.required_players, self.canonical_height);
    }

    fn rejected(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}
