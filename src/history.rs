//! Stroke history with undo/redo and base-layer replay.
//!
//! Strokes are recorded as vector data in local display coordinates. Undo and
//! redo never patch the surface incrementally; they clear it, draw the base
//! layer (the previous contributor's artifact, if any) and replay every
//! committed stroke in order.
//!
//! The base layer arrives as an encoded raster payload. Decoding is
//! asynchronous, so [`StrokeHistory::reset`] hands out a [`DecodeTicket`]
//! tagged with a generation number and [`StrokeHistory::install_base`] drops
//! images whose generation is no longer current.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::normalize::Point;
use crate::protocol::RasterPayload;
use crate::turn::SegmentPhase;

// ── Style ───────────────────────────────────────────────────────────

/// Shape drawn at the ends of an open stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    Butt,
    #[default]
    Round,
    Square,
}

/// Shape drawn where two stroke segments meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    Miter,
    #[default]
    Round,
    Bevel,
}

/// Rendering style, frozen when a stroke begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: String,
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: "black".to_owned(),
            width: 5.0,
            cap: LineCap::Round,
            join: LineJoin::Round,
        }
    }
}

/// A committed polyline in local display coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub style: StrokeStyle,
}

/// Line piece produced by [`StrokeHistory::extend_stroke`] for incremental
/// rendering while the pointer moves.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSegment {
    pub from: Point,
    pub to: Point,
    pub style: StrokeStyle,
}

// ── Collaborator seams ──────────────────────────────────────────────

/// Rendering target for replay.
pub trait Surface {
    /// Decoded raster image the surface can draw.
    type Image;

    fn clear(&mut self);

    /// Draw the base layer at the origin, scaled to the surface.
    fn draw_image(&mut self, image: &Self::Image);

    fn draw_stroke(&mut self, stroke: &Stroke);
}

/// Decodes an encoded raster payload into a drawable image.
///
/// Implementations may take arbitrarily long; the caller discards results
/// that arrive after a newer reset.
#[async_trait]
pub trait RasterDecoder: Send + Sync {
    type Image: Send;

    async fn decode(&self, payload: &RasterPayload) -> Result<Self::Image>;
}

/// A base-layer decode requested by [`StrokeHistory::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTicket {
    pub generation: u64,
    pub payload: RasterPayload,
}

impl DecodeTicket {
    /// Run the decoder, keeping the generation attached to the result.
    ///
    /// # Errors
    ///
    /// Propagates the decoder's error.
    pub async fn decode<D: RasterDecoder>(&self, decoder: &D) -> Result<DecodedBase<D::Image>> {
        let image = decoder.decode(&self.payload).await?;
        Ok(DecodedBase {
            generation: self.generation,
            image,
        })
    }
}

/// Output of [`DecodeTicket::decode`], ready for [`StrokeHistory::install_base`].
#[derive(Debug, Clone)]
pub struct DecodedBase<I> {
    pub generation: u64,
    pub image: I,
}

// ── History ─────────────────────────────────────────────────────────

/// Committed strokes and redo buffer for the current segment.
///
/// Invariants: the committed list and redo buffer are disjoint, and
/// committing a stroke empties the redo buffer.
#[derive(Debug)]
pub struct StrokeHistory<I> {
    strokes: Vec<Stroke>,
    redo: Vec<Stroke>,
    in_progress: Option<Stroke>,
    base: Option<I>,
    generation: u64,
}

impl<I> Default for StrokeHistory<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> StrokeHistory<I> {
    pub fn new() -> Self {
        Self {
            strokes: Vec::new(),
            redo: Vec::new(),
            in_progress: None,
            base: None,
            generation: 0,
        }
    }

    /// Start a stroke if the phase allows drawing.
    ///
    /// Returns `false` when the input was ignored. A stroke that was still
    /// open is committed first.
    pub fn begin_stroke(&mut self, phase: SegmentPhase, point: Point, style: StrokeStyle) -> bool {
        if !phase.accepts_drawing() {
            trace!(%phase, "ignoring stroke start");
            return false;
        }
        if self.in_progress.is_some() {
            self.commit_stroke();
        }
        self.in_progress = Some(Stroke {
            points: vec![point],
            style,
        });
        true
    }

    /// Append a point to the open stroke.
    ///
    /// Returns the piece to draw, or `None` when no stroke is open.
    pub fn extend_stroke(&mut self, point: Point) -> Option<LineSegment> {
        let stroke = self.in_progress.as_mut()?;
        let from = stroke.points.last().copied().unwrap_or(point);
        stroke.points.push(point);
        Some(LineSegment {
            from,
            to: point,
            style: stroke.style.clone(),
        })
    }

    /// Close the open stroke.
    ///
    /// Strokes with fewer than two points are discarded. Returns `true` if a
    /// stroke was added to the committed list.
    pub fn commit_stroke(&mut self) -> bool {
        let Some(stroke) = self.in_progress.take() else {
            return false;
        };
        if stroke.points.len() < 2 {
            trace!("discarding single-point stroke");
            return false;
        }
        self.strokes.push(stroke);
        self.redo.clear();
        true
    }

    /// Remove the last committed stroke and replay.
    ///
    /// No-op outside [`SegmentPhase::Drawing`], while a stroke is open or
    /// when nothing is committed.
    pub fn undo<S: Surface<Image = I>>(&mut self, phase: SegmentPhase, surface: &mut S) -> bool {
        if !self.can_undo(phase) {
            return false;
        }
        let Some(stroke) = self.strokes.pop() else {
            return false;
        };
        self.redo.push(stroke);
        self.replay(surface);
        true
    }

    /// Restore the most recently undone stroke and replay.
    ///
    /// No-op outside [`SegmentPhase::Drawing`], while a stroke is open or
    /// when the redo buffer is empty.
    pub fn redo<S: Surface<Image = I>>(&mut self, phase: SegmentPhase, surface: &mut S) -> bool {
        if !self.can_redo(phase) {
            return false;
        }
        let Some(stroke) = self.redo.pop() else {
            return false;
        };
        self.strokes.push(stroke);
        self.replay(surface);
        true
    }

    /// Clear the surface, draw the base layer, then every committed stroke.
    pub fn replay<S: Surface<Image = I>>(&self, surface: &mut S) {
        surface.clear();
        if let Some(base) = &self.base {
            surface.draw_image(base);
        }
        for stroke in &self.strokes {
            surface.draw_stroke(stroke);
        }
    }

    /// Forget all strokes for a new segment.
    ///
    /// Any pending decode becomes stale. Returns a ticket when a prior
    /// artifact has to be decoded into the new base layer.
    pub fn reset(&mut self, prior_artifact: Option<RasterPayload>) -> Option<DecodeTicket> {
        self.strokes.clear();
        self.redo.clear();
        self.in_progress = None;
        self.base = None;
        self.generation = self.generation.wrapping_add(1);
        debug!(generation = self.generation, has_prior = prior_artifact.is_some(), "stroke history reset");
        prior_artifact.map(|payload| DecodeTicket {
            generation: self.generation,
            payload,
        })
    }

    /// Install a decoded base layer and replay.
    ///
    /// Returns `false`, leaving the surface untouched, if a newer reset
    /// happened after the decode was requested.
    pub fn install_base<S: Surface<Image = I>>(&mut self, decoded: DecodedBase<I>, surface: &mut S) -> bool {
        if decoded.generation != self.generation {
            debug!(
                stale = decoded.generation,
                current = self.generation,
                "dropping stale base layer"
            );
            return false;
        }
        self.base = Some(decoded.image);
        self.replay(surface);
        true
    }

    /// `true` once a stroke is committed for this segment.
    pub fn has_drawn(&self) -> bool {
        !self.strokes.is_empty()
    }

    pub fn is_stroke_open(&self) -> bool {
        self.in_progress.is_some()
    }

    /// Whether an undo button should be enabled in `phase`.
    pub fn can_undo(&self, phase: SegmentPhase) -> bool {
        phase.accepts_drawing() && self.in_progress.is_none() && !self.strokes.is_empty()
    }

    pub fn can_redo(&self, phase: SegmentPhase) -> bool {
        phase.accepts_drawing() && self.in_progress.is_none() && !self.redo.is_empty()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
