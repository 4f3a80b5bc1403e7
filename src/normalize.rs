//! Conversion between canonical and local surface coordinates.
//!
//! The remote counterpart reasons about positions on a fixed canonical
//! surface ([`CANONICAL_SURFACE`]). Each client renders at whatever size fits
//! its window, so every positional value that crosses the wire is scaled
//! through this module: inbound peek boundaries with [`to_local`], outbound
//! hand-off markers with [`to_canonical`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Canonical surface the remote counterpart composites onto.
pub const CANONICAL_SURFACE: SurfaceSize = SurfaceSize {
    width: 1080.0,
    height: 1920.0,
};

/// Margin kept free around the surface on each side of the viewport.
pub const VIEWPORT_MARGIN: f64 = 20.0;

/// Width and height of a drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns `true` once both dimensions have been measured.
    pub fn is_measured(&self) -> bool {
        is_usable(self.width) && is_usable(self.height)
    }

    /// Width divided by height.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DimensionUnavailable`] if the surface is unmeasured.
    pub fn aspect_ratio(&self) -> Result<f64> {
        if !self.is_measured() {
            return Err(SessionError::DimensionUnavailable);
        }
        Ok(self.width / self.height)
    }
}

/// A position on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn is_usable(size: f64) -> bool {
    size.is_finite() && size > 0.0
}

fn rescale(value: f64, source: f64, target: f64) -> Result<f64> {
    if !is_usable(source) || !is_usable(target) {
        return Err(SessionError::DimensionUnavailable);
    }
    Ok(value * (target / source))
}

/// Scale a local scalar into canonical units.
///
/// # Errors
///
/// Returns [`SessionError::DimensionUnavailable`] if either size is zero,
/// negative or not finite.
pub fn to_canonical(local: f64, local_size: f64, canonical_size: f64) -> Result<f64> {
    rescale(local, local_size, canonical_size)
}

/// Scale a canonical scalar into local units.
///
/// # Errors
///
/// Returns [`SessionError::DimensionUnavailable`] if either size is zero,
/// negative or not finite.
pub fn to_local(canonical: f64, canonical_size: f64, local_size: f64) -> Result<f64> {
    rescale(canonical, canonical_size, local_size)
}

/// Scale a local point into canonical coordinates.
///
/// # Errors
///
/// Returns [`SessionError::DimensionUnavailable`] if either surface is unmeasured.
pub fn point_to_canonical(point: Point, local: SurfaceSize, canonical: SurfaceSize) -> Result<Point> {
    Ok(Point {
        x: to_canonical(point.x, local.width, canonical.width)?,
        y: to_canonical(point.y, local.height, canonical.height)?,
    })
}

/// Scale a canonical point into local coordinates.
///
/// # Errors
///
/// Returns [`SessionError::DimensionUnavailable`] if either surface is unmeasured.
pub fn point_to_local(point: Point, canonical: SurfaceSize, local: SurfaceSize) -> Result<Point> {
    Ok(Point {
        x: to_local(point.x, canonical.width, local.width)?,
        y: to_local(point.y, canonical.height, local.height)?,
    })
}

/// Largest surface with the canonical aspect ratio that fits the viewport.
///
/// Keeps [`VIEWPORT_MARGIN`] free on every side, never grows past the
/// canonical size and rounds to whole pixels.
///
/// # Errors
///
/// Returns [`SessionError::DimensionUnavailable`] if the viewport leaves no
/// room once the margins are removed.
pub fn fit_to_viewport(viewport: SurfaceSize, canonical: SurfaceSize) -> Result<SurfaceSize> {
    let target_ratio = canonical.aspect_ratio()?;
    let available = SurfaceSize::new(
        viewport.width - VIEWPORT_MARGIN * 2.0,
        viewport.height - VIEWPORT_MARGIN * 2.0,
    );
    if !available.is_measured() {
        return Err(SessionError::DimensionUnavailable);
    }

    let width_based_height = available.width / target_ratio;
    let (mut width, mut height) = if width_based_height <= available.height {
        (available.width, width_based_height)
    } else {
        (available.height * target_ratio, available.height)
    };

    if width > canonical.width || height > canonical.height {
        let scale = (canonical.width / width).min(canonical.height / height);
        width *= scale;
        height *= scale;
    }

    Ok(SurfaceSize::new(width.round(), height.round()))
}
