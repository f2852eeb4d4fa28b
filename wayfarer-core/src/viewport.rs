//! Viewport - pan/zoom transform between world and screen space
//!
//! `screen = world * zoom + pan`. Zoom is clamped to the configured limits
//! at all times, including on restore.
//!
//! # Pointer-anchored zoom
//! `zoom_at(p, f)` keeps the world point under `p` fixed on screen, so the
//! map appears to zoom into the cursor.

use serde::{Deserialize, Serialize};

use crate::config::ViewportConfig;
use crate::types::{ScreenPoint, WorldPoint};

/// Zoom clamp range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self::from_config(&ViewportConfig::default())
    }
}

impl ZoomLimits {
    pub fn from_config(config: &ViewportConfig) -> Self {
        Self {
            min: config.zoom_min,
            max: config.zoom_max,
        }
    }

    pub fn clamp(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.min;
        }
        zoom.max(self.min).min(self.max)
    }
}

/// Pan/zoom state for the map canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pan_x: f64,
    pan_y: f64,
    zoom: f64,
    limits: ZoomLimits,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(ZoomLimits::default())
    }
}

impl Viewport {
    pub fn new(limits: ZoomLimits) -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: limits.clamp(1.0),
            limits,
        }
    }

    /// Rebuild from a persisted pan/zoom triple.
    pub fn restore(pan_x: f64, pan_y: f64, zoom: f64, limits: ZoomLimits) -> Self {
        Self {
            pan_x,
            pan_y,
            zoom: limits.clamp(zoom),
            limits,
        }
    }

    pub fn pan(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    // =========================================================================
    // COORDINATE TRANSFORMS
    // =========================================================================

    pub fn world_to_screen(&self, world: WorldPoint) -> ScreenPoint {
        ScreenPoint::new(
            world.x * self.zoom + self.pan_x,
            world.y * self.zoom + self.pan_y,
        )
    }

    pub fn screen_to_world(&self, screen: ScreenPoint) -> WorldPoint {
        WorldPoint::new(
            (screen.x - self.pan_x) / self.zoom,
            (screen.y - self.pan_y) / self.zoom,
        )
    }

    /// Convert a screen-space distance into world units at the current zoom.
    pub fn screen_radius_to_world(&self, radius: f64) -> f64 {
        radius / self.zoom
    }

    // =========================================================================
    // CONTROLS
    // =========================================================================

    /// Pan by a screen-space delta (drag).
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    pub fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        self.pan_x = pan_x;
        self.pan_y = pan_y;
    }

    /// Zoom by `factor`, keeping the world point under `anchor` fixed.
    pub fn zoom_at(&mut self, anchor: ScreenPoint, factor: f64) {
        let new_zoom = self.limits.clamp(self.zoom * factor);
        let ratio = new_zoom / self.zoom;
        self.pan_x = anchor.x - (anchor.x - self.pan_x) * ratio;
        self.pan_y = anchor.y - (anchor.y - self.pan_y) * ratio;
        self.zoom = new_zoom;
    }

    /// Wheel zoom: scrolling down (`delta_y > 0`) zooms out.
    pub fn zoom_wheel(&mut self, anchor: ScreenPoint, delta_y: f64, wheel_factor: f64) {
        let factor = if delta_y > 0.0 {
            1.0 / wheel_factor
        } else {
            wheel_factor
        };
        self.zoom_at(anchor, factor);
    }

    /// Pan that would put `world` at the centre of a canvas of the given size.
    pub fn centering_pan(&self, world: WorldPoint, canvas: (f64, f64)) -> (f64, f64) {
        (
            canvas.0 / 2.0 - world.x * self.zoom,
            canvas.1 / 2.0 - world.y * self.zoom,
        )
    }
}

// =============================================================================
// JOURNEY CAMERA
// =============================================================================

/// Eased pan from the departure view toward a destination during travel.
///
/// The camera only steers while the viewport is where it last left it. Once
/// the user pans or zooms, [`JourneyCamera::step`] stops touching the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JourneyCamera {
    from: (f64, f64),
    to: (f64, f64),
    zoom: f64,
    last: (f64, f64),
}

impl JourneyCamera {
    /// Plan a pan that centres `destination` on the canvas.
    pub fn toward(viewport: &Viewport, destination: WorldPoint, canvas: (f64, f64)) -> Self {
        Self {
            from: viewport.pan(),
            to: viewport.centering_pan(destination, canvas),
            zoom: viewport.zoom(),
            last: viewport.pan(),
        }
    }

    /// Apply the pan for `progress`. Returns `false` without changing
    /// anything if the viewport was moved or zoomed since the last step.
    pub fn step(&mut self, viewport: &mut Viewport, progress: f64) -> bool {
        if viewport.pan() != self.last || viewport.zoom() != self.zoom {
            return false;
        }
        let (x, y) = self.pan_at(progress);
        viewport.set_pan(x, y);
        self.last = viewport.pan();
        true
    }

    /// Pan at `progress` in [0, 1], ease-in-out quadratic.
    pub fn pan_at(&self, progress: f64) -> (f64, f64) {
        let t = progress.clamp(0.0, 1.0);
        let ease = if t < 0.5 {
            2.0 * t * t
        } else {
            -1.0 + (4.0 - 2.0 * t) * t
        };
        (
            self.from.0 + (self.to.0 - self.from.0) * ease,
            self.from.1 + (self.to.1 - self.from.1) * ease,
        )
    }
}
