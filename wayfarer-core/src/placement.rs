//! Deterministic spiral placement for new waypoints
//!
//! Positions are a pure function of the insertion index, so replaying the
//! same insertion sequence reproduces the same layout.

use crate::config::LayoutConfig;
use crate::types::WorldPoint;

/// Golden angle in radians.
pub const GOLDEN_ANGLE: f64 = 2.39996;

/// Golden-angle spiral with a radius that wraps within a bounded span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpiralPlacer {
    origin: WorldPoint,
    base_radius: f64,
    radius_step: u64,
    radius_span: u64,
}

impl Default for SpiralPlacer {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}

impl SpiralPlacer {
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            origin: WorldPoint::new(config.origin_x, config.origin_y),
            base_radius: config.base_radius,
            radius_step: config.radius_step,
            // A zero span would divide by zero; treat it as "no growth".
            radius_span: config.radius_span.max(1),
        }
    }

    /// World coordinates for the waypoint inserted at `index`.
    pub fn place(&self, index: usize) -> WorldPoint {
        let idx = index as u64;
        let angle = idx as f64 * GOLDEN_ANGLE;
        let radius =
            self.base_radius + (idx.wrapping_mul(self.radius_step) % self.radius_span) as f64;
        WorldPoint::new(
            self.origin.x + radius * angle.cos(),
            self.origin.y + radius * angle.sin(),
        )
    }

    pub fn origin(&self) -> WorldPoint {
        self.origin
    }
}
