//! Spatial index for pointer hit testing
//!
//! Uses an R-tree (via `rstar`) over waypoint coordinates. Each entry carries
//! its insertion slot so overlapping pins resolve to the most recently
//! inserted one.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::types::{WaypointId, WorldPoint};

/// Index entry for one waypoint pin.
#[derive(Debug, Clone, PartialEq)]
pub struct PinEntry {
    pub id: WaypointId,
    /// Position in store insertion order
    pub slot: usize,
    center: [f64; 2],
}

impl PinEntry {
    pub fn new(id: WaypointId, slot: usize, at: WorldPoint) -> Self {
        Self {
            id,
            slot,
            center: [at.x, at.y],
        }
    }
}

impl RTreeObject for PinEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.center)
    }
}

impl PointDistance for PinEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = point[0] - self.center[0];
        let dy = point[1] - self.center[1];
        dx * dx + dy * dy
    }
}

/// R-tree over pin centres.
#[derive(Clone, Default)]
pub struct SpatialIndex {
    tree: RTree<PinEntry>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("count", &self.tree.size())
            .finish_non_exhaustive()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch; call after removals.
    pub fn rebuild(&mut self, entries: impl Iterator<Item = PinEntry>) {
        self.tree = RTree::bulk_load(entries.collect());
    }

    pub fn insert(&mut self, entry: PinEntry) {
        self.tree.insert(entry);
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The highest-slot entry within `radius` (world units) of `point`.
    pub fn topmost_within(&self, point: WorldPoint, radius: f64) -> Option<&PinEntry> {
        if radius.is_nan() || radius < 0.0 {
            return None;
        }
        self.tree
            .locate_within_distance([point.x, point.y], radius * radius)
            .max_by_key(|entry| entry.slot)
    }
}
