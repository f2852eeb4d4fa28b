//! Waypoint store
//!
//! Owns waypoint entities in insertion order and enforces identity rules:
//! ids are unique and no two waypoints share a `(name, position)` key, with
//! names compared case-insensitively. Insertion order drives both default
//! traversal and hit-test priority (later pins sit on top).

use chrono::Utc;
use tracing::debug;

use crate::placement::SpiralPlacer;
use crate::spatial::{PinEntry, SpatialIndex};
use crate::types::{OriginKind, PositionIndex, Timestamp, Waypoint, WaypointId, WorldPoint};
use crate::viewport::Viewport;

/// Result of an insertion attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upsert<'a> {
    Created(&'a Waypoint),
    /// The key already existed; nothing was inserted.
    Existing(&'a Waypoint),
}

impl<'a> Upsert<'a> {
    pub fn waypoint(&self) -> &'a Waypoint {
        match self {
            Upsert::Created(wp) | Upsert::Existing(wp) => wp,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WaypointStore {
    waypoints: Vec<Waypoint>,
    index: SpatialIndex,
    placer: SpiralPlacer,
    last_created_at: Timestamp,
}

impl WaypointStore {
    pub fn new(placer: SpiralPlacer) -> Self {
        Self {
            placer,
            ..Self::default()
        }
    }

    /// Rebuild a store from persisted waypoints.
    ///
    /// Entries repeating an earlier id or key are dropped.
    pub fn from_waypoints(placer: SpiralPlacer, waypoints: Vec<Waypoint>) -> Self {
        let mut store = Self::new(placer);
        for wp in waypoints {
            if store.get(wp.id()).is_some()
                || store.find_by_key(wp.name(), wp.position_index()).is_some()
            {
                debug!("Dropping duplicate persisted waypoint '{}'", wp.name());
                continue;
            }
            store.last_created_at = store.last_created_at.max(wp.created_at());
            store.waypoints.push(wp);
        }
        store.rebuild_index();
        store
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoints in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Waypoint> {
        self.waypoints.iter()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn get(&self, id: WaypointId) -> Option<&Waypoint> {
        self.waypoints.iter().find(|wp| wp.id() == id)
    }

    pub fn contains(&self, id: WaypointId) -> bool {
        self.get(id).is_some()
    }

    pub fn find_by_key(&self, name: &str, position_index: PositionIndex) -> Option<&Waypoint> {
        self.waypoints
            .iter()
            .find(|wp| wp.same_key(name, position_index))
    }

    /// First waypoint with this name (case-insensitive), any position.
    pub fn find_by_name(&self, name: &str) -> Option<&Waypoint> {
        let lower = name.to_lowercase();
        self.waypoints
            .iter()
            .find(|wp| wp.name().to_lowercase() == lower)
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Insert unless `(name, position_index)` already exists.
    ///
    /// New waypoints are placed on the spiral keyed by the current store size.
    pub fn upsert(
        &mut self,
        name: &str,
        position_index: PositionIndex,
        origin: OriginKind,
    ) -> Upsert<'_> {
        if let Some(slot) = self.slot_of_key(name, position_index) {
            return Upsert::Existing(&self.waypoints[slot]);
        }
        let at = self.placer.place(self.waypoints.len());
        Upsert::Created(self.push(name, position_index, at, origin))
    }

    /// Place a manual waypoint at explicit world coordinates.
    pub fn manual_insert(
        &mut self,
        name: &str,
        coordinates: WorldPoint,
        position_index: PositionIndex,
    ) -> Upsert<'_> {
        if let Some(slot) = self.slot_of_key(name, position_index) {
            return Upsert::Existing(&self.waypoints[slot]);
        }
        Upsert::Created(self.push(name, position_index, coordinates, OriginKind::Manual))
    }

    /// Remove every waypoint failing `keep`. Returns how many were removed.
    pub fn reset(&mut self, keep: impl Fn(&Waypoint) -> bool) -> usize {
        let before = self.waypoints.len();
        self.waypoints.retain(|wp| keep(wp));
        self.rebuild_index();
        before - self.waypoints.len()
    }

    fn push(
        &mut self,
        name: &str,
        position_index: PositionIndex,
        at: WorldPoint,
        origin: OriginKind,
    ) -> &Waypoint {
        // Wall clock can step backwards; creation stamps must not.
        let created_at = Utc::now().timestamp_millis().max(self.last_created_at);
        self.last_created_at = created_at;

        let wp = Waypoint::new(name, position_index, at, origin, created_at);
        let slot = self.waypoints.len();
        self.index.insert(PinEntry::new(wp.id(), slot, at));
        debug!(
            "Created {:?} waypoint '{}' at message {} ({:.1}, {:.1})",
            origin, wp.name(), position_index, at.x, at.y
        );
        self.waypoints.push(wp);
        &self.waypoints[slot]
    }

    fn slot_of_key(&self, name: &str, position_index: PositionIndex) -> Option<usize> {
        self.waypoints
            .iter()
            .position(|wp| wp.same_key(name, position_index))
    }

    fn rebuild_index(&mut self) {
        self.index.rebuild(
            self.waypoints
                .iter()
                .enumerate()
                .map(|(slot, wp)| PinEntry::new(wp.id(), slot, wp.coordinates())),
        );
    }

    // =========================================================================
    // HIT TESTING
    // =========================================================================

    /// Topmost (last inserted) waypoint within `max_screen_radius` pixels of
    /// `world_point`, measured at the viewport's zoom.
    pub fn find_near(
        &self,
        world_point: WorldPoint,
        max_screen_radius: f64,
        viewport: &Viewport,
    ) -> Option<&Waypoint> {
        let radius = viewport.screen_radius_to_world(max_screen_radius);
        self.index
            .topmost_within(world_point, radius)
            .and_then(|entry| self.waypoints.get(entry.slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LORE_SENTINEL;
    use crate::viewport::ZoomLimits;
    use pretty_assertions::assert_eq;

    fn store() -> WaypointStore {
        WaypointStore::new(SpiralPlacer::default())
    }

    #[test]
    fn test_upsert_dedups_on_name_and_position() {
        let mut store = store();
        let first = store.upsert("Silver Lake", 4, OriginKind::Dynamic).waypoint().id();

        let again = store.upsert("silver lake", 4, OriginKind::Dynamic);
        assert!(!again.is_created());
        assert_eq!(again.waypoint().id(), first);
        assert_eq!(store.len(), 1);

        // Same name later in the story is a distinct waypoint.
        assert!(store.upsert("Silver Lake", 9, OriginKind::Dynamic).is_created());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_repeated_inserts_do_not_grow() {
        let mut store = store();
        for i in 0..5 {
            store.upsert(&format!("Place {i}"), i, OriginKind::Dynamic);
        }
        let ids: Vec<_> = store.iter().map(|wp| wp.id()).collect();
        for i in 0..5 {
            let up = store.upsert(&format!("Place {i}"), i, OriginKind::Dynamic);
            assert_eq!(up.waypoint().id(), ids[i as usize]);
        }
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_same_sequence_same_layout() {
        let mut a = store();
        let mut b = store();
        for (i, name) in ["Ravenwood", "Silver Lake", "Stormhaven"].iter().enumerate() {
            a.upsert(name, i as i64, OriginKind::Dynamic);
            b.upsert(name, i as i64, OriginKind::Dynamic);
        }
        let coords_a: Vec<_> = a.iter().map(|wp| wp.coordinates()).collect();
        let coords_b: Vec<_> = b.iter().map(|wp| wp.coordinates()).collect();
        assert_eq!(coords_a, coords_b);
    }

    #[test]
    fn test_reset_keeps_lore_and_reindexes() {
        let mut store = store();
        store.upsert("Eldoria", LORE_SENTINEL, OriginKind::Lore);
        store.upsert("Ravenwood", 3, OriginKind::Dynamic);
        store.manual_insert("Camp", WorldPoint::new(5.0, 5.0), 3);

        let removed = store.reset(|wp| wp.origin() == OriginKind::Lore);
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);

        let vp = Viewport::default();
        assert!(store.find_near(WorldPoint::new(5.0, 5.0), 15.0, &vp).is_none());
        let lore = store.find_by_name("eldoria").unwrap();
        assert!(store
            .find_near(lore.coordinates(), 1.0, &vp)
            .is_some_and(|wp| wp.name() == "Eldoria"));
    }

    #[test]
    fn test_find_near_prefers_latest_and_scales_with_zoom() {
        let mut store = store();
        let under = store
            .manual_insert("Lower", WorldPoint::new(100.0, 100.0), 0)
            .waypoint()
            .id();
        let over = store
            .manual_insert("Upper", WorldPoint::new(104.0, 100.0), 0)
            .waypoint()
            .id();

        let vp = Viewport::default();
        let hit = store.find_near(WorldPoint::new(101.0, 100.0), 15.0, &vp).unwrap();
        assert_eq!(hit.id(), over);
        assert_ne!(hit.id(), under);

        // 12 world units away: inside 15px at zoom 1, outside at zoom 2.
        let target = WorldPoint::new(100.0, 112.0);
        assert!(store.find_near(target, 15.0, &vp).is_some());
        let zoomed = Viewport::restore(0.0, 0.0, 2.0, ZoomLimits::default());
        assert!(store.find_near(target, 15.0, &zoomed).is_none());
    }

    #[test]
    fn test_created_at_is_monotonic() {
        let mut store = store();
        for i in 0..20 {
            store.upsert(&format!("Town {i}"), i, OriginKind::Dynamic);
        }
        let stamps: Vec<_> = store.iter().map(|wp| wp.created_at()).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_from_waypoints_drops_duplicates() {
        let mut original = store();
        original.upsert("Ravenwood", 1, OriginKind::Dynamic);
        let mut persisted = original.waypoints().to_vec();
        persisted.push(persisted[0].clone());

        let restored = WaypointStore::from_waypoints(SpiralPlacer::default(), persisted);
        assert_eq!(restored.len(), 1);
    }
}
