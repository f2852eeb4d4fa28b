//! Map state owned by one chat session
//!
//! Bundles the waypoint store, discovery state and viewport behind plain
//! synchronous operations. Nothing here suspends; the travel controller and
//! session wrap this in a mutex and call in.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::config::WayfarerConfig;
use crate::discovery::DiscoveryState;
use crate::extract::LocationExtractor;
use crate::host::LoreEntry;
use crate::placement::SpiralPlacer;
use crate::store::{Upsert, WaypointStore};
use crate::types::{OriginKind, PositionIndex, Waypoint, WaypointId, WorldPoint, LORE_SENTINEL};
use crate::viewport::{Viewport, ZoomLimits};

/// What a message ingestion changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub created: Vec<WaypointId>,
    pub revealed: Vec<WaypointId>,
}

/// Position change and reveals produced by an arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalSweep {
    pub position: PositionIndex,
    pub revealed: Vec<WaypointId>,
}

/// Map state shared between the session and an in-flight journey.
pub type SharedMapState = Arc<Mutex<MapState>>;

/// Lock shared state, recovering from a poisoned mutex.
pub fn lock_state(state: &SharedMapState) -> MutexGuard<'_, MapState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct MapState {
    pub(crate) store: WaypointStore,
    pub(crate) discovery: DiscoveryState,
    pub(crate) viewport: Viewport,
    pub(crate) background_image: Option<String>,
    extractor: LocationExtractor,
}

impl Default for MapState {
    fn default() -> Self {
        Self::new(&WayfarerConfig::default())
    }
}

impl MapState {
    pub fn new(config: &WayfarerConfig) -> Self {
        Self {
            store: WaypointStore::new(SpiralPlacer::from_config(&config.layout)),
            discovery: DiscoveryState::from_config(&config.discovery),
            viewport: Viewport::new(ZoomLimits::from_config(&config.viewport)),
            background_image: None,
            extractor: LocationExtractor::new(),
        }
    }

    /// Assemble from already-restored parts.
    pub fn from_parts(
        store: WaypointStore,
        discovery: DiscoveryState,
        viewport: Viewport,
        background_image: Option<String>,
    ) -> Self {
        Self {
            store,
            discovery,
            viewport,
            background_image,
            extractor: LocationExtractor::new(),
        }
    }

    pub fn into_shared(self) -> SharedMapState {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &WaypointStore {
        &self.store
    }

    pub fn discovery(&self) -> &DiscoveryState {
        &self.discovery
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn background_image(&self) -> Option<&str> {
        self.background_image.as_deref()
    }

    pub fn set_background_image(&mut self, image: Option<String>) {
        self.background_image = image;
    }

    pub fn current_position(&self) -> PositionIndex {
        self.discovery.current_position()
    }

    pub fn is_discovered(&self, waypoint: &Waypoint) -> bool {
        self.discovery.is_discovered(waypoint)
    }

    // =========================================================================
    // HOST-DRIVEN UPDATES
    // =========================================================================

    /// A message was appended at `index`: move there, extract and insert
    /// new locations, then sweep the whole store.
    pub fn ingest_message(&mut self, position: PositionIndex, text: &str) -> IngestReport {
        let mut revealed = self.discovery.move_to(position, &self.store);

        let mut created = Vec::new();
        for name in self.extractor.extract(text) {
            if let Upsert::Created(wp) = self.store.upsert(&name, position, OriginKind::Dynamic) {
                created.push(wp.id());
            }
        }

        revealed.extend(self.discovery.sweep(&self.store));
        if !created.is_empty() {
            debug!(
                "Message {} yielded {} new location(s)",
                position,
                created.len()
            );
        }
        IngestReport { created, revealed }
    }

    /// Seed lore waypoints from world-knowledge entries. Returns how many
    /// new lore locations were added.
    pub fn seed_lore(&mut self, entries: &[LoreEntry]) -> usize {
        let mut found = 0;
        for entry in entries {
            if entry.text.trim().is_empty() {
                continue;
            }
            let text = format!("{} {}", entry.tags.join(" "), entry.text);
            for name in self.extractor.extract(&text) {
                if self.has_lore_named(&name) {
                    continue;
                }
                if self
                    .store
                    .upsert(&name, LORE_SENTINEL, OriginKind::Lore)
                    .is_created()
                {
                    found += 1;
                }
            }
        }
        if found > 0 {
            info!("Found {} locations in world knowledge", found);
        }
        found
    }

    fn has_lore_named(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.store
            .iter()
            .any(|wp| wp.origin() == OriginKind::Lore && wp.name().to_lowercase() == lower)
    }

    // =========================================================================
    // USER-DRIVEN UPDATES
    // =========================================================================

    /// Place a manual waypoint at world coordinates, anchored at `position`.
    pub fn place_manual(
        &mut self,
        name: &str,
        at: WorldPoint,
        position: PositionIndex,
    ) -> WaypointId {
        self.store.manual_insert(name, at, position).waypoint().id()
    }

    /// Arrival step shared by instant and timed travel.
    pub fn arrive(&mut self, position: PositionIndex) -> ArrivalSweep {
        let revealed = self.discovery.move_to(position, &self.store);
        ArrivalSweep { position, revealed }
    }

    pub fn set_fog_enabled(&mut self, enabled: bool) {
        self.discovery.set_fog_enabled(enabled);
    }

    pub fn set_discovery_radius(&mut self, radius: u64) -> Vec<WaypointId> {
        self.discovery.set_radius(radius, &self.store)
    }

    /// Explicitly reveal one waypoint. Returns `true` if it was newly recorded.
    pub fn reveal(&mut self, id: WaypointId) -> bool {
        match self.store.get(id) {
            Some(wp) => self.discovery.reveal(wp),
            None => false,
        }
    }

    pub fn reveal_all(&mut self) -> usize {
        self.discovery.reveal_all(&self.store)
    }

    /// Drop dynamic and manual waypoints, keep lore, rewind to message 0.
    pub fn clear(&mut self) -> usize {
        let removed = self.store.reset(|wp| wp.origin() == OriginKind::Lore);
        let lore_ids: Vec<_> = self.store.iter().map(|wp| wp.id()).collect();
        self.discovery.reset(lore_ids);
        removed
    }

    /// Chat boundary: [`MapState::clear`] plus dropping the background art.
    pub fn reset_chat(&mut self) -> usize {
        self.background_image = None;
        self.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lore(tags: &[&str], text: &str) -> LoreEntry {
        LoreEntry {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_ingest_creates_and_reveals() {
        let mut state = MapState::default();
        let report = state.ingest_message(0, "The caravan arrives at Silver Lake by noon.");
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.revealed, report.created);
        assert_eq!(state.current_position(), 0);

        let report = state.ingest_message(0, "Again they reach Silver Lake.");
        assert!(report.created.is_empty());
        assert_eq!(state.store().len(), 1);
    }

    #[test]
    fn test_ingest_moves_position_and_sweeps_old_waypoints() {
        let mut state = MapState::default();
        state.ingest_message(0, "Nothing here.");
        state.ingest_message(8, "They rest in Ravenwood.");
        let ravenwood = state.store().find_by_name("Ravenwood").unwrap().clone();
        assert!(state.discovery().discovered_ids().contains(&ravenwood.id()));

        state.ingest_message(40, "Far away now.");
        assert_eq!(state.current_position(), 40);
        assert!(state.is_discovered(&ravenwood));
    }

    #[test]
    fn test_ingest_reports_existing_waypoints_it_reveals() {
        let mut state = MapState::default();
        state.set_fog_enabled(false);
        state.ingest_message(10, "They rest in Ravenwood.");
        state.set_fog_enabled(true);
        let report = state.ingest_message(0, "Far from anywhere.");
        assert!(report.revealed.is_empty());

        let ravenwood = state.store().find_by_name("Ravenwood").unwrap().id();
        let report = state.ingest_message(8, "The road bends north.");
        assert!(report.created.is_empty());
        assert_eq!(report.revealed, vec![ravenwood]);
        assert!(state.discovery().discovered_ids().contains(&ravenwood));
    }

    #[test]
    fn test_seed_lore_dedups_by_name() {
        let mut state = MapState::default();
        let entries = vec![
            lore(&["Highcrest"], "The old capital lies beyond Stormhaven."),
            lore(&["stormhaven"], "Stormhaven is a port."),
            lore(&[], "   "),
        ];
        assert_eq!(state.seed_lore(&entries), 2);
        assert_eq!(state.seed_lore(&entries), 0);
        assert!(state
            .store()
            .iter()
            .all(|wp| wp.origin() == OriginKind::Lore && !wp.is_anchored()));
    }

    #[test]
    fn test_clear_keeps_lore_and_reseeds() {
        let mut state = MapState::default();
        state.seed_lore(&[lore(&[], "Travellers speak of Stormhaven.")]);
        state.ingest_message(3, "They enter Ravenwood.");
        state.place_manual("Camp", WorldPoint::new(0.0, 0.0), 3);
        state.set_background_image(Some("data:image/png;base64,AAAA".into()));

        assert_eq!(state.clear(), 2);
        assert_eq!(state.store().len(), 1);
        assert_eq!(state.current_position(), 0);
        let lore_id = state.store().waypoints()[0].id();
        assert_eq!(
            state.discovery().discovered_ids().iter().copied().collect::<Vec<_>>(),
            vec![lore_id]
        );
        assert!(state.background_image().is_some());

        state.reset_chat();
        assert!(state.background_image().is_none());
    }
}
