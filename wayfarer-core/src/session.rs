//! Per-chat map session
//!
//! [`MapSession`] is the entry point hosts talk to. It owns the shared map
//! state and the travel controller, reacts to host events, and schedules
//! snapshot saves in the background after every mutation.
//!
//! `MapSession` is cheap to clone; clones share one session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::art::{build_map_request, ArtService};
use crate::config::WayfarerConfig;
use crate::error::{ArtError, TravelError};
use crate::host::{EventHub, LoreSource, MessageLog, StaticLore, Subscription};
use crate::persistence::{MapSnapshot, SnapshotStore};
use crate::render::{quick_travel, MapView, QuickTravelEntry, VisibleWaypoint};
use crate::state::{lock_state, IngestReport, MapState, SharedMapState};
use crate::travel::{ArrivalHook, TravelController, TravelPhase, TravelStart};
use crate::types::{position_of, ScreenPoint, WaypointId, WorldPoint};

// =============================================================================
// BACKGROUND SAVES
// =============================================================================

/// Fire-and-forget snapshot writer. Saves may finish out of order; a save
/// older than the last one written is skipped.
struct BackgroundSaver {
    store: Arc<dyn SnapshotStore>,
    scheduled: AtomicU64,
    written: tokio::sync::Mutex<u64>,
}

impl BackgroundSaver {
    fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            scheduled: AtomicU64::new(0),
            written: tokio::sync::Mutex::new(0),
        }
    }

    fn schedule(self: &Arc<Self>, snapshot: MapSnapshot) {
        let Ok(handle) = Handle::try_current() else {
            debug!("No runtime; snapshot save skipped");
            return;
        };
        let seq = self.scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        let saver = Arc::clone(self);
        handle.spawn(async move {
            let mut written = saver.written.lock().await;
            if *written > seq {
                return;
            }
            match saver.store.save(&snapshot).await {
                Ok(()) => *written = seq,
                Err(err) => warn!("Failed to save map snapshot: {:#}", err),
            }
        });
    }

    async fn save_now(&self, snapshot: &MapSnapshot) -> anyhow::Result<()> {
        let seq = self.scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        let mut written = self.written.lock().await;
        self.store.save(snapshot).await?;
        *written = seq;
        Ok(())
    }
}

// =============================================================================
// BUILDER
// =============================================================================

pub struct SessionBuilder {
    config: WayfarerConfig,
    log: Arc<dyn MessageLog>,
    lore: Arc<dyn LoreSource>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    art: Option<Arc<dyn ArtService>>,
    initial: Option<MapSnapshot>,
}

impl SessionBuilder {
    pub fn lore(mut self, lore: Arc<dyn LoreSource>) -> Self {
        self.lore = lore;
        self
    }

    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn art_service(mut self, art: Arc<dyn ArtService>) -> Self {
        self.art = Some(art);
        self
    }

    /// Start from a saved snapshot instead of an empty map.
    pub fn restore(mut self, snapshot: MapSnapshot) -> Self {
        self.initial = Some(snapshot);
        self
    }

    pub fn build(self) -> MapSession {
        let state = match self.initial {
            Some(snapshot) => snapshot.into_state(&self.config),
            None => MapState::new(&self.config),
        }
        .into_shared();
        let saver = self.snapshots.map(|store| Arc::new(BackgroundSaver::new(store)));

        let canvas = (self.config.viewport.canvas_width, self.config.viewport.canvas_height);
        let mut travel = TravelController::new(self.config.travel.clone(), canvas);
        if let Some(saver) = &saver {
            let saver = Arc::clone(saver);
            let hook_state = Arc::clone(&state);
            let hook: ArrivalHook = Arc::new(move |_| {
                let snapshot = MapSnapshot::capture(&lock_state(&hook_state));
                saver.schedule(snapshot);
            });
            travel = travel.with_arrival_hook(hook);
        }

        MapSession {
            inner: Arc::new(SessionInner {
                config: self.config,
                state,
                log: self.log,
                lore: self.lore,
                travel,
                saver,
                art: self.art,
            }),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

struct SessionInner {
    config: WayfarerConfig,
    state: SharedMapState,
    log: Arc<dyn MessageLog>,
    lore: Arc<dyn LoreSource>,
    travel: TravelController,
    saver: Option<Arc<BackgroundSaver>>,
    art: Option<Arc<dyn ArtService>>,
}

/// Result of a pointer click on the map.
#[derive(Debug)]
pub enum ClickOutcome {
    /// A pin was hit and travel toward it was accepted.
    Travel(TravelStart),
    /// Empty map; the world point under the pointer, for manual placement.
    Miss(WorldPoint),
}

#[derive(Clone)]
pub struct MapSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for MapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSession")
            .field("waypoints", &self.with_state(|s| s.store().len()))
            .field("travel", &self.inner.travel.phase())
            .finish_non_exhaustive()
    }
}

impl MapSession {
    pub fn builder(config: WayfarerConfig, log: Arc<dyn MessageLog>) -> SessionBuilder {
        SessionBuilder {
            config,
            log,
            lore: Arc::new(StaticLore::empty()),
            snapshots: None,
            art: None,
            initial: None,
        }
    }

    pub fn config(&self) -> &WayfarerConfig {
        &self.inner.config
    }

    /// Run `f` against the current state.
    pub fn with_state<R>(&self, f: impl FnOnce(&MapState) -> R) -> R {
        f(&lock_state(&self.inner.state))
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut MapState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = lock_state(&self.inner.state);
            let result = f(&mut state);
            let snapshot = self.inner.saver.as_ref().map(|_| MapSnapshot::capture(&state));
            (result, snapshot)
        };
        if let (Some(saver), Some(snapshot)) = (&self.inner.saver, snapshot) {
            saver.schedule(snapshot);
        }
        result
    }

    // =========================================================================
    // HOST EVENTS
    // =========================================================================

    /// Subscribe to host events. Dropping the returned handles detaches them.
    pub fn attach(&self, hub: &EventHub) -> Vec<Subscription> {
        let appended = self.clone();
        let reset = self.clone();
        vec![
            hub.on_message_appended(move |index| {
                appended.on_message_appended(index);
            }),
            hub.on_chat_reset(move || {
                reset.on_chat_reset();
            }),
        ]
    }

    /// Ingest the message now at `index` in the host log.
    pub fn on_message_appended(&self, index: usize) -> IngestReport {
        let Some(message) = self.inner.log.message_at(index) else {
            debug!("Message {} not in log; ignoring", index);
            return IngestReport::default();
        };
        self.mutate(|state| state.ingest_message(position_of(index), &message.text))
    }

    /// New chat: cancel travel, reset the map, then rescan world knowledge.
    pub fn on_chat_reset(&self) -> usize {
        self.inner.travel.cancel();
        let lore = self.inner.lore.list_entries();
        self.mutate(|state| {
            state.reset_chat();
            state.seed_lore(&lore)
        })
    }

    /// Rescan world knowledge for lore locations. Returns how many were new.
    pub fn scan_lore(&self) -> usize {
        let lore = self.inner.lore.list_entries();
        self.mutate(|state| state.seed_lore(&lore))
    }

    // =========================================================================
    // USER ACTIONS
    // =========================================================================

    /// Drop chat-derived and manual waypoints, keeping lore and background.
    pub fn clear_map(&self) -> usize {
        self.inner.travel.cancel();
        let removed = self.mutate(MapState::clear);
        info!("Map cleared ({} waypoints removed)", removed);
        removed
    }

    pub fn reveal_all(&self) -> usize {
        self.mutate(MapState::reveal_all)
    }

    pub fn set_fog_enabled(&self, enabled: bool) {
        self.mutate(|state| state.set_fog_enabled(enabled));
    }

    pub fn set_discovery_radius(&self, radius: u64) -> Vec<WaypointId> {
        self.mutate(|state| state.set_discovery_radius(radius))
    }

    pub fn pan_by(&self, dx: f64, dy: f64) {
        self.mutate(|state| state.viewport_mut().pan_by(dx, dy));
    }

    pub fn zoom_at(&self, anchor: ScreenPoint, factor: f64) {
        self.mutate(|state| state.viewport_mut().zoom_at(anchor, factor));
    }

    pub fn zoom_wheel(&self, anchor: ScreenPoint, delta_y: f64) {
        let wheel_factor = self.inner.config.viewport.wheel_factor;
        self.mutate(|state| state.viewport_mut().zoom_wheel(anchor, delta_y, wheel_factor));
    }

    /// Hit-test a click and travel to the pin under it, if any.
    pub fn click(&self, at: ScreenPoint) -> Result<ClickOutcome, TravelError> {
        let hit_radius = self.inner.config.viewport.hit_radius;
        let (world, hit) = self.with_state(|state| {
            let world = state.viewport().screen_to_world(at);
            let hit = state
                .store()
                .find_near(world, hit_radius, state.viewport())
                .map(|wp| wp.id());
            (world, hit)
        });
        match hit {
            Some(id) => self.travel_to(id).map(ClickOutcome::Travel),
            None => Ok(ClickOutcome::Miss(world)),
        }
    }

    /// Place a manual pin anchored at the latest message.
    pub fn place_manual(&self, name: &str, at: WorldPoint) -> WaypointId {
        let len = self.inner.log.len();
        self.mutate(|state| {
            let position = match len {
                0 => state.current_position(),
                n => position_of(n - 1),
            };
            let id = state.place_manual(name, at, position);
            info!("Placed '{}' at message {}", name, position);
            id
        })
    }

    // =========================================================================
    // TRAVEL
    // =========================================================================

    pub fn travel_to(&self, target: WaypointId) -> Result<TravelStart, TravelError> {
        let start = self.inner.travel.request_travel(
            &self.inner.state,
            Arc::clone(&self.inner.log),
            target,
        );
        if let Err(err) = &start {
            info!("Travel rejected: {}", err);
        }
        start
    }

    pub fn cancel_travel(&self) -> bool {
        self.inner.travel.cancel()
    }

    pub fn travel_phase(&self) -> TravelPhase {
        self.inner.travel.phase()
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    pub fn map_view(&self) -> MapView {
        self.with_state(MapView::capture)
    }

    pub fn visible_waypoints(&self) -> Vec<VisibleWaypoint> {
        self.with_state(crate::render::visible_waypoints)
    }

    pub fn quick_travel(&self) -> Vec<QuickTravelEntry> {
        self.with_state(quick_travel)
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    pub fn snapshot(&self) -> MapSnapshot {
        self.with_state(MapSnapshot::capture)
    }

    /// Replace the map with a snapshot. Any journey in flight is cancelled.
    pub fn restore(&self, snapshot: MapSnapshot) {
        self.inner.travel.cancel();
        let restored = snapshot.into_state(&self.inner.config);
        self.mutate(|state| *state = restored);
    }

    /// Load and apply the stored snapshot, if there is one.
    pub async fn load(&self) -> anyhow::Result<bool> {
        let Some(saver) = &self.inner.saver else {
            return Ok(false);
        };
        match saver.store.load().await? {
            Some(snapshot) => {
                self.restore(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save immediately and wait for the write.
    pub async fn save(&self) -> anyhow::Result<()> {
        if let Some(saver) = &self.inner.saver {
            saver.save_now(&self.snapshot()).await?;
        }
        Ok(())
    }

    // =========================================================================
    // MAP ART
    // =========================================================================

    /// Request background art for the discovered map. The returned task sets
    /// the background on success and only logs on failure.
    pub fn request_map_art(&self) -> Result<JoinHandle<()>, ArtError> {
        let Some(service) = self.inner.art.clone() else {
            return Err(ArtError::Disabled);
        };
        let request = self.with_state(|state| build_map_request(state, &self.inner.config.art))?;
        let Ok(runtime) = Handle::try_current() else {
            return Err(ArtError::NoRuntime);
        };
        info!("Requesting map art");
        let session = self.clone();
        Ok(runtime.spawn(async move {
            match service.generate(&request).await {
                Ok(image) => {
                    session.mutate(|state| state.set_background_image(Some(image)));
                    info!("Map art updated");
                }
                Err(err) => warn!("Map art generation failed: {:#}", err),
            }
        }))
    }
}
