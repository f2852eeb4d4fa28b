//! Snapshot persistence
//!
//! A [`MapSnapshot`] is the full persisted shape of one session's map. The
//! engine treats saving as fire-and-forget; the [`SnapshotStore`] seam lets
//! the host decide where snapshots live.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::config::WayfarerConfig;
use crate::discovery::DiscoveryState;
use crate::placement::SpiralPlacer;
use crate::state::MapState;
use crate::store::WaypointStore;
use crate::types::{PositionIndex, Waypoint, WaypointId};
use crate::viewport::{Viewport, ZoomLimits};

pub const SNAPSHOT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub waypoints: Vec<Waypoint>,
    pub discovered_ids: Vec<WaypointId>,
    pub current_position: PositionIndex,
    pub fog_enabled: bool,
    pub discovery_radius: u64,
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
    #[serde(default)]
    pub background_image: Option<String>,
}

impl MapSnapshot {
    pub fn capture(state: &MapState) -> Self {
        let discovery = state.discovery();
        let (pan_x, pan_y) = state.viewport().pan();
        Self {
            version: SNAPSHOT_VERSION,
            waypoints: state.store().waypoints().to_vec(),
            discovered_ids: discovery.discovered_ids().iter().copied().collect(),
            current_position: discovery.current_position(),
            fog_enabled: discovery.fog_enabled(),
            discovery_radius: discovery.radius(),
            pan_x,
            pan_y,
            zoom: state.viewport().zoom(),
            background_image: state.background_image().map(str::to_string),
        }
    }

    /// Rebuild map state. Layout and zoom limits come from `config`; zoom
    /// is clamped into them and dangling discovered ids are dropped.
    pub fn into_state(self, config: &WayfarerConfig) -> MapState {
        let store = WaypointStore::from_waypoints(
            SpiralPlacer::from_config(&config.layout),
            self.waypoints,
        );
        let discovery = DiscoveryState::restore(
            &store,
            self.discovered_ids,
            self.current_position,
            self.fog_enabled,
            self.discovery_radius,
        );
        let viewport = Viewport::restore(
            self.pan_x,
            self.pan_y,
            self.zoom,
            ZoomLimits::from_config(&config.viewport),
        );
        MapState::from_parts(store, discovery, viewport, self.background_image)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize map snapshot")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).context("Failed to parse map snapshot")?;
        anyhow::ensure!(
            snapshot.version <= SNAPSHOT_VERSION,
            "Unsupported snapshot version {}",
            snapshot.version
        );
        Ok(snapshot)
    }
}

// =============================================================================
// STORES
// =============================================================================

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &MapSnapshot) -> Result<()>;

    async fn load(&self) -> Result<Option<MapSnapshot>>;
}

/// Keeps the latest snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: RwLock<Option<MapSnapshot>>,
    saves: std::sync::atomic::AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &MapSnapshot) -> Result<()> {
        *self.latest.write().await = Some(snapshot.clone());
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<MapSnapshot>> {
        Ok(self.latest.read().await.clone())
    }
}

/// Stores the snapshot as pretty JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, snapshot: &MapSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Write then rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot.to_json()?)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<MapSnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => MapSnapshot::from_json(&json).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }
}
