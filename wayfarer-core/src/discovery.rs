//! Fog of war discovery state
//!
//! A waypoint is visible when any of these hold, checked in order:
//! 1. fog is disabled
//! 2. it is lore-origin or manual
//! 3. it has been explicitly revealed
//! 4. it lies within `radius` messages of the current position
//!
//! `reveal` is the only mutator of the revealed set and never removes ids;
//! only [`DiscoveryState::reset`] clears it. Every change of position is
//! followed by a [`DiscoveryState::sweep`] so that rule 4 matches are
//! recorded under rule 3 before the position moves on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::store::WaypointStore;
use crate::types::{PositionIndex, Waypoint, WaypointId};

/// Per-session discovery state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryState {
    discovered_ids: BTreeSet<WaypointId>,
    current_position: PositionIndex,
    fog_enabled: bool,
    radius: u64,
}

impl Default for DiscoveryState {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

impl DiscoveryState {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            discovered_ids: BTreeSet::new(),
            current_position: 0,
            fog_enabled: config.fog_enabled,
            radius: config.radius,
        }
    }

    /// Rebuild from persisted parts. Ids absent from `store` are dropped.
    pub fn restore(
        store: &WaypointStore,
        discovered_ids: impl IntoIterator<Item = WaypointId>,
        current_position: PositionIndex,
        fog_enabled: bool,
        radius: u64,
    ) -> Self {
        Self {
            discovered_ids: discovered_ids
                .into_iter()
                .filter(|id| store.contains(*id))
                .collect(),
            current_position,
            fog_enabled,
            radius,
        }
    }

    pub fn discovered_ids(&self) -> &BTreeSet<WaypointId> {
        &self.discovered_ids
    }

    pub fn current_position(&self) -> PositionIndex {
        self.current_position
    }

    pub fn fog_enabled(&self) -> bool {
        self.fog_enabled
    }

    pub fn radius(&self) -> u64 {
        self.radius
    }

    pub fn set_fog_enabled(&mut self, enabled: bool) {
        self.fog_enabled = enabled;
    }

    /// Whether `waypoint` is within the discovery radius of the position.
    pub fn in_range(&self, waypoint: &Waypoint) -> bool {
        waypoint.distance_from(self.current_position) <= self.radius
    }

    /// Visibility check, rules 1 to 4.
    pub fn is_discovered(&self, waypoint: &Waypoint) -> bool {
        !self.fog_enabled
            || waypoint.origin().is_permanent()
            || self.discovered_ids.contains(&waypoint.id())
            || self.in_range(waypoint)
    }

    /// Record `waypoint` as revealed. Returns `true` if the set grew.
    ///
    /// Waypoints visible by rule 1 or 2 are not recorded.
    pub fn reveal(&mut self, waypoint: &Waypoint) -> bool {
        if !self.fog_enabled || waypoint.origin().is_permanent() {
            return false;
        }
        let added = self.discovered_ids.insert(waypoint.id());
        if added {
            info!("Discovered: {}", waypoint.name());
        }
        added
    }

    /// Reveal every waypoint in range of the current position.
    pub fn sweep(&mut self, store: &WaypointStore) -> Vec<WaypointId> {
        let mut revealed = Vec::new();
        for wp in store.iter() {
            if self.in_range(wp) && self.reveal(wp) {
                revealed.push(wp.id());
            }
        }
        if !revealed.is_empty() {
            debug!(
                "Sweep at message {} revealed {} waypoint(s)",
                self.current_position,
                revealed.len()
            );
        }
        revealed
    }

    /// Move to `position` and sweep.
    pub fn move_to(&mut self, position: PositionIndex, store: &WaypointStore) -> Vec<WaypointId> {
        self.current_position = position;
        self.sweep(store)
    }

    /// Change the radius and sweep, so a wider radius never un-reveals later.
    pub fn set_radius(&mut self, radius: u64, store: &WaypointStore) -> Vec<WaypointId> {
        self.radius = radius;
        self.sweep(store)
    }

    /// Reveal every waypoint in the store.
    pub fn reveal_all(&mut self, store: &WaypointStore) -> usize {
        store.iter().filter(|wp| self.reveal(wp)).count()
    }

    /// Full reset: clear revealed ids, seed `keep`, return to position 0.
    pub fn reset(&mut self, seed: impl IntoIterator<Item = WaypointId>) {
        self.discovered_ids = seed.into_iter().collect();
        self.current_position = 0;
    }

    /// Non-permanent waypoints near the position that are not yet recorded.
    pub fn nearby_undiscovered(&self, store: &WaypointStore, slack: u64) -> usize {
        store
            .iter()
            .filter(|wp| !wp.origin().is_permanent())
            .filter(|wp| wp.distance_from(self.current_position) <= self.radius + slack)
            .filter(|wp| !self.discovered_ids.contains(&wp.id()))
            .count()
    }
}
