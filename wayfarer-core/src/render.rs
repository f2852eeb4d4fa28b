//! Read-only views for the renderer
//!
//! Everything here is derived from [`MapState`] without mutating it.

use serde::Serialize;

use crate::state::MapState;
use crate::types::{Category, PositionIndex, Waypoint, WaypointId, WorldPoint};

/// Consecutive discovered waypoints further apart than this are not joined.
pub const ROUTE_MAX_GAP: u64 = 50;
/// Extra messages beyond the radius in which undiscovered pins show faintly.
pub const HINT_SLACK: u64 = 5;
/// Extra messages beyond the radius counted by the nearby badge.
pub const BADGE_SLACK: u64 = 2;
pub const QUICK_TRAVEL_LIMIT: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleWaypoint {
    pub waypoint: Waypoint,
    pub discovered: bool,
    /// Sits at the current position
    pub is_current: bool,
}

/// Every waypoint with its discovery flag, in insertion order.
pub fn visible_waypoints(state: &MapState) -> Vec<VisibleWaypoint> {
    let current = state.current_position();
    state
        .store()
        .iter()
        .map(|wp| VisibleWaypoint {
            waypoint: wp.clone(),
            discovered: state.is_discovered(wp),
            is_current: wp.position_index() == current,
        })
        .collect()
}

/// Dashed route line between two discovered pins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteSegment {
    pub from: WaypointId,
    pub to: WaypointId,
    pub start: WorldPoint,
    pub end: WorldPoint,
}

/// Join each discovered waypoint to the first discovered waypoint later in
/// the story, when the gap is under [`ROUTE_MAX_GAP`] messages.
pub fn route_segments(state: &MapState) -> Vec<RouteSegment> {
    let discovered: Vec<&Waypoint> = state
        .store()
        .iter()
        .filter(|wp| state.is_discovered(wp))
        .collect();

    let Some((_, init)) = discovered.split_last() else {
        return Vec::new();
    };
    init.iter()
        .filter_map(|curr| {
            let next = discovered
                .iter()
                .find(|wp| wp.position_index() > curr.position_index())?;
            let gap = next.position_index() - curr.position_index();
            (gap < ROUTE_MAX_GAP as i64).then(|| RouteSegment {
                from: curr.id(),
                to: next.id(),
                start: curr.coordinates(),
                end: next.coordinates(),
            })
        })
        .collect()
}

/// Faint marker for an undiscovered pin just beyond the discovery radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FogHint {
    pub id: WaypointId,
    pub at: WorldPoint,
    pub opacity: f64,
}

pub fn fog_hints(state: &MapState) -> Vec<FogHint> {
    let discovery = state.discovery();
    let reach = discovery.radius() + HINT_SLACK;
    state
        .store()
        .iter()
        .filter(|wp| !wp.origin().is_permanent() && !state.is_discovered(wp))
        .filter_map(|wp| {
            let distance = wp.distance_from(discovery.current_position());
            let opacity = 0.3 - distance as f64 * 0.05;
            (distance <= reach && opacity > 0.0).then(|| FogHint {
                id: wp.id(),
                at: wp.coordinates(),
                opacity,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveryStats {
    pub discovered: usize,
    pub total: usize,
}

pub fn discovery_stats(state: &MapState) -> DiscoveryStats {
    DiscoveryStats {
        discovered: state
            .store()
            .iter()
            .filter(|wp| state.is_discovered(wp))
            .count(),
        total: state.store().len(),
    }
}

/// Count shown on the map button: undiscovered dynamic pins close ahead.
pub fn nearby_badge(state: &MapState) -> usize {
    state.discovery().nearby_undiscovered(state.store(), BADGE_SLACK)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickTravelEntry {
    pub id: WaypointId,
    pub name: String,
    pub position_index: PositionIndex,
    pub category: Category,
}

/// Most recent discovered destinations, latest first.
pub fn quick_travel(state: &MapState) -> Vec<QuickTravelEntry> {
    let mut entries: Vec<&Waypoint> = state
        .store()
        .iter()
        .filter(|wp| state.is_discovered(wp))
        .collect();
    entries.sort_by(|a, b| b.position_index().cmp(&a.position_index()));
    entries
        .into_iter()
        .take(QUICK_TRAVEL_LIMIT)
        .map(|wp| QuickTravelEntry {
            id: wp.id(),
            name: wp.name().to_string(),
            position_index: wp.position_index(),
            category: wp.category(),
        })
        .collect()
}

/// Everything a frame needs, in one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub pan: (f64, f64),
    pub zoom: f64,
    pub current_position: PositionIndex,
    pub fog_enabled: bool,
    pub waypoints: Vec<VisibleWaypoint>,
    pub routes: Vec<RouteSegment>,
    pub hints: Vec<FogHint>,
    pub stats: DiscoveryStats,
    pub nearby: usize,
    pub background_image: Option<String>,
}

impl MapView {
    pub fn capture(state: &MapState) -> Self {
        Self {
            pan: state.viewport().pan(),
            zoom: state.viewport().zoom(),
            current_position: state.current_position(),
            fog_enabled: state.discovery().fog_enabled(),
            waypoints: visible_waypoints(state),
            routes: route_segments(state),
            hints: fog_hints(state),
            stats: discovery_stats(state),
            nearby: nearby_badge(state),
            background_image: state.background_image().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OriginKind, LORE_SENTINEL};
    use pretty_assertions::assert_eq;

    fn state_with(positions: &[i64]) -> MapState {
        let mut state = MapState::default();
        for (i, p) in positions.iter().enumerate() {
            state
                .store
                .upsert(&format!("Place {i}"), *p, OriginKind::Dynamic);
        }
        state
    }

    fn positions_of(state: &MapState, ids: impl Iterator<Item = WaypointId>) -> Vec<i64> {
        ids.map(|id| state.store().get(id).unwrap().position_index())
            .collect()
    }

    #[test]
    fn test_visible_flags() {
        let mut state = state_with(&[0, 30]);
        state.ingest_message(0, "");
        let view = visible_waypoints(&state);
        assert_eq!(
            view.iter().map(|v| (v.discovered, v.is_current)).collect::<Vec<_>>(),
            vec![(true, true), (false, false)]
        );
    }

    #[test]
    fn test_routes_skip_large_gaps() {
        let mut state = state_with(&[0, 10, 70, 80]);
        state.set_fog_enabled(false);
        let routes = route_segments(&state);
        let pairs: Vec<_> = routes
            .iter()
            .map(|r| {
                (
                    state.store().get(r.from).unwrap().position_index(),
                    state.store().get(r.to).unwrap().position_index(),
                )
            })
            .collect();
        assert_eq!(pairs, vec![(0, 10), (70, 80)]);
    }

    #[test]
    fn test_fog_hints_fade_with_distance() {
        let mut state = state_with(&[0, 3, 5, 6, 20]);
        state.set_discovery_radius(2);
        state.ingest_message(0, "");
        let hints = fog_hints(&state);
        // 6 fades to zero opacity and 20 is out of reach.
        assert_eq!(positions_of(&state, hints.iter().map(|h| h.id)), vec![3, 5]);
        assert!((hints[0].opacity - 0.15).abs() < 1e-9);
        assert!((hints[1].opacity - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_quick_travel_latest_first_and_capped() {
        let mut state = state_with(&[1, 2, 3, 4, 5, 6, 7, 8]);
        state
            .store
            .upsert("Eldoria", LORE_SENTINEL, OriginKind::Lore);
        state.set_fog_enabled(false);
        let entries = quick_travel(&state);
        assert_eq!(
            entries.iter().map(|e| e.position_index).collect::<Vec<_>>(),
            vec![8, 7, 6, 5, 4, 3]
        );
    }

    #[test]
    fn test_quick_travel_lists_lore_last() {
        let mut state = state_with(&[4]);
        state.store.upsert("Eldoria", LORE_SENTINEL, OriginKind::Lore);
        state.ingest_message(4, "");
        let entries = quick_travel(&state);
        assert_eq!(
            entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["Place 0", "Eldoria"]
        );
    }

    #[test]
    fn test_stats_and_badge() {
        let mut state = state_with(&[0, 6, 7, 30]);
        state.store.upsert("Eldoria", LORE_SENTINEL, OriginKind::Lore);
        state.ingest_message(0, "");
        assert_eq!(
            discovery_stats(&state),
            DiscoveryStats {
                discovered: 2,
                total: 5
            }
        );
        assert_eq!(nearby_badge(&state), 2);
    }

    #[test]
    fn test_map_view_serializes() {
        let mut state = state_with(&[0]);
        state.ingest_message(0, "");
        let json = serde_json::to_value(MapView::capture(&state)).unwrap();
        assert_eq!(json["stats"]["total"], 1);
        assert_eq!(json["waypoints"][0]["discovered"], true);
    }
}
