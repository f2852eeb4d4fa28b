use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Index into the host message log, or [`LORE_SENTINEL`].
pub type PositionIndex = i64;

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

/// Position index reserved for waypoints seeded from world knowledge.
pub const LORE_SENTINEL: PositionIndex = -1;

/// Convert a host log index into a position index.
pub fn position_of(index: usize) -> PositionIndex {
    PositionIndex::try_from(index).unwrap_or(PositionIndex::MAX)
}

// ─── Identifiers ──────────────────────────────────────────────

/// Opaque waypoint identifier, unique within a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointId(Uuid);

impl WaypointId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WaypointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wp_{}", self.0.simple())
    }
}

// ─── Geometry ─────────────────────────────────────────────────

/// A point in map (world) space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: WorldPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A point in screen (canvas pixel) space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ─── Classification ───────────────────────────────────────────

/// How a waypoint came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Extracted from a chat message.
    Dynamic,
    /// Seeded from world knowledge; always discovered.
    Lore,
    /// Placed by the user; always discovered.
    Manual,
}

impl OriginKind {
    /// Lore and manual waypoints are never hidden by fog.
    pub fn is_permanent(self) -> bool {
        matches!(self, OriginKind::Lore | OriginKind::Manual)
    }
}

/// Coarse terrain class derived from a waypoint name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Forest,
    Mountain,
    Water,
    Desert,
    City,
    Dungeon,
    Temple,
    Plains,
}

impl Category {
    /// Classify a location name. The first matching rule wins.
    pub fn classify(name: &str) -> Self {
        const RULES: &[(Category, &[&str])] = &[
            (Category::Forest, &["forest", "wood", "grove"]),
            (Category::Mountain, &["mountain", "peak", "cliff"]),
            (Category::Water, &["water", "lake", "river", "sea"]),
            (Category::Desert, &["desert", "sand", "dune"]),
            (Category::City, &["city", "town", "burg", "capital"]),
            (Category::Dungeon, &["cave", "dungeon", "crypt"]),
            (Category::Temple, &["temple", "shrine"]),
        ];

        let lower = name.to_lowercase();
        RULES
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Plains)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Forest => "forest",
            Category::Mountain => "mountain",
            Category::Water => "water",
            Category::Desert => "desert",
            Category::City => "city",
            Category::Dungeon => "dungeon",
            Category::Temple => "temple",
            Category::Plains => "plains",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ─── Waypoint ─────────────────────────────────────────────────

/// A named location on the map.
///
/// Waypoints are immutable once created. Discovery flags live in
/// [`crate::discovery::DiscoveryState`], not on the entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    id: WaypointId,
    name: String,
    position_index: PositionIndex,
    coordinates: WorldPoint,
    category: Category,
    origin: OriginKind,
    created_at: Timestamp,
}

impl Waypoint {
    pub(crate) fn new(
        name: impl Into<String>,
        position_index: PositionIndex,
        coordinates: WorldPoint,
        origin: OriginKind,
        created_at: Timestamp,
    ) -> Self {
        let name = name.into();
        Self {
            id: WaypointId::new(),
            category: Category::classify(&name),
            name,
            position_index,
            coordinates,
            origin,
            created_at,
        }
    }

    pub fn id(&self) -> WaypointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position_index(&self) -> PositionIndex {
        self.position_index
    }

    pub fn coordinates(&self) -> WorldPoint {
        self.coordinates
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn origin(&self) -> OriginKind {
        self.origin
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Whether this waypoint is tied to a message in the log.
    pub fn is_anchored(&self) -> bool {
        self.position_index != LORE_SENTINEL
    }

    /// Dedup identity: case-insensitive name plus position.
    pub fn same_key(&self, name: &str, position_index: PositionIndex) -> bool {
        self.position_index == position_index && self.name.to_lowercase() == name.to_lowercase()
    }

    /// Message-index distance from a position.
    pub fn distance_from(&self, position: PositionIndex) -> u64 {
        self.position_index.abs_diff(position)
    }
}
