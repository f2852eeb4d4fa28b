//! Wayfarer - fog-of-war world map and fast travel over a chat log
//!
//! Locations mentioned in chat messages become waypoints on a deterministic
//! spiral layout. Waypoints stay hidden until the story's current position
//! comes within the discovery radius of them, after which they remain
//! revealed. Discovered waypoints can be travelled to with a timed,
//! cancellable journey that reports progress as it goes.
//!
//! # Layout
//! - [`extract`]: location names from free text
//! - [`placement`]: golden-angle spiral coordinates
//! - [`store`]: waypoint entities, dedup and hit testing
//! - [`discovery`]: fog-of-war state
//! - [`viewport`]: pan/zoom transform
//! - [`travel`]: fast-travel controller
//! - [`session`]: host-facing wiring of all of the above

pub mod art;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod host;
pub mod persistence;
pub mod placement;
pub mod render;
pub mod session;
pub mod spatial;
pub mod state;
pub mod store;
pub mod travel;
pub mod types;
pub mod viewport;

pub use config::WayfarerConfig;
pub use discovery::DiscoveryState;
pub use error::{ArtError, ConfigError, TravelError, TravelWarning};
pub use extract::{extract_locations, LocationExtractor};
pub use host::{EventHub, HostEvent, InMemoryLog, LoreEntry, LoreSource, MessageLog, StaticLore};
pub use persistence::{JsonFileSnapshotStore, MapSnapshot, MemorySnapshotStore, SnapshotStore};
pub use placement::SpiralPlacer;
pub use render::MapView;
pub use session::{ClickOutcome, MapSession};
pub use state::MapState;
pub use store::WaypointStore;
pub use travel::{Arrival, Journey, TravelController, TravelPhase, TravelProgress, TravelStart};
pub use types::{Category, OriginKind, ScreenPoint, Waypoint, WaypointId, WorldPoint};
pub use viewport::Viewport;
