//! Error taxonomy
//!
//! Every error here is local and recoverable. Empty extraction and duplicate
//! upserts are not errors at all: they surface as an empty set and as the
//! existing waypoint respectively.

use thiserror::Error;

use crate::types::{PositionIndex, WaypointId};

/// Why a travel request did not (or will not) reach its destination.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TravelError {
    #[error("Already traveling")]
    Busy,

    #[error("Cannot travel to undiscovered location '{name}'")]
    Unreachable { name: String },

    #[error("Waypoint {0} not found")]
    UnknownWaypoint(WaypointId),

    #[error("Timed travel needs a running async runtime")]
    NoRuntime,

    #[error("Journey cancelled")]
    Cancelled,
}

impl TravelError {
    /// Whether the request left all state untouched.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, TravelError::Cancelled)
    }
}

/// Non-fatal condition attached to a successful arrival.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TravelWarning {
    #[error("Location '{name}' (message {position}) not found in chat history")]
    DestinationUnresolvable {
        name: String,
        position: PositionIndex,
    },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Why a map art request was not issued.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArtError {
    #[error("Map art generation is disabled")]
    Disabled,

    #[error("Discover locations first")]
    NothingDiscovered,

    #[error("Map art requests need a running async runtime")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_vs_cancellation() {
        assert!(TravelError::Busy.is_rejection());
        assert!(TravelError::NoRuntime.is_rejection());
        assert!(TravelError::Unreachable { name: "x".into() }.is_rejection());
        assert!(!TravelError::Cancelled.is_rejection());
    }

    #[test]
    fn test_display() {
        let err = TravelError::Unreachable {
            name: "Silver Lake".into(),
        };
        assert!(err.to_string().contains("Silver Lake"));

        let warning = TravelWarning::DestinationUnresolvable {
            name: "Ravenwood".into(),
            position: 42,
        };
        assert!(warning.to_string().contains("42"));
    }
}
