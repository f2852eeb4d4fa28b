//! Map background art
//!
//! Builds an image-generation request from the discovered places and hands
//! it to an [`ArtService`]. The engine never waits on the result; a returned
//! image becomes the map background, a failure is only logged.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::config::ArtConfig;
use crate::error::ArtError;
use crate::state::MapState;

/// Request body for an image backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapArtRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub scale: f32,
}

/// Build the request for the currently discovered places.
pub fn build_map_request(state: &MapState, config: &ArtConfig) -> Result<MapArtRequest, ArtError> {
    if !config.enabled {
        return Err(ArtError::Disabled);
    }
    let places: Vec<String> = state
        .store()
        .iter()
        .filter(|wp| state.is_discovered(wp))
        .take(config.max_locations)
        .map(|wp| format!("{}({})", wp.name(), wp.category()))
        .collect();
    if places.is_empty() {
        return Err(ArtError::NothingDiscovered);
    }

    Ok(MapArtRequest {
        prompt: config
            .prompt_template
            .replacen("{locations}", &places.join(", "), 1),
        negative_prompt: config.negative_prompt.clone(),
        width: config.width,
        height: config.height,
        steps: config.steps,
        scale: config.scale,
    })
}

/// Image backend. Returns the image as a URL or data URI.
#[async_trait]
pub trait ArtService: Send + Sync {
    async fn generate(&self, request: &MapArtRequest) -> Result<String>;
}

/// Returns a fixed image and records every request.
#[derive(Debug, Default)]
pub struct RecordingArtService {
    image: String,
    requests: Mutex<Vec<MapArtRequest>>,
}

impl RecordingArtService {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<MapArtRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ArtService for RecordingArtService {
    async fn generate(&self, request: &MapArtRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.clone());
        Ok(self.image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OriginKind;

    #[test]
    fn test_prompt_lists_discovered_places() {
        let mut state = MapState::default();
        state.ingest_message(0, "They leave Ravenwood and arrive at Silver Lake.");
        state.store.upsert("Hidden Crypt", 90, OriginKind::Dynamic);

        let request = build_map_request(&state, &ArtConfig::default()).unwrap();
        assert!(request.prompt.contains("Ravenwood(forest)"));
        assert!(request.prompt.contains("Silver Lake(water)"));
        assert!(!request.prompt.contains("Hidden Crypt"));
        assert!(!request.prompt.contains("{locations}"));
        assert_eq!(request.width, 1024);
    }

    #[test]
    fn test_prompt_caps_place_count() {
        let mut state = MapState::default();
        state.set_fog_enabled(false);
        for i in 0..30 {
            state.store.upsert(&format!("Town {i}"), i, OriginKind::Dynamic);
        }
        let config = ArtConfig {
            prompt_template: "{locations}".into(),
            ..ArtConfig::default()
        };
        let request = build_map_request(&state, &config).unwrap();
        assert_eq!(request.prompt.split(", ").count(), 15);
    }

    #[test]
    fn test_rejections() {
        let state = MapState::default();
        assert_eq!(
            build_map_request(&state, &ArtConfig::default()),
            Err(ArtError::NothingDiscovered)
        );
        let disabled = ArtConfig {
            enabled: false,
            ..ArtConfig::default()
        };
        assert_eq!(build_map_request(&state, &disabled), Err(ArtError::Disabled));
    }
}
