//! Engine configuration
//!
//! Loaded from YAML (see `config/wayfarer.yaml` in the CLI) with every field
//! optional; missing fields fall back to the defaults below. A handful of
//! knobs can be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfarerConfig {
    pub discovery: DiscoveryConfig,
    pub travel: TravelConfig,
    pub viewport: ViewportConfig,
    pub layout: LayoutConfig,
    pub art: ArtConfig,
}

/// Fog of war defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Message-index distance within which waypoints are revealed
    pub radius: u64,
    /// Hide undiscovered waypoints
    pub fog_enabled: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            radius: 5,
            fog_enabled: true,
        }
    }
}

/// Fast-travel timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelConfig {
    /// Milliseconds of travel per message of distance
    pub speed_ms_per_message: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    /// Distances at or below this complete instantly
    pub instant_threshold: u64,
    /// Progress reporting cadence
    pub tick_ms: u64,
    /// Ease the viewport toward the destination while travelling
    pub animate_viewport: bool,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            speed_ms_per_message: 100,
            min_duration_ms: 500,
            max_duration_ms: 8000,
            instant_threshold: 3,
            tick_ms: 50,
            animate_viewport: true,
        }
    }
}

impl TravelConfig {
    /// Travel time for a distance, or `None` when the hop is instant.
    pub fn duration_for(&self, distance: u64) -> Option<Duration> {
        if distance <= self.instant_threshold {
            return None;
        }
        let ms = distance
            .saturating_mul(self.speed_ms_per_message)
            .max(self.min_duration_ms)
            .min(self.max_duration_ms);
        Some(Duration::from_millis(ms))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Canvas and zoom limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub zoom_min: f64,
    pub zoom_max: f64,
    /// Wheel zoom step (scroll down zooms out by the reciprocal)
    pub wheel_factor: f64,
    /// Pointer hit radius in screen pixels
    pub hit_radius: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            zoom_min: 0.5,
            zoom_max: 3.0,
            wheel_factor: 1.1,
            hit_radius: 15.0,
            canvas_width: 320.0,
            canvas_height: 400.0,
        }
    }
}

/// Spiral placement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub origin_x: f64,
    pub origin_y: f64,
    pub base_radius: f64,
    pub radius_step: u64,
    pub radius_span: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin_x: 160.0,
            origin_y: 200.0,
            base_radius: 30.0,
            radius_step: 5,
            radius_span: 100,
        }
    }
}

/// Background art generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtConfig {
    pub enabled: bool,
    /// `{locations}` is replaced with the discovered place list
    pub prompt_template: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub scale: f32,
    /// Maximum number of places named in the prompt
    pub max_locations: usize,
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt_template: "fantasy world map, {locations}, discovered regions detailed, \
                undiscovered areas fade to parchment edges, hand-drawn cartography style, \
                aged paper texture, compass rose"
                .to_string(),
            negative_prompt: "blurry, low quality, modern elements, text, watermark, UI, buttons"
                .to_string(),
            width: 1024,
            height: 1024,
            steps: 25,
            scale: 7.0,
            max_locations: 15,
        }
    }
}

impl WayfarerConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: WayfarerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WAYFARER_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(radius) = env_parse("WAYFARER_DISCOVERY_RADIUS") {
            self.discovery.radius = radius;
        }
        if let Ok(fog) = std::env::var("WAYFARER_FOG") {
            self.discovery.fog_enabled = fog != "false" && fog != "0";
        }
        if let Some(speed) = env_parse("WAYFARER_TRAVEL_SPEED_MS") {
            self.travel.speed_ms_per_message = speed;
        }
        if let Some(max) = env_parse("WAYFARER_MAX_TRAVEL_MS") {
            self.travel.max_duration_ms = max;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.viewport;
        if !(v.zoom_min > 0.0 && v.zoom_min <= v.zoom_max) {
            return Err(ConfigError::Invalid(format!(
                "zoom bounds must satisfy 0 < min <= max (got {}..{})",
                v.zoom_min, v.zoom_max
            )));
        }
        if v.wheel_factor <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "wheel_factor must be greater than 1 (got {})",
                v.wheel_factor
            )));
        }
        let t = &self.travel;
        if t.min_duration_ms > t.max_duration_ms {
            return Err(ConfigError::Invalid(format!(
                "min_duration_ms {} exceeds max_duration_ms {}",
                t.min_duration_ms, t.max_duration_ms
            )));
        }
        if t.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_match_scenarios() {
        let travel = TravelConfig::default();
        assert_eq!(travel.duration_for(2), None);
        assert_eq!(travel.duration_for(3), None);
        assert_eq!(travel.duration_for(4), Some(Duration::from_millis(500)));
        assert_eq!(travel.duration_for(10), Some(Duration::from_millis(1000)));
        assert_eq!(travel.duration_for(100), Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
discovery:
  radius: 2
travel:
  max_duration_ms: 3000
"#;
        let config = WayfarerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.discovery.radius, 2);
        assert!(config.discovery.fog_enabled);
        assert_eq!(config.travel.max_duration_ms, 3000);
        assert_eq!(config.travel.speed_ms_per_message, 100);
        assert_eq!(config.viewport, ViewportConfig::default());
    }

    #[test]
    fn test_rejects_inverted_zoom_bounds() {
        let yaml = r#"
viewport:
  zoom_min: 4.0
  zoom_max: 2.0
"#;
        let err = WayfarerConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("zoom bounds"));
    }

    #[test]
    fn test_rejects_inverted_durations() {
        let yaml = r#"
travel:
  min_duration_ms: 9000
"#;
        assert!(WayfarerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_default_validates() {
        WayfarerConfig::default().validate().unwrap();
    }
}
