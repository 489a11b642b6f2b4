//! Viewer and dataset configuration.

use crate::error::TrackError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the lineage fetcher expands the `tracks_to_tracks` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageExpansion {
    /// Follow edges until no new track ids appear (works for one-hop and closure data)
    #[default]
    BreadthFirst,

    /// Trust each row to already hold the full lineage (one lookup per owning track)
    StoredClosure,
}

/// Configuration for a viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Above this many newly selected points the caller is warned before fetching (default: 100)
    pub max_num_selected_cells: usize,

    /// Length of perspective frustum corner rays (default: 1e7)
    pub frustum_max_depth: f64,

    /// Maximum pointer-ray to point distance that counts as a hit (default: 10.0)
    pub raycast_threshold: f64,

    /// Base radius of the sphere cursor (default: 25.0)
    pub cursor_radius: f64,

    /// Cursor scale change per wheel delta unit (default: 0.001)
    pub wheel_sensitivity: f64,

    /// Lineage expansion strategy (default: breadth-first)
    pub lineage_expansion: LineageExpansion,

    /// Dataset opened when none is given explicitly
    pub default_dataset: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_num_selected_cells: 100,
            frustum_max_depth: 1.0e7,
            raycast_threshold: 10.0,
            cursor_radius: 25.0,
            wheel_sensitivity: 0.001,
            lineage_expansion: LineageExpansion::BreadthFirst,
            default_dataset: None,
        }
    }
}

impl ViewerConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, TrackError> {
        let config: Self = serde_json::from_str(json).map_err(|e| TrackError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TrackError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Rejects values the selection geometry cannot work with.
    pub fn validate(&self) -> Result<(), TrackError> {
        if !(self.frustum_max_depth.is_finite() && self.frustum_max_depth > 0.0) {
            return Err(TrackError::Config(format!(
                "frustum_max_depth must be positive and finite, got {}",
                self.frustum_max_depth
            )));
        }
        if !(self.cursor_radius > 0.0) {
            return Err(TrackError::Config(format!("cursor_radius must be positive, got {}", self.cursor_radius)));
        }
        if self.raycast_threshold < 0.0 {
            return Err(TrackError::Config(format!(
                "raycast_threshold must be non-negative, got {}",
                self.raycast_threshold
            )));
        }
        Ok(())
    }
}

/// Array locations of one dataset inside its store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackGraphConfig {
    /// Per-timepoint coordinate array
    pub points: String,

    /// Point -> track relation group
    pub points_to_tracks: String,

    /// Track -> points relation group
    pub tracks_to_points: String,

    /// Track -> track lineage relation group
    pub tracks_to_tracks: String,
}

impl Default for TrackGraphConfig {
    fn default() -> Self {
        Self {
            points: "points".to_string(),
            points_to_tracks: "points_to_tracks".to_string(),
            tracks_to_points: "tracks_to_points".to_string(),
            tracks_to_tracks: "tracks_to_tracks".to_string(),
        }
    }
}
