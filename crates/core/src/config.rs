//! Engine configuration

use crate::autosave::AutosaveConfig;
use crate::history::DEFAULT_HISTORY_DEPTH;
use crate::measurement::{MeasurementStyle, DEFAULT_CLOSING_TOLERANCE};
use crate::placement::{PlacementConfig, DEFAULT_DRAG_THRESHOLD};
use crate::project::DEFAULT_GRID_SPACING;
use std::time::Duration;

/// Default autosave interval in seconds
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 60;

/// Tunable engine behaviour; every field has a default so partial settings
/// files load cleanly
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum drag length (screen pixels) that commits a placement
    pub drag_threshold_px: f64,
    /// Distance to the first vertex (screen pixels) that closes a polygon
    pub closing_tolerance_px: f64,
    /// Maximum number of undo entries
    pub history_depth: usize,
    pub autosave_enabled: bool,
    pub autosave_interval_secs: u64,
    /// Style given to newly placed measurements
    pub default_style: MeasurementStyle,
    pub default_grid_spacing_px: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD,
            closing_tolerance_px: DEFAULT_CLOSING_TOLERANCE,
            history_depth: DEFAULT_HISTORY_DEPTH,
            autosave_enabled: true,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            default_style: MeasurementStyle::default(),
            default_grid_spacing_px: DEFAULT_GRID_SPACING,
        }
    }
}

impl EngineConfig {
    /// Placement thresholds derived from this configuration
    pub fn placement(&self) -> PlacementConfig {
        PlacementConfig {
            drag_threshold: self.drag_threshold_px,
            closing_tolerance: self.closing_tolerance_px,
        }
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn autosave(&self) -> AutosaveConfig {
        AutosaveConfig {
            enabled: self.autosave_enabled,
            interval: self.autosave_interval(),
        }
    }
}
