//! Configuration for the tile streaming engine
//!
//! Every option has a default, so hosts can supply any subset as JSON or start
//! from one of the presets and override fields. Options are validated once,
//! when a layer is built; invalid options never reach the scheduler.

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_HEIGHT_ZOOM_TABLE, DEFAULT_SUBDOMAINS, DEFAULT_URL_TEMPLATE, DEFAULT_USER_AGENT,
    MAX_SUPPORTED_ZOOM,
};
use crate::core::geo::LatLng;
use crate::ConfigError;

/// Row numbering used by the tile server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowConvention {
    /// Row 0 is the northernmost row (OpenStreetMap, Google).
    #[default]
    Xyz,
    /// Row 0 is the southernmost row.
    Tms,
}

/// Per-zoom overrides of the tile budget and throttle timings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LodLevel {
    pub zoom: u8,
    /// Keep at most this many desired tiles (closest first).
    pub max_tiles: Option<usize>,
    /// Extra tiles added around the viewport or radius window.
    pub margin_tiles: Option<f64>,
    pub update_throttle_ms: Option<u64>,
    pub zoom_throttle_ms: Option<u64>,
}

/// One row of the height→zoom table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightZoomStep {
    /// Camera height above ground, in meters.
    pub max_height: f64,
    pub zoom: u8,
}

/// Monotonic camera-height → zoom lookup. Closer cameras get higher zooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeightZoomTable(pub Vec<HeightZoomStep>);

impl HeightZoomTable {
    /// Zoom for a camera at `height_meters`; heights above the last row use
    /// `fallback_zoom`.
    pub fn zoom_for_height(&self, height_meters: f64, fallback_zoom: u8) -> u8 {
        self.0
            .iter()
            .find(|step| height_meters <= step.max_height)
            .map(|step| step.zoom)
            .unwrap_or(fallback_zoom)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            return Err(ConfigError::EmptyList {
                field: "height_zoom_table",
            });
        }
        for step in &self.0 {
            if !step.max_height.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: "height_zoom_table",
                });
            }
        }
        let monotonic = self
            .0
            .windows(2)
            .all(|pair| pair[0].max_height < pair[1].max_height && pair[0].zoom >= pair[1].zoom);
        if !monotonic {
            return Err(ConfigError::InvalidValue {
                field: "height_zoom_table",
                reason: "heights must increase while zoom levels do not".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for HeightZoomTable {
    fn default() -> Self {
        Self(
            DEFAULT_HEIGHT_ZOOM_TABLE
                .iter()
                .map(|&(max_height, zoom)| HeightZoomStep { max_height, zoom })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerOptions {
    pub enabled: bool,
    /// Geographic position of the local render origin.
    pub origin: LatLng,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Base radius of the desired window, in tiles.
    pub tile_radius: u32,
    /// Upper bound when the radius is widened to cover the visible ground.
    pub max_dynamic_tile_radius: u32,
    pub opacity: f32,
    /// Literal `{z}`, `{x}`, `{y}` and `{s}` placeholders are substituted.
    pub url_template: String,
    pub row_convention: RowConvention,
    pub subdomains: Vec<String>,
    pub max_concurrent_requests: usize,
    pub max_cached_tiles: usize,
    /// Frames a tile may stay unwanted before it is evicted.
    pub retain_frames: u64,
    /// Total load attempts per tile, the first one included. At least 1.
    pub retry_limit: u32,
    pub update_throttle_ms: u64,
    pub zoom_throttle_ms: u64,
    /// Center shift (in tiles) that bypasses the throttle.
    pub immediate_tile_shift: u32,
    pub lod_levels: Vec<LodLevel>,
    /// Zero disables fading.
    pub fade_duration_ms: f64,
    pub max_parent_search_depth: u8,
    pub debug_overlay: bool,
    /// Margin added around the projected viewport, in tiles.
    pub viewport_margin_tiles: f64,
    pub meters_per_render_unit: f64,
    pub height_zoom_table: HeightZoomTable,
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl Default for TileLayerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: LatLng::default(),
            min_zoom: 2,
            max_zoom: 19,
            tile_radius: 2,
            max_dynamic_tile_radius: 6,
            opacity: 1.0,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            row_convention: RowConvention::Xyz,
            subdomains: DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            max_concurrent_requests: 6,
            max_cached_tiles: 256,
            retain_frames: 120,
            retry_limit: 2,
            update_throttle_ms: 80,
            zoom_throttle_ms: 200,
            immediate_tile_shift: 2,
            lod_levels: Vec::new(),
            fade_duration_ms: 250.0,
            max_parent_search_depth: 4,
            debug_overlay: false,
            viewport_margin_tiles: 1.0,
            meters_per_render_unit: 1.0,
            height_zoom_table: HeightZoomTable::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Unified configuration presets for TileLayerOptions
impl TileLayerOptions {
    pub fn openstreetmap() -> Self {
        Self::default()
    }

    pub fn low_resource() -> Self {
        Self {
            max_dynamic_tile_radius: 3,
            max_concurrent_requests: 2,
            max_cached_tiles: 96,
            retain_frames: 60,
            retry_limit: 1,
            max_parent_search_depth: 2,
            ..Self::default()
        }
    }

    pub fn high_detail() -> Self {
        Self {
            tile_radius: 3,
            max_dynamic_tile_radius: 10,
            max_concurrent_requests: 12,
            max_cached_tiles: 1024,
            retain_frames: 300,
            retry_limit: 3,
            max_parent_search_depth: 6,
            ..Self::default()
        }
    }

    /// Deterministic options for headless hosts and tests: no fade, no
    /// subdomains, a fake URL scheme.
    pub fn for_testing() -> Self {
        Self {
            url_template: "test://{z}/{x}/{y}.png".to_string(),
            subdomains: Vec::new(),
            max_concurrent_requests: 4,
            fade_duration_ms: 0.0,
            ..Self::default()
        }
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Per-zoom overrides, if any. The list is short, a linear scan is enough.
    pub fn lod_for(&self, zoom: u8) -> Option<&LodLevel> {
        self.lod_levels.iter().find(|level| level.zoom == zoom)
    }

    pub fn update_throttle_for(&self, zoom: u8) -> u64 {
        self.lod_for(zoom)
            .and_then(|level| level.update_throttle_ms)
            .unwrap_or(self.update_throttle_ms)
    }

    pub fn zoom_throttle_for(&self, zoom: u8) -> u64 {
        self.lod_for(zoom)
            .and_then(|level| level.zoom_throttle_ms)
            .unwrap_or(self.zoom_throttle_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom || self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(ConfigError::InvalidZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }

        check_finite("origin", self.origin.lat)?;
        check_finite("origin", self.origin.lng)?;
        if !self.origin.is_valid() {
            return Err(ConfigError::InvalidValue {
                field: "origin",
                reason: format!("{:?} is not a geographic position", self.origin),
            });
        }

        check_finite("opacity", self.opacity as f64)?;
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ConfigError::InvalidValue {
                field: "opacity",
                reason: format!("{} is outside [0, 1]", self.opacity),
            });
        }

        check_non_negative("fade_duration_ms", self.fade_duration_ms)?;
        check_non_negative("viewport_margin_tiles", self.viewport_margin_tiles)?;
        check_finite("meters_per_render_unit", self.meters_per_render_unit)?;
        if self.meters_per_render_unit <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "meters_per_render_unit",
                reason: "must be positive".to_string(),
            });
        }

        if self.tile_radius > self.max_dynamic_tile_radius {
            return Err(ConfigError::InvalidValue {
                field: "max_dynamic_tile_radius",
                reason: format!(
                    "{} is smaller than tile_radius {}",
                    self.max_dynamic_tile_radius, self.tile_radius
                ),
            });
        }

        if self.url_template.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "url_template",
                reason: "must not be empty".to_string(),
            });
        }
        if self.url_template.contains("{s}") && self.subdomains.is_empty() {
            return Err(ConfigError::EmptyList { field: "subdomains" });
        }

        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_requests",
                reason: "at least one request must be allowed in flight".to_string(),
            });
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_limit",
                reason: "every tile needs at least one attempt".to_string(),
            });
        }
        if self.max_cached_tiles == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_cached_tiles",
                reason: "the cache must hold at least one tile".to_string(),
            });
        }

        for level in &self.lod_levels {
            if let Some(margin) = level.margin_tiles {
                check_non_negative("lod_levels.margin_tiles", margin)?;
            }
            if level.max_tiles == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "lod_levels.max_tiles",
                    reason: format!("zoom {} allows no tiles", level.zoom),
                });
            }
        }

        self.height_zoom_table.validate()
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{} is negative", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for options in [
            TileLayerOptions::openstreetmap(),
            TileLayerOptions::low_resource(),
            TileLayerOptions::high_detail(),
            TileLayerOptions::for_testing(),
        ] {
            options.validate().unwrap();
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options = TileLayerOptions::from_json(
            r#"{ "max_zoom": 16, "row_convention": "tms", "lod_levels": [{ "zoom": 16, "max_tiles": 40 }] }"#,
        )
        .unwrap();
        assert_eq!(options.max_zoom, 16);
        assert_eq!(options.row_convention, RowConvention::Tms);
        assert_eq!(options.min_zoom, 2);
        assert_eq!(options.lod_for(16).and_then(|l| l.max_tiles), Some(40));
        assert_eq!(options.update_throttle_for(16), 80);
    }

    #[test]
    fn test_invalid_zoom_range_is_rejected() {
        let options = TileLayerOptions {
            min_zoom: 12,
            max_zoom: 4,
            ..TileLayerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidZoomRange { min: 12, max: 4 })
        ));
    }

    #[test]
    fn test_zero_attempt_budget_is_rejected() {
        let options = TileLayerOptions {
            retry_limit: 0,
            ..TileLayerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidValue { field: "retry_limit", .. })
        ));
        assert!(TileLayerOptions::from_json(r#"{ "retry_limit": 0 }"#).is_err());
    }

    #[test]
    fn test_non_finite_options_are_rejected() {
        let options = TileLayerOptions {
            fade_duration_ms: f64::NAN,
            ..TileLayerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::NonFinite { field: "fade_duration_ms" })
        ));
    }

    #[test]
    fn test_subdomain_placeholder_requires_subdomains() {
        let options = TileLayerOptions {
            subdomains: Vec::new(),
            ..TileLayerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::EmptyList { field: "subdomains" })
        ));
    }

    #[test]
    fn test_height_zoom_lookup() {
        let table = HeightZoomTable::default();
        assert_eq!(table.zoom_for_height(100.0, 2), 19);
        assert_eq!(table.zoom_for_height(100_000.0, 2), 10);
        assert_eq!(table.zoom_for_height(1e9, 2), 2);
    }

    #[test]
    fn test_non_monotonic_table_is_rejected() {
        let options = TileLayerOptions {
            height_zoom_table: HeightZoomTable(vec![
                HeightZoomStep { max_height: 100.0, zoom: 10 },
                HeightZoomStep { max_height: 200.0, zoom: 12 },
            ]),
            ..TileLayerOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
