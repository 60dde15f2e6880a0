//! Read-only snapshots for HUDs and debug views

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{cache::TileCache, types::ViewState};
use crate::core::{
    bounds::Bounds,
    geo::{Point, WorldRect},
};

/// Per-frame counters describing the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileTelemetry {
    pub zoom: u8,
    pub center_x: u32,
    pub center_y: u32,
    /// Entries in the cache.
    pub tile_count: usize,
    pub tile_radius: u32,
    pub queued_count: usize,
    pub loading_count: usize,
    pub ready_count: usize,
    pub error_count: usize,
    /// Size of the applied desired set.
    pub requested_count: usize,
    /// Surfaces currently visible.
    pub rendered_count: usize,
    pub rendered_count_by_zoom: BTreeMap<u8, usize>,
    pub fetches_dispatched: u64,
    pub fetches_failed: u64,
    pub stale_responses: u64,
}

/// Counters that accumulate over the layer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounters {
    pub dispatched: u64,
    pub failed: u64,
    pub stale: u64,
}

impl TileTelemetry {
    pub(crate) fn collect(
        cache: &TileCache,
        view: Option<&ViewState>,
        requested_count: usize,
        counters: FetchCounters,
    ) -> Self {
        let counts = cache.state_counts();
        let mut rendered_count_by_zoom = BTreeMap::new();
        for tile in cache.iter().filter(|tile| tile.surface().is_visible()) {
            *rendered_count_by_zoom.entry(tile.coord().z).or_insert(0) += 1;
        }

        Self {
            zoom: view.map_or(0, |v| v.zoom),
            center_x: view.map_or(0, |v| v.center_x),
            center_y: view.map_or(0, |v| v.center_y),
            tile_count: cache.len(),
            tile_radius: view.map_or(0, |v| v.tile_radius),
            queued_count: counts.queued,
            loading_count: counts.loading,
            ready_count: counts.ready,
            error_count: counts.error,
            requested_count,
            rendered_count: rendered_count_by_zoom.values().sum(),
            rendered_count_by_zoom,
            fetches_dispatched: counters.dispatched,
            fetches_failed: counters.failed,
            stale_responses: counters.stale,
        }
    }
}

/// Geometry for a debug view of what the scheduler is doing, in render units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugOverlay {
    /// Rectangles of the applied desired set.
    pub desired: Vec<WorldRect>,
    /// Visible ground used for the applied view, if any.
    pub viewport: Option<Bounds>,
    pub focus: Point,
}
