//! Core data types for the tile scheduler

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::surface::{TileImage, TileSurface};
use crate::core::{
    bounds::Bounds,
    geo::{TileCoord, WorldRect},
};

/// Cache entries are keyed by tile id; its `Display` form is `"z/x/y"`.
pub type TileKey = TileCoord;

/// Lifecycle of a cache entry.
///
/// `Idle → Queued → Loading → Ready | Error`, with `Error → Queued` while the
/// retry budget lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileState {
    Idle,
    Queued,
    Loading,
    Ready,
    Error,
}

/// One cache entry. Owned exclusively by the scheduler; hosts only read it.
#[derive(Debug)]
pub struct Tile {
    pub(crate) coord: TileCoord,
    pub(crate) state: TileState,
    pub(crate) attempts: u32,
    /// Generation stamped on the attempt currently in flight.
    pub(crate) generation: u64,
    pub(crate) priority: f64,
    pub(crate) last_wanted_frame: u64,
    pub(crate) last_touched_frame: u64,
    pub(crate) current_opacity: f32,
    pub(crate) target_opacity: f32,
    pub(crate) surface: TileSurface,
}

impl Tile {
    pub(crate) fn new(coord: TileCoord, rect: WorldRect, frame: u64) -> Self {
        Self {
            coord,
            state: TileState::Idle,
            attempts: 0,
            generation: 0,
            priority: f64::MAX,
            last_wanted_frame: frame,
            last_touched_frame: frame,
            current_opacity: 0.0,
            target_opacity: 0.0,
            surface: TileSurface::new(coord, rect),
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn last_wanted_frame(&self) -> u64 {
        self.last_wanted_frame
    }

    pub fn last_touched_frame(&self) -> u64 {
        self.last_touched_frame
    }

    pub fn current_opacity(&self) -> f32 {
        self.current_opacity
    }

    pub fn target_opacity(&self) -> f32 {
        self.target_opacity
    }

    pub fn surface(&self) -> &TileSurface {
        &self.surface
    }

    pub fn is_ready(&self) -> bool {
        self.state == TileState::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.state == TileState::Loading
    }

    /// Whether a failed tile still has attempts left.
    pub fn can_retry(&self, retry_limit: u32) -> bool {
        self.attempts < retry_limit
    }

    /// Whether entering the desired set should put this tile in the queue.
    pub(crate) fn needs_fetch(&self, retry_limit: u32) -> bool {
        match self.state {
            TileState::Idle => true,
            TileState::Error => self.can_retry(retry_limit),
            TileState::Queued | TileState::Loading | TileState::Ready => false,
        }
    }

    pub(crate) fn mark_queued(&mut self) {
        self.state = TileState::Queued;
    }

    pub(crate) fn begin_load(&mut self, generation: u64) {
        self.state = TileState::Loading;
        self.attempts += 1;
        self.generation = generation;
    }

    /// Whether a completion stamped with `generation` belongs to the attempt
    /// currently in flight.
    pub(crate) fn is_current_attempt(&self, generation: u64) -> bool {
        self.state == TileState::Loading && self.generation == generation
    }

    pub(crate) fn mark_ready(&mut self, image: Arc<TileImage>) {
        self.surface.set_texture(image);
        self.state = TileState::Ready;
    }

    pub(crate) fn mark_error(&mut self) {
        self.state = TileState::Error;
    }

    pub(crate) fn touch(&mut self, frame: u64) {
        self.last_touched_frame = self.last_touched_frame.max(frame);
    }

    pub(crate) fn mark_wanted(&mut self, frame: u64) {
        self.last_wanted_frame = self.last_wanted_frame.max(frame);
        self.touch(frame);
    }
}

/// A tile the current view needs, computed once per applied view state.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredTile {
    pub coord: TileCoord,
    /// Squared, wrap-aware tile distance from the view center; lower first.
    pub priority: f64,
    pub rect: Option<WorldRect>,
}

impl DesiredTile {
    pub fn key(&self) -> TileKey {
        self.coord
    }
}

/// Fractional tile-index window of the visible ground, margin included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileWindow {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl TileWindow {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Everything that determines the desired set. Two view states with the same
/// `state_key` produce the same desired set.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub zoom: u8,
    pub center_x: u32,
    pub center_y: u32,
    pub tile_radius: u32,
    /// Visible ground window in tile space; `None` selects radius mode.
    pub viewport: Option<TileWindow>,
    /// Visible ground in render units, kept for the debug overlay.
    pub viewport_bounds: Option<Bounds>,
    pub state_key: String,
}

impl ViewState {
    pub(crate) fn build_key(
        zoom: u8,
        center_x: u32,
        center_y: u32,
        tile_radius: u32,
        viewport: Option<&TileWindow>,
    ) -> String {
        match viewport {
            Some(window) => format!(
                "{}/{}/{}/r{}/v{}:{}:{}:{}",
                zoom,
                center_x,
                center_y,
                tile_radius,
                window.min_x.floor() as i64,
                window.max_x.floor() as i64,
                window.min_y.floor() as i64,
                window.max_y.floor() as i64,
            ),
            None => format!("{}/{}/{}/r{}", zoom, center_x, center_y, tile_radius),
        }
    }

    pub fn center(&self) -> TileCoord {
        TileCoord::new(self.center_x, self.center_y, self.zoom)
    }
}
