//! Tile cache: one entry per tile id, owned by the scheduler

use super::types::{Tile, TileKey, TileState};
use crate::core::geo::{TileCoord, WorldRect};
use crate::prelude::HashMap;

/// Entry counts per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub idle: usize,
    pub queued: usize,
    pub loading: usize,
    pub ready: usize,
    pub error: usize,
}

/// Keyed tile map with frame-based eviction.
///
/// Dropping an entry drops its surface, which releases the texture. No other
/// component holds a `Tile`, so removal here is the only release point.
#[derive(Debug, Default)]
pub struct TileCache {
    tiles: HashMap<TileKey, Tile>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    pub fn get(&self, key: &TileKey) -> Option<&Tile> {
        self.tiles.get(key)
    }

    pub fn get_mut(&mut self, key: &TileKey) -> Option<&mut Tile> {
        self.tiles.get_mut(key)
    }

    /// Returns the entry for `coord`, creating an `Idle` one if absent.
    pub fn get_or_create<F>(&mut self, coord: TileCoord, frame: u64, rect: F) -> &mut Tile
    where
        F: FnOnce() -> WorldRect,
    {
        self.tiles.entry(coord).or_insert_with(|| {
            log::trace!("tile {} created", coord);
            Tile::new(coord, rect(), frame)
        })
    }

    pub fn remove(&mut self, key: &TileKey) -> Option<Tile> {
        self.tiles.remove(key)
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for tile in self.tiles.values() {
            match tile.state {
                TileState::Idle => counts.idle += 1,
                TileState::Queued => counts.queued += 1,
                TileState::Loading => counts.loading += 1,
                TileState::Ready => counts.ready += 1,
                TileState::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Drops tiles not wanted this frame whose last want is more than
    /// `retain_frames` ago. `Loading` tiles are kept.
    pub fn evict_stale(&mut self, frame: u64, retain_frames: u64) -> usize {
        let before = self.tiles.len();
        self.tiles.retain(|key, tile| {
            let stale = tile.state != TileState::Loading
                && tile.last_wanted_frame < frame
                && frame - tile.last_wanted_frame > retain_frames;
            if stale {
                log::trace!("tile {} evicted as stale", key);
            }
            !stale
        });
        before - self.tiles.len()
    }

    /// Evicts least-recently-touched, furthest tiles until at most
    /// `max_tiles` remain. Tiles wanted this frame and `Loading` tiles are
    /// never evicted, so the cache may stay above the cap.
    pub fn evict_over_capacity(&mut self, frame: u64, max_tiles: usize) -> usize {
        let excess = self.tiles.len().saturating_sub(max_tiles);
        if excess == 0 {
            return 0;
        }

        let mut candidates: Vec<(TileKey, u64, f64)> = self
            .tiles
            .values()
            .filter(|tile| tile.state != TileState::Loading && tile.last_wanted_frame < frame)
            .map(|tile| (tile.coord, tile.last_touched_frame, tile.priority))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| b.2.total_cmp(&a.2)));

        let mut evicted = 0;
        for (key, _, _) in candidates.into_iter().take(excess) {
            if self.tiles.remove(&key).is_some() {
                log::trace!("tile {} evicted over capacity", key);
                evicted += 1;
            }
        }
        if self.tiles.len() > max_tiles {
            log::debug!(
                "cache holds {} tiles over a cap of {}; the rest are wanted or loading",
                self.tiles.len(),
                max_tiles
            );
        }
        evicted
    }
}
