//! Ancestor fallback and fade animation
//!
//! Runs every frame over the applied desired set. Desired tiles that are not
//! ready yet borrow imagery from their closest ready ancestor; every tile then
//! eases its opacity toward what the selection says it should be.

use super::{
    cache::TileCache,
    queue::LoadQueue,
    types::{DesiredTile, Tile, TileKey},
};
use crate::core::{config::TileLayerOptions, geo::LocalFrame};
use crate::prelude::HashSet;

/// Marks the desired set wanted and picks what to show for each desired tile:
/// the tile itself when ready, otherwise its first ready ancestor.
///
/// Ancestors on the way up are registered, marked wanted and queued if they
/// need a fetch. Each ancestor is handled once per frame however many
/// children share it.
pub fn select_tiles(
    cache: &mut TileCache,
    queue: &mut LoadQueue,
    desired: &[DesiredTile],
    frame: u64,
    options: &TileLayerOptions,
    local: &LocalFrame,
) -> HashSet<TileKey> {
    let mut selected = HashSet::default();
    let mut visited: HashSet<TileKey> = HashSet::default();

    for wanted in desired {
        let tile = cache.get_or_create(wanted.coord, frame, || {
            wanted.rect.unwrap_or_else(|| local.tile_rect(&wanted.coord))
        });
        tile.mark_wanted(frame);
        if tile.is_ready() {
            selected.insert(wanted.coord);
            continue;
        }

        let mut current = wanted.coord;
        for _ in 0..options.max_parent_search_depth {
            if current.z <= options.min_zoom {
                break;
            }
            let Some(parent) = current.parent() else {
                break;
            };

            if visited.insert(parent) {
                let ancestor = cache.get_or_create(parent, frame, || local.tile_rect(&parent));
                ancestor.mark_wanted(frame);
                // Desired tiles arrive closest first, so the first child to
                // reach an ancestor carries the best priority.
                ancestor.priority = wanted.priority;
                if ancestor.needs_fetch(options.retry_limit) {
                    ancestor.mark_queued();
                    queue.push(parent);
                }
            }

            if cache.get(&parent).map_or(false, Tile::is_ready) {
                selected.insert(parent);
                break;
            }
            current = parent;
        }
    }

    selected
}

/// Moves every tile's opacity toward its target and mirrors it onto the
/// surface. Linear, `dt_ms / fade_duration_ms` per call; fading disabled snaps.
pub fn update_opacity(
    cache: &mut TileCache,
    selected: &HashSet<TileKey>,
    frame: u64,
    dt_ms: f64,
    options: &TileLayerOptions,
) {
    let max_opacity = options.opacity;
    let step = if options.fade_duration_ms > 0.0 {
        Some((dt_ms.max(0.0) / options.fade_duration_ms) as f32)
    } else {
        None
    };

    for tile in cache.iter_mut() {
        let recently_wanted =
            frame.saturating_sub(tile.last_wanted_frame) <= options.retain_frames;
        tile.target_opacity =
            if selected.contains(&tile.coord) && tile.is_ready() && recently_wanted {
                max_opacity
            } else {
                0.0
            };

        let next = match step {
            None => tile.target_opacity,
            Some(step) => approach(tile.current_opacity, tile.target_opacity, step),
        };
        tile.current_opacity = next.clamp(0.0, max_opacity);
        tile.surface.set_opacity(tile.current_opacity);
    }
}

/// Hides every surface at once.
pub fn hide_all(cache: &mut TileCache) {
    for tile in cache.iter_mut() {
        tile.target_opacity = 0.0;
        tile.current_opacity = 0.0;
        tile.surface.set_opacity(0.0);
    }
}

fn approach(current: f32, target: f32, step: f32) -> f32 {
    if current < target {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}
