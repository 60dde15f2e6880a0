//! View sampling: camera pose → zoom level → desired tiles
//!
//! Sampling runs every frame and is cheap: it only produces a [`ViewState`].
//! The desired tile list is built from a view state once it has been applied.

use super::types::{DesiredTile, TileWindow, ViewState};
use crate::core::{
    bounds::{Bounds, GroundQuad},
    config::TileLayerOptions,
    constants::{FULL_WORLD_COLUMN_THRESHOLD, MAX_VIEWPORT_WORLD_SPAN},
    geo::{LocalFrame, Point, TileCoord},
};
use crate::prelude::HashSet;

/// Camera information supplied by the host each frame, in render units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Point on the ground the camera looks at.
    pub focus: Point,
    /// Camera height above the ground plane.
    pub camera_height: f64,
    /// Frustum corners intersected with the ground plane, if all four hit.
    pub visible_ground: Option<GroundQuad>,
    /// Explicit visible bounds; takes precedence over `visible_ground`.
    pub viewport_bounds: Option<Bounds>,
}

impl FrameInput {
    pub fn new(focus: Point, camera_height: f64) -> Self {
        Self {
            focus,
            camera_height,
            ..Self::default()
        }
    }

    pub fn with_visible_ground(mut self, quad: GroundQuad) -> Self {
        self.visible_ground = Some(quad);
        self
    }

    pub fn with_viewport_bounds(mut self, bounds: Bounds) -> Self {
        self.viewport_bounds = Some(bounds);
        self
    }

    /// Visible ground as bounds, or `None` when the geometry is unusable.
    fn visible_bounds(&self) -> Option<Bounds> {
        if let Some(bounds) = self.viewport_bounds {
            return bounds.is_valid().then_some(bounds);
        }
        self.visible_ground
            .as_ref()
            .filter(|quad| quad.is_finite())
            .and_then(GroundQuad::bounds)
    }
}

/// Zoom level for a camera at `camera_height` render units above the ground.
pub fn select_zoom(camera_height: f64, options: &TileLayerOptions) -> u8 {
    let height_meters = camera_height.abs() * options.meters_per_render_unit;
    options
        .height_zoom_table
        .zoom_for_height(height_meters, options.min_zoom)
        .clamp(options.min_zoom, options.max_zoom)
}

/// Samples the camera into a view state. Returns `None` when the focus or
/// height is not a finite number; the previous view then stays in effect.
pub fn sample_view(
    input: &FrameInput,
    options: &TileLayerOptions,
    frame: &LocalFrame,
) -> Option<ViewState> {
    if !input.focus.is_finite() || !input.camera_height.is_finite() {
        log::trace!("skipping non-finite camera input {:?}", input);
        return None;
    }

    let zoom = select_zoom(input.camera_height, options);
    let n = TileCoord::world_size(zoom);
    let (fx, fy) = frame.local_to_tile(input.focus, zoom);
    let center_x = (fx.floor() as i64).rem_euclid(n as i64) as u32;
    let center_y = (fy.floor() as i64).clamp(0, n as i64 - 1) as u32;

    let lod = options.lod_for(zoom);
    let lod_margin = lod.and_then(|level| level.margin_tiles).unwrap_or(0.0);

    let bounds = input.visible_bounds();
    let tile_size = frame.tile_world_size(zoom);

    let mut radius = options.tile_radius;
    if let Some(bounds) = &bounds {
        let reach = bounds_reach(bounds, input.focus);
        let needed = (reach / tile_size).ceil();
        if needed.is_finite() && needed > radius as f64 {
            radius = needed.min(options.max_dynamic_tile_radius as f64) as u32;
        }
    }
    radius = radius
        .saturating_add(lod_margin.ceil() as u32)
        .clamp(options.tile_radius, options.max_dynamic_tile_radius);
    if n <= FULL_WORLD_COLUMN_THRESHOLD {
        radius = radius.max(n - 1);
    }

    let viewport = if n <= FULL_WORLD_COLUMN_THRESHOLD {
        // Radius mode already covers the whole world here.
        None
    } else {
        bounds.as_ref().and_then(|bounds| {
            project_window(
                bounds,
                frame,
                zoom,
                options.viewport_margin_tiles + lod_margin,
                center_x,
            )
        })
    };

    let state_key = ViewState::build_key(zoom, center_x, center_y, radius, viewport.as_ref());
    Some(ViewState {
        zoom,
        center_x,
        center_y,
        tile_radius: radius,
        viewport,
        viewport_bounds: bounds,
        state_key,
    })
}

/// Farthest bounds corner from `focus`.
fn bounds_reach(bounds: &Bounds, focus: Point) -> f64 {
    GroundQuad::new([
        bounds.min,
        Point::new(bounds.max.x, bounds.min.y),
        bounds.max,
        Point::new(bounds.min.x, bounds.max.y),
    ])
    .reach_from(focus)
}

/// Projects visible bounds into a tile window with `margin`. Degenerate
/// geometry yields `None`.
fn project_window(
    bounds: &Bounds,
    frame: &LocalFrame,
    zoom: u8,
    margin: f64,
    center_x: u32,
) -> Option<TileWindow> {
    let n = TileCoord::world_size(zoom) as f64;
    let (x0, y0) = frame.local_to_tile(bounds.min, zoom);
    let (x1, y1) = frame.local_to_tile(bounds.max, zoom);
    let raw = TileWindow {
        min_x: x0.min(x1) - margin,
        max_x: x0.max(x1) + margin,
        min_y: y0.min(y1) - margin,
        max_y: y0.max(y1) + margin,
    };

    let finite = [raw.min_x, raw.max_x, raw.min_y, raw.max_y]
        .iter()
        .all(|v| v.is_finite());
    if !finite
        || raw.width() > MAX_VIEWPORT_WORLD_SPAN * n
        || raw.height() > MAX_VIEWPORT_WORLD_SPAN * n
    {
        log::debug!("degenerate viewport at zoom {}, using radius mode", zoom);
        return None;
    }

    // The window's x may sit a world away from the center when the focus
    // wrapped; move it next to the center.
    let mid_x = (raw.min_x + raw.max_x) / 2.0;
    let shift = ((center_x as f64 + 0.5 - mid_x) / n).round() * n;
    Some(TileWindow {
        min_x: raw.min_x + shift,
        max_x: raw.max_x + shift,
        ..raw
    })
}

/// Squared wrap-aware distance in tiles from the view center.
pub fn tile_priority(coord: &TileCoord, center_x: u32, center_y: u32) -> f64 {
    let n = TileCoord::world_size(coord.z) as i64;
    let raw_dx = (coord.x as i64 - center_x as i64).rem_euclid(n);
    let dx = raw_dx.min(n - raw_dx) as f64;
    let dy = coord.y as f64 - center_y as f64;
    dx * dx + dy * dy
}

/// Builds the desired tile list for an applied view state, closest first.
pub fn desired_tiles(
    view: &ViewState,
    options: &TileLayerOptions,
    frame: &LocalFrame,
) -> Vec<DesiredTile> {
    let zoom = view.zoom;
    let n = TileCoord::world_size(zoom) as i64;
    let mut seen: HashSet<TileCoord> = HashSet::default();
    let mut tiles = Vec::new();

    let mut push = |x: i64, y: i64| {
        if let Some(coord) = TileCoord::wrapped(x, y, zoom) {
            if seen.insert(coord) {
                tiles.push(DesiredTile {
                    coord,
                    priority: tile_priority(&coord, view.center_x, view.center_y),
                    rect: Some(frame.tile_rect(&coord)),
                });
            }
        }
    };

    match &view.viewport {
        Some(window) => {
            let min_y = (window.min_y.floor() as i64).max(0);
            let max_y = (window.max_y.floor() as i64).min(n - 1);
            let (min_x, max_x) = if window.width() >= n as f64 {
                (0, n - 1)
            } else {
                (window.min_x.floor() as i64, window.max_x.floor() as i64)
            };
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    push(x, y);
                }
            }
        }
        None => {
            let r = view.tile_radius as i64;
            let (cx, cy) = (view.center_x as i64, view.center_y as i64);
            for dy in -r..=r {
                for dx in -r..=r {
                    push(cx + dx, cy + dy);
                }
            }
        }
    }

    tiles.sort_by(|a, b| {
        a.priority
            .total_cmp(&b.priority)
            .then_with(|| a.coord.cmp(&b.coord))
    });
    if let Some(max_tiles) = options.lod_for(zoom).and_then(|level| level.max_tiles) {
        tiles.truncate(max_tiles);
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LodLevel;
    use crate::core::geo::LatLng;

    fn frame() -> LocalFrame {
        LocalFrame::default()
    }

    fn focus_on_tile(coord: TileCoord) -> Point {
        frame().tile_rect(&coord).center
    }

    #[test]
    fn test_zoom_follows_height_and_clamps() {
        let options = TileLayerOptions::for_testing();
        assert_eq!(select_zoom(100_000.0, &options), 10);
        assert_eq!(select_zoom(1.0, &options), 19);
        assert_eq!(select_zoom(1e12, &options), options.min_zoom);

        let clamped = TileLayerOptions {
            max_zoom: 15,
            ..TileLayerOptions::for_testing()
        };
        assert_eq!(select_zoom(1.0, &clamped), 15);
    }

    #[test]
    fn test_radius_mode_window() {
        let options = TileLayerOptions::for_testing();
        let target = TileCoord::new(512, 341, 10);
        let input = FrameInput::new(focus_on_tile(target), 100_000.0);
        let view = sample_view(&input, &options, &frame()).unwrap();
        assert_eq!((view.zoom, view.center_x, view.center_y), (10, 512, 341));
        assert!(view.viewport.is_none());

        let tiles = desired_tiles(&view, &options, &frame());
        assert_eq!(tiles.len(), 25);
        assert_eq!(tiles[0].coord, target);
        assert_eq!(tiles[0].priority, 0.0);
        assert!(tiles.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn test_low_zoom_covers_whole_world() {
        let options = TileLayerOptions {
            min_zoom: 0,
            ..TileLayerOptions::for_testing()
        };
        // Zoom 3 has eight columns.
        let input = FrameInput::new(Point::new(0.0, 0.0), 16_000_000.0);
        let view = sample_view(&input, &options, &frame()).unwrap();
        assert_eq!(view.zoom, 3);
        let tiles = desired_tiles(&view, &options, &frame());
        assert_eq!(tiles.len(), 64);
    }

    #[test]
    fn test_columns_wrap_and_rows_are_dropped() {
        let options = TileLayerOptions::for_testing();
        let corner = TileCoord::new(0, 0, 10);
        let input = FrameInput::new(focus_on_tile(corner), 100_000.0);
        let view = sample_view(&input, &options, &frame()).unwrap();
        let tiles = desired_tiles(&view, &options, &frame());

        // Rows -2 and -1 are dropped, columns 1022 and 1023 wrap in.
        assert_eq!(tiles.len(), 15);
        assert!(tiles.iter().any(|t| t.coord.x == 1023));
        let wrapped = tiles.iter().find(|t| t.coord == TileCoord::new(1023, 0, 10));
        assert_eq!(wrapped.map(|t| t.priority), Some(1.0));
    }

    #[test]
    fn test_viewport_mode_uses_projected_window() {
        let options = TileLayerOptions {
            viewport_margin_tiles: 0.0,
            ..TileLayerOptions::for_testing()
        };
        let frame = frame();
        let target = TileCoord::new(512, 341, 10);
        let rect = frame.tile_rect(&target);
        // One tile wide, two tiles tall (northwards).
        let bounds = Bounds::from_coords(
            rect.center.x - rect.width * 0.4,
            rect.center.y - rect.height * 0.4,
            rect.center.x + rect.width * 0.4,
            rect.center.y + rect.height * 1.4,
        );
        let input = FrameInput::new(rect.center, 100_000.0).with_viewport_bounds(bounds);
        let view = sample_view(&input, &options, &frame).unwrap();
        assert!(view.viewport.is_some());

        let mut coords: Vec<_> = desired_tiles(&view, &options, &frame)
            .into_iter()
            .map(|t| t.coord)
            .collect();
        coords.sort();
        assert_eq!(
            coords,
            vec![TileCoord::new(512, 340, 10), TileCoord::new(512, 341, 10)]
        );
    }

    fn strip_around(coord: TileCoord, half_width_tiles: f64, frame: &LocalFrame) -> Bounds {
        let rect = frame.tile_rect(&coord);
        Bounds::from_coords(
            rect.center.x - rect.width * half_width_tiles,
            rect.center.y - rect.height * 0.4,
            rect.center.x + rect.width * half_width_tiles,
            rect.center.y + rect.height * 0.4,
        )
    }

    #[test]
    fn test_wide_viewport_is_not_cut_to_the_radius() {
        let options = TileLayerOptions {
            viewport_margin_tiles: 0.0,
            ..TileLayerOptions::for_testing()
        };
        let frame = frame();
        let target = TileCoord::new(512, 341, 10);
        let bounds = strip_around(target, 10.4, &frame);
        let input = FrameInput::new(frame.tile_rect(&target).center, 100_000.0)
            .with_viewport_bounds(bounds);
        let view = sample_view(&input, &options, &frame).unwrap();
        assert!(view.viewport.is_some());

        let tiles = desired_tiles(&view, &options, &frame);
        assert_eq!(tiles.len(), 21);
        assert!(tiles.iter().all(|t| t.coord.y == 341));
        assert!(tiles.iter().any(|t| t.coord.x == 502));
        assert!(tiles.iter().any(|t| t.coord.x == 522));
    }

    #[test]
    fn test_viewport_wider_than_world_takes_every_column_once() {
        let options = TileLayerOptions {
            viewport_margin_tiles: 0.0,
            ..TileLayerOptions::for_testing()
        };
        let frame = frame();
        // Zoom 5 has 32 columns; the strip is 40 tiles wide.
        let target = TileCoord::new(16, 16, 5);
        let bounds = strip_around(target, 20.0, &frame);
        let input = FrameInput::new(frame.tile_rect(&target).center, 3_000_000.0)
            .with_viewport_bounds(bounds);
        let view = sample_view(&input, &options, &frame).unwrap();
        assert_eq!(view.zoom, 5);
        let window = view.viewport.unwrap();
        assert!(window.width() >= 32.0);

        let tiles = desired_tiles(&view, &options, &frame);
        assert_eq!(tiles.len(), 32);
        assert!(tiles.iter().all(|t| t.coord.y == 16));
        let mut columns: Vec<u32> = tiles.iter().map(|t| t.coord.x).collect();
        columns.sort_unstable();
        assert_eq!(columns, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_degenerate_viewport_falls_back_to_radius_mode() {
        let options = TileLayerOptions::for_testing();
        let quad = GroundQuad::new([
            Point::new(0.0, 0.0),
            Point::new(f64::INFINITY, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]);
        let input = FrameInput::new(Point::new(0.0, 0.0), 100_000.0).with_visible_ground(quad);
        let view = sample_view(&input, &options, &frame()).unwrap();
        assert!(view.viewport.is_none());
        assert_eq!(view.tile_radius, options.tile_radius);
    }

    #[test]
    fn test_visible_ground_widens_radius() {
        let options = TileLayerOptions::for_testing();
        let size = frame().tile_world_size(10);
        let quad = GroundQuad::new([
            Point::new(-4.5 * size, -4.5 * size),
            Point::new(4.5 * size, -4.5 * size),
            Point::new(4.5 * size, 4.5 * size),
            Point::new(-4.5 * size, 4.5 * size),
        ]);
        let input = FrameInput::new(Point::new(0.0, 0.0), 100_000.0).with_visible_ground(quad);
        let view = sample_view(&input, &options, &frame()).unwrap();
        assert_eq!(view.tile_radius, options.max_dynamic_tile_radius);
    }

    #[test]
    fn test_lod_caps_tile_count() {
        let options = TileLayerOptions {
            lod_levels: vec![LodLevel {
                zoom: 10,
                max_tiles: Some(5),
                ..LodLevel::default()
            }],
            ..TileLayerOptions::for_testing()
        };
        let frame = LocalFrame::new(LatLng::new(51.5, -0.12), 1.0);
        let input = FrameInput::new(Point::new(0.0, 0.0), 100_000.0);
        let view = sample_view(&input, &options, &frame).unwrap();
        let tiles = desired_tiles(&view, &options, &frame);
        assert_eq!(tiles.len(), 5);
        assert!(tiles.iter().all(|t| t.priority <= 1.0));
    }

    #[test]
    fn test_non_finite_focus_is_skipped() {
        let options = TileLayerOptions::for_testing();
        let input = FrameInput::new(Point::new(f64::NAN, 0.0), 100.0);
        assert!(sample_view(&input, &options, &frame()).is_none());
    }
}
