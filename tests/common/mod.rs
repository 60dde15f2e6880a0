//! Shared helpers for driving a layer frame by frame without a network.

#![allow(dead_code)]

use tileplane::{
    layers::tile::TileImage,
    prelude::{Duration, Instant},
    FrameInput, ManualFetcher, TileCoord, TileLayer, TileLayerOptions,
};

/// Camera height that selects zoom 10 with the default height table.
pub const HEIGHT_Z10: f64 = 100_000.0;
/// Camera height that selects zoom 9.
pub const HEIGHT_Z9: f64 = 200_000.0;
/// Camera height that selects zoom 14.
pub const HEIGHT_Z14: f64 = 6_000.0;

pub struct Harness {
    pub layer: TileLayer,
    pub fetcher: ManualFetcher,
    pub start: Instant,
}

impl Harness {
    pub fn new(options: TileLayerOptions) -> Self {
        let fetcher = ManualFetcher::new();
        let layer = TileLayer::new(options, Box::new(fetcher.clone())).expect("valid options");
        Self {
            layer,
            fetcher,
            start: Instant::now(),
        }
    }

    pub fn at(&self, millis: u64) -> Instant {
        self.start + Duration::from_millis(millis)
    }

    /// Camera input centred on `coord` at `height`.
    pub fn looking_at(&self, coord: TileCoord, height: f64) -> FrameInput {
        let focus = self.layer.local_frame().tile_rect(&coord).center;
        FrameInput::new(focus, height)
    }

    pub fn frame(&mut self, input: &FrameInput, millis: u64) {
        let now = self.at(millis);
        self.layer.update(input, now);
    }
}

/// Options with a single desired tile and no ancestor walk.
pub fn single_tile_options() -> TileLayerOptions {
    TileLayerOptions {
        tile_radius: 0,
        max_dynamic_tile_radius: 0,
        max_parent_search_depth: 0,
        ..TileLayerOptions::for_testing()
    }
}

pub fn image() -> TileImage {
    TileImage::new(1, 1, vec![40, 80, 120, 255])
}
