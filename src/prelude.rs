//! Prelude module for common tileplane types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tileplane::prelude::*;`

pub use crate::core::{
    bounds::{Bounds, GroundQuad},
    config::{HeightZoomTable, LodLevel, RowConvention, TileLayerOptions},
    geo::{LatLng, LocalFrame, Point, TileCoord, WorldRect},
};

pub use crate::layers::tile::{
    loader::{AsyncTileFetcher, FetchCompletion, ImageSource, TileFetcher, TileRequest},
    source::{TileSource, UrlTemplateSource},
    DebugOverlay, FrameInput, ManualFetcher, TileLayer, TileState, TileSurface, TileTelemetry,
};

#[cfg(feature = "render")]
pub use crate::layers::tile::loader::HttpImageSource;

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::{ConfigError, Error as TileError, Result};

pub use std::{pin::Pin, sync::Arc};

pub use instant::{Duration, Instant};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

pub use futures::Future;
