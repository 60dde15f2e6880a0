//! # tileplane
//!
//! Streams web-map raster tiles (OpenStreetMap-style XYZ tiles) onto the
//! ground plane of a 3D scene.
//!
//! The heart of the crate is [`TileLayer`], a per-frame scheduler that decides
//! which tiles the camera needs, fetches missing ones under a concurrency
//! budget, shows coarser ancestors while children load, fades tiles in and
//! out, and evicts stale entries to keep memory bounded. Everything else
//! (projection math, frustum/ground intersection, the async fetch layer)
//! supports that loop.

pub mod core;
pub mod layers;
pub mod prelude;
#[cfg(feature = "render")]
pub mod rendering;
pub mod runtime;

pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::{Bounds, GroundQuad},
    config::{HeightZoomTable, LodLevel, RowConvention, TileLayerOptions},
    geo::{LatLng, LocalFrame, Point, TileCoord, WorldRect},
};

pub use layers::tile::{
    DebugOverlay, FrameInput, ManualFetcher, TileFetcher, TileLayer, TileState, TileSurface,
    TileTelemetry, UrlTemplateSource,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration problems detected while building a layer.
///
/// These are fatal: a layer is never constructed from options that fail
/// validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid zoom range: min_zoom {min} > max_zoom {max} (or above the supported maximum)")]
    InvalidZoomRange { min: u8, max: u8 },

    #[error("option `{field}` must be finite")]
    NonFinite { field: &'static str },

    #[error("option `{field}` must not be empty")]
    EmptyList { field: &'static str },

    #[error("option `{field}` is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to parse options: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Install `env_logger` as the `log` backend, honouring `RUST_LOG`.
///
/// Calling this more than once is harmless.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
