//! Tile streaming and caching
//!
//! [`TileLayer`] is the per-frame engine. The submodules are its parts:
//! sampling the camera into a view, throttling view changes, the fetch queue
//! and fetch layer, the cache with eviction, ancestor fallback with fading,
//! and telemetry.

pub mod cache;
pub mod fallback;
pub mod layer;
pub mod loader;
pub mod queue;
pub mod sampler;
pub mod source;
pub mod surface;
pub mod telemetry;
pub mod throttle;
pub mod types;

pub use cache::TileCache;
pub use layer::TileLayer;
pub use loader::{
    AsyncTileFetcher, FetchCompletion, ImageSource, ManualFetcher, TileFetcher, TileRequest,
};
pub use queue::LoadQueue;
pub use sampler::FrameInput;
pub use source::{TileSource, UrlTemplateSource};
pub use surface::{TileImage, TileSurface};
pub use telemetry::{DebugOverlay, TileTelemetry};
pub use throttle::{ThrottleDecision, UpdateThrottle};
pub use types::{DesiredTile, Tile, TileKey, TileState, TileWindow, ViewState};

#[cfg(feature = "render")]
pub use loader::HttpImageSource;
