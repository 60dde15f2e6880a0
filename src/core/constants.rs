//! Engine-wide defaults derived from common web-map conventions.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

/// Highest zoom level the scheduler accepts.
pub const MAX_SUPPORTED_ZOOM: u8 = 22;

/// Default OpenStreetMap URL template.
pub const DEFAULT_URL_TEMPLATE: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default subdomains for load balancing across tile servers.
pub const DEFAULT_SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// User agent sent with tile requests; public tile servers reject anonymous clients.
pub const DEFAULT_USER_AGENT: &str = "tileplane/0.1.0";

/// Below this many columns the whole world is requested at once.
pub const FULL_WORLD_COLUMN_THRESHOLD: u32 = 8;

/// A viewport spanning more than this many worlds (in tile space) is treated
/// as degenerate geometry.
pub const MAX_VIEWPORT_WORLD_SPAN: f64 = 4.0;

/// Opacity below which a surface counts as hidden.
pub const OPACITY_EPSILON: f32 = 1e-3;

/// Camera height (render units at 1 m/unit) → zoom. Each row reads
/// "at or below this height, use this zoom".
pub const DEFAULT_HEIGHT_ZOOM_TABLE: [(f64, u8); 17] = [
    (250.0, 19),
    (500.0, 18),
    (1_000.0, 17),
    (2_000.0, 16),
    (4_000.0, 15),
    (8_000.0, 14),
    (16_000.0, 13),
    (32_000.0, 12),
    (64_000.0, 11),
    (128_000.0, 10),
    (256_000.0, 9),
    (512_000.0, 8),
    (1_024_000.0, 7),
    (2_048_000.0, 6),
    (4_096_000.0, 5),
    (8_192_000.0, 4),
    (16_384_000.0, 3),
];
