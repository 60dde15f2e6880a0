use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::bounds::Bounds;

/// Web Mercator projection constants
pub const EARTH_RADIUS: f64 = 6378137.0;
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Half the width of the projected world in meters (`π·R`).
pub const HALF_WORLD_METERS: f64 = PI * EARTH_RADIUS;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Converts to Web Mercator projection (EPSG:3857)
    pub fn to_mercator(&self) -> Point {
        let lat = Self::clamp_lat(self.lat);
        let x = self.lng.to_radians() * EARTH_RADIUS;
        let y = ((PI / 4.0 + lat.to_radians() / 2.0).tan().ln()) * EARTH_RADIUS;
        Point::new(x, y)
    }

    /// Creates LatLng from Web Mercator coordinates
    pub fn from_mercator(point: Point) -> Self {
        let lng = (point.x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        Self::new(Self::clamp_lat(lat), Self::wrap_lng(lng))
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A point on the ground plane, either in projected meters or render units
/// depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Number of tiles along one axis at `zoom`.
    pub fn world_size(zoom: u8) -> u32 {
        1u32 << zoom
    }

    /// Builds a coordinate from unbounded indices: `x` wraps around the
    /// antimeridian, `y` outside `[0, 2^z)` yields `None`.
    pub fn wrapped(x: i64, y: i64, z: u8) -> Option<TileCoord> {
        let n = Self::world_size(z) as i64;
        if y < 0 || y >= n {
            return None;
        }
        Some(TileCoord::new(x.rem_euclid(n) as u32, y as u32, z))
    }

    /// Creates a tile coordinate from a LatLng and zoom level
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        let (x, y) = lon_lat_to_tile(lat_lng.lng, lat_lng.lat, zoom);
        let n = Self::world_size(zoom) as i64;
        let col = (x.floor() as i64).rem_euclid(n);
        let row = (y.floor() as i64).clamp(0, n - 1);
        Self::new(col as u32, row as u32, zoom)
    }

    /// Converts tile coordinate to LatLng (northwest corner)
    pub fn to_lat_lng(&self) -> LatLng {
        tile_to_lon_lat(self.x as f64, self.y as f64, self.z)
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Gets the four child tiles at the next zoom level
    pub fn children(&self) -> [TileCoord; 4] {
        [
            TileCoord::new(self.x * 2, self.y * 2, self.z + 1),
            TileCoord::new(self.x * 2 + 1, self.y * 2, self.z + 1),
            TileCoord::new(self.x * 2, self.y * 2 + 1, self.z + 1),
            TileCoord::new(self.x * 2 + 1, self.y * 2 + 1, self.z + 1),
        ]
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = Self::world_size(self.z);
        self.x < max_coord && self.y < max_coord
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Fractional tile indices of a geographic position. The integer part is the
/// tile, the fraction the position inside it.
pub fn lon_lat_to_tile(lng: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let lat_rad = LatLng::clamp_lat(lat).to_radians();
    let n = TileCoord::world_size(zoom) as f64;
    let x = (lng + 180.0) / 360.0 * n;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;
    (x, y)
}

/// Inverse of [`lon_lat_to_tile`]; accepts fractional indices.
pub fn tile_to_lon_lat(x: f64, y: f64, zoom: u8) -> LatLng {
    let n = TileCoord::world_size(zoom) as f64;
    let lng = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

/// Geographic position to projected Web Mercator meters.
pub fn lon_lat_to_meters(lng: f64, lat: f64) -> Point {
    LatLng::new(lat, lng).to_mercator()
}

/// Projected Web Mercator meters back to a geographic position.
pub fn meters_to_lon_lat(meters: Point) -> LatLng {
    LatLng::from_mercator(meters)
}

/// Edge length of one tile in projected meters at `zoom`.
pub fn tile_size_meters(zoom: u8) -> f64 {
    2.0 * HALF_WORLD_METERS / TileCoord::world_size(zoom) as f64
}

/// Axis-aligned rectangle on the ground plane in local render units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldRect {
    pub center: Point,
    pub width: f64,
    pub height: f64,
}

impl WorldRect {
    pub fn bounds(&self) -> Bounds {
        Bounds::from_center_and_size(self.center, self.width, self.height)
    }
}

/// The engine's local render frame: projected meters shifted to an origin and
/// divided by a fixed unit scale.
///
/// Local `x` grows east, local `y` grows north. Tile rows grow south, so the
/// frame flips the sign when converting to tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    /// Origin in projected meters.
    pub origin: Point,
    pub meters_per_unit: f64,
}

impl LocalFrame {
    pub fn new(origin: LatLng, meters_per_unit: f64) -> Self {
        Self {
            origin: origin.to_mercator(),
            meters_per_unit,
        }
    }

    pub fn meters_to_local(&self, meters: Point) -> Point {
        meters.subtract(&self.origin).multiply(1.0 / self.meters_per_unit)
    }

    pub fn local_to_meters(&self, local: Point) -> Point {
        local.multiply(self.meters_per_unit).add(&self.origin)
    }

    pub fn lat_lng_to_local(&self, lat_lng: &LatLng) -> Point {
        self.meters_to_local(lat_lng.to_mercator())
    }

    pub fn local_to_lat_lng(&self, local: Point) -> LatLng {
        LatLng::from_mercator(self.local_to_meters(local))
    }

    /// Edge length of one tile in render units at `zoom`.
    pub fn tile_world_size(&self, zoom: u8) -> f64 {
        tile_size_meters(zoom) / self.meters_per_unit
    }

    /// Fractional tile indices of a local point. Works directly in meters so
    /// that points beyond the Mercator latitude limit keep growing linearly.
    pub fn local_to_tile(&self, local: Point, zoom: u8) -> (f64, f64) {
        let meters = self.local_to_meters(local);
        let size = tile_size_meters(zoom);
        (
            (meters.x + HALF_WORLD_METERS) / size,
            (HALF_WORLD_METERS - meters.y) / size,
        )
    }

    /// World rectangle covered by a tile, in render units.
    pub fn tile_rect(&self, coord: &TileCoord) -> WorldRect {
        let size = tile_size_meters(coord.z);
        let west = -HALF_WORLD_METERS + coord.x as f64 * size;
        let north = HALF_WORLD_METERS - coord.y as f64 * size;
        let center = Point::new(west + size / 2.0, north - size / 2.0);
        let extent = size / self.meters_per_unit;
        WorldRect {
            center: self.meters_to_local(center),
            width: extent,
            height: extent,
        }
    }
}

impl Default for LocalFrame {
    fn default() -> Self {
        Self::new(LatLng::default(), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
    }

    #[test]
    fn test_tile_coord_conversion() {
        let lat_lng = LatLng::new(40.70, -74.0);
        let tile = TileCoord::from_lat_lng(&lat_lng, 10);
        assert_eq!((tile.x, tile.y, tile.z), (301, 385, 10));

        let back_to_lat_lng = tile.to_lat_lng();
        assert!((back_to_lat_lng.lat - lat_lng.lat).abs() < 1.0);
        assert!((back_to_lat_lng.lng - lat_lng.lng).abs() < 1.0);
    }

    #[test]
    fn test_mercator_round_trip_is_clamped() {
        let pole = LatLng::new(89.9, 10.0);
        let meters = pole.to_mercator();
        let back = LatLng::from_mercator(meters);
        assert!((back.lat - MAX_LATITUDE).abs() < 1e-6);
        assert!((back.lng - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_frame_round_trip() {
        let frame = LocalFrame::new(LatLng::new(47.3769, 8.5417), 2.0);
        assert_eq!(frame.lat_lng_to_local(&LatLng::new(47.3769, 8.5417)), Point::new(0.0, 0.0));

        let meters = frame.origin.add(&Point::new(1_000.0, -500.0));
        let local = frame.meters_to_local(meters);
        assert!((local.x - 500.0).abs() < 1e-6);
        assert!((local.y - -250.0).abs() < 1e-6);

        let back = frame.local_to_meters(local);
        assert!(back.distance_to(&meters) < 1e-6);
    }

    #[test]
    fn test_wrapped_tile_coord() {
        assert_eq!(TileCoord::wrapped(-1, 3, 2), Some(TileCoord::new(3, 3, 2)));
        assert_eq!(TileCoord::wrapped(9, 0, 2), Some(TileCoord::new(1, 0, 2)));
        assert_eq!(TileCoord::wrapped(0, 4, 2), None);
        assert_eq!(TileCoord::wrapped(0, -1, 2), None);
    }

    #[test]
    fn test_parent_and_children() {
        let tile = TileCoord::new(5, 9, 4);
        assert_eq!(tile.parent(), Some(TileCoord::new(2, 4, 3)));
        assert!(tile.children().iter().all(|c| c.parent() == Some(tile)));
        assert_eq!(TileCoord::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_local_frame_tile_rect_contains_its_tile() {
        let frame = LocalFrame::new(LatLng::new(48.8566, 2.3522), 10.0);
        let tile = TileCoord::from_lat_lng(&LatLng::new(48.8566, 2.3522), 12);
        let rect = frame.tile_rect(&tile);

        let (tx, ty) = frame.local_to_tile(rect.center, 12);
        assert_eq!(tx.floor() as u32, tile.x);
        assert_eq!(ty.floor() as u32, tile.y);
        assert!((rect.width - frame.tile_world_size(12)).abs() < 1e-9);
        // The origin lies inside the tile that contains it.
        assert!(rect.bounds().contains(&Point::new(0.0, 0.0)));
    }
}
