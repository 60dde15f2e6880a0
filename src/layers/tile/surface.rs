//! Renderable quad owned by each cache entry

use std::sync::Arc;

use crate::core::{
    constants::OPACITY_EPSILON,
    geo::{TileCoord, WorldRect},
};

/// Decoded RGBA8 tile image, shared with whatever uploads it to the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
}

impl TileImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// A textured quad lying on the ground plane, one per cached tile.
///
/// The surface is created together with its cache entry and dropped with it;
/// dropping releases the texture reference. Hosts read surfaces every frame
/// and mirror them into their scene graph, keyed by [`TileSurface::coord`].
#[derive(Debug)]
pub struct TileSurface {
    coord: TileCoord,
    rect: WorldRect,
    texture: Option<Arc<TileImage>>,
    opacity: f32,
}

impl TileSurface {
    pub(crate) fn new(coord: TileCoord, rect: WorldRect) -> Self {
        Self {
            coord,
            rect,
            texture: None,
            opacity: 0.0,
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Position and size in render units.
    pub fn rect(&self) -> &WorldRect {
        &self.rect
    }

    pub fn texture(&self) -> Option<&Arc<TileImage>> {
        self.texture.as_ref()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Higher zooms draw above their coarser fallbacks.
    pub fn render_order(&self) -> u8 {
        self.coord.z
    }

    pub fn is_visible(&self) -> bool {
        self.texture.is_some() && self.opacity > OPACITY_EPSILON
    }

    pub(crate) fn set_texture(&mut self, image: Arc<TileImage>) {
        self.texture = Some(image);
    }

    pub(crate) fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Point;

    #[test]
    fn test_surface_visibility_needs_texture_and_opacity() {
        let rect = WorldRect {
            center: Point::new(0.0, 0.0),
            width: 2.0,
            height: 2.0,
        };
        let mut surface = TileSurface::new(TileCoord::new(0, 0, 1), rect);
        surface.set_opacity(1.0);
        assert!(!surface.is_visible());

        let image = Arc::new(TileImage::new(1, 1, vec![0, 0, 0, 255]));
        surface.set_texture(image.clone());
        assert!(surface.is_visible());
        assert_eq!(Arc::strong_count(&image), 2);

        drop(surface);
        assert_eq!(Arc::strong_count(&image), 1);
    }
}
