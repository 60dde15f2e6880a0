//! Glue between a 3D camera and the tile layer's per-frame input

pub mod camera;

// Re-export main types
pub use camera::{ground_to_world, world_to_ground, Camera};
