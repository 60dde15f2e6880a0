//! Projection math, geometry primitives and configuration.

pub mod bounds;
pub mod config;
pub mod constants;
pub mod geo;
