//! Scene layers. The tile layer is the only one the engine ships.

pub mod tile;
