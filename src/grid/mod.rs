//! Spatial grid - DOP
//!
//! Data lives in grid_data.rs, functions in grid_operations.rs.

pub mod grid_data;
pub mod grid_operations;

pub use grid_data::{Cell, CellState, GridGeometry, GridIndex, GridStats, UnloadedCell};
pub use grid_operations as ops;
