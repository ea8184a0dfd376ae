//! Grid Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in grid_operations.rs

use crate::entity::EntityHandle;
use crate::types::CellCoord;
use bit_vec::BitVec;

/// Lifecycle state of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Unloaded,
    Loaded,
    /// Loaded but without interest; unloads when the expiry countdown runs out
    MarkedForUnload,
}

/// Mapping between world space and cells. The grid is centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
    /// World-space corner of cell (0, 0)
    pub origin_x: f32,
    pub origin_y: f32,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub coord: CellCoord,
    pub state: CellState,
    /// Handles of every entity currently placed in the cell
    pub entities: Vec<EntityHandle>,
    pub player_count: u32,
    pub active_count: u32,
    /// Explicit no-unload pins
    pub pin_count: u32,
    /// Remaining time before unload, only counts down while marked
    pub expiry_ms: i64,
    pub times_loaded: u32,
}

/// Fixed-size cell grid of one instance
#[derive(Debug, Clone)]
pub struct GridIndex {
    pub geometry: GridGeometry,
    pub unload_delay_ms: u32,
    pub cells: Vec<Cell>,
    /// Bit per cell, set while the cell is Loaded or MarkedForUnload
    pub loaded: BitVec,
}

/// Cell released by the grid tick or a full unload, with the entities it held
#[derive(Debug, Clone)]
pub struct UnloadedCell {
    pub coord: CellCoord,
    pub entities: Vec<EntityHandle>,
}

/// Grid statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub loaded_cells: usize,
    pub marked_cells: usize,
    pub pinned_cells: usize,
    pub placed_entities: usize,
}
