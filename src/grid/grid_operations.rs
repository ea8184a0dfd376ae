//! Grid Operations - DOP Functions
//!
//! Functions over GridIndex and GridGeometry. The grid only tracks cell
//! state and which handles sit in which cell; populating a freshly loaded
//! cell and releasing the entities of an unloaded one is the instance's job.

use super::grid_data::{Cell, CellState, GridGeometry, GridIndex, GridStats, UnloadedCell};
use crate::config::GridConfig;
use crate::entity::EntityHandle;
use crate::types::{CellCoord, CellId, Position};
use bit_vec::BitVec;
use std::collections::BTreeSet;

/// Geometry for a grid centred on the world origin
pub fn create_geometry(config: &GridConfig) -> GridGeometry {
    GridGeometry {
        width: config.width,
        height: config.height,
        cell_size: config.cell_size,
        origin_x: -(config.width as f32 * config.cell_size) / 2.0,
        origin_y: -(config.height as f32 * config.cell_size) / 2.0,
    }
}

/// Create a grid with every cell unloaded
pub fn create_grid(config: &GridConfig) -> GridIndex {
    let geometry = create_geometry(config);
    let mut cells = Vec::with_capacity((config.width * config.height) as usize);
    for y in 0..config.height {
        for x in 0..config.width {
            cells.push(Cell {
                coord: CellCoord::new(x, y),
                state: CellState::Unloaded,
                entities: Vec::new(),
                player_count: 0,
                active_count: 0,
                pin_count: 0,
                expiry_ms: 0,
                times_loaded: 0,
            });
        }
    }

    GridIndex {
        geometry,
        unload_delay_ms: config.unload_delay_ms,
        loaded: BitVec::from_elem(cells.len(), false),
        cells,
    }
}

/// Cell containing `position`, `None` when outside the grid
pub fn coord_for(geometry: &GridGeometry, position: &Position) -> Option<CellCoord> {
    if !(position.x.is_finite() && position.y.is_finite()) {
        return None;
    }
    let fx = ((position.x - geometry.origin_x) / geometry.cell_size).floor();
    let fy = ((position.y - geometry.origin_y) / geometry.cell_size).floor();
    if fx < 0.0 || fy < 0.0 || fx >= geometry.width as f32 || fy >= geometry.height as f32 {
        return None;
    }
    Some(CellCoord::new(fx as u32, fy as u32))
}

pub fn cell_id(geometry: &GridGeometry, coord: CellCoord) -> CellId {
    CellId(coord.y * geometry.width + coord.x)
}

pub fn coord_of_id(geometry: &GridGeometry, id: CellId) -> Option<CellCoord> {
    if id.0 >= geometry.width * geometry.height {
        return None;
    }
    Some(CellCoord::new(id.0 % geometry.width, id.0 / geometry.width))
}

/// World-space centre of a cell, at height zero
pub fn cell_center(geometry: &GridGeometry, coord: CellCoord) -> Position {
    Position::new(
        geometry.origin_x + (coord.x as f32 + 0.5) * geometry.cell_size,
        geometry.origin_y + (coord.y as f32 + 0.5) * geometry.cell_size,
        0.0,
    )
}

fn index_of(grid: &GridIndex, coord: CellCoord) -> Option<usize> {
    if coord.x < grid.geometry.width && coord.y < grid.geometry.height {
        Some((coord.y * grid.geometry.width + coord.x) as usize)
    } else {
        None
    }
}

pub fn cell(grid: &GridIndex, coord: CellCoord) -> Option<&Cell> {
    index_of(grid, coord).map(|i| &grid.cells[i])
}

fn cell_mut(grid: &mut GridIndex, coord: CellCoord) -> Option<&mut Cell> {
    let index = index_of(grid, coord)?;
    Some(&mut grid.cells[index])
}

pub fn cell_state(grid: &GridIndex, coord: CellCoord) -> CellState {
    cell(grid, coord).map_or(CellState::Unloaded, |c| c.state)
}

pub fn is_loaded(grid: &GridIndex, coord: CellCoord) -> bool {
    index_of(grid, coord).map_or(false, |i| grid.loaded.get(i).unwrap_or(false))
}

/// Transition an unloaded cell to Loaded. Returns true only on that transition.
pub fn mark_loaded(grid: &mut GridIndex, coord: CellCoord) -> bool {
    let Some(index) = index_of(grid, coord) else {
        log::warn!("[GridIndex] Refusing to load out-of-range cell {}", coord);
        return false;
    };
    let delay = grid.unload_delay_ms as i64;
    let cell = &mut grid.cells[index];
    if cell.state != CellState::Unloaded {
        return false;
    }
    cell.state = CellState::Loaded;
    cell.expiry_ms = delay;
    cell.times_loaded += 1;
    grid.loaded.set(index, true);
    log::debug!("[GridIndex] Cell {} loaded", coord);
    true
}

/// Pin a cell so it never unloads while the pin is held
pub fn mark_no_unload(grid: &mut GridIndex, coord: CellCoord) -> bool {
    match cell_mut(grid, coord) {
        Some(cell) => {
            cell.pin_count += 1;
            true
        }
        None => false,
    }
}

/// Release one pin. Unpinning an unpinned cell is logged and ignored.
pub fn unmark_no_unload(grid: &mut GridIndex, coord: CellCoord) -> bool {
    match cell_mut(grid, coord) {
        Some(cell) if cell.pin_count > 0 => {
            cell.pin_count -= 1;
            true
        }
        Some(_) => {
            log::warn!("[GridIndex] Unpin of cell {} without a matching pin", coord);
            false
        }
        None => false,
    }
}

pub fn add_entity(grid: &mut GridIndex, coord: CellCoord, handle: EntityHandle, is_player: bool) {
    if let Some(cell) = cell_mut(grid, coord) {
        cell.entities.push(handle);
        if is_player {
            cell.player_count += 1;
        }
    }
}

pub fn remove_entity(
    grid: &mut GridIndex,
    coord: CellCoord,
    handle: EntityHandle,
    is_player: bool,
) -> bool {
    let Some(cell) = cell_mut(grid, coord) else {
        return false;
    };
    let Some(pos) = cell.entities.iter().position(|h| *h == handle) else {
        return false;
    };
    cell.entities.swap_remove(pos);
    if is_player {
        cell.player_count = cell.player_count.saturating_sub(1);
    }
    true
}

pub fn add_active(grid: &mut GridIndex, coord: CellCoord) {
    if let Some(cell) = cell_mut(grid, coord) {
        cell.active_count += 1;
    }
}

pub fn remove_active(grid: &mut GridIndex, coord: CellCoord) {
    if let Some(cell) = cell_mut(grid, coord) {
        cell.active_count = cell.active_count.saturating_sub(1);
    }
}

/// Square of cells around `center`, clipped to the grid
pub fn cells_in_radius(geometry: &GridGeometry, center: CellCoord, radius: u32) -> Vec<CellCoord> {
    let min_x = center.x.saturating_sub(radius);
    let min_y = center.y.saturating_sub(radius);
    let max_x = center.x.saturating_add(radius).min(geometry.width.saturating_sub(1));
    let max_y = center.y.saturating_add(radius).min(geometry.height.saturating_sub(1));

    let mut cells = Vec::new();
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            cells.push(CellCoord::new(x, y));
        }
    }
    cells
}

/// Loaded cells that are currently under interest: within `radius` of a
/// player or an active object
pub fn observed_cells(grid: &GridIndex, radius: u32) -> BTreeSet<CellCoord> {
    let mut observed = BTreeSet::new();
    for index in grid.loaded.iter().enumerate().filter(|(_, set)| *set).map(|(i, _)| i) {
        let cell = &grid.cells[index];
        if cell.player_count > 0 || cell.active_count > 0 {
            for coord in cells_in_radius(&grid.geometry, cell.coord, radius) {
                if is_loaded(grid, coord) {
                    observed.insert(coord);
                }
            }
        }
    }
    observed
}

fn has_interest(cell: &Cell, observed: &BTreeSet<CellCoord>) -> bool {
    cell.player_count > 0
        || cell.active_count > 0
        || cell.pin_count > 0
        || observed.contains(&cell.coord)
}

/// Advance cell expiry. Cells that lost interest are marked and count down
/// from the unload delay; cells that regained it return to Loaded.
pub fn tick_cells(
    grid: &mut GridIndex,
    elapsed_ms: u32,
    observed: &BTreeSet<CellCoord>,
) -> Vec<UnloadedCell> {
    let delay = grid.unload_delay_ms as i64;
    let loaded: Vec<usize> = grid
        .loaded
        .iter()
        .enumerate()
        .filter(|(_, set)| *set)
        .map(|(i, _)| i)
        .collect();

    let mut released = Vec::new();
    for index in loaded {
        let cell = &mut grid.cells[index];
        if has_interest(cell, observed) {
            cell.state = CellState::Loaded;
            cell.expiry_ms = delay;
            continue;
        }

        match cell.state {
            CellState::Loaded => {
                cell.state = CellState::MarkedForUnload;
                cell.expiry_ms = delay;
            }
            CellState::MarkedForUnload => {
                cell.expiry_ms -= elapsed_ms as i64;
                if cell.expiry_ms <= 0 {
                    cell.state = CellState::Unloaded;
                    cell.expiry_ms = 0;
                    let entities = std::mem::take(&mut cell.entities);
                    let coord = cell.coord;
                    grid.loaded.set(index, false);
                    log::debug!(
                        "[GridIndex] Cell {} unloaded, releasing {} entities",
                        coord,
                        entities.len()
                    );
                    released.push(UnloadedCell { coord, entities });
                }
            }
            CellState::Unloaded => {}
        }
    }
    released
}

/// Unload every loaded cell regardless of interest or pins
pub fn unload_all(grid: &mut GridIndex) -> Vec<UnloadedCell> {
    let mut released = Vec::new();
    for (index, cell) in grid.cells.iter_mut().enumerate() {
        if cell.state == CellState::Unloaded {
            continue;
        }
        cell.state = CellState::Unloaded;
        cell.expiry_ms = 0;
        cell.player_count = 0;
        cell.active_count = 0;
        cell.pin_count = 0;
        grid.loaded.set(index, false);
        released.push(UnloadedCell {
            coord: cell.coord,
            entities: std::mem::take(&mut cell.entities),
        });
    }
    released
}

pub fn loaded_cells(grid: &GridIndex) -> Vec<CellCoord> {
    grid.cells
        .iter()
        .filter(|c| c.state != CellState::Unloaded)
        .map(|c| c.coord)
        .collect()
}

pub fn grid_stats(grid: &GridIndex) -> GridStats {
    let mut stats = GridStats::default();
    for cell in grid.cells.iter().filter(|c| c.state != CellState::Unloaded) {
        stats.loaded_cells += 1;
        if cell.state == CellState::MarkedForUnload {
            stats.marked_cells += 1;
        }
        if cell.pin_count > 0 {
            stats.pinned_cells += 1;
        }
        stats.placed_entities += cell.entities.len();
    }
    stats
}
