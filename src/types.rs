//! Positions and cell addressing shared by every component

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// World-space position. `x`/`y` span the terrain plane, `z` is height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub orientation: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            orientation: 0.0,
        }
    }

    pub fn with_orientation(mut self, orientation: f32) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn plane(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Distance on the terrain plane, ignoring height
    pub fn distance_2d(&self, other: &Position) -> f32 {
        self.plane().distance(other.plane())
    }
}

/// Address of a cell inside the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

impl CellCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Flat cell id, `y * width + x`. This is the home-cell id persisted with respawn records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u32);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_ignores_height() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 100.0);
        assert!((a.distance_2d(&b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cell_coord_ordering() {
        let mut coords = vec![CellCoord::new(2, 1), CellCoord::new(1, 5), CellCoord::new(1, 2)];
        coords.sort();
        assert_eq!(coords[0], CellCoord::new(1, 2));
        assert_eq!(coords[2], CellCoord::new(2, 1));
    }
}
