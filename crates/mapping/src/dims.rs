//! Map dimension properties.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Cell length, size in cells and top-left world offset of a grid map.
///
/// The in-bounds limit is two cells short of the size on each axis so the
/// bilinear interpolation can always fetch an `(i+1, j+1)` neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapDimensions {
    cell_length: f64,
    top_left_offset: [f64; 2],
    map_dimensions: [usize; 2],
    map_limits: [f64; 2],
}

impl MapDimensions {
    pub fn new(top_left_offset: [f64; 2], map_dimensions: [usize; 2], cell_length: f64) -> Self {
        let mut dims = Self {
            cell_length,
            top_left_offset,
            map_dimensions: [0, 0],
            map_limits: [0.0, 0.0],
        };
        dims.set_map_cell_dims(map_dimensions);
        dims
    }

    pub fn set_map_cell_dims(&mut self, new_dims: [usize; 2]) {
        self.map_dimensions = new_dims;
        self.map_limits = [new_dims[0] as f64 - 2.0, new_dims[1] as f64 - 2.0];
    }

    pub fn set_top_left_offset(&mut self, offset: [f64; 2]) {
        self.top_left_offset = offset;
    }

    pub fn set_cell_length(&mut self, cell_length: f64) {
        self.cell_length = cell_length;
    }

    /// Whether a map coordinate lies outside the interpolation-safe interior.
    pub fn point_out_of_map_bounds(&self, coords: Vector2<f64>) -> bool {
        coords.x < 0.0
            || coords.x > self.map_limits[0]
            || coords.y < 0.0
            || coords.y > self.map_limits[1]
    }

    pub fn map_dimensions(&self) -> [usize; 2] {
        self.map_dimensions
    }

    pub fn size_x(&self) -> usize {
        self.map_dimensions[0]
    }

    pub fn size_y(&self) -> usize {
        self.map_dimensions[1]
    }

    pub fn cell_length(&self) -> f64 {
        self.cell_length
    }

    pub fn top_left_offset(&self) -> [f64; 2] {
        self.top_left_offset
    }

    pub fn has_equal_dimensions(&self, other: &MapDimensions) -> bool {
        self.map_dimensions == other.map_dimensions
    }

    pub fn has_equal_transformation(&self, other: &MapDimensions) -> bool {
        self.top_left_offset == other.top_left_offset && self.cell_length == other.cell_length
    }
}
