//! Binary planning map derived from an occupancy grid.

use mapping::{Cell, GridMap, MappingError, OccGrid};
use nalgebra::Vector2;
use types::Pose;

/// Cell that is either free or obstacle. Untouched cells count as obstacle,
/// which makes unexplored space non-traversable by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCell {
    free: bool,
}

impl BinaryCell {
    pub fn set_free(&mut self, free: bool) {
        self.free = free;
    }
}

impl Cell for BinaryCell {
    fn value(&self) -> f64 {
        if self.free {
            1.0
        } else {
            -1.0
        }
    }

    fn is_occupied(&self) -> bool {
        !self.free
    }

    fn is_free(&self) -> bool {
        self.free
    }

    fn reset(&mut self) {
        self.free = false;
    }
}

/// Downsampled, obstacle-dilated boolean map.
#[derive(Debug, Clone)]
pub struct BinaryMap {
    grid: GridMap<BinaryCell>,
}

impl BinaryMap {
    /// Shrink `source` by `shrink_factor` and erode obstacles by
    /// `check_radius` meters: a binary cell is free only when every source
    /// cell in the corresponding area plus the radius is not occupied.
    pub fn from_occ_grid(
        source: &OccGrid,
        shrink_factor: usize,
        check_radius: f64,
    ) -> Result<Self, MappingError> {
        let size = [
            source.size_x() / shrink_factor,
            source.size_y() / shrink_factor,
        ];
        let cell_length = source.cell_length() * shrink_factor as f64;
        let offset = source.dims().top_left_offset();

        let mut grid = GridMap::<BinaryCell>::new(cell_length, size, offset)?;

        let cell_radius = (check_radius / source.cell_length()).ceil() as i64;
        let piece = shrink_factor as i64 + 2 * cell_radius;

        for j in 0..size[1] {
            for i in 0..size[0] {
                let x_min = i as i64 * shrink_factor as i64 - cell_radius;
                let y_min = j as i64 * shrink_factor as i64 - cell_radius;
                if piece_is_free(source, x_min, y_min, piece) {
                    grid.cell_mut(i, j).set_free(true);
                }
            }
        }

        Ok(Self { grid })
    }

    pub fn size_x(&self) -> usize {
        self.grid.size_x()
    }

    pub fn size_y(&self) -> usize {
        self.grid.size_y()
    }

    pub fn cell_length(&self) -> f64 {
        self.grid.cell_length()
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        self.grid.index(x, y)
    }

    pub fn is_free(&self, x: usize, y: usize) -> bool {
        self.grid.cell(x, y).is_free()
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.grid.cell(x, y).is_occupied()
    }

    pub fn is_occupied_by_index(&self, index: usize) -> bool {
        self.grid.cell_by_index(index).is_occupied()
    }

    pub fn point_out_of_map_bounds(&self, coords: Vector2<f64>) -> bool {
        self.grid.point_out_of_map_bounds(coords)
    }

    pub fn map_coords(&self, world: Vector2<f64>) -> Vector2<f64> {
        self.grid.map_coords(world)
    }

    pub fn map_coords_pose(&self, world_pose: Pose) -> Pose {
        self.grid.map_coords_pose(world_pose)
    }

    pub fn world_coords(&self, map: Vector2<f64>) -> Vector2<f64> {
        self.grid.world_coords(map)
    }
}

/// Whether a `size`-square piece of the source map starting at `(x_min,
/// y_min)` contains no occupied cell. Coordinates are clamped to the map.
fn piece_is_free(source: &OccGrid, x_min: i64, y_min: i64, size: i64) -> bool {
    let x_lo = x_min.max(0) as usize;
    let y_lo = y_min.max(0) as usize;
    let x_hi = ((x_min + size).max(0) as usize).min(source.size_x());
    let y_hi = ((y_min + size).max(0) as usize).min(source.size_y());

    for y in y_lo..y_hi {
        for x in x_lo..x_hi {
            if source.cell(x, y).is_occupied() {
                return false;
            }
        }
    }
    true
}
