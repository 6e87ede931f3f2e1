//! Generic dense grid map with world<->map transforms.

use crate::cell::Cell;
use crate::dims::MapDimensions;
use crate::MappingError;
use nalgebra::{Matrix3, Matrix4, Vector2};
use transforms::apply;
use types::Pose;

/// Immutable-size dense cell array, stored row-major (`index = y * sx + x`),
/// plus the homogeneous transforms between world coordinates (meters) and map
/// coordinates (cell units).
#[derive(Debug, Clone)]
pub struct GridMap<C: Cell> {
    cells: Vec<C>,
    dims: MapDimensions,
    scale_to_map: f64,
    map_from_world: Matrix3<f64>,
    world_from_map: Matrix3<f64>,
    world_from_map_3d: Matrix4<f64>,
    last_update_index: i64,
}

impl<C: Cell> GridMap<C> {
    pub fn new(
        cell_length: f64,
        size: [usize; 2],
        top_left_offset: [f64; 2],
    ) -> Result<Self, MappingError> {
        if cell_length <= 0.0 {
            return Err(MappingError::InvalidCellLength(cell_length));
        }
        if size[0] == 0 || size[1] == 0 {
            return Err(MappingError::InvalidSize(size[0], size[1]));
        }

        let mut grid = Self {
            cells: vec![C::default(); size[0] * size[1]],
            dims: MapDimensions::new(top_left_offset, size, cell_length),
            scale_to_map: 0.0,
            map_from_world: Matrix3::identity(),
            world_from_map: Matrix3::identity(),
            world_from_map_3d: Matrix4::identity(),
            last_update_index: -1,
        };
        grid.set_transformation(top_left_offset, cell_length);
        Ok(grid)
    }

    /// Recompute the world<->map transforms for a new offset or cell length.
    pub fn set_transformation(&mut self, top_left_offset: [f64; 2], cell_length: f64) {
        self.dims.set_top_left_offset(top_left_offset);
        self.dims.set_cell_length(cell_length);

        let s = 1.0 / cell_length;
        self.scale_to_map = s;

        self.map_from_world = Matrix3::new(
            s,
            0.0,
            top_left_offset[0] * s,
            0.0,
            s,
            top_left_offset[1] * s,
            0.0,
            0.0,
            1.0,
        );
        self.world_from_map = self
            .map_from_world
            .try_inverse()
            .expect("map transform must be invertible");

        // 3D variant with an identity z axis, for downstream renderers
        let mut map_from_world_3d = Matrix4::identity();
        map_from_world_3d[(0, 0)] = s;
        map_from_world_3d[(1, 1)] = s;
        map_from_world_3d[(0, 3)] = top_left_offset[0] * s;
        map_from_world_3d[(1, 3)] = top_left_offset[1] * s;
        self.world_from_map_3d = map_from_world_3d
            .try_inverse()
            .expect("map transform must be invertible");
    }

    pub fn size_x(&self) -> usize {
        self.dims.size_x()
    }

    pub fn size_y(&self) -> usize {
        self.dims.size_y()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_length(&self) -> f64 {
        self.dims.cell_length()
    }

    pub fn scale_to_map(&self) -> f64 {
        self.scale_to_map
    }

    pub fn dims(&self) -> &MapDimensions {
        &self.dims
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.dims.size_x() + x
    }

    /// Whether integer coordinates address a cell.
    pub fn has_grid_value(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.size_x() && (y as usize) < self.size_y()
    }

    pub fn point_out_of_map_bounds(&self, coords: Vector2<f64>) -> bool {
        self.dims.point_out_of_map_bounds(coords)
    }

    pub fn cell(&self, x: usize, y: usize) -> &C {
        &self.cells[self.index(x, y)]
    }

    pub fn cell_mut(&mut self, x: usize, y: usize) -> &mut C {
        let index = self.index(x, y);
        &mut self.cells[index]
    }

    pub fn cell_by_index(&self, index: usize) -> &C {
        &self.cells[index]
    }

    pub fn cell_by_index_mut(&mut self, index: usize) -> &mut C {
        &mut self.cells[index]
    }

    /// Reset every cell to the prior state.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
    }

    pub fn world_coords(&self, map_coords: Vector2<f64>) -> Vector2<f64> {
        apply(&self.world_from_map, map_coords)
    }

    pub fn map_coords(&self, world_coords: Vector2<f64>) -> Vector2<f64> {
        apply(&self.map_from_world, world_coords)
    }

    pub fn world_coords_pose(&self, map_pose: Pose) -> Pose {
        let p = self.world_coords(Vector2::new(map_pose.x, map_pose.y));
        Pose::new(p.x, p.y, map_pose.theta)
    }

    pub fn map_coords_pose(&self, world_pose: Pose) -> Pose {
        let p = self.map_coords(Vector2::new(world_pose.x, world_pose.y));
        Pose::new(p.x, p.y, world_pose.theta)
    }

    pub fn world_from_map_3d(&self) -> &Matrix4<f64> {
        &self.world_from_map_3d
    }

    pub fn set_updated(&mut self) {
        self.last_update_index += 1;
    }

    pub fn update_index(&self) -> i64 {
        self.last_update_index
    }

    /// Bounding rectangle `(x_min, y_min, x_max, y_max)` of cells holding a
    /// non-default value, or `None` for an untouched map.
    pub fn map_extents(&self) -> Option<(usize, usize, usize, usize)> {
        let mut x_min = usize::MAX;
        let mut y_min = usize::MAX;
        let mut x_max = 0usize;
        let mut y_max = 0usize;
        let mut found = false;

        for y in 0..self.size_y() {
            for x in 0..self.size_x() {
                if self.cell(x, y).value() != 0.0 {
                    found = true;
                    x_min = x_min.min(x);
                    y_min = y_min.min(y);
                    x_max = x_max.max(x);
                    y_max = y_max.max(y);
                }
            }
        }

        found.then_some((x_min, y_min, x_max, y_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::LogOddsCell;
    use approx::assert_relative_eq;

    fn grid(cell_length: f64, size: [usize; 2], offset: [f64; 2]) -> GridMap<LogOddsCell> {
        GridMap::new(cell_length, size, offset).unwrap()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(GridMap::<LogOddsCell>::new(0.0, [8, 8], [0.0, 0.0]).is_err());
        assert!(GridMap::<LogOddsCell>::new(-1.0, [8, 8], [0.0, 0.0]).is_err());
        assert!(GridMap::<LogOddsCell>::new(0.1, [0, 8], [0.0, 0.0]).is_err());
    }

    #[test]
    fn test_coordinate_roundtrip() {
        let grid = grid(0.025, [1024, 1024], [12.8, 12.8]);
        for &(x, y) in &[(0.0, 0.0), (3.7, -2.1), (-10.0, 10.0), (12.0, 12.0)] {
            let p = Vector2::new(x, y);
            let back = grid.world_coords(grid.map_coords(p));
            assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pose_roundtrip_preserves_theta() {
        let grid = grid(0.05, [256, 256], [6.4, 6.4]);
        let pose = Pose::new(1.25, -0.75, 2.1);
        let back = grid.world_coords_pose(grid.map_coords_pose(pose));
        assert_relative_eq!(back.x, pose.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, pose.y, epsilon = 1e-9);
        assert_relative_eq!(back.theta, pose.theta, epsilon = 1e-12);
    }

    #[test]
    fn test_world_origin_maps_to_offset() {
        // With offset o the world origin lands at map coordinate o / cell_length
        let grid = grid(0.5, [64, 64], [16.0, 8.0]);
        let m = grid.map_coords(Vector2::zeros());
        assert_relative_eq!(m.x, 32.0, epsilon = 1e-9);
        assert_relative_eq!(m.y, 16.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cell_identity() {
        let grid = grid(1.0, [7, 5], [0.0, 0.0]);
        for y in 0..5 {
            for x in 0..7 {
                assert_eq!(grid.index(x, y), y * 7 + x);
                let by_coords = grid.cell(x, y) as *const _;
                let by_index = grid.cell_by_index(grid.index(x, y)) as *const _;
                assert_eq!(by_coords, by_index);
            }
        }
    }

    #[test]
    fn test_has_grid_value_bounds() {
        let grid = grid(1.0, [4, 3], [0.0, 0.0]);
        assert!(grid.has_grid_value(0, 0));
        assert!(grid.has_grid_value(3, 2));
        assert!(!grid.has_grid_value(4, 0));
        assert!(!grid.has_grid_value(0, 3));
        assert!(!grid.has_grid_value(-1, 0));
    }

    #[test]
    fn test_clear_resets_cells() {
        let mut grid = grid(1.0, [4, 4], [0.0, 0.0]);
        grid.cell_mut(1, 1).set_log_odds(3.0);
        grid.clear();
        assert_eq!(grid.cell(1, 1).value(), 0.0);
    }

    #[test]
    fn test_map_extents() {
        let mut grid = grid(1.0, [10, 10], [0.0, 0.0]);
        assert_eq!(grid.map_extents(), None);
        grid.cell_mut(2, 3).set_log_odds(1.0);
        grid.cell_mut(7, 5).set_log_odds(-1.0);
        assert_eq!(grid.map_extents(), Some((2, 3, 7, 5)));
    }

    #[test]
    fn test_update_index_advances() {
        let mut grid = grid(1.0, [4, 4], [0.0, 0.0]);
        assert_eq!(grid.update_index(), -1);
        grid.set_updated();
        grid.set_updated();
        assert_eq!(grid.update_index(), 1);
    }
}
