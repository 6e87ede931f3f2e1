//! Log-odds occupancy grid with ray-casting scan integration.

use crate::cell::{Cell, LogOddsCell, LogOddsFunctions};
use crate::dims::MapDimensions;
use crate::grid::GridMap;
use crate::scan::ScanContainer;
use crate::MappingError;
use nalgebra::{Matrix4, Vector2};
use transforms::{apply, transform_matrix};
use types::Pose;

/// Occupancy grid map over log-odds cells.
///
/// Integrating a scan draws a Bresenham line from the beam origin to each
/// endpoint, marking traversed cells free and the endpoint occupied. Per-scan
/// mark indices guarantee a cell is updated at most once in each direction per
/// scan, and that an endpoint hit overrides an earlier free mark.
#[derive(Debug, Clone)]
pub struct OccGrid {
    grid: GridMap<LogOddsCell>,
    functions: LogOddsFunctions,
    curr_update_index: i64,
    curr_mark_occ_index: i64,
    curr_mark_free_index: i64,
}

impl OccGrid {
    pub fn new(
        cell_length: f64,
        size: [usize; 2],
        top_left_offset: [f64; 2],
    ) -> Result<Self, MappingError> {
        Ok(Self {
            grid: GridMap::new(cell_length, size, top_left_offset)?,
            functions: LogOddsFunctions::new(),
            curr_update_index: 0,
            curr_mark_occ_index: -1,
            curr_mark_free_index: -1,
        })
    }

    pub fn size_x(&self) -> usize {
        self.grid.size_x()
    }

    pub fn size_y(&self) -> usize {
        self.grid.size_y()
    }

    pub fn cell_count(&self) -> usize {
        self.grid.cell_count()
    }

    pub fn cell_length(&self) -> f64 {
        self.grid.cell_length()
    }

    pub fn scale_to_map(&self) -> f64 {
        self.grid.scale_to_map()
    }

    pub fn dims(&self) -> &MapDimensions {
        self.grid.dims()
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        self.grid.index(x, y)
    }

    pub fn has_grid_value(&self, x: i32, y: i32) -> bool {
        self.grid.has_grid_value(x, y)
    }

    pub fn point_out_of_map_bounds(&self, coords: Vector2<f64>) -> bool {
        self.grid.point_out_of_map_bounds(coords)
    }

    pub fn cell(&self, x: usize, y: usize) -> &LogOddsCell {
        self.grid.cell(x, y)
    }

    pub fn cell_by_index(&self, index: usize) -> &LogOddsCell {
        self.grid.cell_by_index(index)
    }

    pub fn world_coords(&self, map_coords: Vector2<f64>) -> Vector2<f64> {
        self.grid.world_coords(map_coords)
    }

    pub fn map_coords(&self, world_coords: Vector2<f64>) -> Vector2<f64> {
        self.grid.map_coords(world_coords)
    }

    pub fn world_coords_pose(&self, map_pose: Pose) -> Pose {
        self.grid.world_coords_pose(map_pose)
    }

    pub fn map_coords_pose(&self, world_pose: Pose) -> Pose {
        self.grid.map_coords_pose(world_pose)
    }

    pub fn world_from_map_3d(&self) -> &Matrix4<f64> {
        self.grid.world_from_map_3d()
    }

    pub fn map_extents(&self) -> Option<(usize, usize, usize, usize)> {
        self.grid.map_extents()
    }

    pub fn update_index(&self) -> i64 {
        self.grid.update_index()
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.cell(x, y).is_occupied()
    }

    pub fn is_free(&self, x: usize, y: usize) -> bool {
        self.cell(x, y).is_free()
    }

    pub fn probability(&self, x: usize, y: usize) -> f64 {
        self.functions.probability(self.cell(x, y))
    }

    pub fn probability_by_index(&self, index: usize) -> f64 {
        self.functions.probability(self.cell_by_index(index))
    }

    /// Directly set a cell's log-odds value. Used when restoring a stored map.
    pub fn set_log_odds_by_index(&mut self, index: usize, value: f64) {
        self.grid.cell_by_index_mut(index).set_log_odds(value);
    }

    pub fn set_update_free_factor(&mut self, factor: f64) {
        self.functions.set_update_free_factor(factor);
    }

    pub fn set_update_occupied_factor(&mut self, factor: f64) {
        self.functions.set_update_occupied_factor(factor);
    }

    /// Reset all cells to unknown.
    pub fn clear(&mut self) {
        self.grid.clear();
    }

    /// Integrate a scan taken at `robot_pose_world` into the grid.
    ///
    /// The scan's points and origin are expected in this grid's cell units
    /// (see [`ScanContainer`]). Beams whose endpoint falls outside the grid or
    /// on the beam origin cell are skipped; an out-of-grid origin rejects the
    /// whole update and leaves the grid unchanged.
    pub fn update_by_scan(
        &mut self,
        scan: &ScanContainer,
        robot_pose_world: Pose,
    ) -> Result<(), MappingError> {
        self.curr_mark_free_index = self.curr_update_index + 1;
        self.curr_mark_occ_index = self.curr_update_index + 2;

        let map_pose = self.map_coords_pose(robot_pose_world);
        let pose_transform = transform_matrix(map_pose);

        let begin_f = apply(&pose_transform, scan.origin());
        let begin = [
            (begin_f.x + 0.5).floor() as i32,
            (begin_f.y + 0.5).floor() as i32,
        ];
        if !self.has_grid_value(begin[0], begin[1]) {
            return Err(MappingError::OriginOutOfBounds(begin_f.x, begin_f.y));
        }

        for point in scan.points() {
            let end_f = apply(&pose_transform, *point);
            let end = [
                (end_f.x + 0.5).floor() as i32,
                (end_f.y + 0.5).floor() as i32,
            ];
            if end != begin {
                self.update_line_bresenham(begin, end);
            }
        }

        self.grid.set_updated();

        // Keep this scan's mark indices from colliding with the next scan's
        self.curr_update_index += 3;
        Ok(())
    }

    /// Draw one beam: free cells from `begin` to `end` (exclusive), occupied
    /// endpoint. Skipped entirely when the endpoint is off the map.
    fn update_line_bresenham(&mut self, begin: [i32; 2], end: [i32; 2]) {
        if !self.has_grid_value(end[0], end[1]) {
            return;
        }

        let dx = end[0] - begin[0];
        let dy = end[1] - begin[1];

        let abs_dx = dx.abs();
        let abs_dy = dy.abs();

        let size_x = self.size_x() as i32;
        let offset_dx = if dx > 0 { 1 } else { -1 };
        let offset_dy = if dy > 0 { size_x } else { -size_x };

        let start_offset = begin[1] * size_x + begin[0];

        if abs_dx >= abs_dy {
            self.bresenham2d(abs_dx, abs_dy, abs_dx / 2, offset_dx, offset_dy, start_offset);
        } else {
            self.bresenham2d(abs_dy, abs_dx, abs_dy / 2, offset_dy, offset_dx, start_offset);
        }

        let end_offset = end[1] * size_x + end[0];
        self.bresenham_cell_occupied(end_offset as usize);
    }

    /// Walk the dominant axis, marking every traversed cell free. The
    /// endpoint cell is left for the occupied mark.
    fn bresenham2d(
        &mut self,
        abs_da: i32,
        abs_db: i32,
        mut error_b: i32,
        offset_a: i32,
        offset_b: i32,
        mut offset: i32,
    ) {
        self.bresenham_cell_free(offset as usize);

        for _ in 0..abs_da - 1 {
            offset += offset_a;
            error_b += abs_db;
            if error_b >= abs_da {
                offset += offset_b;
                error_b -= abs_da;
            }
            self.bresenham_cell_free(offset as usize);
        }
    }

    fn bresenham_cell_free(&mut self, index: usize) {
        let mark = self.curr_mark_free_index;
        let functions = self.functions;
        let cell = self.grid.cell_by_index_mut(index);
        if cell.update_index() < mark {
            functions.update_set_free(cell);
            cell.set_update_index(mark);
        }
    }

    fn bresenham_cell_occupied(&mut self, index: usize) {
        let mark_occ = self.curr_mark_occ_index;
        let mark_free = self.curr_mark_free_index;
        let functions = self.functions;
        let cell = self.grid.cell_by_index_mut(index);
        if cell.update_index() < mark_occ {
            // A free mark from an earlier beam of this scan is reverted first
            if cell.update_index() == mark_free {
                functions.update_unset_free(cell);
            }
            functions.update_set_occupied(cell);
            cell.set_update_index(mark_occ);
        }
    }
}
