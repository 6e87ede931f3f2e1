//! A* shortest path over binary planning cells.

use crate::binmap::BinaryMap;
use crate::path::Path;
use crate::PlanError;
use mapping::{Cell, OccGrid};
use nalgebra::Vector2;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;
use types::Pose;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Source cells per binary cell on each axis
    pub shrink_factor: usize,
    /// Obstacle erosion radius in meters
    pub check_radius: f64,
    /// Heuristic multiplier for cells not known free in the source grid
    pub unknown_punish: f64,
    /// Node expansion budget
    pub max_iterations: usize,
    pub smoothing_data_weight: f64,
    pub smoothing_smooth_weight: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            shrink_factor: 4,
            check_radius: 0.3,
            unknown_punish: 1.5,
            max_iterations: 100_000,
            smoothing_data_weight: 0.5,
            smoothing_smooth_weight: 0.1,
        }
    }
}

/// Heap entry ordered by lowest f-score.
#[derive(Debug, Clone, Copy)]
struct OpenNode {
    index: usize,
    g: f64,
    f: f64,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest f first
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
    }
}

/// 4-connected A* planner over an eroded binary snapshot of an occupancy
/// grid. Borrows the source grid for the heuristic's explored-space check.
pub struct AstarPlanner<'a> {
    occ_map: &'a OccGrid,
    bin_map: BinaryMap,
    config: PlannerConfig,
    goal_cell: [i64; 2],
}

impl<'a> AstarPlanner<'a> {
    pub fn new(occ_map: &'a OccGrid, config: PlannerConfig) -> Result<Self, PlanError> {
        let bin_map = BinaryMap::from_occ_grid(occ_map, config.shrink_factor, config.check_radius)?;
        Ok(Self {
            occ_map,
            bin_map,
            config,
            goal_cell: [0, 0],
        })
    }

    pub fn binary_map(&self) -> &BinaryMap {
        &self.bin_map
    }

    /// Plan from `from` to `to` (world frame). The returned path is smoothed
    /// and simplified.
    pub fn plan_path(&mut self, from: Pose, to: Pose) -> Result<Path, PlanError> {
        self.set_goal(to)?;

        let start = self.cell_of(from);
        let start_index = self.index_of(start);
        let goal_index = self.index_of(self.goal_cell);

        let mut open = BinaryHeap::new();
        let mut best_g: HashMap<usize, f64> = HashMap::new();
        let mut came_from: HashMap<usize, usize> = HashMap::new();

        open.push(OpenNode {
            index: start_index,
            g: 0.0,
            f: self.heuristic(start_index),
        });
        best_g.insert(start_index, 0.0);

        let mut iterations = 0;
        while let Some(current) = open.pop() {
            if iterations >= self.config.max_iterations {
                break;
            }
            iterations += 1;

            if current.index == goal_index {
                debug!(iterations, "A* reached the goal");
                return Ok(self.reconstruct_path(&came_from, current.index));
            }

            // A stale heap entry for an already-improved cell
            if current.g > best_g.get(&current.index).copied().unwrap_or(f64::INFINITY) {
                continue;
            }

            let [x, y] = self.coords_of(current.index);
            for (dx, dy) in [(0i64, -1i64), (1, 0), (0, 1), (-1, 0)] {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0
                    || ny < 0
                    || nx >= self.bin_map.size_x() as i64
                    || ny >= self.bin_map.size_y() as i64
                {
                    continue;
                }
                if self.bin_map.is_occupied(nx as usize, ny as usize) {
                    continue;
                }

                let neighbor = self.index_of([nx, ny]);
                let g = current.g + 1.0;
                if g >= best_g.get(&neighbor).copied().unwrap_or(f64::INFINITY) {
                    continue;
                }

                best_g.insert(neighbor, g);
                came_from.insert(neighbor, current.index);
                open.push(OpenNode {
                    index: neighbor,
                    g,
                    f: g + self.heuristic(neighbor),
                });
            }
        }

        Err(PlanError::NoPath { iterations })
    }

    fn set_goal(&mut self, goal: Pose) -> Result<(), PlanError> {
        let goal_map = self.bin_map.map_coords(Vector2::new(goal.x, goal.y));
        if self.bin_map.point_out_of_map_bounds(goal_map) {
            return Err(PlanError::GoalOutOfBounds);
        }
        if self
            .bin_map
            .is_occupied(goal_map.x as usize, goal_map.y as usize)
        {
            return Err(PlanError::GoalOccupied);
        }
        self.goal_cell = [goal_map.x as i64, goal_map.y as i64];
        Ok(())
    }

    fn cell_of(&self, pose: Pose) -> [i64; 2] {
        let map = self.bin_map.map_coords_pose(pose);
        [map.x as i64, map.y as i64]
    }

    fn index_of(&self, cell: [i64; 2]) -> usize {
        cell[1] as usize * self.bin_map.size_x() + cell[0] as usize
    }

    fn coords_of(&self, index: usize) -> [i64; 2] {
        let size_x = self.bin_map.size_x();
        [(index % size_x) as i64, (index / size_x) as i64]
    }

    /// Euclidean distance to the goal in binary cells, punished when the
    /// corresponding source cell is not known free. This biases paths into
    /// explored corridors.
    fn heuristic(&self, index: usize) -> f64 {
        let [x, y] = self.coords_of(index);
        let dx = (x - self.goal_cell[0]) as f64;
        let dy = (y - self.goal_cell[1]) as f64;
        let mut euclidean = (dx * dx + dy * dy).sqrt();

        let sx = x as usize * self.config.shrink_factor;
        let sy = y as usize * self.config.shrink_factor;
        if sx < self.occ_map.size_x() && sy < self.occ_map.size_y() {
            if !self.occ_map.cell(sx, sy).is_free() {
                euclidean *= self.config.unknown_punish;
            }
        }

        euclidean
    }

    fn reconstruct_path(&self, came_from: &HashMap<usize, usize>, end: usize) -> Path {
        let mut cells = vec![end];
        let mut current = end;
        while let Some(&parent) = came_from.get(&current) {
            cells.push(parent);
            current = parent;
        }
        cells.reverse();

        let poses = cells
            .into_iter()
            .map(|index| {
                let [x, y] = self.coords_of(index);
                let world = self
                    .bin_map
                    .world_coords(Vector2::new(x as f64, y as f64));
                Pose::new(world.x, world.y, 0.0)
            })
            .collect();

        let mut path = Path::from_poses(poses);
        path.smooth(
            self.config.smoothing_data_weight,
            self.config.smoothing_smooth_weight,
            0.001,
        );
        path.simplify();
        path
    }
}
