//! Map representations: a single grid or a coarse-to-fine pyramid.
//!
//! The pyramid stacks grids at halving resolutions, as described in the
//! Hector SLAM paper. All levels are updated simultaneously from the same
//! scan; they are never generated from each other. Matching walks the stack
//! coarse to fine, feeding each level's refined pose to the next as its
//! initial guess.

use crate::cache::InterpCache;
use crate::matcher::ScanMatcher;
use crate::occupancy::OccGrid;
use crate::scan::ScanContainer;
use crate::MappingError;
use nalgebra::Matrix3;
use std::sync::{Arc, RwLock};
use tracing::debug;
use types::Pose;

/// Archive type tag for log-odds maps.
pub const LOG_ODDS_MAP_TYPE: &str = "hectorslam";

/// Gauss-Newton iterations after the warm-up, per level kind.
const ITERATIONS_FINE: usize = 5;
const ITERATIONS_COARSE: usize = 3;
const ITERATIONS_SINGLE: usize = 20;

/// One pyramid level: the shared grid plus the matcher state and
/// interpolation cache that serve it. Cache and matcher belong to the SLAM
/// task alone; only the grid is shared with readers.
pub struct MapLevel {
    grid: Arc<RwLock<OccGrid>>,
    cache: InterpCache,
    matcher: ScanMatcher,
}

impl MapLevel {
    fn new(grid: OccGrid) -> Self {
        Self {
            grid: Arc::new(RwLock::new(grid)),
            cache: InterpCache::new(),
            matcher: ScanMatcher::new(),
        }
    }
}

/// A stack of `levels` grids, level 0 finest, each coarser level with twice
/// the cell length and half the cell count per axis. Holds one reusable scan
/// buffer per coarser level.
pub struct MultiMap {
    levels: Vec<MapLevel>,
    scan_buffers: Vec<ScanContainer>,
}

/// Map representation driven by the SLAM processor.
pub enum MapRep {
    Single(MapLevel),
    Multi(MultiMap),
}

impl MapRep {
    /// Build a pyramid. `start_coords` places the world origin as a fraction
    /// of the map's world extent on each axis.
    pub fn new_multi(
        map_resolution: f64,
        map_size_x: usize,
        map_size_y: usize,
        start_coords: [f64; 2],
        levels: usize,
    ) -> Result<Self, MappingError> {
        if levels == 0 || map_size_x >> (levels - 1) == 0 || map_size_y >> (levels - 1) == 0 {
            return Err(MappingError::TooManyLevels {
                levels,
                size_x: map_size_x,
                size_y: map_size_y,
            });
        }

        let offset = [
            map_resolution * map_size_x as f64 * start_coords[0],
            map_resolution * map_size_y as f64 * start_coords[1],
        ];

        let mut map_levels = Vec::with_capacity(levels);
        let mut resolution = map_resolution;
        let mut size = [map_size_x, map_size_y];
        for level in 0..levels {
            debug!(
                level,
                cell_length = resolution,
                size_x = size[0],
                size_y = size[1],
                "allocating pyramid level"
            );
            map_levels.push(MapLevel::new(OccGrid::new(resolution, size, offset)?));
            resolution *= 2.0;
            size = [size[0] / 2, size[1] / 2];
        }

        Ok(Self::Multi(MultiMap {
            levels: map_levels,
            scan_buffers: vec![ScanContainer::new(); levels - 1],
        }))
    }

    pub fn new_single(
        map_resolution: f64,
        map_size_x: usize,
        map_size_y: usize,
        start_coords: [f64; 2],
    ) -> Result<Self, MappingError> {
        let offset = [
            map_resolution * map_size_x as f64 * start_coords[0],
            map_resolution * map_size_y as f64 * start_coords[1],
        ];
        let grid = OccGrid::new(map_resolution, [map_size_x, map_size_y], offset)?;
        Ok(Self::Single(MapLevel::new(grid)))
    }

    /// Rebuild a representation from restored grids, finest first. Used by
    /// the map archive loader.
    pub fn from_grids(grids: Vec<OccGrid>, single: bool) -> Result<Self, MappingError> {
        if grids.is_empty() {
            return Err(MappingError::InvalidSize(0, 0));
        }
        if single {
            let mut grids = grids;
            Ok(Self::Single(MapLevel::new(grids.remove(0))))
        } else {
            let count = grids.len();
            Ok(Self::Multi(MultiMap {
                levels: grids.into_iter().map(MapLevel::new).collect(),
                scan_buffers: vec![ScanContainer::new(); count - 1],
            }))
        }
    }

    pub fn map_levels(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(multi) => multi.levels.len(),
        }
    }

    /// Shared handle to one level's grid. Readers (renderer, planner) take
    /// the read lock for the duration of a snapshot.
    pub fn grid(&self, level: usize) -> Arc<RwLock<OccGrid>> {
        match self {
            Self::Single(l) => l.grid.clone(),
            Self::Multi(multi) => multi.levels[level].grid.clone(),
        }
    }

    pub fn grids(&self) -> Vec<Arc<RwLock<OccGrid>>> {
        (0..self.map_levels()).map(|i| self.grid(i)).collect()
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    pub fn scale_to_map(&self) -> f64 {
        self.grid(0).read().unwrap().scale_to_map()
    }

    pub fn reset(&mut self) {
        for level in self.levels_mut() {
            level.grid.write().unwrap().clear();
            level.cache.reset();
        }
    }

    /// Invalidate every level's interpolation cache after a map update.
    pub fn on_map_updated(&mut self) {
        for level in self.levels_mut() {
            level.cache.reset();
        }
    }

    pub fn set_update_factor_free(&mut self, factor: f64) {
        for level in self.levels_mut() {
            level.grid.write().unwrap().set_update_free_factor(factor);
        }
    }

    pub fn set_update_factor_occupied(&mut self, factor: f64) {
        for level in self.levels_mut() {
            level
                .grid
                .write()
                .unwrap()
                .set_update_occupied_factor(factor);
        }
    }

    /// Match the scan against the representation, coarsest level first, and
    /// return the refined world pose with the finest level's Hessian.
    pub fn match_data(&mut self, begin_estimate_world: Pose, scan: &ScanContainer) -> (Pose, Matrix3<f64>) {
        match self {
            Self::Single(level) => {
                let grid = level.grid.read().unwrap();
                level.matcher.match_data(
                    begin_estimate_world,
                    &grid,
                    &mut level.cache,
                    scan,
                    ITERATIONS_SINGLE,
                )
            }
            Self::Multi(multi) => {
                let MultiMap {
                    levels,
                    scan_buffers,
                } = multi;

                let mut estimate = begin_estimate_world;
                let mut covariance = Matrix3::identity();

                for i in (0..levels.len()).rev() {
                    let (container, iterations) = if i == 0 {
                        (scan, ITERATIONS_FINE)
                    } else {
                        let factor = 1.0 / (1 << i) as f64;
                        scan_buffers[i - 1].set_from(scan, factor);
                        (&scan_buffers[i - 1], ITERATIONS_COARSE)
                    };

                    let level = &mut levels[i];
                    let grid = level.grid.read().unwrap();
                    let (pose, cov) = level.matcher.match_data(
                        estimate,
                        &grid,
                        &mut level.cache,
                        container,
                        iterations,
                    );
                    estimate = pose;
                    covariance = cov;
                }

                (estimate, covariance)
            }
        }
    }

    /// Integrate the scan into every level at the given world pose. Assumes
    /// [`MapRep::match_data`] ran for this scan, so the coarser levels' scan
    /// buffers are current.
    pub fn update_by_scan(
        &mut self,
        scan: &ScanContainer,
        robot_pose_world: Pose,
    ) -> Result<(), MappingError> {
        match self {
            Self::Single(level) => level.grid.write().unwrap().update_by_scan(scan, robot_pose_world),
            Self::Multi(multi) => {
                for (i, level) in multi.levels.iter_mut().enumerate() {
                    let container = if i == 0 {
                        scan
                    } else {
                        &multi.scan_buffers[i - 1]
                    };
                    level
                        .grid
                        .write()
                        .unwrap()
                        .update_by_scan(container, robot_pose_world)?;
                }
                Ok(())
            }
        }
    }

    fn levels_mut(&mut self) -> impl Iterator<Item = &mut MapLevel> {
        let slice: &mut [MapLevel] = match self {
            Self::Single(level) => std::slice::from_mut(level),
            Self::Multi(multi) => &mut multi.levels,
        };
        slice.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_halves_resolution_per_level() {
        let rep = MapRep::new_multi(0.025, 1024, 1024, [0.5, 0.5], 3).unwrap();
        assert_eq!(rep.map_levels(), 3);

        let l0 = rep.grid(0);
        let l1 = rep.grid(1);
        let l2 = rep.grid(2);
        assert_eq!(l0.read().unwrap().size_x(), 1024);
        assert_eq!(l1.read().unwrap().size_x(), 512);
        assert_eq!(l2.read().unwrap().size_x(), 256);
        assert!((l0.read().unwrap().cell_length() - 0.025).abs() < 1e-12);
        assert!((l1.read().unwrap().cell_length() - 0.05).abs() < 1e-12);
        assert!((l2.read().unwrap().cell_length() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_levels_share_world_origin() {
        let rep = MapRep::new_multi(0.1, 128, 128, [0.25, 0.75], 3).unwrap();
        let world = nalgebra::Vector2::new(1.5, -2.0);
        for level in 0..3 {
            let grid = rep.grid(level);
            let grid = grid.read().unwrap();
            let back = grid.world_coords(grid.map_coords(world));
            assert!((back - world).norm() < 1e-9);
        }
        // The same world point lands at half the map coordinate one level up
        let g0 = rep.grid(0);
        let g1 = rep.grid(1);
        let m0 = g0.read().unwrap().map_coords(world);
        let m1 = g1.read().unwrap().map_coords(world);
        assert!((m0 / 2.0 - m1).norm() < 1e-9);
    }

    #[test]
    fn test_too_many_levels_rejected() {
        assert!(matches!(
            MapRep::new_multi(0.1, 16, 16, [0.5, 0.5], 6),
            Err(MappingError::TooManyLevels { .. })
        ));
        assert!(MapRep::new_multi(0.1, 16, 16, [0.5, 0.5], 4).is_ok());
    }

    #[test]
    fn test_update_by_scan_touches_all_levels() {
        let mut rep = MapRep::new_multi(0.25, 64, 64, [0.5, 0.5], 3).unwrap();
        let scale = rep.scale_to_map();

        let mut scan = ScanContainer::new();
        scan.add(nalgebra::Vector2::new(2.0 * scale, 0.0));

        // Buffers are refreshed by a match pass first
        let _ = rep.match_data(Pose::default(), &scan);
        rep.update_by_scan(&scan, Pose::default()).unwrap();

        for level in 0..3 {
            let grid = rep.grid(level);
            let grid = grid.read().unwrap();
            assert!(
                grid.map_extents().is_some(),
                "level {level} should have been updated"
            );
        }
    }

    #[test]
    fn test_single_rep_reports_one_level() {
        let rep = MapRep::new_single(0.1, 64, 64, [0.5, 0.5]).unwrap();
        assert_eq!(rep.map_levels(), 1);
        assert!(rep.is_single());
    }

    #[test]
    fn test_from_grids_roundtrip_shape() {
        let grids = vec![
            OccGrid::new(0.1, [64, 64], [3.2, 3.2]).unwrap(),
            OccGrid::new(0.2, [32, 32], [3.2, 3.2]).unwrap(),
        ];
        let rep = MapRep::from_grids(grids, false).unwrap();
        assert_eq!(rep.map_levels(), 2);
        assert!(!rep.is_single());
    }
}
