//! Gauss-Newton scan-to-map pose refinement.
//!
//! Minimizes `E(xi) = sum_k (1 - M(S_k(xi)))^2` where `S_k` carries scan point
//! `k` into map coordinates under the pose `xi` and `M` is the bilinearly
//! interpolated occupancy probability.

use crate::cache::InterpCache;
use crate::occupancy::OccGrid;
use crate::scan::ScanContainer;
use nalgebra::{Matrix3, Vector3};
use transforms::{apply, normalize_angle, transform_matrix};
use types::Pose;

/// Angle steps larger than this are clamped; a single Gauss-Newton step must
/// not rotate the estimate out of the map gradient's validity range.
const MAX_ANGLE_STEP: f64 = 0.2;

/// Per-level Gauss-Newton scan matcher. The Hessian and gradient accumulators
/// are reused across scans.
#[derive(Debug, Clone)]
pub struct ScanMatcher {
    hessian: Matrix3<f64>,
    gradient: Vector3<f64>,
}

impl ScanMatcher {
    pub fn new() -> Self {
        Self {
            hessian: Matrix3::zeros(),
            gradient: Vector3::zeros(),
        }
    }

    /// Refine a world-frame pose estimate against one grid level.
    ///
    /// Runs one warm-up iteration plus `max_iterations` Gauss-Newton
    /// iterations. Returns the refined world pose and the final Hessian as
    /// the match covariance (callers invert it if they want a true
    /// covariance). Empty scans return the input pose unchanged.
    pub fn match_data(
        &mut self,
        begin_estimate_world: Pose,
        grid: &OccGrid,
        cache: &mut InterpCache,
        scan: &ScanContainer,
        max_iterations: usize,
    ) -> (Pose, Matrix3<f64>) {
        if scan.is_empty() {
            return (begin_estimate_world, self.hessian);
        }

        let begin_estimate_map = grid.map_coords_pose(begin_estimate_world);
        let mut estimate = Vector3::new(
            begin_estimate_map.x,
            begin_estimate_map.y,
            begin_estimate_map.theta,
        );

        self.estimate_transformation(&mut estimate, grid, cache, scan);
        for _ in 0..max_iterations {
            self.estimate_transformation(&mut estimate, grid, cache, scan);
        }

        estimate.z = normalize_angle(estimate.z);

        let world = grid.world_coords_pose(Pose::new(estimate.x, estimate.y, estimate.z));
        (world, self.hessian)
    }

    /// One Gauss-Newton step. Returns false when the Hessian is degenerate
    /// and the estimate was left untouched.
    fn estimate_transformation(
        &mut self,
        estimate: &mut Vector3<f64>,
        grid: &OccGrid,
        cache: &mut InterpCache,
        scan: &ScanContainer,
    ) -> bool {
        self.accumulate_hessian(*estimate, grid, cache, scan);

        if self.hessian[(0, 0)] == 0.0 || self.hessian[(1, 1)] == 0.0 {
            return false;
        }

        let Some(h_inv) = self.hessian.try_inverse() else {
            return false;
        };

        let mut search_dir = h_inv * self.gradient;
        search_dir.z = search_dir.z.clamp(-MAX_ANGLE_STEP, MAX_ANGLE_STEP);

        *estimate += search_dir;
        true
    }

    /// Accumulate `H = sum J J^T` and `g = sum (1 - M) J` over the scan.
    fn accumulate_hessian(
        &mut self,
        estimate: Vector3<f64>,
        grid: &OccGrid,
        cache: &mut InterpCache,
        scan: &ScanContainer,
    ) {
        let transform = transform_matrix(Pose::new(estimate.x, estimate.y, estimate.z));
        let (sin_rot, cos_rot) = estimate.z.sin_cos();

        self.hessian = Matrix3::zeros();
        self.gradient = Vector3::zeros();

        for point in scan.points() {
            let transformed = apply(&transform, *point);
            let interp = grid.interp_value_with_derivatives(cache, transformed);

            let fun_val = 1.0 - interp.x;
            let d_x = interp.y;
            let d_y = interp.z;

            let rot_deriv = (-sin_rot * point.x - cos_rot * point.y) * d_x
                + (cos_rot * point.x - sin_rot * point.y) * d_y;

            self.gradient.x += d_x * fun_val;
            self.gradient.y += d_y * fun_val;
            self.gradient.z += rot_deriv * fun_val;

            self.hessian[(0, 0)] += d_x * d_x;
            self.hessian[(1, 1)] += d_y * d_y;
            self.hessian[(2, 2)] += rot_deriv * rot_deriv;
            self.hessian[(0, 1)] += d_x * d_y;
            self.hessian[(0, 2)] += d_x * rot_deriv;
            self.hessian[(1, 2)] += d_y * rot_deriv;
        }

        self.hessian[(1, 0)] = self.hessian[(0, 1)];
        self.hessian[(2, 0)] = self.hessian[(0, 2)];
        self.hessian[(2, 1)] = self.hessian[(1, 2)];
    }
}

impl Default for ScanMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::prob_to_log_odds;
    use nalgebra::Vector2;

    /// Vertical wall at x = 20, y in [12, 28], on a 40x40 unit grid.
    fn wall_grid() -> OccGrid {
        let mut grid = OccGrid::new(1.0, [40, 40], [0.0, 0.0]).unwrap();
        for y in 12..=28 {
            let index = grid.index(20, y);
            grid.set_log_odds_by_index(index, prob_to_log_odds(0.99));
        }
        grid
    }

    /// Scan hitting the wall along its height: points at x = 0 in the robot
    /// frame so the optimum places the robot's x on the wall.
    fn wall_scan() -> ScanContainer {
        let mut scan = ScanContainer::new();
        for k in 0..20 {
            scan.add(Vector2::new(0.0, k as f64));
        }
        scan
    }

    #[test]
    fn test_empty_scan_returns_input_pose() {
        let grid = wall_grid();
        let mut cache = InterpCache::new();
        let mut matcher = ScanMatcher::new();

        let prior = Pose::new(3.0, 4.0, 0.5);
        let (pose, _) = matcher.match_data(prior, &grid, &mut cache, &ScanContainer::new(), 5);
        assert_eq!(pose, prior);
    }

    #[test]
    fn test_converges_onto_wall() {
        let grid = wall_grid();
        let mut cache = InterpCache::new();
        let mut matcher = ScanMatcher::new();

        let prior = Pose::new(19.5, 10.0, 0.0);
        let (pose, _) = matcher.match_data(prior, &grid, &mut cache, &wall_scan(), 5);

        assert!(
            (pose.x - 20.0).abs() < 0.05,
            "x should converge onto the wall, got {}",
            pose.x
        );
    }

    #[test]
    fn test_converges_from_both_sides() {
        let grid = wall_grid();
        let mut matcher = ScanMatcher::new();

        let mut cache = InterpCache::new();
        let (from_left, _) =
            matcher.match_data(Pose::new(19.6, 10.0, 0.0), &grid, &mut cache, &wall_scan(), 5);
        let mut cache = InterpCache::new();
        let (from_right, _) =
            matcher.match_data(Pose::new(20.4, 10.0, 0.0), &grid, &mut cache, &wall_scan(), 5);

        assert!((from_left.x - 20.0).abs() < 0.05);
        assert!((from_right.x - 20.0).abs() < 0.05);
    }

    #[test]
    fn test_uniform_map_skips_refinement() {
        // No structure anywhere: the Hessian is all zeros, so every iteration
        // is skipped and the pose comes back unchanged.
        let grid = OccGrid::new(1.0, [40, 40], [0.0, 0.0]).unwrap();
        let mut cache = InterpCache::new();
        let mut matcher = ScanMatcher::new();

        let prior = Pose::new(10.0, 10.0, 0.3);
        let (pose, _) = matcher.match_data(prior, &grid, &mut cache, &wall_scan(), 5);
        assert_eq!(pose.x, prior.x);
        assert_eq!(pose.y, prior.y);
    }

    #[test]
    fn test_exports_hessian_not_inverse() {
        let grid = wall_grid();
        let mut cache = InterpCache::new();
        let mut matcher = ScanMatcher::new();

        let (_, cov) = matcher.match_data(
            Pose::new(19.8, 10.0, 0.0),
            &grid,
            &mut cache,
            &wall_scan(),
            5,
        );
        // H accumulates squared gradients; near the wall those are large,
        // while an inverted covariance would be tiny.
        assert!(cov[(0, 0)] > 0.0);
        assert_eq!(cov[(0, 1)], cov[(1, 0)]);
    }

    #[test]
    fn test_output_angle_is_normalized() {
        let grid = wall_grid();
        let mut cache = InterpCache::new();
        let mut matcher = ScanMatcher::new();

        let prior = Pose::new(19.5, 10.0, 3.0 * std::f64::consts::PI);
        let (pose, _) = matcher.match_data(prior, &grid, &mut cache, &wall_scan(), 5);
        assert!(pose.theta > -std::f64::consts::PI && pose.theta <= std::f64::consts::PI);
    }
}
