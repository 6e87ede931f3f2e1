//! SLAM processor: match, pose-gate, update.

use crate::maprep::MapRep;
use crate::scan::ScanContainer;
use nalgebra::Matrix3;
use tracing::warn;
use transforms::pose_difference_larger_than;
use types::Pose;

/// Drives the match -> pose-gate -> map-update loop over a map
/// representation.
///
/// Every scan is matched; the map is only integrated when the refined pose
/// has moved further than the configured distance or angle thresholds since
/// the last integration. The refined pose is published either way.
pub struct SlamProcessor {
    map_rep: MapRep,
    last_map_update_pose: Pose,
    last_scan_match_pose: Pose,
    last_scan_match_cov: Matrix3<f64>,
    min_dist_diff: f64,
    min_angle_diff: f64,
}

impl SlamProcessor {
    pub fn new(map_rep: MapRep) -> Self {
        let mut processor = Self {
            map_rep,
            last_map_update_pose: Pose::default(),
            last_scan_match_pose: Pose::default(),
            last_scan_match_cov: Matrix3::identity(),
            min_dist_diff: 0.4,
            min_angle_diff: 0.9,
        };
        processor.reset_poses();
        processor
    }

    /// Process one scan with a world-frame pose hint.
    pub fn update(&mut self, scan: &ScanContainer, pose_hint_world: Pose) {
        let (new_pose, covariance) = self.map_rep.match_data(pose_hint_world, scan);

        self.last_scan_match_pose = new_pose;
        self.last_scan_match_cov = covariance;

        if pose_difference_larger_than(
            new_pose,
            self.last_map_update_pose,
            self.min_dist_diff,
            self.min_angle_diff,
        ) {
            match self.map_rep.update_by_scan(scan, new_pose) {
                Ok(()) => {
                    self.map_rep.on_map_updated();
                    self.last_map_update_pose = new_pose;
                }
                Err(e) => warn!(?e, "map update rejected"),
            }
        }
    }

    /// Clear the maps and forget the pose history; the next scan always
    /// integrates.
    pub fn reset(&mut self) {
        self.reset_poses();
        self.map_rep.reset();
    }

    fn reset_poses(&mut self) {
        self.last_map_update_pose = Pose::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        self.last_scan_match_pose = Pose::default();
    }

    pub fn last_scan_match_pose(&self) -> Pose {
        self.last_scan_match_pose
    }

    pub fn last_scan_match_covariance(&self) -> Matrix3<f64> {
        self.last_scan_match_cov
    }

    pub fn last_map_update_pose(&self) -> Pose {
        self.last_map_update_pose
    }

    pub fn scale_to_map(&self) -> f64 {
        self.map_rep.scale_to_map()
    }

    pub fn map_levels(&self) -> usize {
        self.map_rep.map_levels()
    }

    pub fn map_rep(&self) -> &MapRep {
        &self.map_rep
    }

    pub fn map_rep_mut(&mut self) -> &mut MapRep {
        &mut self.map_rep
    }

    /// Consume the processor, releasing its map representation.
    pub fn into_map_rep(self) -> MapRep {
        self.map_rep
    }

    pub fn set_map_update_min_dist_diff(&mut self, min_dist: f64) {
        self.min_dist_diff = min_dist;
    }

    pub fn set_map_update_min_angle_diff(&mut self, min_angle: f64) {
        self.min_angle_diff = min_angle;
    }

    pub fn set_update_factor_free(&mut self, factor: f64) {
        self.map_rep.set_update_factor_free(factor);
    }

    pub fn set_update_factor_occupied(&mut self, factor: f64) {
        self.map_rep.set_update_factor_occupied(factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;
    use transforms::normalize_angle;

    /// Cast a beam from `pose` at `angle` against the walls of a square room
    /// of half-size `half` centered on the world origin.
    fn range_to_box(pose: Pose, angle: f64, half: f64) -> f64 {
        let (s, c) = (pose.theta + angle).sin_cos();
        let mut best = f64::INFINITY;
        if c.abs() > 1e-9 {
            for wall_x in [-half, half] {
                let t = (wall_x - pose.x) / c;
                if t > 0.0 {
                    let y = pose.y + t * s;
                    if y.abs() <= half + 1e-9 {
                        best = best.min(t);
                    }
                }
            }
        }
        if s.abs() > 1e-9 {
            for wall_y in [-half, half] {
                let t = (wall_y - pose.y) / s;
                if t > 0.0 {
                    let x = pose.x + t * c;
                    if x.abs() <= half + 1e-9 {
                        best = best.min(t);
                    }
                }
            }
        }
        best
    }

    /// Simulated scan of the box room, points pre-scaled to level-0 cells.
    fn box_scan(pose: Pose, scale_to_map: f64, beams: usize) -> ScanContainer {
        let mut scan = ScanContainer::new();
        for k in 0..beams {
            let angle = k as f64 / beams as f64 * std::f64::consts::TAU;
            let range = range_to_box(pose, angle, 5.0);
            let (s, c) = angle.sin_cos();
            scan.add(Vector2::new(range * c * scale_to_map, range * s * scale_to_map));
        }
        scan
    }

    fn room_processor() -> SlamProcessor {
        let rep = MapRep::new_multi(0.25, 128, 128, [0.5, 0.5], 3).unwrap();
        let mut processor = SlamProcessor::new(rep);
        processor.set_update_factor_occupied(0.9);
        processor
    }

    #[test]
    fn test_first_scan_always_integrates() {
        let mut processor = room_processor();
        let scan = box_scan(Pose::default(), processor.scale_to_map(), 90);

        assert!(processor.last_map_update_pose().x.is_infinite());
        processor.update(&scan, Pose::default());

        let grid = processor.map_rep().grid(0);
        assert!(grid.read().unwrap().map_extents().is_some());
        assert_eq!(processor.last_map_update_pose(), processor.last_scan_match_pose());
    }

    #[test]
    fn test_pose_gate_blocks_small_motion() {
        let mut processor = room_processor();
        let scan = box_scan(Pose::default(), processor.scale_to_map(), 90);

        processor.update(&scan, Pose::default());
        let grid = processor.map_rep().grid(0);
        let index_after_first = grid.read().unwrap().update_index();

        // Same place: matched pose stays within the gate, no integration
        processor.update(&scan, Pose::default());
        assert_eq!(grid.read().unwrap().update_index(), index_after_first);

        // A hint far past the gate moves the matched pose enough to integrate
        let moved = Pose::new(1.0, 0.0, 0.0);
        let moved_scan = box_scan(moved, processor.scale_to_map(), 90);
        processor.update(&moved_scan, moved);
        assert_eq!(grid.read().unwrap().update_index(), index_after_first + 1);
    }

    #[test]
    fn test_reset_forces_next_integration() {
        let mut processor = room_processor();
        let scan = box_scan(Pose::default(), processor.scale_to_map(), 90);

        processor.update(&scan, Pose::default());
        processor.reset();

        let grid = processor.map_rep().grid(0);
        assert!(grid.read().unwrap().map_extents().is_none());
        assert!(processor.last_map_update_pose().x.is_infinite());

        processor.update(&scan, Pose::default());
        assert!(grid.read().unwrap().map_extents().is_some());
    }

    #[test]
    fn test_pyramid_recovers_perturbed_pose() {
        let mut processor = room_processor();
        let truth = Pose::default();
        let scan = box_scan(truth, processor.scale_to_map(), 240);

        // Build up the map from the true pose. The first update also fills
        // the coarse-level scan buffers through its match pass.
        processor.update(&scan, truth);
        for _ in 0..7 {
            processor.map_rep_mut().update_by_scan(&scan, truth).unwrap();
            processor.map_rep_mut().on_map_updated();
        }

        let prior = Pose::new(1.0, 1.0, 0.3);
        let (matched, _) = processor.map_rep_mut().match_data(prior, &scan);

        assert!(
            matched.x.abs() < 0.1 && matched.y.abs() < 0.1,
            "position should recover, got ({}, {})",
            matched.x,
            matched.y
        );
        assert!(
            normalize_angle(matched.theta).abs() < 0.02,
            "heading should recover, got {}",
            matched.theta
        );
    }
}
