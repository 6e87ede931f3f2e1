//! Lookahead-based path following.
//!
//! The steering law splits the desired course angle into the path tangent of
//! the current segment and a correction that aims at a point a lookahead
//! distance ahead of the projection of the robot onto the path. The heading
//! error then maps to differential wheel reference speeds in `[-1, 1]`.

pub mod los;

use planning::Path;
use transforms::normalize_angle;
use types::Pose;

/// Wheel reference speeds produced by one follower tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedCommand {
    pub left: f64,
    pub right: f64,
    /// The end of the path has been reached
    pub finished: bool,
}

/// Lookahead steering over a waypoint path.
///
/// Tracks the current segment index per path ID; handing it a replaced path
/// restarts from the first segment.
#[derive(Debug)]
pub struct Lookahead {
    /// Lookahead distance delta in meters
    lookahead_distance: f64,
    curr_index: usize,
    path_id: Option<u64>,
}

impl Lookahead {
    pub fn new(lookahead_distance: f64) -> Self {
        Self {
            lookahead_distance,
            curr_index: 0,
            path_id: None,
        }
    }

    /// Compute wheel speeds for the current pose. Sets `finished` once the
    /// segment index has advanced past the last segment.
    pub fn speed_update(&mut self, path: &Path, pos: Pose) -> SpeedCommand {
        if self.path_id != Some(path.id) {
            self.path_id = Some(path.id);
            self.curr_index = 0;
        }

        let Some((point_a, point_b)) = self.segment_points(path) else {
            return SpeedCommand {
                left: 0.0,
                right: 0.0,
                finished: true,
            };
        };

        let alpha = los::alpha(point_a, point_b);
        let (s, e) = los::epsilon(point_a, point_b, [pos.x, pos.y]);

        // Desired course: path tangent corrected toward a point one
        // lookahead distance ahead of the projection
        let chi_d = alpha - (e / self.lookahead_distance).atan();

        // Move on to the next segment once the projection approaches the end
        // of this one (takes effect on the next update)
        if s > segment_length(point_a, point_b) - self.lookahead_distance / 2.0 {
            self.curr_index += 1;
        }

        let e_chi = normalize_angle(chi_d - pos.theta)
            .clamp(-std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2);

        // Full speed on straightaways, half speed while correcting
        let k = if e_chi.abs() < 0.05 { 1.0 } else { 0.5 };

        let (left, right) = if e_chi <= 0.0 {
            // Clockwise: slow the right wheel harder
            (
                k * ((25.0 / 157.0) * e_chi + 0.5),
                k * ((75.0 / 157.0) * e_chi + 0.5),
            )
        } else {
            // Counter-clockwise
            (
                k * ((-75.0 / 157.0) * e_chi + 0.5),
                k * ((-25.0 / 157.0) * e_chi + 0.5),
            )
        };

        SpeedCommand {
            left,
            right,
            finished: false,
        }
    }

    /// Segment index the follower is currently tracking.
    pub fn current_index(&self) -> usize {
        self.curr_index
    }

    fn segment_points(&self, path: &Path) -> Option<([f64; 2], [f64; 2])> {
        if path.poses.len() < 2 || self.curr_index > path.poses.len() - 2 {
            return None;
        }
        let a = path.poses[self.curr_index];
        let b = path.poses[self.curr_index + 1];
        Some(([a.x, a.y], [b.x, b.y]))
    }
}

fn segment_length(point_a: [f64; 2], point_b: [f64; 2]) -> f64 {
    ((point_b[0] - point_a[0]).powi(2) + (point_b[1] - point_a[1]).powi(2)).sqrt()
}
