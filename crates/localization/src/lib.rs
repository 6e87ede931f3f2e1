//! Pose estimation fusing wheel odometry with scan-matched poses.
//!
//! The filter state is `(x, y, theta, v_l, v_r)`. Odometry readings correct
//! the wheel velocities, scan-match results correct the pose; between updates
//! the state propagates through the differential-drive model. All delta times
//! come from reading timestamps, so readings arriving out of order with
//! respect to wall clock still fuse correctly.

mod ekf;

pub use ekf::OdomSlamEkf;

use model::DiffDriveModel;
use std::time::Instant;
use types::Pose;

/// Filter snapshot published to pose consumers.
///
/// Consumers get a current pose by pure propagation of the copied state; no
/// lock on the filter is needed.
#[derive(Debug, Clone, Copy)]
pub struct PoseEstimate {
    pub pose: Pose,
    pub v_l: f64,
    pub v_r: f64,
    pub stamp: Instant,
}

impl PoseEstimate {
    pub fn origin() -> Self {
        Self {
            pose: Pose::default(),
            v_l: 0.0,
            v_r: 0.0,
            stamp: Instant::now(),
        }
    }

    /// Pose propagated from the snapshot instant to `now`.
    pub fn predicted(&self, robot: &DiffDriveModel, now: Instant) -> Pose {
        let dt = now.saturating_duration_since(self.stamp).as_secs_f64();
        robot.roll_position(self.v_l * dt, self.v_r * dt, self.pose)
    }
}
