//! Extended Kalman filter over `(x, y, theta, v_l, v_r)`.

use crate::PoseEstimate;
use model::DiffDriveModel;
use nalgebra::{SMatrix, SVector};
use std::time::Instant;
use tracing::trace;
use transforms::angle_diff;
use types::{OdometryReading, Pose};

type Vector5 = SVector<f64, 5>;
type Matrix5 = SMatrix<f64, 5, 5>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum UpdateKind {
    Odometry,
    ScanMatch,
}

/// Odometry + scan-match EKF.
///
/// Both sensors produce a full-dimension measurement; the gain rows of the
/// components a sensor does not observe are zeroed, so odometry only corrects
/// the wheel velocities and scan matches only correct the pose. The first
/// reading of each kind initializes that sensor's clock and is otherwise
/// dropped.
pub struct OdomSlamEkf {
    x: Vector5,
    p: Matrix5,
    q: Matrix5,
    r: Matrix5,
    robot: DiffDriveModel,
    odom_update_time: Option<Instant>,
    slam_update_time: Option<Instant>,
    update_time: Instant,
}

impl OdomSlamEkf {
    pub fn new(robot: DiffDriveModel) -> Self {
        Self::with_start_time(robot, Instant::now())
    }

    pub fn with_start_time(robot: DiffDriveModel, start: Instant) -> Self {
        Self {
            x: Vector5::zeros(),
            p: Matrix5::identity(),
            q: Matrix5::from_diagonal(&Vector5::repeat(2.0)),
            r: Matrix5::from_diagonal(&Vector5::repeat(0.2)),
            robot,
            odom_update_time: None,
            slam_update_time: None,
            update_time: start,
        }
    }

    /// Fuse incremental wheel pulse counts.
    pub fn odometry_update(&mut self, reading: &OdometryReading) {
        let Some(last_odom) = self.odom_update_time.replace(reading.timestamp) else {
            return;
        };

        let dt_odom = reading
            .timestamp
            .saturating_duration_since(last_odom)
            .as_secs_f64();
        if dt_odom <= 0.0 {
            return;
        }

        let per_pulse = self.robot.distance_per_pulse();
        let d_l = per_pulse * reading.left_pulses as f64;
        let d_r = per_pulse * reading.right_pulses as f64;
        let v_l = d_l / dt_odom;
        let v_r = d_r / dt_odom;

        // Position part of the measurement: the last filter pose rolled
        // forward with the measured speeds. It is discarded by the zeroed
        // gain rows but keeps the measurement full-dimension.
        let dt_filter = reading
            .timestamp
            .saturating_duration_since(self.update_time)
            .as_secs_f64();
        let pos = self.pose_from_state(&self.x);
        let rolled = self
            .robot
            .roll_position(v_l * dt_filter, v_r * dt_filter, pos);

        let y = Vector5::new(rolled.x, rolled.y, rolled.theta, v_l, v_r);
        self.update(y, reading.timestamp, UpdateKind::Odometry);
    }

    /// Fuse a scan-matched pose. `timestamp` is the scan's capture time.
    pub fn slam_update(&mut self, pose: Pose, timestamp: Instant) {
        let Some(last_slam) = self.slam_update_time.replace(timestamp) else {
            return;
        };

        let dt_slam = timestamp.saturating_duration_since(last_slam).as_secs_f64();
        if dt_slam <= 0.0 {
            return;
        }

        // Recover pseudo wheel speeds, assuming the motion since the last
        // scan was a straight line plus a rotation
        let prev = self.pose_from_state(&self.x);
        let distance = ((pose.x - prev.x).powi(2) + (pose.y - prev.y).powi(2)).sqrt();
        let rot_distance = self.robot.base_width / 2.0 * angle_diff(prev.theta, pose.theta);
        let v_l = (distance + rot_distance) / dt_slam;
        let v_r = (distance - rot_distance) / dt_slam;

        let y = Vector5::new(pose.x, pose.y, pose.theta, v_l, v_r);
        self.update(y, timestamp, UpdateKind::ScanMatch);
    }

    fn update(&mut self, y: Vector5, timestamp: Instant, kind: UpdateKind) {
        let dt = timestamp
            .saturating_duration_since(self.update_time)
            .as_secs_f64();

        let x_minus = self.propagate(dt);
        let f = self.jacobian(&x_minus, dt);
        let p_minus = f * self.p * f.transpose() + self.q;

        let mut k = p_minus
            * (p_minus + self.r)
                .try_inverse()
                .expect("innovation covariance must be invertible");

        match kind {
            // Odometry observes only the wheel speeds
            UpdateKind::Odometry => k.fixed_rows_mut::<3>(0).fill(0.0),
            // Scan matching observes only the pose
            UpdateKind::ScanMatch => k.fixed_rows_mut::<2>(3).fill(0.0),
        }

        let mut innovation = y - x_minus;
        innovation[2] = transforms::normalize_angle(innovation[2]);

        self.x = x_minus + k * innovation;
        self.p = (Matrix5::identity() - k) * p_minus;
        self.update_time = timestamp;

        trace!(
            x = self.x[0],
            y = self.x[1],
            theta = self.x[2],
            v_l = self.x[3],
            v_r = self.x[4],
            ?kind,
            "filter update"
        );
    }

    /// State propagated `dt` seconds past the last update.
    fn propagate(&self, dt: f64) -> Vector5 {
        let pose = self.pose_from_state(&self.x);
        let v_l = self.x[3];
        let v_r = self.x[4];
        let rolled = self.robot.roll_position(v_l * dt, v_r * dt, pose);
        Vector5::new(rolled.x, rolled.y, rolled.theta, v_l, v_r)
    }

    fn jacobian(&self, x: &Vector5, dt: f64) -> Matrix5 {
        let theta = x[2];
        let v = (x[3] + x[4]) / 2.0;
        let (sin, cos) = theta.sin_cos();

        let mut f = Matrix5::identity();
        f[(0, 2)] = -v * sin * dt;
        f[(0, 3)] = cos / 2.0 * dt;
        f[(0, 4)] = cos / 2.0 * dt;
        f[(1, 2)] = v * cos * dt;
        f[(1, 3)] = sin / 2.0 * dt;
        f[(1, 4)] = sin / 2.0 * dt;
        f
    }

    fn pose_from_state(&self, x: &Vector5) -> Pose {
        Pose::new(x[0], x[1], x[2])
    }

    /// Freshly propagated state estimate at `now`.
    pub fn estimate_at(&self, now: Instant) -> Vector5 {
        let dt = now.saturating_duration_since(self.update_time).as_secs_f64();
        self.propagate(dt)
    }

    /// Freshly propagated state estimate at the current wall clock.
    pub fn estimate(&self) -> Vector5 {
        self.estimate_at(Instant::now())
    }

    /// Raw state from the last update, without propagation.
    pub fn states(&self) -> Vector5 {
        self.x
    }

    /// Snapshot for lock-free pose queries.
    pub fn snapshot(&self) -> PoseEstimate {
        PoseEstimate {
            pose: self.pose_from_state(&self.x),
            v_l: self.x[3],
            v_r: self.x[4],
            stamp: self.update_time,
        }
    }

    /// Zero the wheel velocities so propagation halts.
    pub fn stop(&mut self) {
        self.x[3] = 0.0;
        self.x[4] = 0.0;
    }
}
