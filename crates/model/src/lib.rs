//! Differential-drive kinematics.
//!
//! Models a robot with two parallel-mounted wheels. Equal wheel distances move
//! the robot straight ahead; unequal distances rotate it about a point on the
//! extended wheel axis.

use std::f64::consts::PI;
use types::Pose;

/// Geometry and encoder constants of a differential-drive robot, in SI units.
#[derive(Debug, Clone, Copy)]
pub struct DiffDriveModel {
    /// Distance between the centers of the two wheels (m)
    pub base_width: f64,
    /// Wheel radius (m)
    pub wheel_radius: f64,
    /// Encoder pulses per full wheel rotation
    pub odometry_ppr: u32,
}

impl DiffDriveModel {
    pub fn new(base_width: f64, wheel_radius: f64, odometry_ppr: u32) -> Self {
        Self {
            base_width,
            wheel_radius,
            odometry_ppr,
        }
    }

    /// Distance one encoder pulse corresponds to on the wheel circumference.
    pub fn distance_per_pulse(&self) -> f64 {
        2.0 * PI * self.wheel_radius / self.odometry_ppr as f64
    }

    /// Advance a pose by the distances the left and right wheel have rolled.
    pub fn roll_position(&self, dist_left: f64, dist_right: f64, prev: Pose) -> Pose {
        if dist_left == dist_right {
            return Pose {
                x: prev.x + dist_left * prev.theta.cos(),
                y: prev.y + dist_left * prev.theta.sin(),
                theta: prev.theta,
            };
        }

        let turn_radius =
            self.base_width * (dist_right + dist_left) / (2.0 * (dist_right - dist_left));
        let theta = prev.theta + (dist_right - dist_left) / self.base_width;
        Pose {
            x: prev.x + turn_radius * (theta.sin() - prev.theta.sin()),
            y: prev.y - turn_radius * (theta.cos() - prev.theta.cos()),
            theta,
        }
    }

    /// Advance a pose by raw encoder pulse counts from each wheel.
    pub fn odometry_position(&self, pulses_left: i32, pulses_right: i32, prev: Pose) -> Pose {
        let per_pulse = self.distance_per_pulse();
        self.roll_position(
            per_pulse * pulses_left as f64,
            per_pulse * pulses_right as f64,
            prev,
        )
    }
}

impl Default for DiffDriveModel {
    fn default() -> Self {
        Self {
            base_width: 0.4,
            wheel_radius: 0.05,
            odometry_ppr: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_per_pulse() {
        let robot = DiffDriveModel::new(0.4, 0.05, 200);
        assert_relative_eq!(robot.distance_per_pulse(), PI * 0.1 / 200.0, epsilon = 1e-12);
    }

    #[test]
    fn test_roll_straight() {
        let robot = DiffDriveModel::default();
        let pose = robot.roll_position(1.0, 1.0, Pose::default());
        assert_relative_eq!(pose.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.theta, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_roll_straight_respects_heading() {
        let robot = DiffDriveModel::default();
        let start = Pose::new(0.0, 0.0, PI / 2.0);
        let pose = robot.roll_position(2.0, 2.0, start);
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_roll_spin_in_place() {
        // Opposite wheel distances rotate about the axle center
        let robot = DiffDriveModel::new(0.4, 0.05, 200);
        let quarter = PI / 2.0 * robot.base_width / 2.0;
        let pose = robot.roll_position(-quarter, quarter, Pose::default());
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.theta, PI / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_roll_full_circle_returns_home() {
        let robot = DiffDriveModel::new(0.4, 0.05, 200);
        // One wheel still, the other drives a full circle of radius base_width
        let outer = 2.0 * PI * robot.base_width;
        let pose = robot.roll_position(0.0, outer, Pose::default());
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.theta, 2.0 * PI, epsilon = 1e-9);
    }

    #[test]
    fn test_odometry_position_straight() {
        let robot = DiffDriveModel::new(0.4, 0.05, 200);
        let pose = robot.odometry_position(1000, 1000, Pose::default());
        assert_relative_eq!(pose.x, 1000.0 * robot.distance_per_pulse(), epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-12);
    }
}
