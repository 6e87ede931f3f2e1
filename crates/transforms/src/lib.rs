//! 2D transform helpers and angle math for SLAM and navigation.
//!
//! Conventions:
//! - `world`: global fixed frame, meters, y grows upward
//! - `map`: grid frame, cell units, y index grows downward in images
//! - Headings are radians, positive counter-clockwise, wrapped to (-PI, PI]

use nalgebra::{Matrix3, Vector2, Vector3};
use std::f64::consts::PI;
use types::Pose;

/// Homogeneous 2D transform for a pose `(x, y, theta)`:
///
/// ```text
/// | cos -sin  x |
/// | sin  cos  y |
/// |  0    0   1 |
/// ```
///
/// Left-multiply a robot-frame point (as `(px, py, 1)`) to carry it into the
/// pose's parent frame.
pub fn transform_matrix(pose: Pose) -> Matrix3<f64> {
    let (s, c) = pose.theta.sin_cos();
    Matrix3::new(c, -s, pose.x, s, c, pose.y, 0.0, 0.0, 1.0)
}

/// Apply a homogeneous transform to a 2D point.
pub fn apply(transform: &Matrix3<f64>, point: Vector2<f64>) -> Vector2<f64> {
    let v = transform * Vector3::new(point.x, point.y, 1.0);
    Vector2::new(v.x, v.y)
}

/// Normalize an angle to (-PI, PI].
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest angular difference from `a` to `b`, in (-PI, PI].
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(b - a)
}

/// Whether two poses differ by more than the given translation or rotation
/// thresholds. Used as the gate deciding if the robot has moved enough to
/// integrate a new scan.
pub fn pose_difference_larger_than(
    pose1: Pose,
    pose2: Pose,
    distance_thresh: f64,
    angle_thresh: f64,
) -> bool {
    let dx = pose1.x - pose2.x;
    let dy = pose1.y - pose2.y;
    if (dx * dx + dy * dy).sqrt() > distance_thresh {
        return true;
    }

    angle_diff(pose2.theta, pose1.theta).abs() > angle_thresh
}
