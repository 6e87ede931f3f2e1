//! Shared types and sensor reading definitions for tigerslam.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 2D pose in the world frame (meters, radians).
/// Origin is where the robot was powered on (or where a stored map says it is).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X position in meters (positive = forward at theta=0)
    pub x: f64,
    /// Y position in meters (positive = left at theta=0)
    pub y: f64,
    /// Heading in radians (positive = counter-clockwise from X axis)
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

/// One full LIDAR sweep.
///
/// Distances are in millimeters, indexed by beam; the sweep covers `span`
/// degrees centered on the robot's forward axis. A distance of zero means the
/// beam returned nothing.
#[derive(Debug, Clone)]
pub struct LidarReading {
    /// Per-beam ranges in millimeters
    pub distances: Vec<f64>,
    /// Angular span of the sweep in degrees
    pub span: f64,
    /// Maximum measurable range in millimeters
    pub max_distance: f64,
    /// Timestamp when the sweep completed
    pub timestamp: Instant,
}

impl LidarReading {
    pub fn new(distances: Vec<f64>, span: f64, max_distance: f64) -> Self {
        Self {
            distances,
            span,
            max_distance,
            timestamp: Instant::now(),
        }
    }
}

/// Incremental wheel encoder counts since the previous reading.
#[derive(Debug, Clone, Copy)]
pub struct OdometryReading {
    pub left_pulses: i32,
    pub right_pulses: i32,
    /// Timestamp when the counts were sampled
    pub timestamp: Instant,
}

impl OdometryReading {
    pub fn new(left_pulses: i32, right_pulses: i32) -> Self {
        Self {
            left_pulses,
            right_pulses,
            timestamp: Instant::now(),
        }
    }
}
