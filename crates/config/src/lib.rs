//! Startup configuration for tigerslam.
//!
//! The configuration is a flat key-value file (TOML) read once at startup.
//! The resulting [`RobotConfig`] is an immutable snapshot handed to the
//! subsystems through their constructors; nothing re-reads the file at
//! runtime.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Process-wide configuration snapshot.
///
/// Field names match the option names in the configuration file one to one.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    // Sensors
    pub lidar_port: String,
    pub lidar_num_distances: usize,
    pub lidar_radial_span: f64,
    pub lidar_max_distance: f64,
    /// Laser mount offset from the robot center, meters
    pub lidar_position_x: f64,
    pub lidar_position_y: f64,
    pub use_lidar: bool,
    pub odometry_port: String,
    pub use_odometry: bool,

    // Robot geometry
    pub robot_base_width: f64,
    pub robot_wheel_radius: f64,
    pub robot_odometry_ppr: u32,

    // HectorSLAM
    pub hectorslam_gridmap_size_x: usize,
    pub hectorslam_gridmap_size_y: usize,
    /// Level-0 cell length in meters
    pub hectorslam_gridmap_resolution: f64,
    /// World origin as a fraction [0, 1] of the map's world size
    pub hectorslam_gridmap_start_x: f64,
    pub hectorslam_gridmap_start_y: f64,
    pub hectorslam_levels: usize,
    pub hectorslam_update_factor_free: f64,
    pub hectorslam_update_factor_occupied: f64,
    pub hectorslam_map_update_min_dist_diff: f64,
    pub hectorslam_map_update_min_angle_diff: f64,
    pub hectorslam_use_odometry: bool,
    pub hectorslam_use_lidar_correction: bool,
    /// Time the LIDAR uses on one sweep, first beam to last (s)
    pub hectorslam_scan_duration: f64,

    // A* planning
    pub astar_shrink_factor: usize,
    pub astar_check_radius: f64,
    pub astar_unknown_punish: f64,
    pub astar_max_iterations: usize,
    pub astar_smoothing_data_weight: f64,
    pub astar_smoothing_smooth_weight: f64,

    // Path following
    pub lookahead_distance: f64,

    // Collision avoidance
    pub collision_detection_radius: f64,
    pub collision_detection_angle: f64,

    // Map storage
    pub map_storage_root: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            lidar_port: "/dev/ttyUSB0".into(),
            lidar_num_distances: 360,
            lidar_radial_span: 360.0,
            lidar_max_distance: 6000.0,
            lidar_position_x: 0.0,
            lidar_position_y: 0.0,
            use_lidar: true,
            odometry_port: "/dev/ttyUSB1".into(),
            use_odometry: true,

            robot_base_width: 0.4,
            robot_wheel_radius: 0.05,
            robot_odometry_ppr: 200,

            hectorslam_gridmap_size_x: 1024,
            hectorslam_gridmap_size_y: 1024,
            hectorslam_gridmap_resolution: 0.025,
            hectorslam_gridmap_start_x: 0.5,
            hectorslam_gridmap_start_y: 0.5,
            hectorslam_levels: 3,
            hectorslam_update_factor_free: 0.4,
            hectorslam_update_factor_occupied: 0.6,
            hectorslam_map_update_min_dist_diff: 0.4,
            hectorslam_map_update_min_angle_diff: 0.9,
            hectorslam_use_odometry: true,
            hectorslam_use_lidar_correction: false,
            hectorslam_scan_duration: 0.0667,

            astar_shrink_factor: 4,
            astar_check_radius: 0.3,
            astar_unknown_punish: 1.5,
            astar_max_iterations: 100_000,
            astar_smoothing_data_weight: 0.5,
            astar_smoothing_smooth_weight: 0.1,

            lookahead_distance: 0.5,

            collision_detection_radius: 0.5,
            collision_detection_angle: 1.0,

            map_storage_root: "maps".into(),
        }
    }
}

impl RobotConfig {
    /// Load the configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
