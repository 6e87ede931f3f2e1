//! SLAM pipeline for a differential-drive robot with a planar LIDAR.
//!
//! Wires the scan matcher and map pyramid to the sensor channels:
//! - Converts LIDAR readings into scan containers, optionally compensating
//!   for robot motion during the sweep
//! - Runs the match -> pose-gate -> update loop on every scan
//! - Fuses odometry and matched poses in the EKF and publishes pose snapshots
//!
//! The SLAM task is the only writer of the map pyramid; renderers and the
//! planner read level grids through their shared handles.

mod controller;
mod conversion;
mod task;

pub use controller::{SlamController, SlamState};
pub use conversion::{lidar_to_scan, ScanConversion};
pub use task::{SlamTask, SlamTaskConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlamError {
    #[error("SLAM already initialized")]
    AlreadyInitialized,
    #[error("no SLAM session initialized")]
    NotInitialized,
    #[error("SLAM is not running")]
    NotRunning,
    #[error("SLAM is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Mapping(#[from] mapping::MappingError),
}
