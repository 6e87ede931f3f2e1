//! Collision avoidance watchdog.
//!
//! Subscribes to LIDAR readings and watches a wedge in front of the robot.
//! When a return appears inside the wedge a STOP event is emitted; when the
//! area clears again, a RESUME event. The follower task selects on these
//! alongside its tick timer.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;
use types::LidarReading;

/// Returns below this are sensor noise, not obstacles (mm).
const MIN_VALID_DISTANCE_MM: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct CollisionConfig {
    /// Width of the watched wedge in radians, centered on the forward axis
    pub angle: f64,
    /// Trigger distance in meters
    pub radius: f64,
    /// Beams per sweep of the sensor
    pub num_distances: usize,
    /// Sweep span in degrees
    pub radial_span: f64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            angle: 1.0,
            radius: 0.5,
            num_distances: 360,
            radial_span: 360.0,
        }
    }
}

/// Handle to a running collision-avoidance task.
pub struct CollisionDetector {
    pub stop_rx: mpsc::Receiver<()>,
    pub resume_rx: mpsc::Receiver<()>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollisionDetector {
    /// Spawn the detector on a LIDAR subscription.
    pub fn spawn(config: CollisionConfig, mut lidar_rx: mpsc::Receiver<Arc<LidarReading>>) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (resume_tx, resume_rx) = mpsc::channel(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let (min_index, max_index) = wedge_indices(&config);
            let mut is_stopped = false;

            loop {
                let reading = tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    reading = lidar_rx.recv() => match reading {
                        Some(reading) => reading,
                        None => return,
                    },
                };

                let occupied =
                    area_occupied(&reading, min_index, max_index, config.radius);

                if is_stopped && !occupied {
                    is_stopped = false;
                    let _ = resume_tx.try_send(());
                    info!("obstacle gone");
                } else if !is_stopped && occupied {
                    is_stopped = true;
                    let _ = stop_tx.try_send(());
                    info!("obstacle detected");
                }
            }
        });

        Self {
            stop_rx,
            resume_rx,
            shutdown_tx,
            task,
        }
    }

    /// Stop the task.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.task.abort();
    }
}

/// Beam index range covering the watched wedge.
fn wedge_indices(config: &CollisionConfig) -> (usize, usize) {
    let n_per_deg = config.num_distances as f64 / config.radial_span;
    let n_per_rad = n_per_deg * 180.0 / std::f64::consts::PI;
    let center = config.num_distances / 2;
    let half = (n_per_rad * config.angle / 2.0) as usize;
    (center.saturating_sub(half), (center + half).min(config.num_distances))
}

/// Whether any beam inside the wedge returns closer than the radius.
fn area_occupied(reading: &LidarReading, min_index: usize, max_index: usize, radius: f64) -> bool {
    let radius_mm = radius * 1000.0;
    reading.distances[min_index..max_index.min(reading.distances.len())]
        .iter()
        .any(|&d| d > MIN_VALID_DISTANCE_MM && d < radius_mm)
}
