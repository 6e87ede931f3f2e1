//! The SLAM task: consumes sensor readings, drives the processor and filter.

use crate::conversion::{lidar_to_scan, ScanConversion};
use localization::{OdomSlamEkf, PoseEstimate};
use mapping::{ScanContainer, SlamProcessor};
use model::DiffDriveModel;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use types::{LidarReading, OdometryReading, Pose};

#[derive(Debug, Clone)]
pub struct SlamTaskConfig {
    pub robot: DiffDriveModel,
    pub conversion: ScanConversion,
    /// Feed odometry readings into the filter
    pub use_odometry: bool,
}

/// Long-lived task owning the SLAM processor and the EKF.
///
/// Scans are processed strictly in arrival order from the sensor; odometry
/// and scans carry their own timestamps, so the filter is insensitive to
/// receive-order jitter between the two channels.
pub struct SlamTask {
    processor: SlamProcessor,
    filter: OdomSlamEkf,
    scan: ScanContainer,
    config: SlamTaskConfig,
    pose_tx: watch::Sender<PoseEstimate>,
    stop_rx: watch::Receiver<bool>,
    lidar_rx: mpsc::Receiver<Arc<LidarReading>>,
    odometry_rx: mpsc::Receiver<Arc<OdometryReading>>,
}

impl SlamTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        processor: SlamProcessor,
        config: SlamTaskConfig,
        lidar_rx: mpsc::Receiver<Arc<LidarReading>>,
        odometry_rx: mpsc::Receiver<Arc<OdometryReading>>,
        pose_tx: watch::Sender<PoseEstimate>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let filter = OdomSlamEkf::new(config.robot);
        Self {
            processor,
            filter,
            scan: ScanContainer::new(),
            config,
            pose_tx,
            stop_rx,
            lidar_rx,
            odometry_rx,
        }
    }

    /// Run until the stop signal fires or both sensor channels close.
    /// Returns the processor so a stopped session can be resumed or saved.
    pub async fn run(mut self) -> SlamProcessor {
        info!("SLAM task running");

        enum Event {
            Stop,
            Continue,
            Odometry(Option<Arc<OdometryReading>>),
            Lidar(Option<Arc<LidarReading>>),
        }

        let mut odometry_open = true;
        let mut lidar_open = true;

        loop {
            let event = tokio::select! {
                result = self.stop_rx.changed() => {
                    if result.is_err() || *self.stop_rx.borrow() {
                        Event::Stop
                    } else {
                        Event::Continue
                    }
                }
                reading = self.odometry_rx.recv(), if odometry_open => Event::Odometry(reading),
                reading = self.lidar_rx.recv(), if lidar_open => Event::Lidar(reading),
            };

            match event {
                Event::Stop => break,
                Event::Continue => {}
                Event::Odometry(Some(reading)) => self.handle_odometry(&reading),
                Event::Lidar(Some(reading)) => self.handle_scan(&reading),
                Event::Odometry(None) => odometry_open = false,
                Event::Lidar(None) => lidar_open = false,
            }

            if !odometry_open && !lidar_open {
                break;
            }
        }

        self.filter.stop();
        info!("SLAM task stopped");
        self.processor
    }

    fn handle_odometry(&mut self, reading: &OdometryReading) {
        if !self.config.use_odometry {
            return;
        }
        self.filter.odometry_update(reading);
    }

    fn handle_scan(&mut self, reading: &LidarReading) {
        let estimate = self.filter.estimate();
        let hint = Pose::new(estimate[0], estimate[1], estimate[2]);

        lidar_to_scan(
            reading,
            &mut self.scan,
            self.processor.scale_to_map(),
            &self.config.robot,
            estimate[3],
            estimate[4],
            &self.config.conversion,
        );

        self.processor.update(&self.scan, hint);

        let matched = self.processor.last_scan_match_pose();
        self.filter.slam_update(matched, reading.timestamp);

        debug!(
            x = matched.x,
            y = matched.y,
            theta = matched.theta,
            beams = self.scan.len(),
            "scan processed"
        );

        let _ = self.pose_tx.send(self.filter.snapshot());
    }
}
