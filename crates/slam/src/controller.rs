//! SLAM session lifecycle.

use crate::task::{SlamTask, SlamTaskConfig};
use crate::SlamError;
use localization::PoseEstimate;
use mapping::{MapRep, OccGrid, SlamProcessor};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;
use types::{LidarReading, OdometryReading};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlamState {
    /// No map representation allocated
    Off,
    /// Initialized but not consuming sensor readings
    Stopped,
    /// Task running
    Running,
}

/// Owns a SLAM session: Off -> Stopped -> Running and back.
///
/// A session can start from an empty map or from a map representation
/// restored out of a stored archive. While the task runs, the processor
/// lives inside it; stopping joins the task and takes the processor back, so
/// the session can be resumed or saved.
pub struct SlamController {
    state: SlamState,
    processor: Option<SlamProcessor>,
    grids: Vec<Arc<RwLock<OccGrid>>>,
    single_map: bool,
    pose_rx: Option<watch::Receiver<PoseEstimate>>,
    stop_tx: Option<watch::Sender<bool>>,
    running: Option<JoinHandle<SlamProcessor>>,
}

impl SlamController {
    pub fn new() -> Self {
        Self {
            state: SlamState::Off,
            processor: None,
            grids: Vec::new(),
            single_map: false,
            pose_rx: None,
            stop_tx: None,
            running: None,
        }
    }

    pub fn state(&self) -> SlamState {
        self.state
    }

    /// Set up a session around a map representation (fresh or restored).
    pub fn initialize(&mut self, map_rep: MapRep) -> Result<(), SlamError> {
        if self.state != SlamState::Off {
            return Err(SlamError::AlreadyInitialized);
        }

        self.grids = map_rep.grids();
        self.single_map = map_rep.is_single();
        self.processor = Some(SlamProcessor::new(map_rep));
        self.state = SlamState::Stopped;
        info!(levels = self.grids.len(), "SLAM initialized");
        Ok(())
    }

    /// Start the SLAM task on the given sensor subscriptions.
    pub fn start(
        &mut self,
        config: SlamTaskConfig,
        lidar_rx: mpsc::Receiver<Arc<LidarReading>>,
        odometry_rx: mpsc::Receiver<Arc<OdometryReading>>,
    ) -> Result<watch::Receiver<PoseEstimate>, SlamError> {
        if self.state == SlamState::Running {
            return Err(SlamError::AlreadyRunning);
        }
        let processor = self.processor.take().ok_or(SlamError::NotInitialized)?;

        let (pose_tx, pose_rx) = watch::channel(PoseEstimate::origin());
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = SlamTask::new(processor, config, lidar_rx, odometry_rx, pose_tx, stop_rx);
        self.running = Some(tokio::spawn(task.run()));
        self.stop_tx = Some(stop_tx);
        self.pose_rx = Some(pose_rx.clone());
        self.state = SlamState::Running;
        Ok(pose_rx)
    }

    /// Signal the task to stop and take the processor back.
    pub async fn stop(&mut self) -> Result<(), SlamError> {
        let handle = self.running.take().ok_or(SlamError::NotRunning)?;
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        let processor = handle.await.expect("SLAM task panicked");
        self.processor = Some(processor);
        self.pose_rx = None;
        self.state = SlamState::Stopped;
        info!("SLAM stopped");
        Ok(())
    }

    /// Drop the session entirely. A still-running task is signalled to stop.
    pub fn terminate(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.processor = None;
        self.grids.clear();
        self.pose_rx = None;
        self.running = None;
        self.state = SlamState::Off;
    }

    /// Latest pose estimates while running.
    pub fn pose_rx(&self) -> Option<watch::Receiver<PoseEstimate>> {
        self.pose_rx.clone()
    }

    /// Shared level grids, finest first. Valid from initialization until
    /// termination, across start/stop cycles.
    pub fn grids(&self) -> &[Arc<RwLock<OccGrid>>] {
        &self.grids
    }

    pub fn is_single_map(&self) -> bool {
        self.single_map
    }

    /// The processor of a stopped session (for saving or tuning).
    pub fn processor(&self) -> Option<&SlamProcessor> {
        self.processor.as_ref()
    }

    pub fn processor_mut(&mut self) -> Option<&mut SlamProcessor> {
        self.processor.as_mut()
    }
}

impl Default for SlamController {
    fn default() -> Self {
        Self::new()
    }
}
