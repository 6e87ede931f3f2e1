//! Motor controller: manual speeds and the path-follow task.

use crate::collision::{CollisionConfig, CollisionDetector};
use crate::motor::SharedDriver;
use following::Lookahead;
use localization::PoseEstimate;
use mapping::OccGrid;
use model::DiffDriveModel;
use planning::{AstarPlanner, Path, PlanError, PlannerConfig};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::{LidarReading, Pose};

/// How long a collision STOP may hold the robot before the sub-path is
/// abandoned and replanned.
const COLLISION_RESUME_TIMEOUT: Duration = Duration::from_secs(5);

/// Reverse duration and speed used to clear an obstacle before replanning.
const BACKUP_DURATION: Duration = Duration::from_secs(2);
const BACKUP_SPEED: f64 = -0.9;

/// Follower tick period (~10 Hz).
const TICK_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Manual,
    PathFollowing,
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub robot: DiffDriveModel,
    pub planner: PlannerConfig,
    pub collision: CollisionConfig,
    /// Follower lookahead distance in meters
    pub lookahead_distance: f64,
}

/// Owns the driver handle, the current path and the goal; spawns the
/// path-follow task.
///
/// The path lives behind a mutex touched only when it is replaced and inside
/// a follower tick. Switching to manual at any time cancels path following at
/// the next tick.
pub struct MotorController {
    state: Arc<Mutex<ControlState>>,
    motor: SharedDriver,
    path: Arc<Mutex<Option<Path>>>,
    config: ControlConfig,
    goal: Option<Pose>,
    grid: Option<Arc<RwLock<OccGrid>>>,
}

impl MotorController {
    pub fn new(motor: SharedDriver, config: ControlConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState::Manual)),
            motor,
            path: Arc::new(Mutex::new(None)),
            config,
            goal: None,
            grid: None,
        }
    }

    pub fn state(&self) -> ControlState {
        *self.state.lock().unwrap()
    }

    /// Set wheel speeds directly. Cancels any path following.
    pub fn manual_speeds(&self, left: f64, right: f64) -> Result<(), crate::MotorError> {
        *self.state.lock().unwrap() = ControlState::Manual;
        self.motor.lock().unwrap().set_speeds(left, right)
    }

    /// Plan a path on a snapshot of the map and store it for following.
    pub fn plan_path(
        &mut self,
        grid: Arc<RwLock<OccGrid>>,
        current: Pose,
        goal: Pose,
    ) -> Result<(), PlanError> {
        if self.state() == ControlState::PathFollowing {
            self.stop_path_following();
        }

        let path = {
            let grid = grid.read().unwrap();
            let mut planner = AstarPlanner::new(&grid, self.config.planner.clone())?;
            planner.plan_path(current, goal)?
        };

        info!(waypoints = path.len(), id = path.id, "path planned");
        *self.path.lock().unwrap() = Some(path);
        self.goal = Some(goal);
        self.grid = Some(grid);
        Ok(())
    }

    pub fn path(&self) -> Option<Path> {
        self.path.lock().unwrap().clone()
    }

    /// Delete the path; any path following aborts on its next tick.
    pub fn delete_path(&self) {
        *self.path.lock().unwrap() = None;
    }

    /// Cancel path following; the task exits on its next tick.
    pub fn stop_path_following(&self) {
        *self.state.lock().unwrap() = ControlState::Manual;
    }

    /// Follow the stored path, reading poses from `pose_rx` and collision
    /// events from a detector on `collision_rx`. Returns the task handle; the
    /// task runs until arrival, manual override, or an unrecoverable abort.
    pub fn follow_path(
        &self,
        pose_rx: watch::Receiver<PoseEstimate>,
        collision_rx: mpsc::Receiver<Arc<LidarReading>>,
    ) -> JoinHandle<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ControlState::PathFollowing {
                return tokio::spawn(async {});
            }
            *state = ControlState::PathFollowing;
        }

        let task = FollowTask {
            state: self.state.clone(),
            motor: self.motor.clone(),
            path: self.path.clone(),
            grid: self.grid.clone(),
            goal: self.goal,
            config: self.config.clone(),
            pose_rx,
        };
        let detector = CollisionDetector::spawn(self.config.collision.clone(), collision_rx);

        tokio::spawn(task.run(detector))
    }
}

struct FollowTask {
    state: Arc<Mutex<ControlState>>,
    motor: SharedDriver,
    path: Arc<Mutex<Option<Path>>>,
    grid: Option<Arc<RwLock<OccGrid>>>,
    goal: Option<Pose>,
    config: ControlConfig,
    pose_rx: watch::Receiver<PoseEstimate>,
}

impl FollowTask {
    async fn run(mut self, mut detector: CollisionDetector) {
        info!("path following started");

        loop {
            let arrived = self.follow_sub_path(&mut detector).await;

            if arrived {
                info!("arrived at goal");
                break;
            }

            // Not arrived: either cancelled or blocked. Cancelled means stop;
            // blocked means back up, replan toward the goal and continue.
            if *self.state.lock().unwrap() == ControlState::Manual
                || self.path.lock().unwrap().is_none()
            {
                break;
            }
            if !self.backup_and_replan().await {
                break;
            }
        }

        *self.state.lock().unwrap() = ControlState::Manual;
        detector.shutdown();
        let _ = self.motor.lock().unwrap().set_speeds(0.0, 0.0);
        info!("path following ended");
    }

    /// Tick the follower at ~10 Hz until it finishes, is cancelled, or a
    /// collision stop times out. Returns true on arrival.
    async fn follow_sub_path(&mut self, detector: &mut CollisionDetector) -> bool {
        let mut follower = Lookahead::new(self.config.lookahead_distance);
        let mut ticker = tokio::time::interval(TICK_PERIOD);

        loop {
            // Obstacle handling between ticks
            if detector.stop_rx.try_recv().is_ok() {
                let _ = self.motor.lock().unwrap().set_speeds(0.0, 0.0);
                info!("obstacle ahead, waiting");
                match tokio::time::timeout(COLLISION_RESUME_TIMEOUT, detector.resume_rx.recv())
                    .await
                {
                    Ok(Some(())) => info!("obstacle cleared, resuming"),
                    _ => {
                        warn!("obstacle did not clear, aborting sub-path");
                        return false;
                    }
                }
            }

            // Manual override wins between ticks
            if *self.state.lock().unwrap() != ControlState::PathFollowing {
                let _ = self.motor.lock().unwrap().set_speeds(0.0, 0.0);
                return false;
            }

            {
                let path_guard = self.path.lock().unwrap();
                let Some(path) = path_guard.as_ref() else {
                    return false;
                };

                let pose = self
                    .pose_rx
                    .borrow()
                    .predicted(&self.config.robot, std::time::Instant::now());
                let cmd = follower.speed_update(path, pose);

                if cmd.finished {
                    let _ = self.motor.lock().unwrap().set_speeds(0.0, 0.0);
                    return true;
                }

                if let Err(e) = self.motor.lock().unwrap().set_speeds(cmd.left, cmd.right) {
                    warn!(?e, "failed to command motors");
                }
            }

            ticker.tick().await;
        }
    }

    /// Clear the obstacle by reversing, then plan a fresh path to the goal.
    /// Returns false when replanning is impossible.
    async fn backup_and_replan(&mut self) -> bool {
        let (Some(grid), Some(goal)) = (self.grid.clone(), self.goal) else {
            return false;
        };

        info!("backing up before replanning");
        let _ = self.motor.lock().unwrap().set_speeds(BACKUP_SPEED, BACKUP_SPEED);
        tokio::time::sleep(BACKUP_DURATION).await;
        let _ = self.motor.lock().unwrap().set_speeds(0.0, 0.0);

        let pose = self
            .pose_rx
            .borrow()
            .predicted(&self.config.robot, std::time::Instant::now());

        let replanned = {
            let grid = grid.read().unwrap();
            AstarPlanner::new(&grid, self.config.planner.clone())
                .and_then(|mut planner| planner.plan_path(pose, goal))
        };

        match replanned {
            Ok(path) => {
                info!(id = path.id, "replanned path to goal");
                *self.path.lock().unwrap() = Some(path);
                true
            }
            Err(e) => {
                warn!(?e, "unable to find an alternative route to goal");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::DummyDriver;
    use mapping::cell::prob_to_log_odds;
    use sensors::FanOut;
    use std::time::Instant;

    fn free_grid(size: usize) -> Arc<RwLock<OccGrid>> {
        let mut grid = OccGrid::new(1.0, [size, size], [0.0, 0.0]).unwrap();
        for i in 0..size * size {
            grid.set_log_odds_by_index(i, prob_to_log_odds(0.2));
        }
        Arc::new(RwLock::new(grid))
    }

    fn controller_with_driver() -> (MotorController, Arc<Mutex<DummyDriver>>) {
        let driver = Arc::new(Mutex::new(DummyDriver::new()));
        let config = ControlConfig {
            robot: DiffDriveModel::default(),
            planner: PlannerConfig {
                shrink_factor: 1,
                check_radius: 0.0,
                ..Default::default()
            },
            collision: CollisionConfig::default(),
            lookahead_distance: 0.5,
        };
        let controller = MotorController::new(driver.clone(), config);
        (controller, driver)
    }

    #[test]
    fn test_manual_speeds_reach_driver() {
        let (controller, driver) = controller_with_driver();
        controller.manual_speeds(0.3, -0.3).unwrap();
        assert_eq!(driver.lock().unwrap().last_speeds(), (0.3, -0.3));
        assert_eq!(controller.state(), ControlState::Manual);
    }

    #[test]
    fn test_plan_path_stores_path_and_goal() {
        let (mut controller, _driver) = controller_with_driver();
        let grid = free_grid(32);

        controller
            .plan_path(grid, Pose::new(5.0, 5.0, 0.0), Pose::new(20.0, 20.0, 0.0))
            .unwrap();

        let path = controller.path().unwrap();
        assert!(path.len() >= 2);
    }

    #[test]
    fn test_plan_path_propagates_planner_errors() {
        let (mut controller, _driver) = controller_with_driver();
        let grid = free_grid(32);

        let result = controller.plan_path(
            grid,
            Pose::new(5.0, 5.0, 0.0),
            Pose::new(500.0, 500.0, 0.0),
        );
        assert!(matches!(result, Err(PlanError::GoalOutOfBounds)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_path_finishes_at_goal() {
        let (mut controller, driver) = controller_with_driver();
        let grid = free_grid(32);
        controller
            .plan_path(grid, Pose::new(5.0, 5.0, 0.0), Pose::new(8.0, 5.0, 0.0))
            .unwrap();

        // Pose stream reporting the robot already at the goal
        let (pose_tx, pose_rx) = watch::channel(PoseEstimate {
            pose: Pose::new(8.0, 5.0, 0.0),
            v_l: 0.0,
            v_r: 0.0,
            stamp: Instant::now(),
        });
        let lidar = FanOut::new("lidar");

        let handle = controller.follow_path(pose_rx, lidar.subscribe());
        handle.await.unwrap();

        assert_eq!(controller.state(), ControlState::Manual);
        assert_eq!(driver.lock().unwrap().last_speeds(), (0.0, 0.0));
        drop(pose_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_override_cancels_following() {
        let (mut controller, driver) = controller_with_driver();
        let grid = free_grid(32);
        controller
            .plan_path(grid, Pose::new(5.0, 5.0, 0.0), Pose::new(25.0, 25.0, 0.0))
            .unwrap();

        let (_pose_tx, pose_rx) = watch::channel(PoseEstimate {
            pose: Pose::new(5.0, 5.0, 0.0),
            v_l: 0.0,
            v_r: 0.0,
            stamp: Instant::now(),
        });
        let lidar = FanOut::new("lidar");

        let handle = controller.follow_path(pose_rx, lidar.subscribe());
        tokio::task::yield_now().await;

        controller.stop_path_following();
        handle.await.unwrap();

        assert_eq!(controller.state(), ControlState::Manual);
        assert_eq!(driver.lock().unwrap().last_speeds(), (0.0, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_path_aborts_following() {
        let (mut controller, _driver) = controller_with_driver();
        let grid = free_grid(32);
        controller
            .plan_path(grid, Pose::new(5.0, 5.0, 0.0), Pose::new(25.0, 25.0, 0.0))
            .unwrap();

        let (_pose_tx, pose_rx) = watch::channel(PoseEstimate {
            pose: Pose::new(5.0, 5.0, 0.0),
            v_l: 0.0,
            v_r: 0.0,
            stamp: Instant::now(),
        });
        let lidar = FanOut::new("lidar");

        let handle = controller.follow_path(pose_rx, lidar.subscribe());
        tokio::task::yield_now().await;

        controller.delete_path();
        handle.await.unwrap();
    }
}
