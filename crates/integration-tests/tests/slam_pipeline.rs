//! End-to-end: simulated LIDAR sweeps through the SLAM task, then planning
//! and storage on the produced map.

use mapping::MapRep;
use model::DiffDriveModel;
use planning::{AstarPlanner, PlannerConfig};
use sensors::FanOut;
use slam::{ScanConversion, SlamController, SlamState, SlamTaskConfig};
use std::sync::Arc;
use types::{LidarReading, OdometryReading, Pose};

/// Simulate one 360-degree sweep inside a square room of `half` meters
/// half-size, seen from `pose`.
fn simulated_sweep(pose: Pose, half: f64, beams: usize) -> Arc<LidarReading> {
    let distances = (0..beams)
        .map(|k| {
            // Beam angles run from -span/2 to +span/2 in the robot frame
            let beam_angle =
                -std::f64::consts::PI + k as f64 / (beams - 1) as f64 * std::f64::consts::TAU;
            let world_angle = pose.theta + beam_angle;
            let (s, c) = world_angle.sin_cos();

            let mut best = f64::INFINITY;
            for (wall, along, cos_like) in [
                (half - pose.x, pose.y, true),
                (-half - pose.x, pose.y, true),
                (half - pose.y, pose.x, false),
                (-half - pose.y, pose.x, false),
            ] {
                let denom = if cos_like { c } else { s };
                if denom.abs() < 1e-9 {
                    continue;
                }
                let t = wall / denom;
                if t <= 0.0 {
                    continue;
                }
                let lateral = if cos_like { along + t * s } else { along + t * c };
                if lateral.abs() <= half + 1e-9 {
                    best = best.min(t);
                }
            }
            best * 1000.0
        })
        .collect();
    Arc::new(LidarReading::new(distances, 360.0, 8000.0))
}

fn pipeline_config() -> SlamTaskConfig {
    SlamTaskConfig {
        robot: DiffDriveModel::new(0.4, 0.05, 200),
        conversion: ScanConversion::default(),
        use_odometry: true,
    }
}

#[tokio::test]
async fn test_map_builds_plans_and_roundtrips() {
    let lidar = FanOut::<Arc<LidarReading>>::new("lidar");
    let odometry = FanOut::<Arc<OdometryReading>>::new("odometry");

    let mut slam = SlamController::new();
    slam.initialize(MapRep::new_multi(0.1, 256, 256, [0.5, 0.5], 3).unwrap())
        .unwrap();
    if let Some(processor) = slam.processor_mut() {
        processor.set_update_factor_occupied(0.9);
    }

    let mut pose_rx = slam
        .start(pipeline_config(), lidar.subscribe(), odometry.subscribe())
        .unwrap();
    assert_eq!(slam.state(), SlamState::Running);

    // Feed a handful of stationary sweeps of a 4 m room
    for _ in 0..5 {
        lidar.publish(simulated_sweep(Pose::default(), 2.0, 180));
        pose_rx.changed().await.unwrap();
    }

    // The pose stays near the origin for a stationary robot
    let estimate = *pose_rx.borrow();
    assert!(estimate.pose.x.abs() < 0.3, "x drifted to {}", estimate.pose.x);
    assert!(estimate.pose.y.abs() < 0.3, "y drifted to {}", estimate.pose.y);

    slam.stop().await.unwrap();

    // The level-0 grid has walls and free interior
    let grid = slam.grids()[0].clone();
    {
        let grid = grid.read().unwrap();
        assert!(grid.map_extents().is_some());
        // Robot cell is known free space
        let origin = grid.map_coords_pose(Pose::default());
        assert!(grid.is_free(origin.x as usize, origin.y as usize));
    }

    // Plan inside the mapped room
    {
        let grid = grid.read().unwrap();
        let config = PlannerConfig {
            shrink_factor: 2,
            check_radius: 0.1,
            ..Default::default()
        };
        let mut planner = AstarPlanner::new(&grid, config).unwrap();
        let path = planner
            .plan_path(Pose::new(0.0, 0.0, 0.0), Pose::new(1.0, 1.0, 0.0))
            .unwrap();
        assert!(path.len() >= 2);
        assert!(path.length() >= 2.0f64.sqrt() - 0.3);
    }

    // Save, reload, compare probabilities on the finest level
    let dir = tempfile::tempdir().unwrap();
    let path = mapstore::map_file_path(dir.path(), "pipeline");
    let processor = slam.processor().unwrap();
    let mut meta = mapstore::MapMetaData::new("pipeline", "integration fixture");
    mapstore::save(processor.map_rep(), &mut meta, &path).unwrap();

    let loaded = mapstore::load(&path).unwrap();
    assert_eq!(loaded.map_rep.map_levels(), 3);
    let restored = loaded.map_rep.grid(0);
    let restored = restored.read().unwrap();
    let original = grid.read().unwrap();
    assert_eq!(restored.cell_count(), original.cell_count());
    for i in 0..original.cell_count() {
        assert_eq!(
            restored.probability_by_index(i),
            original.probability_by_index(i)
        );
    }
}

#[tokio::test]
async fn test_odometry_stream_consumed_and_shutdown_clean() {
    use std::time::{Duration, Instant};

    let lidar = FanOut::<Arc<LidarReading>>::new("lidar");
    let odometry = FanOut::<Arc<OdometryReading>>::new("odometry");

    let mut slam = SlamController::new();
    slam.initialize(MapRep::new_multi(0.1, 128, 128, [0.5, 0.5], 2).unwrap())
        .unwrap();
    let pose_rx = slam
        .start(pipeline_config(), lidar.subscribe(), odometry.subscribe())
        .unwrap();

    let t0 = Instant::now();
    let publish_at = |offset: u64, pulses: i32| {
        odometry.publish(Arc::new(OdometryReading {
            left_pulses: pulses,
            right_pulses: pulses,
            timestamp: t0 + Duration::from_millis(offset),
        }));
    };

    publish_at(0, 0);
    for i in 1..=5 {
        publish_at(i * 100, 100);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    slam.stop().await.unwrap();
    drop(pose_rx);
}
