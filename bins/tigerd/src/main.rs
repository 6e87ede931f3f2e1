//! tigerd — SLAM and navigation daemon.
//!
//! Wires the sensor fan-out channels to the SLAM task and the motor
//! controller, and keeps running until interrupted. The serial sensor and
//! motor drivers attach through the fan-out publishers and the
//! [`control::MotorDriver`] trait; without hardware the daemon maps from
//! whatever readings are published.
//!
//! Exit codes: 0 normal, 1 fatal initialization error, 2 sensor connect
//! failure.

use anyhow::Result;
use clap::Parser;
use config::RobotConfig;
use control::{CollisionConfig, ControlConfig, DummyDriver, MotorController};
use mapping::MapRep;
use model::DiffDriveModel;
use nalgebra::Vector2;
use planning::PlannerConfig;
use sensors::FanOut;
use slam::{ScanConversion, SlamController, SlamTaskConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::{LidarReading, OdometryReading};

const EXIT_INIT_FAILURE: i32 = 1;
const EXIT_SENSOR_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(name = "tigerd", about = "SLAM and navigation daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tigerslam.toml")]
    config: PathBuf,

    /// Resume mapping from a stored map instead of starting fresh
    #[arg(long)]
    load_map: Option<String>,

    /// Save the map under this name on shutdown
    #[arg(long)]
    save_map: Option<String>,

    /// Skip the sensor device checks (simulation / replay setups)
    #[arg(long)]
    no_sensor_check: bool,

    /// Log directory for text logs
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = match init_logging(&args.log_dir, &args.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(EXIT_INIT_FAILURE);
        }
    };

    let cfg = match RobotConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(?e, "failed to load configuration");
            std::process::exit(EXIT_INIT_FAILURE);
        }
    };
    info!(path = %args.config.display(), "configuration loaded");

    if !args.no_sensor_check {
        if let Err(port) = check_sensor_ports(&cfg) {
            error!(port = %port, "sensor device not present");
            std::process::exit(EXIT_SENSOR_FAILURE);
        }
    }

    if let Err(e) = run(args, cfg).await {
        error!(?e, "fatal error");
        std::process::exit(EXIT_INIT_FAILURE);
    }
}

async fn run(args: Args, cfg: RobotConfig) -> Result<()> {
    let robot = DiffDriveModel::new(
        cfg.robot_base_width,
        cfg.robot_wheel_radius,
        cfg.robot_odometry_ppr,
    );

    // Sensor fan-out: the driver layer publishes, everything else subscribes
    let lidar = Arc::new(FanOut::<Arc<LidarReading>>::new("lidar"));
    let odometry = Arc::new(FanOut::<Arc<OdometryReading>>::new("odometry"));

    // SLAM session
    let map_rep = match &args.load_map {
        Some(name) => {
            let path = mapstore::map_file_path(std::path::Path::new(&cfg.map_storage_root), name);
            let stored = mapstore::load(&path)?;
            info!(name = %stored.meta.name, "resuming from stored map");
            stored.map_rep
        }
        None => MapRep::new_multi(
            cfg.hectorslam_gridmap_resolution,
            cfg.hectorslam_gridmap_size_x,
            cfg.hectorslam_gridmap_size_y,
            [cfg.hectorslam_gridmap_start_x, cfg.hectorslam_gridmap_start_y],
            cfg.hectorslam_levels,
        )?,
    };

    let mut slam = SlamController::new();
    slam.initialize(map_rep)?;
    if let Some(processor) = slam.processor_mut() {
        processor.set_update_factor_free(cfg.hectorslam_update_factor_free);
        processor.set_update_factor_occupied(cfg.hectorslam_update_factor_occupied);
        processor.set_map_update_min_dist_diff(cfg.hectorslam_map_update_min_dist_diff);
        processor.set_map_update_min_angle_diff(cfg.hectorslam_map_update_min_angle_diff);
    }

    let task_config = SlamTaskConfig {
        robot,
        conversion: ScanConversion {
            lidar_position: Vector2::new(cfg.lidar_position_x, cfg.lidar_position_y),
            use_motion_correction: cfg.hectorslam_use_lidar_correction,
            scan_duration: cfg.hectorslam_scan_duration,
        },
        use_odometry: cfg.hectorslam_use_odometry,
    };
    let _pose_rx = slam.start(task_config, lidar.subscribe(), odometry.subscribe())?;
    info!("SLAM running");

    // Motor controller; a real serial driver replaces the dummy when wired
    let driver = Arc::new(Mutex::new(DummyDriver::new()));
    let control_config = ControlConfig {
        robot,
        planner: PlannerConfig {
            shrink_factor: cfg.astar_shrink_factor,
            check_radius: cfg.astar_check_radius,
            unknown_punish: cfg.astar_unknown_punish,
            max_iterations: cfg.astar_max_iterations,
            smoothing_data_weight: cfg.astar_smoothing_data_weight,
            smoothing_smooth_weight: cfg.astar_smoothing_smooth_weight,
        },
        collision: CollisionConfig {
            angle: cfg.collision_detection_angle,
            radius: cfg.collision_detection_radius,
            num_distances: cfg.lidar_num_distances,
            radial_span: cfg.lidar_radial_span,
        },
        lookahead_distance: cfg.lookahead_distance,
    };
    let _controller = MotorController::new(driver, control_config);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    slam.stop().await?;
    lidar.close();
    odometry.close();

    if let Some(name) = &args.save_map {
        let path = mapstore::map_file_path(std::path::Path::new(&cfg.map_storage_root), name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut meta = mapstore::MapMetaData::new(name.clone(), "saved on shutdown");
        match slam.processor() {
            Some(processor) => {
                mapstore::save(processor.map_rep(), &mut meta, &path)?;
                info!(path = %path.display(), "map saved");
            }
            None => warn!("no map to save"),
        }
    }

    Ok(())
}

/// Verify the configured sensor devices exist before starting.
fn check_sensor_ports(cfg: &RobotConfig) -> Result<(), String> {
    if cfg.use_lidar && !std::path::Path::new(&cfg.lidar_port).exists() {
        return Err(cfg.lidar_port.clone());
    }
    if cfg.use_odometry && !std::path::Path::new(&cfg.odometry_port).exists() {
        return Err(cfg.odometry_port.clone());
    }
    Ok(())
}

fn init_logging(
    log_dir: &std::path::Path,
    level: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "tigerd.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
