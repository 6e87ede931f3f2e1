//! LIDAR reading to scan container conversion.

use mapping::ScanContainer;
use model::DiffDriveModel;
use nalgebra::Vector2;
use types::LidarReading;

/// Beams closer than this are sensor artifacts and are dropped (mm).
const MIN_BEAM_DISTANCE_MM: f64 = 100.0;

/// Conversion parameters.
#[derive(Debug, Clone)]
pub struct ScanConversion {
    /// Laser mount offset from the robot center, meters
    pub lidar_position: Vector2<f64>,
    /// Compensate beam positions for robot motion during the sweep
    pub use_motion_correction: bool,
    /// Time the LIDAR uses on one sweep, first beam to last (s)
    pub scan_duration: f64,
}

impl Default for ScanConversion {
    fn default() -> Self {
        Self {
            lidar_position: Vector2::zeros(),
            use_motion_correction: false,
            scan_duration: 0.0667,
        }
    }
}

/// Fill `scan` from a LIDAR reading.
///
/// Polar millimeter ranges become cartesian points in the robot frame, scaled
/// by `scale_to_map` so the container is in level-0 map units. Beam `i` of
/// `n` is measured `(n - i) / n * scan_duration` seconds before the sweep
/// completes; with motion correction enabled each point is rotated and
/// shifted back by the motion the wheel speeds predict for that interval.
pub fn lidar_to_scan(
    reading: &LidarReading,
    scan: &mut ScanContainer,
    scale_to_map: f64,
    robot: &DiffDriveModel,
    v_l: f64,
    v_r: f64,
    conversion: &ScanConversion,
) {
    let n = reading.distances.len();

    scan.clear();
    scan.set_origin(conversion.lidar_position * scale_to_map);

    if n == 0 {
        return;
    }

    // First beam points half a span behind the forward axis
    let alpha = -reading.span / 2.0 * std::f64::consts::PI / 180.0;
    let delta_angle = if n > 1 {
        reading.span / (n - 1) as f64 * std::f64::consts::PI / 180.0
    } else {
        0.0
    };

    let theta_dot = (v_r - v_l) / robot.base_width;
    let v = (v_r + v_l) / 2.0;

    let mut angle = alpha;
    for i in 0..n {
        let distance_mm = reading.distances[i];
        if distance_mm < MIN_BEAM_DISTANCE_MM {
            angle += delta_angle;
            continue;
        }

        let dist = distance_mm / 1000.0 * scale_to_map;
        let x_p = dist * angle.cos();
        let y_p = dist * angle.sin();

        if conversion.use_motion_correction {
            // Negative delay between this beam and the end of the sweep
            let d_i = -((n - i) as f64) / n as f64 * conversion.scan_duration;
            let delta_theta = theta_dot * d_i;
            let delta_y = v * d_i * scale_to_map;

            let (sin, cos) = delta_theta.sin_cos();
            let x_a = x_p * cos - y_p * sin;
            let y_a = x_p * sin + y_p * cos + delta_y;
            scan.add(Vector2::new(x_a, y_a));
        } else {
            scan.add(Vector2::new(x_p, y_p));
        }

        angle += delta_angle;
    }
}
