//! Line-of-sight projection helpers.
//!
//! Shared geometry for steering laws that track a piecewise-linear path, as
//! treated in The Handbook of Marine Craft Hydrodynamics and Motion Control,
//! chapter 10.

/// Angle between the segment A->B and the world x axis.
pub fn alpha(point_a: [f64; 2], point_b: [f64; 2]) -> f64 {
    (point_b[1] - point_a[1]).atan2(point_b[0] - point_a[0])
}

/// Along-track distance and cross-track error of `pos` relative to the
/// segment A->B.
///
/// The along-track distance `s` is the projection of `pos` onto the segment
/// direction, measured from A. The cross-track error `e` is the perpendicular
/// displacement, positive left of the path. A follower's job is to drive
/// `e` to zero.
pub fn epsilon(point_a: [f64; 2], point_b: [f64; 2], pos: [f64; 2]) -> (f64, f64) {
    let alpha = alpha(point_a, point_b);
    let (sin_alpha, cos_alpha) = alpha.sin_cos();

    let dx = pos[0] - point_a[0];
    let dy = pos[1] - point_a[1];

    let s = dx * cos_alpha + dy * sin_alpha;
    let e = -dx * sin_alpha + dy * cos_alpha;

    (s, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_alpha_axis_aligned() {
        assert_relative_eq!(alpha([0.0, 0.0], [1.0, 0.0]), 0.0, epsilon = 1e-12);
        assert_relative_eq!(alpha([0.0, 0.0], [0.0, 1.0]), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(alpha([1.0, 1.0], [0.0, 1.0]), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_epsilon_on_segment() {
        let (s, e) = epsilon([0.0, 0.0], [10.0, 0.0], [3.0, 0.0]);
        assert_relative_eq!(s, 3.0, epsilon = 1e-12);
        assert_relative_eq!(e, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_epsilon_left_is_positive() {
        let (s, e) = epsilon([0.0, 0.0], [10.0, 0.0], [4.0, 2.0]);
        assert_relative_eq!(s, 4.0, epsilon = 1e-12);
        assert_relative_eq!(e, 2.0, epsilon = 1e-12);

        let (_, e) = epsilon([0.0, 0.0], [10.0, 0.0], [4.0, -2.0]);
        assert_relative_eq!(e, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_epsilon_rotated_segment() {
        // Diagonal segment; a point on it has zero cross-track error
        let (s, e) = epsilon([0.0, 0.0], [10.0, 10.0], [5.0, 5.0]);
        assert_relative_eq!(s, 50.0f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(e, 0.0, epsilon = 1e-9);
    }
}
