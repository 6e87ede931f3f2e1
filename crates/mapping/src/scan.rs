//! Per-scan point container.

use nalgebra::Vector2;

/// Cartesian scan points in the robot frame plus the laser's mount offset.
///
/// Points and origin are stored pre-scaled to level-0 map units (meters times
/// `scale_to_map`), so the map update and the matcher can apply a map-frame
/// pose transform to them directly. Coarser pyramid levels reuse the same
/// container type through [`ScanContainer::set_from`], which rescales without
/// reallocating.
#[derive(Debug, Clone, Default)]
pub struct ScanContainer {
    points: Vec<Vector2<f64>>,
    origin: Vector2<f64>,
}

impl ScanContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate for the sensor's beam count.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            points: Vec::with_capacity(size),
            origin: Vector2::zeros(),
        }
    }

    /// Fill this container with `other`'s points and origin scaled by
    /// `factor`. Reuses the existing allocation.
    pub fn set_from(&mut self, other: &ScanContainer, factor: f64) {
        self.origin = other.origin * factor;
        self.points.clear();
        self.points.extend(other.points.iter().map(|p| p * factor));
    }

    pub fn add(&mut self, point: Vector2<f64>) {
        self.points.push(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Vector2<f64> {
        self.points[index]
    }

    pub fn points(&self) -> &[Vector2<f64>] {
        &self.points
    }

    pub fn origin(&self) -> Vector2<f64> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Vector2<f64>) {
        self.origin = origin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_clear() {
        let mut scan = ScanContainer::with_capacity(4);
        scan.add(Vector2::new(1.0, 2.0));
        scan.add(Vector2::new(-3.0, 0.5));
        assert_eq!(scan.len(), 2);
        scan.clear();
        assert!(scan.is_empty());
    }

    #[test]
    fn test_set_from_scales_points_and_origin() {
        let mut src = ScanContainer::new();
        src.set_origin(Vector2::new(2.0, -4.0));
        src.add(Vector2::new(8.0, 6.0));
        src.add(Vector2::new(-2.0, 1.0));

        let mut dst = ScanContainer::new();
        dst.set_from(&src, 0.5);

        assert_eq!(dst.len(), 2);
        assert_eq!(dst.origin(), Vector2::new(1.0, -2.0));
        assert_eq!(dst.point(0), Vector2::new(4.0, 3.0));
        assert_eq!(dst.point(1), Vector2::new(-1.0, 0.5));
        // Source is untouched
        assert_eq!(src.point(0), Vector2::new(8.0, 6.0));
    }

    #[test]
    fn test_set_from_overwrites_previous_contents() {
        let mut src = ScanContainer::new();
        src.add(Vector2::new(1.0, 1.0));

        let mut dst = ScanContainer::new();
        dst.add(Vector2::new(9.0, 9.0));
        dst.add(Vector2::new(9.0, 9.0));
        dst.set_from(&src, 2.0);

        assert_eq!(dst.len(), 1);
        assert_eq!(dst.point(0), Vector2::new(2.0, 2.0));
    }
}
