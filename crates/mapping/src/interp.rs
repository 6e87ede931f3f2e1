//! Bilinear map interpolation with derivatives.
//!
//! Grid cell probabilities are treated as samples of a continuous occupancy
//! distribution. The matcher needs both the interpolated value and its
//! gradient at arbitrary map coordinates; probability conversions go through
//! the stamped [`InterpCache`](crate::cache::InterpCache).

use crate::cache::InterpCache;
use crate::occupancy::OccGrid;
use nalgebra::{Vector2, Vector3};

impl OccGrid {
    /// Interpolated occupancy probability at map coordinates, or zero outside
    /// the map interior.
    pub fn interp_value(&self, cache: &mut InterpCache, coords: Vector2<f64>) -> f64 {
        if self.point_out_of_map_bounds(coords) {
            return 0.0;
        }

        let (values, fx, fy) = self.neighbor_probabilities(cache, coords);
        let [i0, i1, i2, i3] = values;
        let fx_inv = 1.0 - fx;
        let fy_inv = 1.0 - fy;

        (i0 * fx_inv + i1 * fx) * fy_inv + (i2 * fx_inv + i3 * fx) * fy
    }

    /// Interpolated value plus its gradient `(I, dI/du, dI/dv)` at map
    /// coordinates. Out-of-bounds coordinates yield all zeros.
    pub fn interp_value_with_derivatives(
        &self,
        cache: &mut InterpCache,
        coords: Vector2<f64>,
    ) -> Vector3<f64> {
        if self.point_out_of_map_bounds(coords) {
            return Vector3::zeros();
        }

        let (values, fx, fy) = self.neighbor_probabilities(cache, coords);
        let [i0, i1, i2, i3] = values;
        let fx_inv = 1.0 - fx;
        let fy_inv = 1.0 - fy;

        let value = (i0 * fx_inv + i1 * fx) * fy_inv + (i2 * fx_inv + i3 * fx) * fy;
        let d_u = -((i0 - i1) * fy_inv + (i2 - i3) * fy);
        let d_v = -((i0 - i2) * fx_inv + (i1 - i3) * fx);

        Vector3::new(value, d_u, d_v)
    }

    /// Probabilities of the four cells surrounding `coords` plus the
    /// fractional offsets. Coordinates must be in bounds.
    fn neighbor_probabilities(
        &self,
        cache: &mut InterpCache,
        coords: Vector2<f64>,
    ) -> ([f64; 4], f64, f64) {
        cache.ensure_size(self.cell_count());

        // In-bounds map coords are non-negative, so the cast floors
        let i = coords.x as usize;
        let j = coords.y as usize;
        let fx = coords.x - i as f64;
        let fy = coords.y - j as f64;

        let size_x = self.size_x();
        let base = j * size_x + i;

        let values = [
            self.cached_probability(cache, base),
            self.cached_probability(cache, base + 1),
            self.cached_probability(cache, base + size_x),
            self.cached_probability(cache, base + size_x + 1),
        ];

        (values, fx, fy)
    }

    fn cached_probability(&self, cache: &mut InterpCache, index: usize) -> f64 {
        match cache.get(index) {
            Some(value) => value,
            None => {
                let value = self.probability_by_index(index);
                cache.put(index, value);
                value
            }
        }
    }
}
