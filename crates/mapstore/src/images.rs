//! Grayscale rendering of occupancy grids.
//!
//! Free cells render white, occupied cells black, unknown cells mid-gray.
//! Images are split into row stripes processed in parallel. The map y axis
//! grows downward in cell indices while world y grows upward, so rendering
//! flips vertically: the top image row shows the highest cell row.

use image::GrayImage;
use mapping::{MapRep, OccGrid};
use rayon::prelude::*;

pub const TILE_SIZE: u32 = 256;

const FREE: u8 = 255;
const OCCUPIED: u8 = 0;
const UNKNOWN: u8 = 128;

fn cell_color(grid: &OccGrid, x: i32, y: i32) -> u8 {
    if !grid.has_grid_value(x, y) {
        return UNKNOWN;
    }
    let cell = grid.cell(x as usize, y as usize);
    use mapping::Cell;
    if cell.is_free() {
        FREE
    } else if cell.is_occupied() {
        OCCUPIED
    } else {
        UNKNOWN
    }
}

/// 1:1 render of a grid; one pixel per cell.
pub fn grid_image(grid: &OccGrid) -> GrayImage {
    let width = grid.size_x();
    let height = grid.size_y();

    let mut buffer = vec![UNKNOWN; width * height];
    buffer
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, pixels)| {
            let cell_y = (height - 1 - row) as i32;
            for (x, pixel) in pixels.iter_mut().enumerate() {
                *pixel = cell_color(grid, x as i32, cell_y);
            }
        });

    GrayImage::from_raw(width as u32, height as u32, buffer)
        .expect("pixel buffer matches image dimensions")
}

/// 1:1 render of a representation's finest level.
pub fn map_image(rep: &MapRep) -> GrayImage {
    let grid = rep.grid(0);
    let grid = grid.read().unwrap();
    grid_image(&grid)
}

/// One 256x256 tile of the map at the given zoom.
///
/// Zoom z splits the map into `2^z x 2^z` tiles. The render uses the
/// coarsest pyramid level that still has at least one cell per pixel, or
/// level 0 when none does. Tiles outside the map come back fully unknown.
pub fn map_tile(rep: &MapRep, zoom: u32, tile_x: i32, tile_y: i32) -> GrayImage {
    let num_tiles = 1i64 << zoom;
    let total_pixels = num_tiles * TILE_SIZE as i64;

    // Coarsest level that still covers the requested pixel density
    let mut chosen = rep.grid(0);
    for level in (0..rep.map_levels()).rev() {
        let grid = rep.grid(level);
        let max_size = {
            let g = grid.read().unwrap();
            g.size_x().max(g.size_y()) as i64
        };
        if max_size >= total_pixels || level == 0 {
            chosen = grid;
            break;
        }
    }

    let grid = chosen.read().unwrap();
    let max_size = grid.size_x().max(grid.size_y()) as i64;
    let cells_per_tile = max_size / num_tiles;

    let start_x = tile_x as i64 * cells_per_tile;
    let start_y = (num_tiles - 1 - tile_y as i64) * cells_per_tile;
    let step = cells_per_tile as f64 / TILE_SIZE as f64;

    let size = TILE_SIZE as usize;
    let mut buffer = vec![UNKNOWN; size * size];

    if tile_x >= 0 && (tile_x as i64) < num_tiles && tile_y >= 0 && (tile_y as i64) < num_tiles {
        buffer
            .par_chunks_mut(size)
            .enumerate()
            .for_each(|(row, pixels)| {
                let y = start_y as f64 + ((size - 1 - row) as f64 + 0.5) * step;
                for (i, pixel) in pixels.iter_mut().enumerate() {
                    let x = start_x as f64 + (i as f64 + 0.5) * step;
                    *pixel = cell_color(&grid, x.floor() as i32, y.floor() as i32);
                }
            });
    }

    GrayImage::from_raw(TILE_SIZE, TILE_SIZE, buffer).expect("pixel buffer matches tile dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapping::cell::prob_to_log_odds;

    fn rep_with_occupied_column() -> MapRep {
        let rep = MapRep::new_multi(1.0, 512, 512, [0.0, 0.0], 2).unwrap();
        {
            let grid = rep.grid(0);
            let mut grid = grid.write().unwrap();
            for y in 0..512 {
                let index = grid.index(100, y);
                grid.set_log_odds_by_index(index, prob_to_log_odds(0.9));
                let index = grid.index(101, y);
                grid.set_log_odds_by_index(index, prob_to_log_odds(0.1));
            }
        }
        {
            // Same column on the coarser level at half the coordinates
            let grid = rep.grid(1);
            let mut grid = grid.write().unwrap();
            for y in 0..256 {
                let index = grid.index(50, y);
                grid.set_log_odds_by_index(index, prob_to_log_odds(0.9));
            }
        }
        rep
    }

    #[test]
    fn test_grid_image_colors() {
        let rep = rep_with_occupied_column();
        let grid = rep.grid(0);
        let image = grid_image(&grid.read().unwrap());

        assert_eq!(image.dimensions(), (512, 512));
        // Row flip: cell (100, 0) lands on the bottom image row
        assert_eq!(image.get_pixel(100, 511).0[0], OCCUPIED);
        assert_eq!(image.get_pixel(101, 511).0[0], FREE);
        assert_eq!(image.get_pixel(50, 200).0[0], UNKNOWN);
    }

    #[test]
    fn test_tile_zoom_zero_covers_whole_map() {
        let rep = rep_with_occupied_column();
        let tile = map_tile(&rep, 0, 0, 0);
        assert_eq!(tile.dimensions(), (TILE_SIZE, TILE_SIZE));

        // 512 cells over 256 pixels: the occupied column shows at pixel 50
        assert_eq!(tile.get_pixel(50, 128).0[0], OCCUPIED);
        assert_eq!(tile.get_pixel(10, 128).0[0], UNKNOWN);
    }

    #[test]
    fn test_tile_zoom_selects_finer_level() {
        let rep = rep_with_occupied_column();
        // At zoom 1 the pyramid's 512-cell level 0 is required (2*256 pixels)
        let tile = map_tile(&rep, 1, 0, 1);
        // Tile (0, 1) covers x in [0, 256), y in [0, 256) of level 0
        assert_eq!(tile.get_pixel(100, 128).0[0], OCCUPIED);
        assert_eq!(tile.get_pixel(101, 128).0[0], FREE);
    }

    #[test]
    fn test_tile_outside_map_is_unknown() {
        let rep = rep_with_occupied_column();
        let tile = map_tile(&rep, 2, 100, 100);
        assert!(tile.pixels().all(|p| p.0[0] == UNKNOWN));
    }

    #[test]
    fn test_map_image_uses_level_zero() {
        let rep = rep_with_occupied_column();
        let image = map_image(&rep);
        assert_eq!(image.dimensions(), (512, 512));
    }
}
