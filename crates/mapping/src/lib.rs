//! Multi-resolution occupancy mapping and scan matching.
//!
//! Provides:
//! - Log-odds occupancy grids with world<->map transforms
//! - Bilinear map interpolation with derivatives and a stamped value cache
//! - Bresenham ray-casting scan integration
//! - Gauss-Newton scan-to-map pose refinement
//! - A coarse-to-fine map pyramid and the SLAM processor driving it
//!
//! The matcher registers each incoming scan against the pyramid, coarse level
//! first, and the processor decides via a pose gate whether the refined pose
//! has moved enough to integrate the scan into every level.

use thiserror::Error;

pub mod cache;
pub mod cell;
pub mod dims;
pub mod grid;
pub mod maprep;
pub mod matcher;
pub mod occupancy;
pub mod processor;
pub mod scan;

mod interp;

pub use cache::InterpCache;
pub use cell::{Cell, LogOddsCell, LogOddsFunctions};
pub use dims::MapDimensions;
pub use grid::GridMap;
pub use maprep::{MapRep, LOG_ODDS_MAP_TYPE};
pub use matcher::ScanMatcher;
pub use occupancy::OccGrid;
pub use processor::SlamProcessor;
pub use scan::ScanContainer;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("cell length must be positive, got {0}")]
    InvalidCellLength(f64),
    #[error("map size must be at least 1x1 cells, got {0}x{1}")]
    InvalidSize(usize, usize),
    #[error("too many pyramid levels ({levels}) for a {size_x}x{size_y} base grid")]
    TooManyLevels {
        levels: usize,
        size_x: usize,
        size_y: usize,
    },
    #[error("scan origin outside the map: ({0:.2}, {1:.2})")]
    OriginOutOfBounds(f64, f64),
}
