//! Path planning on occupancy grids.
//!
//! The planner works on a binary map derived from a level-0 occupancy grid by
//! downsampling with obstacle dilation: a binary cell is free only when the
//! corresponding source area, grown by the robot's check radius, contains no
//! occupied cell. A* over the binary cells then guarantees traversable path
//! nodes, and the resulting path is smoothed and simplified before
//! publication.

mod astar;
mod binmap;
mod path;

pub use astar::{AstarPlanner, PlannerConfig};
pub use binmap::{BinaryCell, BinaryMap};
pub use path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("goal out of map bounds")]
    GoalOutOfBounds,
    #[error("goal is occupied")]
    GoalOccupied,
    #[error("no path found to goal after {iterations} iterations")]
    NoPath { iterations: usize },
    #[error(transparent)]
    Mapping(#[from] mapping::MappingError),
}
