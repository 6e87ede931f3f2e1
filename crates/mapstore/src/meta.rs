//! Map metadata.

use mapping::MapDimensions;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside a map so browsers can list maps without
/// unpacking the grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapMetaData {
    /// Display name (may differ from the file name)
    pub name: String,
    pub description: String,
    /// Level-0 dimensions, filled in at save time
    pub mdp: Option<MapDimensions>,
    pub is_map_rep_single_map: bool,
    /// Discriminates the cell kind on load
    pub map_type: String,
}

impl MapMetaData {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            mdp: None,
            is_map_rep_single_map: false,
            map_type: mapping::LOG_ODDS_MAP_TYPE.to_string(),
        }
    }
}
