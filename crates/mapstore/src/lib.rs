//! Persistent map storage and rendering.
//!
//! Maps are saved as `.tigermap` files: ZIP archives holding the serialized
//! grid stack, a JSON metadata record and a PNG thumbnail. This crate also
//! renders grids to grayscale images and 256x256 map tiles for UI layers.

mod archive;
mod images;
mod meta;

pub use archive::{
    copy, delete, list_maps, load, load_metadata, load_thumbnail, map_file_path, rename, save,
    StoredMap, MAP_FILE_EXTENSION,
};
pub use images::{grid_image, map_image, map_tile, TILE_SIZE};
pub use meta::MapMetaData;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("map archive I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("map archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("metadata encoding error: {0}")]
    Meta(#[from] serde_json::Error),
    #[error("grid encoding error: {0}")]
    Grid(#[from] bincode::Error),
    #[error("thumbnail encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("archive entry missing: {0}")]
    MissingEntry(String),
    #[error("unsupported map type: {0}")]
    UnsupportedMapType(String),
    #[error("destination already exists: {0}")]
    DestinationExists(String),
    #[error(transparent)]
    Mapping(#[from] mapping::MappingError),
}
