//! `.tigermap` archive save/load.
//!
//! A map file is a ZIP archive with exactly three entries:
//! - `meta`: JSON [`MapMetaData`](crate::MapMetaData)
//! - `map`: bincode-serialized grid stack, finest level first
//! - `thumb.png`: PNG render of the map at zoom 0
//!
//! Loading reads `meta` first to learn the representation shape, then
//! rebuilds the grids from `map`. A missing or corrupt `meta` is fatal for
//! the load; a missing thumbnail is not.

use crate::images::map_tile;
use crate::meta::MapMetaData;
use crate::StoreError;
use image::GrayImage;
use mapping::{MapRep, OccGrid, LOG_ODDS_MAP_TYPE};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const MAP_FILE_EXTENSION: &str = "tigermap";
const META_ENTRY: &str = "meta";
const MAP_ENTRY: &str = "map";
const THUMB_ENTRY: &str = "thumb.png";

/// One stored grid level.
#[derive(Debug, Serialize, Deserialize)]
struct StoredGrid {
    cell_length: f64,
    top_left_offset: [f64; 2],
    size: [usize; 2],
    log_odds: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredLevels {
    levels: Vec<StoredGrid>,
}

/// A loaded map: metadata plus the rebuilt representation.
pub struct StoredMap {
    pub meta: MapMetaData,
    pub map_rep: MapRep,
}

/// Resolve a map name to a path in the storage root, appending the default
/// extension when the name has none. Names carrying a directory are used
/// verbatim.
pub fn map_file_path(storage_root: &Path, name: &str) -> PathBuf {
    let mut path = PathBuf::from(name);
    if path.parent() == Some(Path::new("")) {
        path = storage_root.join(path);
    }
    if path.extension().is_none() {
        path.set_extension(MAP_FILE_EXTENSION);
    }
    path
}

/// Save a map representation with its metadata.
///
/// The metadata's dimensions and representation flag are filled in from the
/// map. The grid stack must serialize before the thumbnail is attempted; a
/// thumbnail render or encode failure leaves a valid archive behind, while
/// any earlier failure deletes the partial file.
pub fn save(map_rep: &MapRep, meta: &mut MapMetaData, path: &Path) -> Result<(), StoreError> {
    meta.is_map_rep_single_map = map_rep.is_single();
    meta.mdp = Some(*map_rep.grid(0).read().unwrap().dims());

    let file = File::create(path)?;
    let mut archive = ZipWriter::new(file);

    let result = write_entries(&mut archive, map_rep, meta);
    match result.and_then(|()| archive.finish().map_err(StoreError::from)) {
        Ok(_) => Ok(()),
        Err(e) => {
            // Do not leave a partial archive behind
            let _ = std::fs::remove_file(path);
            Err(e)
        }
    }
}

fn write_entries(
    archive: &mut ZipWriter<File>,
    map_rep: &MapRep,
    meta: &MapMetaData,
) -> Result<(), StoreError> {
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    archive.start_file(META_ENTRY, options)?;
    archive.write_all(&serde_json::to_vec(meta)?)?;

    archive.start_file(MAP_ENTRY, options)?;
    archive.write_all(&bincode::serialize(&stored_levels(map_rep))?)?;

    // The pyramid is safe on disk; a failing thumbnail keeps the archive
    if let Err(e) = write_thumbnail(archive, map_rep, options) {
        warn!(?e, "failed to attach map thumbnail");
    }
    Ok(())
}

fn write_thumbnail(
    archive: &mut ZipWriter<File>,
    map_rep: &MapRep,
    options: SimpleFileOptions,
) -> Result<(), StoreError> {
    let thumb = map_tile(map_rep, 0, 0, 0);
    let mut png = Vec::new();
    thumb.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    archive.start_file(THUMB_ENTRY, options)?;
    archive.write_all(&png)?;
    Ok(())
}

fn stored_levels(map_rep: &MapRep) -> StoredLevels {
    let levels = (0..map_rep.map_levels())
        .map(|level| {
            let grid = map_rep.grid(level);
            let grid = grid.read().unwrap();
            StoredGrid {
                cell_length: grid.cell_length(),
                top_left_offset: grid.dims().top_left_offset(),
                size: [grid.size_x(), grid.size_y()],
                log_odds: (0..grid.cell_count())
                    .map(|i| grid.cell_by_index(i).log_odds())
                    .collect(),
            }
        })
        .collect();
    StoredLevels { levels }
}

/// Load a complete map.
pub fn load(path: &Path) -> Result<StoredMap, StoreError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let meta = read_meta(&mut archive)?;
    if meta.map_type != LOG_ODDS_MAP_TYPE {
        return Err(StoreError::UnsupportedMapType(meta.map_type));
    }

    let bytes = read_entry(&mut archive, MAP_ENTRY)?;
    let stored: StoredLevels = bincode::deserialize(&bytes)?;

    let mut grids = Vec::with_capacity(stored.levels.len());
    for level in &stored.levels {
        let mut grid = OccGrid::new(level.cell_length, level.size, level.top_left_offset)?;
        for (i, &value) in level.log_odds.iter().enumerate() {
            grid.set_log_odds_by_index(i, value);
        }
        grids.push(grid);
    }

    let map_rep = MapRep::from_grids(grids, meta.is_map_rep_single_map)?;
    Ok(StoredMap { meta, map_rep })
}

/// Load only the metadata of a stored map.
pub fn load_metadata(path: &Path) -> Result<MapMetaData, StoreError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    read_meta(&mut archive)
}

/// Load only the thumbnail of a stored map.
pub fn load_thumbnail(path: &Path) -> Result<GrayImage, StoreError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let bytes = read_entry(&mut archive, THUMB_ENTRY)?;
    let image = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)?;
    Ok(image.into_luma8())
}

/// List stored maps in a directory with their metadata. Files that fail to
/// parse are skipped with a warning.
pub fn list_maps(storage_root: &Path) -> Result<Vec<(String, MapMetaData)>, StoreError> {
    let mut maps = Vec::new();
    for entry in std::fs::read_dir(storage_root)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(MAP_FILE_EXTENSION) {
            continue;
        }
        match load_metadata(&path) {
            Ok(meta) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                maps.push((name, meta));
            }
            Err(e) => warn!(path = %path.display(), ?e, "skipping unreadable map file"),
        }
    }
    maps.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(maps)
}

/// Copy an archive byte-for-byte, rewriting only the metadata name. Fails if
/// the destination already exists.
pub fn copy(from: &Path, to: &Path, new_name: &str) -> Result<(), StoreError> {
    if from == to {
        return Ok(());
    }
    if to.exists() {
        return Err(StoreError::DestinationExists(to.display().to_string()));
    }

    let mut source = ZipArchive::new(File::open(from)?)?;

    let mut meta = read_meta(&mut source)?;
    meta.name = new_name.to_string();

    let file = File::create(to)?;
    let mut target = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let result = (|| -> Result<(), StoreError> {
        target.start_file(META_ENTRY, options)?;
        target.write_all(&serde_json::to_vec(&meta)?)?;

        // Other entries pass through verbatim
        for entry in [MAP_ENTRY, THUMB_ENTRY] {
            match read_entry(&mut source, entry) {
                Ok(bytes) => {
                    target.start_file(entry, options)?;
                    target.write_all(&bytes)?;
                }
                Err(StoreError::MissingEntry(_)) if entry == THUMB_ENTRY => {}
                Err(e) => return Err(e),
            }
        }
        target.finish()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

/// Rename a stored map: copy with the new name, then delete the original.
pub fn rename(from: &Path, to: &Path, new_name: &str) -> Result<(), StoreError> {
    copy(from, to, new_name)?;
    if from != to {
        std::fs::remove_file(from)?;
    }
    Ok(())
}

/// Delete a stored map file.
pub fn delete(path: &Path) -> Result<(), StoreError> {
    std::fs::remove_file(path)?;
    Ok(())
}

fn read_meta(archive: &mut ZipArchive<File>) -> Result<MapMetaData, StoreError> {
    let bytes = read_entry(archive, META_ENTRY)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, StoreError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| StoreError::MissingEntry(name.to_string()))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}
