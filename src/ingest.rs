//! Tile-directory ingestion.
//!
//! Converts a directory of pre-rendered image tiles into a tile store. The
//! source layout is fixed: tiles named `{zoom}.{row}.{col}.{ext}` under a
//! `tiles/` subdirectory, with a sibling JSON info file supplying the
//! pyramid parameters.
//!
//! Ingestion is fail-fast and one-shot: every tile of every level must be
//! present, and each tile is committed as its own transaction. A fatal error
//! mid-run leaves the rows already committed in place.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pyramid::TilesetInfo;
use crate::store::sqlite::SqliteStore;
use crate::store::{TileKey, TileStore};

/// Subdirectory of the source root holding the tile files.
const TILES_SUBDIR: &str = "tiles";

// =============================================================================
// Source info file
// =============================================================================

/// Pyramid parameters read from the source `info.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct TileSourceInfo {
    pub tile_size: u32,
    pub max_zoom: u32,
    pub max_width: u64,
    pub max_height: u64,
}

impl TileSourceInfo {
    /// Load and parse an info file.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| IngestError::InvalidInfo {
            message: e.to_string(),
        })
    }

    /// Build the pyramid metadata row, recording the tile format as dtype.
    pub fn to_tileset_info(&self, dtype: Option<String>) -> Result<TilesetInfo, IngestError> {
        TilesetInfo::new(
            self.tile_size,
            self.max_zoom,
            self.max_width,
            self.max_height,
            dtype,
        )
        .map_err(|message| IngestError::InvalidInfo { message })
    }
}

/// Locate the info file: the configured name inside `base_dir`, falling back
/// to `info.json`.
pub fn resolve_info_path(base_dir: &Path, info_name: &str) -> Result<PathBuf, IngestError> {
    let candidate = base_dir.join(info_name);
    if candidate.is_file() {
        return Ok(candidate);
    }
    let fallback = base_dir.join(crate::config::DEFAULT_INFO_FILE);
    if fallback.is_file() {
        info!("using default tile set info file");
        return Ok(fallback);
    }
    Err(IngestError::InfoNotFound(candidate))
}

// =============================================================================
// Ingestion
// =============================================================================

/// Summary of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub output: PathBuf,
    pub info: TilesetInfo,
    pub tiles_written: u64,
}

/// Run the full ingestion pipeline for one source directory.
pub fn ingest_tiles(config: &IngestConfig) -> Result<IngestSummary, IngestError> {
    if !config.dir.is_dir() {
        return Err(IngestError::SourceNotFound(config.dir.clone()));
    }

    let info_path = resolve_info_path(&config.dir, &config.info)?;
    let source_info = TileSourceInfo::load(&info_path)?;
    let info = source_info.to_tileset_info(Some(config.im_type.extension().to_string()))?;

    let output = config
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.imtiles", config.dir.display())));

    let mut store = SqliteStore::create(&output, config.overwrite)?;
    store.put_tileset_info(&info)?;

    let tiles_written = ingest_directory(&mut store, &config.dir, &info)?;

    Ok(IngestSummary {
        output,
        info,
        tiles_written,
    })
}

/// Walk every level of the pyramid and insert each tile file into `store`.
///
/// A tile file missing from disk is fatal: ingestion promises downstream
/// readers a complete pyramid.
pub fn ingest_directory<S: TileStore>(
    store: &mut S,
    source_dir: &Path,
    info: &TilesetInfo,
) -> Result<u64, IngestError> {
    let ext = info.dtype.as_deref().unwrap_or("jpg");
    let tiles_dir = source_dir.join(TILES_SUBDIR);
    let mut written = 0u64;

    for zoom in 0..=info.max_zoom {
        let (cols, rows) = info
            .level_tile_count(zoom)
            .map_err(|e| IngestError::InvalidInfo {
                message: e.to_string(),
            })?;
        info!(zoom, cols, rows, "ingesting level");

        for row in 0..rows as i64 {
            for col in 0..cols as i64 {
                let key = TileKey::new(zoom, row, col);
                let file_path = tiles_dir.join(format!("{key}.{ext}"));
                debug!(path = %file_path.display(), "insert");

                if !file_path.is_file() {
                    return Err(IngestError::MissingTileFile(file_path));
                }
                let blob = fs::read(&file_path)?;
                store.put_tile(key, Bytes::from(blob))?;
                written += 1;
            }
        }
    }

    Ok(written)
}

// =============================================================================
// Tests
// =============================================================================
