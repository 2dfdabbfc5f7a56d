//! SQLite-backed tile store.
//!
//! One `.imtiles` / `.multires.db` file per pyramid. The schema follows the
//! layout consumed by downstream viewers:
//!
//! - `tileset_info` — single metadata row
//! - `tiles` — primary key `(z, y, x)`, image blob
//! - `intervals` — annotation rows keyed by insertion-ordered id
//! - `position_index` — rtree virtual table over annotation rectangles,
//!   kept 1:1 with `intervals` in the same transaction
//! - `images` — optional preview cache keyed by `(id, z)`, created on first
//!   use
//!
//! Every put is its own transaction, matching the batch pipeline's per-row
//! commit semantics: a crash leaves only whole committed rows visible.

use std::path::Path;

use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::pyramid::{PixelRect, TilesetInfo};

use super::{Annotation, TileKey, TileStore};

/// SQLite store for one tile pyramid.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new store file. Fails with `AlreadyExists` if the file is
    /// already present; set `overwrite` to replace it instead.
    pub fn create<P: AsRef<Path>>(path: P, overwrite: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            if overwrite {
                std::fs::remove_file(path).map_err(|e| {
                    StoreError::InvalidInput(format!(
                        "cannot remove existing output {}: {e}",
                        path.display()
                    ))
                })?;
            } else {
                return Err(StoreError::AlreadyExists(path.display().to_string()));
            }
        }

        debug!(path = %path.display(), "creating tile store");
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an existing store read-write. Fails with `NotFound` if the file
    /// does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a fresh in-memory store (tests and tooling).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE tileset_info
             (
                 zoom_step INT,
                 max_length INT,
                 assembly TEXT,
                 chrom_names TEXT,
                 chrom_sizes TEXT,
                 tile_size INT,
                 max_zoom INT,
                 max_size INT,
                 width INT,
                 height INT,
                 dtype TEXT
             );
             CREATE TABLE tiles
             (
                 z INT NOT NULL,
                 y INT NOT NULL,
                 x INT NOT NULL,
                 image BLOB,
                 PRIMARY KEY (z, y, x)
             );
             CREATE TABLE intervals
             (
                 id int PRIMARY KEY,
                 zoomLevel int,
                 importance real,
                 fromX int,
                 toX int,
                 fromY int,
                 toY int,
                 chrOffset int,
                 uid text,
                 fields text
             );
             CREATE VIRTUAL TABLE position_index USING rtree(
                 id,
                 rFromX, rToX,
                 rFromY, rToY
             );",
        )?;
        Ok(())
    }

    fn ensure_preview_table(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS images
             (
                 id int NOT NULL,
                 z INT NOT NULL,
                 image BLOB,
                 PRIMARY KEY (id, z)
             );",
        )?;
        Ok(())
    }
}

/// Map a primary-key violation to `AlreadyExists`, everything else to the
/// engine error.
fn map_duplicate(e: rusqlite::Error, what: impl Into<String>) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::AlreadyExists(what.into())
        }
        other => StoreError::Sqlite(other),
    }
}

impl TileStore for SqliteStore {
    fn put_tileset_info(&mut self, info: &TilesetInfo) -> Result<(), StoreError> {
        let existing: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tileset_info", [], |row| row.get(0))?;
        if existing > 0 {
            return Err(StoreError::AlreadyExists("tileset_info".to_string()));
        }

        self.conn.execute(
            "INSERT INTO tileset_info VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                info.zoom_step as i64,
                info.max_length,
                info.assembly,
                info.chrom_names,
                info.chrom_sizes,
                info.tile_size as i64,
                info.max_zoom as i64,
                info.max_size as i64,
                info.width as i64,
                info.height as i64,
                info.dtype,
            ],
        )?;
        Ok(())
    }

    fn get_tileset_info(&self) -> Result<TilesetInfo, StoreError> {
        self.conn
            .query_row(
                "SELECT zoom_step, max_length, assembly, chrom_names, chrom_sizes,
                        tile_size, max_zoom, max_size, width, height, dtype
                 FROM tileset_info",
                [],
                |row| {
                    Ok(TilesetInfo {
                        zoom_step: row.get::<_, i64>(0)? as u32,
                        max_length: row.get(1)?,
                        assembly: row.get(2)?,
                        chrom_names: row.get(3)?,
                        chrom_sizes: row.get(4)?,
                        tile_size: row.get::<_, i64>(5)? as u32,
                        max_zoom: row.get::<_, i64>(6)? as u32,
                        max_size: row.get::<_, i64>(7)? as u64,
                        width: row.get::<_, i64>(8)? as u64,
                        height: row.get::<_, i64>(9)? as u64,
                        dtype: row.get(10)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound("tileset_info".to_string()))
    }

    fn put_tile(&mut self, key: TileKey, data: Bytes) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO tiles VALUES (?1,?2,?3,?4)",
                params![key.zoom as i64, key.row, key.col, data.as_ref()],
            )
            .map_err(|e| map_duplicate(e, format!("tile {key}")))?;
        Ok(())
    }

    fn get_tile(&self, key: &TileKey) -> Result<Bytes, StoreError> {
        self.conn
            .query_row(
                "SELECT image FROM tiles WHERE z=?1 AND y=?2 AND x=?3",
                params![key.zoom as i64, key.row, key.col],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .map(Bytes::from)
            .ok_or_else(|| StoreError::NotFound(format!("tile {key}")))
    }

    fn put_annotation(&mut self, annotation: &Annotation) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO intervals VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                annotation.id,
                annotation.zoom as i64,
                annotation.importance,
                annotation.rect.x_min,
                annotation.rect.x_max,
                annotation.rect.y_min,
                annotation.rect.y_max,
                annotation.chr_offset,
                annotation.uid,
                annotation.fields.to_string(),
            ],
        )
        .map_err(|e| map_duplicate(e, format!("annotation {}", annotation.id)))?;
        tx.execute(
            "INSERT INTO position_index VALUES (?1,?2,?3,?4,?5)",
            params![
                annotation.id,
                annotation.rect.x_min as f64,
                annotation.rect.x_max as f64,
                annotation.rect.y_min as f64,
                annotation.rect.y_max as f64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_annotation(&self, id: i64) -> Result<Annotation, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, zoomLevel, importance, fromX, toX, fromY, toY,
                        chrOffset, uid, fields
                 FROM intervals WHERE id=?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("annotation {id}")))?;

        let fields = serde_json::from_str(&row.9)
            .map_err(|e| StoreError::InvalidInput(format!("annotation {id} fields: {e}")))?;
        let rect = PixelRect::new(row.3, row.4, row.5, row.6)
            .map_err(|e| StoreError::InvalidInput(format!("annotation {id} rect: {e}")))?;

        Ok(Annotation {
            id: row.0,
            zoom: row.1 as u32,
            importance: row.2,
            rect,
            chr_offset: row.7,
            uid: row.8,
            fields,
        })
    }

    fn query_overlaps(&self, rect: &PixelRect) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM position_index
             WHERE rFromX < ?1 AND rToX > ?2 AND rFromY < ?3 AND rToY > ?4
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(
                params![
                    rect.x_max as f64,
                    rect.x_min as f64,
                    rect.y_max as f64,
                    rect.y_min as f64,
                ],
                |row| row.get::<_, i64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn put_preview(
        &mut self,
        annotation_id: i64,
        zoom: u32,
        data: Bytes,
    ) -> Result<(), StoreError> {
        self.ensure_preview_table()?;
        self.conn
            .execute(
                "INSERT INTO images VALUES (?1,?2,?3)",
                params![annotation_id, zoom as i64, data.as_ref()],
            )
            .map_err(|e| map_duplicate(e, format!("preview {annotation_id}.{zoom}")))?;
        Ok(())
    }

    fn get_preview(&self, annotation_id: i64, zoom: u32) -> Result<Bytes, StoreError> {
        self.ensure_preview_table()?;
        self.conn
            .query_row(
                "SELECT image FROM images WHERE id=?1 AND z=?2",
                params![annotation_id, zoom as i64],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .map(Bytes::from)
            .ok_or_else(|| StoreError::NotFound(format!("preview {annotation_id}.{zoom}")))
    }
}

// =============================================================================
// Tests
// =============================================================================
