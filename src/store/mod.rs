//! Persistent tile and annotation storage.
//!
//! The store is a thin transactional blob store with a secondary spatial
//! index over annotations. [`TileStore`] is the seam: the ingestion and build
//! pipelines write through it, the region renderer reads through it, and the
//! backing engine stays swappable. [`sqlite::SqliteStore`] is the production
//! backend; [`memory::MemoryStore`] serves tests and in-process use.
//!
//! All writes assume exclusive single-writer access for the duration of a
//! build. Each put commits on its own, so a crash leaves only whole rows
//! visible.

pub mod memory;
pub mod sqlite;

use std::fmt;

use bytes::Bytes;

use crate::error::StoreError;
use crate::pyramid::{PixelRect, TilesetInfo};

// =============================================================================
// Keys and records
// =============================================================================

/// Primary key of a stored tile: zoom level, tile row, tile column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub zoom: u32,
    pub row: i64,
    pub col: i64,
}

impl TileKey {
    pub fn new(zoom: u32, row: i64, col: i64) -> Self {
        Self { zoom, row, col }
    }
}

impl fmt::Display for TileKey {
    /// The composite `"z.y.x"` id used in log output and tile file names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.zoom, self.row, self.col)
    }
}

/// A placed annotation, immutable once written.
///
/// `id` is insertion-ordered and doubles as the spatial index key. `fields`
/// is an opaque JSON payload (name, description, provenance) the store never
/// interprets. `chr_offset` is reserved and always 0 in this design.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub zoom: u32,
    pub importance: f64,
    pub rect: PixelRect,
    pub chr_offset: i64,
    pub uid: String,
    pub fields: serde_json::Value,
}

// =============================================================================
// TileStore
// =============================================================================

/// Transactional key-range store for one tile pyramid.
///
/// Writers get `&mut self`: the store is single-writer, batch-oriented.
/// Duplicate keys are errors, never silent overwrites, matching the one-shot
/// ingestion semantics.
pub trait TileStore {
    /// Write the pyramid metadata. Exactly once per store; a second call
    /// fails with `AlreadyExists`.
    fn put_tileset_info(&mut self, info: &TilesetInfo) -> Result<(), StoreError>;

    /// Read the pyramid metadata, `NotFound` if it was never written.
    fn get_tileset_info(&self) -> Result<TilesetInfo, StoreError>;

    /// Insert one tile image. `AlreadyExists` if the key is taken.
    fn put_tile(&mut self, key: TileKey, data: Bytes) -> Result<(), StoreError>;

    /// Fetch one tile image, `NotFound` if absent.
    fn get_tile(&self, key: &TileKey) -> Result<Bytes, StoreError>;

    /// Insert an annotation row together with its spatial index entry. The
    /// two writes share one transaction so the index never drifts from the
    /// annotation table.
    fn put_annotation(&mut self, annotation: &Annotation) -> Result<(), StoreError>;

    /// Read back one annotation by id.
    fn get_annotation(&self, id: i64) -> Result<Annotation, StoreError>;

    /// Ids of all annotations whose indexed rectangle overlaps `rect`.
    fn query_overlaps(&self, rect: &PixelRect) -> Result<Vec<i64>, StoreError>;

    /// Cache a pre-rendered preview image for `(annotation_id, zoom)`.
    fn put_preview(&mut self, annotation_id: i64, zoom: u32, data: Bytes)
        -> Result<(), StoreError>;

    /// Fetch a cached preview image, `NotFound` if absent.
    fn get_preview(&self, annotation_id: i64, zoom: u32) -> Result<Bytes, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key_display() {
        let key = TileKey::new(2, 3, 1);
        assert_eq!(key.to_string(), "2.3.1");
    }

    #[test]
    fn test_tile_key_ordering_is_z_y_x() {
        let mut keys = vec![
            TileKey::new(1, 0, 0),
            TileKey::new(0, 1, 0),
            TileKey::new(0, 0, 1),
            TileKey::new(0, 0, 0),
        ];
        keys.sort();
        assert_eq!(keys[0], TileKey::new(0, 0, 0));
        assert_eq!(keys[1], TileKey::new(0, 0, 1));
        assert_eq!(keys[2], TileKey::new(0, 1, 0));
        assert_eq!(keys[3], TileKey::new(1, 0, 0));
    }
}
