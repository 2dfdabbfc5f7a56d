//! In-memory tile store.
//!
//! Implements [`TileStore`] over plain BTreeMaps with a linear-scan overlap
//! query. Used by unit tests and by callers that want to stage a build
//! without touching disk. Semantics mirror the SQLite backend: duplicate
//! keys fail, metadata is write-once.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::StoreError;
use crate::pyramid::{PixelRect, TilesetInfo};

use super::{Annotation, TileKey, TileStore};

/// BTreeMap-backed store for one tile pyramid.
#[derive(Debug, Default)]
pub struct MemoryStore {
    info: Option<TilesetInfo>,
    tiles: BTreeMap<TileKey, Bytes>,
    annotations: BTreeMap<i64, Annotation>,
    index: Vec<(i64, PixelRect)>,
    previews: BTreeMap<(i64, u32), Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Number of stored annotations.
    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }
}

impl TileStore for MemoryStore {
    fn put_tileset_info(&mut self, info: &TilesetInfo) -> Result<(), StoreError> {
        if self.info.is_some() {
            return Err(StoreError::AlreadyExists("tileset_info".to_string()));
        }
        self.info = Some(info.clone());
        Ok(())
    }

    fn get_tileset_info(&self) -> Result<TilesetInfo, StoreError> {
        self.info
            .clone()
            .ok_or_else(|| StoreError::NotFound("tileset_info".to_string()))
    }

    fn put_tile(&mut self, key: TileKey, data: Bytes) -> Result<(), StoreError> {
        if self.tiles.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("tile {key}")));
        }
        self.tiles.insert(key, data);
        Ok(())
    }

    fn get_tile(&self, key: &TileKey) -> Result<Bytes, StoreError> {
        self.tiles
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tile {key}")))
    }

    fn put_annotation(&mut self, annotation: &Annotation) -> Result<(), StoreError> {
        if self.annotations.contains_key(&annotation.id) {
            return Err(StoreError::AlreadyExists(format!(
                "annotation {}",
                annotation.id
            )));
        }
        self.annotations.insert(annotation.id, annotation.clone());
        self.index.push((annotation.id, annotation.rect));
        Ok(())
    }

    fn get_annotation(&self, id: i64) -> Result<Annotation, StoreError> {
        self.annotations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("annotation {id}")))
    }

    fn query_overlaps(&self, rect: &PixelRect) -> Result<Vec<i64>, StoreError> {
        let mut ids: Vec<i64> = self
            .index
            .iter()
            .filter(|(_, indexed)| indexed.overlaps(rect))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn put_preview(
        &mut self,
        annotation_id: i64,
        zoom: u32,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let key = (annotation_id, zoom);
        if self.previews.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "preview {annotation_id}.{zoom}"
            )));
        }
        self.previews.insert(key, data);
        Ok(())
    }

    fn get_preview(&self, annotation_id: i64, zoom: u32) -> Result<Bytes, StoreError> {
        self.previews
            .get(&(annotation_id, zoom))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("preview {annotation_id}.{zoom}")))
    }
}
