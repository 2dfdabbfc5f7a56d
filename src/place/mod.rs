//! Quota-bounded annotation placement.
//!
//! [`PlacementEngine`] consumes a priority-ordered stream of annotation
//! rectangles and assigns each one to the coarsest zoom level whose covering
//! tiles still have room. The per-tile quota bounds visual density: once a
//! tile has `quota` annotations referencing it, that tile's zoom level stops
//! admitting rectangles that cover it.
//!
//! Callers feed rectangles in descending importance order so high-priority
//! annotations claim the coarse, always-visible levels first. An annotation
//! admitted at no level is dropped silently; drops are tallied in
//! [`PlacementStats`] so the caller can observe them.
//!
//! The occupancy counters live in a flat map keyed by `(zoom, row, col)` and
//! are owned exclusively by the engine for the lifetime of one run. Nothing
//! is persisted; a new run starts from empty counters.

use std::collections::HashMap;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::pyramid::{PixelRect, TileRange, TilesetInfo};
use crate::store::Annotation;

/// Default maximum number of annotations per tile.
pub const DEFAULT_QUOTA: u32 = 25;

/// Length of generated annotation uids.
const UID_LENGTH: usize = 22;

// =============================================================================
// Window filtering
// =============================================================================

/// How a bounding window admits candidate rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Reject only rectangles disjoint from the window.
    Overlap,
    /// Reject rectangles not fully contained in the window.
    Within,
}

// =============================================================================
// PlacementStats
// =============================================================================

/// Outcome counters for one placement run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementStats {
    /// Annotations placed at some zoom level.
    pub placed: u64,
    /// Annotations admitted by the window but saturated at every level.
    pub dropped: u64,
    /// Annotations rejected by the bounding window before placement.
    pub filtered: u64,
}

// =============================================================================
// PlacementEngine
// =============================================================================

/// Greedy coarsest-first placement over one pyramid.
pub struct PlacementEngine {
    info: TilesetInfo,
    quota: u32,
    window: Option<(PixelRect, WindowMode)>,
    occupancy: HashMap<(u32, i64, i64), u32>,
    next_id: i64,
    stats: PlacementStats,
}

impl PlacementEngine {
    pub fn new(info: TilesetInfo, quota: u32) -> Self {
        Self {
            info,
            quota,
            window: None,
            occupancy: HashMap::new(),
            next_id: 0,
            stats: PlacementStats::default(),
        }
    }

    /// Pre-filter candidates against a bounding window before placement is
    /// attempted.
    pub fn with_window(mut self, window: PixelRect, mode: WindowMode) -> Self {
        self.window = Some((window, mode));
        self
    }

    /// Attempt to place one annotation rectangle.
    ///
    /// Zoom levels are tried coarsest-first. A level is rejected as soon as
    /// any covering tile is at or above quota; otherwise every covering
    /// tile's counter is incremented and the annotation is emitted with the
    /// next insertion-ordered id and a fresh uid. Returns `None` when the
    /// window rejects the rectangle or every level is saturated.
    pub fn place(
        &mut self,
        rect: PixelRect,
        importance: f64,
        fields: serde_json::Value,
    ) -> Option<Annotation> {
        let admitted = match &self.window {
            None => true,
            Some((window, WindowMode::Overlap)) => rect.overlaps(window),
            Some((window, WindowMode::Within)) => rect.within(window),
        };
        if !admitted {
            self.stats.filtered += 1;
            return None;
        }

        for zoom in 0..=self.info.max_zoom {
            let span = (self.info.tile_size as i64) << (self.info.max_zoom - zoom);
            let range = TileRange::covering(rect.x_min, rect.x_max, rect.y_min, rect.y_max, span);

            // Quota check runs before any increment: either every covering
            // tile gains one reference, or none does.
            let saturated = range
                .iter()
                .any(|(row, col)| self.count(zoom, row, col) >= self.quota);
            if saturated {
                continue;
            }

            for (row, col) in range.iter() {
                *self.occupancy.entry((zoom, row, col)).or_insert(0) += 1;
            }

            let id = self.next_id;
            self.next_id += 1;
            self.stats.placed += 1;

            return Some(Annotation {
                id,
                zoom,
                importance,
                rect,
                chr_offset: 0,
                uid: generate_uid(),
                fields,
            });
        }

        debug!(
            x_min = rect.x_min,
            y_min = rect.y_min,
            "every zoom level saturated, dropping annotation"
        );
        self.stats.dropped += 1;
        None
    }

    /// Outcome counters so far.
    pub fn stats(&self) -> PlacementStats {
        self.stats
    }

    /// Occupancy of one tile.
    pub fn count(&self, zoom: u32, row: i64, col: i64) -> u32 {
        self.occupancy
            .get(&(zoom, row, col))
            .copied()
            .unwrap_or(0)
    }

    /// Highest occupancy across all tiles, 0 for an empty run.
    pub fn max_occupancy(&self) -> u32 {
        self.occupancy.values().copied().max().unwrap_or(0)
    }
}

fn generate_uid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UID_LENGTH)
        .map(char::from)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(quota: u32) -> PlacementEngine {
        let info = TilesetInfo::new(256, 2, 1024, 1024, None).unwrap();
        PlacementEngine::new(info, quota)
    }

    fn small_rect() -> PixelRect {
        PixelRect::new(10, 50, 10, 50).unwrap()
    }

    #[test]
    fn test_places_at_coarsest_level_first() {
        let mut engine = engine(25);
        let placed = engine.place(small_rect(), 100.0, serde_json::Value::Null);

        let annotation = placed.expect("level 0 has room");
        assert_eq!(annotation.zoom, 0);
        assert_eq!(annotation.id, 0);
        assert_eq!(annotation.chr_offset, 0);
        assert_eq!(annotation.uid.len(), 22);
    }

    #[test]
    fn test_saturated_level_falls_through_to_finer() {
        let mut engine = engine(1);

        // All three cover tile (z, 0, 0) at every zoom, so each placement
        // saturates one more level.
        let a = engine.place(small_rect(), 3.0, serde_json::Value::Null).unwrap();
        let b = engine.place(small_rect(), 2.0, serde_json::Value::Null).unwrap();
        let c = engine.place(small_rect(), 1.0, serde_json::Value::Null).unwrap();
        assert_eq!(a.zoom, 0);
        assert_eq!(b.zoom, 1);
        assert_eq!(c.zoom, 2);

        // Fourth has nowhere to go.
        let d = engine.place(small_rect(), 0.5, serde_json::Value::Null);
        assert!(d.is_none());
        assert_eq!(
            engine.stats(),
            PlacementStats {
                placed: 3,
                dropped: 1,
                filtered: 0
            }
        );
    }

    #[test]
    fn test_quota_invariant_holds_after_run() {
        let quota = 2;
        let mut engine = engine(quota);
        for i in 0..20 {
            let rect = PixelRect::new(i * 30, i * 30 + 100, 0, 100).unwrap();
            engine.place(rect, (20 - i) as f64, serde_json::Value::Null);
        }
        assert!(engine.max_occupancy() <= quota);
    }

    #[test]
    fn test_any_saturated_covering_tile_rejects_level() {
        let mut engine = engine(1);

        // Saturate tile (2, 0, 0) only at the finest level by first filling
        // levels 0 and 1 with rectangles confined to that tile.
        for _ in 0..3 {
            engine.place(PixelRect::new(0, 100, 0, 100).unwrap(), 1.0, serde_json::Value::Null);
        }
        assert_eq!(engine.count(2, 0, 0), 1);

        // A rectangle straddling tiles (2,0,0) and (2,0,1) is rejected at
        // zoom 2 because one of its covering tiles is full.
        let straddling = PixelRect::new(200, 300, 0, 100).unwrap();
        let result = engine.place(straddling, 1.0, serde_json::Value::Null);
        assert!(result.is_none());
        // Tile (2, 0, 1) was not incremented.
        assert_eq!(engine.count(2, 0, 1), 0);
    }

    #[test]
    fn test_ids_are_insertion_ordered_and_drops_consume_none() {
        let mut engine = engine(1);
        let a = engine.place(small_rect(), 2.0, serde_json::Value::Null).unwrap();
        let b = engine.place(small_rect(), 1.5, serde_json::Value::Null).unwrap();
        let c = engine.place(small_rect(), 1.0, serde_json::Value::Null).unwrap();
        assert!(engine.place(small_rect(), 0.5, serde_json::Value::Null).is_none());
        let d = engine
            .place(PixelRect::new(600, 700, 600, 700).unwrap(), 0.4, serde_json::Value::Null)
            .unwrap();

        assert_eq!((a.id, b.id, c.id, d.id), (0, 1, 2, 3));
    }

    #[test]
    fn test_window_overlap_mode() {
        let window = PixelRect::new(0, 100, 0, 100).unwrap();
        let mut engine = engine(25).with_window(window, WindowMode::Overlap);

        // Partially inside: admitted.
        assert!(engine
            .place(PixelRect::new(50, 150, 50, 150).unwrap(), 1.0, serde_json::Value::Null)
            .is_some());
        // Disjoint: filtered.
        assert!(engine
            .place(PixelRect::new(200, 300, 200, 300).unwrap(), 1.0, serde_json::Value::Null)
            .is_none());
        assert_eq!(engine.stats().filtered, 1);
    }

    #[test]
    fn test_window_edge_contact_is_filtered() {
        // Half-open rects: x 100..200 shares no pixel with a window ending
        // at 100.
        let window = PixelRect::new(0, 100, 0, 100).unwrap();
        let mut engine = engine(25).with_window(window, WindowMode::Overlap);

        assert!(engine
            .place(PixelRect::new(100, 200, 0, 100).unwrap(), 1.0, serde_json::Value::Null)
            .is_none());
        assert_eq!(engine.stats().filtered, 1);
    }

    #[test]
    fn test_window_within_mode() {
        let window = PixelRect::new(0, 100, 0, 100).unwrap();
        let mut engine = engine(25).with_window(window, WindowMode::Within);

        // Partially inside is not enough.
        assert!(engine
            .place(PixelRect::new(50, 150, 50, 150).unwrap(), 1.0, serde_json::Value::Null)
            .is_none());
        assert!(engine
            .place(PixelRect::new(10, 90, 10, 90).unwrap(), 1.0, serde_json::Value::Null)
            .is_some());
        assert_eq!(engine.stats().filtered, 1);
    }

    #[test]
    fn test_uids_are_unique() {
        let mut engine = engine(25);
        let a = engine.place(small_rect(), 1.0, serde_json::Value::Null).unwrap();
        let b = engine
            .place(PixelRect::new(600, 700, 600, 700).unwrap(), 1.0, serde_json::Value::Null)
            .unwrap();
        assert_ne!(a.uid, b.uid);
    }
}
