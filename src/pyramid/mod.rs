//! Tile pyramid addressing and metadata.
//!
//! A pyramid stores one large 2D image as independent zoom levels, each
//! subdivided into fixed-size tiles. Zoom 0 is the coarsest level, `max_zoom`
//! the full-resolution one. At zoom `z` the pixel-to-tile scale factor is
//! `div = 2^(max_zoom - z)`, so a full-resolution pixel coordinate `x` falls
//! into tile column `floor(x / (tile_size * div))`.
//!
//! This module is pure coordinate math: it converts pixel-space rectangles to
//! tile-index ranges and bounds per-level tile enumeration. It holds no state
//! and performs no I/O.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Zoom step between adjacent pyramid levels. The pyramid always halves
/// resolution per level, so this is fixed.
pub const ZOOM_STEP: u32 = 1;

// =============================================================================
// PixelRect
// =============================================================================

/// An axis-aligned rectangle in pixel space, `min` inclusive / `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl PixelRect {
    /// Create a rectangle, rejecting inverted bounds.
    pub fn new(x_min: i64, x_max: i64, y_min: i64, y_max: i64) -> Result<Self, RenderError> {
        if x_min >= x_max || y_min >= y_max {
            return Err(RenderError::InvalidRegion(format!(
                "inverted rectangle bounds: x {x_min}..{x_max}, y {y_min}..{y_max}"
            )));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    /// True if the two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &PixelRect) -> bool {
        self.x_min < other.x_max
            && self.x_max > other.x_min
            && self.y_min < other.y_max
            && self.y_max > other.y_min
    }

    /// True if `self` lies fully inside `other`.
    pub fn within(&self, other: &PixelRect) -> bool {
        self.x_min >= other.x_min
            && self.x_max <= other.x_max
            && self.y_min >= other.y_min
            && self.y_max <= other.y_max
    }
}

// =============================================================================
// TilesetInfo
// =============================================================================

/// Metadata describing one tile pyramid.
///
/// Written exactly once per store. `max_size` is the pyramid's full extent at
/// the finest zoom level, `tile_size * 2^max_zoom`; it may exceed the actual
/// `width`/`height`, in which case edge tiles are partially filled.
///
/// `assembly`, `chrom_names` and `chrom_sizes` are reserved columns for
/// genomic coordinate systems and stay unset in this design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetInfo {
    pub zoom_step: u32,
    pub max_length: i64,
    pub assembly: Option<String>,
    pub chrom_names: Option<String>,
    pub chrom_sizes: Option<String>,
    pub tile_size: u32,
    pub max_zoom: u32,
    pub max_size: u64,
    pub width: u64,
    pub height: u64,
    pub dtype: Option<String>,
}

impl TilesetInfo {
    /// Build pyramid metadata from the source tile set parameters.
    ///
    /// `dtype` names the encoded image format of the source tiles
    /// (e.g. "jpg", "png").
    pub fn new(
        tile_size: u32,
        max_zoom: u32,
        width: u64,
        height: u64,
        dtype: Option<String>,
    ) -> Result<Self, String> {
        if tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if width == 0 || height == 0 {
            return Err("pixel dimensions must be greater than 0".to_string());
        }
        if max_zoom >= 40 {
            return Err(format!("max_zoom {max_zoom} is unreasonably large"));
        }
        Ok(Self {
            zoom_step: ZOOM_STEP,
            max_length: width.max(height) as i64,
            assembly: None,
            chrom_names: None,
            chrom_sizes: None,
            tile_size,
            max_zoom,
            max_size: (tile_size as u64) << max_zoom,
            width,
            height,
            dtype,
        })
    }

    /// Pixel-to-tile scale factor at `zoom`: `2^(max_zoom - zoom)`.
    pub fn zoom_divisor(&self, zoom: u32) -> Result<u64, RenderError> {
        if zoom > self.max_zoom {
            return Err(RenderError::ZoomOutOfRange {
                zoom,
                max_zoom: self.max_zoom,
            });
        }
        Ok(1u64 << (self.max_zoom - zoom))
    }

    /// Number of tile columns and rows holding actual data at `zoom`.
    ///
    /// `ceil((extent / div) / tile_size)` per axis. This bounds iteration when
    /// enumerating an entire pyramid level during ingestion.
    pub fn level_tile_count(&self, zoom: u32) -> Result<(u64, u64), RenderError> {
        let div = self.zoom_divisor(zoom)?;
        let span = self.tile_size as u64 * div;
        Ok((self.width.div_ceil(span), self.height.div_ceil(span)))
    }

    /// Minimal set of tiles whose footprints cover `rect` at `zoom`.
    ///
    /// `rect` is in full-resolution pixel coordinates. Fails with
    /// `ZoomOutOfRange` if `zoom` exceeds the pyramid.
    pub fn tiles_covering(&self, rect: &PixelRect, zoom: u32) -> Result<TileRange, RenderError> {
        let div = self.zoom_divisor(zoom)?;
        let span = self.tile_size as i64 * div as i64;
        Ok(TileRange::covering(
            rect.x_min, rect.x_max, rect.y_min, rect.y_max, span,
        ))
    }
}

// =============================================================================
// TileRange
// =============================================================================

/// An inclusive rectangular range of tile indices at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub col_start: i64,
    pub col_end: i64,
    pub row_start: i64,
    pub row_end: i64,
}

impl TileRange {
    /// Minimal covering range for a pixel rectangle, given the tile span in
    /// the same pixel units.
    ///
    /// The start index is `floor(min / span)`; the end index is
    /// `ceil(max / span) - 1`, clamped so the range is never empty. A `max`
    /// that lands exactly on a tile boundary does not pull in the next tile.
    pub fn covering(x_min: i64, x_max: i64, y_min: i64, y_max: i64, span: i64) -> Self {
        debug_assert!(span > 0);
        let col_start = div_floor(x_min, span);
        let col_end = (div_ceil(x_max, span) - 1).max(col_start);
        let row_start = div_floor(y_min, span);
        let row_end = (div_ceil(y_max, span) - 1).max(row_start);
        Self {
            col_start,
            col_end,
            row_start,
            row_end,
        }
    }

    /// Covering range for fractional coordinates already scaled to one zoom
    /// level, where `span` is the nominal tile size at that level.
    pub fn covering_scaled(x_min: f64, x_max: f64, y_min: f64, y_max: f64, span: f64) -> Self {
        debug_assert!(span > 0.0);
        let col_start = (x_min / span).floor() as i64;
        let col_end = (((x_max / span).ceil() as i64) - 1).max(col_start);
        let row_start = (y_min / span).floor() as i64;
        let row_end = (((y_max / span).ceil() as i64) - 1).max(row_start);
        Self {
            col_start,
            col_end,
            row_start,
            row_end,
        }
    }

    /// Number of tile columns.
    pub fn cols(&self) -> u64 {
        (self.col_end - self.col_start + 1) as u64
    }

    /// Number of tile rows.
    pub fn rows(&self) -> u64 {
        (self.row_end - self.row_start + 1) as u64
    }

    /// Total number of tiles in the range.
    pub fn len(&self) -> u64 {
        self.cols() * self.rows()
    }

    pub fn is_empty(&self) -> bool {
        false // covering ranges always contain at least one tile
    }

    /// Iterate tiles in row-major order as `(row, col)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let cols = self.col_start..=self.col_end;
        (self.row_start..=self.row_end)
            .flat_map(move |row| cols.clone().map(move |col| (row, col)))
    }
}

/// Floor division for possibly-negative coordinates.
fn div_floor(a: i64, b: i64) -> i64 {
    a.div_euclid(b)
}

/// Ceiling division for possibly-negative coordinates.
fn div_ceil(a: i64, b: i64) -> i64 {
    -(-a).div_euclid(b)
}

// =============================================================================
// Tests
// =============================================================================
