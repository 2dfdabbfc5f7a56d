//! Region compositing over a stored tile pyramid.
//!
//! [`RegionRenderer`] retrieves the tiles covering an arbitrary pixel
//! rectangle at one zoom level, pastes them onto a canvas and crops to the
//! requested rectangle. [`RegionRenderer::render_pyramid`] drives this across
//! a zoom range, PNG-encoding one preview per admissible level.
//!
//! A covering tile missing from the store is corruption (`MissingTile`), not
//! a normal case: ingestion writes every tile of every level.

use bytes::Bytes;
use image::{imageops, RgbaImage};
use tracing::debug;

use crate::codec::png::{encode_rgba, DEFAULT_COMPRESSION_LEVEL};
use crate::codec::decode_rgba;
use crate::error::{RenderError, StoreError};
use crate::pyramid::{PixelRect, TileRange, TilesetInfo};
use crate::store::{TileKey, TileStore};

/// Default upper bound (pixels, per axis) for pre-rendered previews.
pub const DEFAULT_MAX_PREVIEW_SIZE: u32 = 512;

// =============================================================================
// RegionRequest
// =============================================================================

/// A pixel region at one zoom level.
///
/// Coordinates are fractional and already scaled to the requested zoom level
/// (full-resolution coordinates divided by `2^(max_zoom - zoom)`).
#[derive(Debug, Clone, Copy)]
pub struct RegionRequest {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub zoom: u32,
}

impl RegionRequest {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64, zoom: u32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            zoom,
        }
    }
}

// =============================================================================
// RegionRenderer
// =============================================================================

/// Renders pixel regions by compositing stored tiles.
pub struct RegionRenderer<S: TileStore> {
    store: S,
    info: TilesetInfo,
    compression: u32,
}

impl<S: TileStore> RegionRenderer<S> {
    /// Create a renderer, reading the pyramid metadata from the store.
    pub fn new(store: S) -> Result<Self, RenderError> {
        let info = store.get_tileset_info()?;
        Ok(Self {
            store,
            info,
            compression: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Set the deflate level (0-9) used when encoding previews.
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = level;
        self
    }

    pub fn info(&self) -> &TilesetInfo {
        &self.info
    }

    /// Fetch and stitch the tiles covering `request`, cropped to the exact
    /// rectangle.
    ///
    /// Rectangles that collapse below one pixel on an axis are expanded
    /// symmetrically around that axis's center to a 1px footprint, so the
    /// crop is never empty.
    pub fn render_region(&self, request: &RegionRequest) -> Result<RgbaImage, RenderError> {
        if request.x_min > request.x_max || request.y_min > request.y_max {
            return Err(RenderError::InvalidRegion(format!(
                "inverted region bounds: x {}..{}, y {}..{}",
                request.x_min, request.x_max, request.y_min, request.y_max
            )));
        }
        if request.zoom > self.info.max_zoom {
            return Err(RenderError::ZoomOutOfRange {
                zoom: request.zoom,
                max_zoom: self.info.max_zoom,
            });
        }

        let tile_size = self.info.tile_size;
        let range = TileRange::covering_scaled(
            request.x_min,
            request.x_max,
            request.y_min,
            request.y_max,
            tile_size as f64,
        );

        let canvas = self.composite(&range, request.zoom)?;

        // Crop coordinates relative to the first covering tile's origin.
        let origin_x = (range.col_start * tile_size as i64) as f64;
        let origin_y = (range.row_start * tile_size as i64) as f64;
        let (rel_x_min, rel_x_max) =
            expand_to_min_1px(request.x_min - origin_x, request.x_max - origin_x);
        let (rel_y_min, rel_y_max) =
            expand_to_min_1px(request.y_min - origin_y, request.y_max - origin_y);

        let left = rel_x_min.floor().max(0.0) as u32;
        let top = rel_y_min.floor().max(0.0) as u32;
        let width = ((rel_x_max - rel_x_min).round() as u32)
            .max(1)
            .min(canvas.width().saturating_sub(left).max(1));
        let height = ((rel_y_max - rel_y_min).round() as u32)
            .max(1)
            .min(canvas.height().saturating_sub(top).max(1));

        Ok(imageops::crop_imm(&canvas, left, top, width, height).to_image())
    }

    /// Render and encode one preview per zoom level in `zoom_from..=zoom_to`.
    ///
    /// `rect` is in full-resolution pixel coordinates and is rescaled per
    /// level. Levels where the rescaled rectangle lies entirely outside the
    /// pyramid extent, or exceeds `max_preview_size` on either axis, are
    /// skipped rather than failing. Levels beyond the pyramid's max zoom are
    /// never attempted.
    pub fn render_pyramid(
        &self,
        rect: &PixelRect,
        zoom_from: u32,
        zoom_to: u32,
        max_preview_size: u32,
    ) -> Result<Vec<(u32, Bytes)>, RenderError> {
        let mut previews = Vec::new();

        for zoom in zoom_from..=zoom_to.min(self.info.max_zoom) {
            let div = self.info.zoom_divisor(zoom)? as f64;
            let x_min = rect.x_min as f64 / div;
            let x_max = rect.x_max as f64 / div;
            let y_min = rect.y_min as f64 / div;
            let y_max = rect.y_max as f64 / div;
            let level_width = self.info.width as f64 / div;
            let level_height = self.info.height as f64 / div;

            let within = x_min < level_width && x_max > 0.0 && y_min < level_height && y_max > 0.0;
            if !within {
                debug!(zoom, "region outside pyramid extent, skipping");
                continue;
            }
            if x_max - x_min > max_preview_size as f64 || y_max - y_min > max_preview_size as f64 {
                debug!(zoom, "too big for a preview, skipping");
                continue;
            }

            let image =
                self.render_region(&RegionRequest::new(x_min, x_max, y_min, y_max, zoom))?;
            let (width, height) = image.dimensions();
            let encoded = encode_rgba(image.as_raw(), width, height, self.compression)?;
            previews.push((zoom, encoded));
        }

        Ok(previews)
    }

    /// Fetch every tile in `range` and paste it onto a canvas of
    /// `tile_size * cols` by `tile_size * rows` pixels. A single-tile range
    /// skips the paste loop.
    fn composite(&self, range: &TileRange, zoom: u32) -> Result<RgbaImage, RenderError> {
        let tile_size = self.info.tile_size;

        if range.len() == 1 {
            return self.fetch_tile(zoom, range.row_start, range.col_start);
        }

        let mut canvas = RgbaImage::new(
            tile_size * range.cols() as u32,
            tile_size * range.rows() as u32,
        );
        for (row, col) in range.iter() {
            let tile = self.fetch_tile(zoom, row, col)?;
            let local_x = (col - range.col_start) as i64 * tile_size as i64;
            let local_y = (row - range.row_start) as i64 * tile_size as i64;
            imageops::replace(&mut canvas, &tile, local_x, local_y);
        }
        Ok(canvas)
    }

    fn fetch_tile(&self, zoom: u32, row: i64, col: i64) -> Result<RgbaImage, RenderError> {
        let key = TileKey::new(zoom, row, col);
        let data = self.store.get_tile(&key).map_err(|e| match e {
            StoreError::NotFound(_) => RenderError::MissingTile { zoom, row, col },
            other => RenderError::Store(other),
        })?;
        Ok(decode_rgba(&data)?)
    }
}

/// Expand an axis interval shorter than one pixel symmetrically around its
/// center to a 1px footprint.
fn expand_to_min_1px(min: f64, max: f64) -> (f64, f64) {
    let extent = max - min;
    if extent < 1.0 {
        let center = min + extent / 2.0;
        (center - 0.5, center + 0.5)
    } else {
        (min, max)
    }
}

// =============================================================================
// Tests
// =============================================================================
