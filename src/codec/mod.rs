//! Tile image encoding and decoding.
//!
//! The crate only ever *produces* one format: a minimal chunked RGBA bitmap
//! stream written by [`png`]. Stored source tiles may be in whatever format
//! ingestion received (jpg, png, gif); decoding those is delegated to the
//! `image` crate.

pub mod png;

pub use png::{encode_rgba, ChunkWriter, DEFAULT_COMPRESSION_LEVEL, PNG_SIGNATURE};

use image::RgbaImage;

use crate::error::CodecError;

/// Decode stored tile bytes into an RGBA pixel buffer.
///
/// The container format is sniffed from the byte stream, so tiles ingested as
/// jpg, png or gif all decode through the same path.
pub fn decode_rgba(data: &[u8]) -> Result<RgbaImage, CodecError> {
    let img = image::load_from_memory(data).map_err(|e| CodecError::Decode {
        message: e.to_string(),
    })?;
    Ok(img.to_rgba8())
}
