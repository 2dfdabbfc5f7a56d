//! Minimal chunked bitmap (PNG) writer.
//!
//! Produces a valid 8-bit RGBA PNG stream with exactly three chunks: IHDR,
//! one IDAT holding every pixel row, and IEND. Each chunk is framed as a
//! 4-byte big-endian payload length, a 4-byte ASCII tag, the payload, and a
//! 4-byte big-endian CRC-32 computed over tag + payload.
//!
//! The framing convention writes rows bottom-to-top, so the encoder flips
//! its top-down input first; the two reversals cancel and a conformant
//! decoder returns the input buffer pixel-exact. Each row is prefixed with
//! a filter-type byte of 0.

use std::io::Write;

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

use crate::error::CodecError;

/// Fixed 8-byte PNG signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Default deflate compression level for encoded previews.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

/// Bit depth of every encoded stream (8 bits per channel).
const BIT_DEPTH: u8 = 8;

/// PNG color type 6: RGBA.
const COLOR_TYPE_RGBA: u8 = 6;

// =============================================================================
// ChunkWriter
// =============================================================================

/// Binary writer producing framed, checksummed chunks.
///
/// Frames are appended to an internal buffer; [`ChunkWriter::into_bytes`]
/// yields the finished stream. The writer itself knows nothing about chunk
/// semantics, only the framing.
#[derive(Debug, Default)]
pub struct ChunkWriter {
    buf: Vec<u8>,
}

impl ChunkWriter {
    /// Start a stream with the PNG signature already written.
    pub fn with_signature() -> Self {
        Self {
            buf: PNG_SIGNATURE.to_vec(),
        }
    }

    /// Append one framed chunk: length, tag, payload, CRC-32(tag + payload).
    pub fn write_chunk(&mut self, tag: [u8; 4], payload: &[u8]) {
        self.buf
            .extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(&tag);
        self.buf.extend_from_slice(payload);

        let mut crc = Crc::new();
        crc.update(&tag);
        crc.update(payload);
        self.buf.extend_from_slice(&crc.sum().to_be_bytes());
    }

    /// Consume the writer, returning the finished byte stream.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a top-down RGBA pixel buffer as a minimal PNG stream.
///
/// `pixels` must hold exactly `width * height * 4` bytes in row-major,
/// top-down order. `level` is the deflate compression level (0-9).
/// Decoding the result with a conformant decoder yields `pixels` exactly.
///
/// # Errors
///
/// Returns `InvalidBuffer` if the buffer length does not match the
/// dimensions, `InvalidCompressionLevel` for a level above 9, and
/// `Compression` if the deflate stream cannot be written.
pub fn encode_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    level: u32,
) -> Result<Bytes, CodecError> {
    if level > 9 {
        return Err(CodecError::InvalidCompressionLevel(level));
    }

    let row_bytes = width as usize * 4;
    let expected = row_bytes * height as usize;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(CodecError::InvalidBuffer {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }

    // Filter byte per row. The input is flipped ahead of the bottom-up
    // framing order, so the two reversals cancel and rows land in image
    // order.
    let mut raw = Vec::with_capacity((row_bytes + 1) * height as usize);
    for row in pixels.chunks_exact(row_bytes) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(&raw).map_err(|e| CodecError::Compression {
        message: e.to_string(),
    })?;
    let compressed = encoder.finish().map_err(|e| CodecError::Compression {
        message: e.to_string(),
    })?;

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(BIT_DEPTH);
    ihdr.push(COLOR_TYPE_RGBA);
    ihdr.push(0); // compression method
    ihdr.push(0); // filter method
    ihdr.push(0); // interlace method

    let mut writer = ChunkWriter::with_signature();
    writer.write_chunk(*b"IHDR", &ihdr);
    writer.write_chunk(*b"IDAT", &compressed);
    writer.write_chunk(*b"IEND", &[]);

    Ok(writer.into_bytes())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    /// Parse the chunk stream into (tag, payload) pairs, verifying framing
    /// and each chunk's CRC along the way.
    fn parse_chunks(data: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
        assert_eq!(&data[..8], &PNG_SIGNATURE);
        let mut chunks = Vec::new();
        let mut pos = 8;
        while pos < data.len() {
            let len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            let tag: [u8; 4] = data[pos + 4..pos + 8].try_into().unwrap();
            let payload = data[pos + 8..pos + 8 + len].to_vec();
            let stored_crc =
                u32::from_be_bytes(data[pos + 8 + len..pos + 12 + len].try_into().unwrap());

            let mut crc = Crc::new();
            crc.update(&tag);
            crc.update(&payload);
            assert_eq!(stored_crc, crc.sum(), "CRC mismatch for {:?}", tag);

            chunks.push((tag, payload));
            pos += 12 + len;
        }
        chunks
    }

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x % 256) as u8);
                pixels.push((y % 256) as u8);
                pixels.push(((x + y) % 256) as u8);
                pixels.push(255);
            }
        }
        pixels
    }

    #[test]
    fn test_chunk_layout() {
        let encoded = encode_rgba(&[1, 2, 3, 255], 1, 1, 9).unwrap();
        let chunks = parse_chunks(&encoded);

        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0].0, b"IHDR");
        assert_eq!(&chunks[1].0, b"IDAT");
        assert_eq!(&chunks[2].0, b"IEND");
        assert!(chunks[2].1.is_empty());
    }

    #[test]
    fn test_ihdr_fields() {
        let encoded = encode_rgba(&gradient(257, 129), 257, 129, 6).unwrap();
        let chunks = parse_chunks(&encoded);
        let ihdr = &chunks[0].1;

        assert_eq!(ihdr.len(), 13);
        assert_eq!(u32::from_be_bytes(ihdr[0..4].try_into().unwrap()), 257);
        assert_eq!(u32::from_be_bytes(ihdr[4..8].try_into().unwrap()), 129);
        assert_eq!(ihdr[8], 8); // bit depth
        assert_eq!(ihdr[9], 6); // color type RGBA
        assert_eq!(&ihdr[10..13], &[0, 0, 0]);
    }

    #[test]
    fn test_rows_framed_in_image_order_with_filter_zero() {
        // Two rows: top red, bottom blue.
        let pixels = vec![
            255, 0, 0, 255, // top
            0, 0, 255, 255, // bottom
        ];
        let encoded = encode_rgba(&pixels, 1, 2, 9).unwrap();
        let chunks = parse_chunks(&encoded);

        let mut raw = Vec::new();
        ZlibDecoder::new(&chunks[1].1[..])
            .read_to_end(&mut raw)
            .unwrap();

        // filter byte + 4px, twice; top row first
        assert_eq!(raw, vec![0, 255, 0, 0, 255, 0, 0, 0, 255, 255]);
    }

    #[test]
    fn test_round_trip_is_pixel_exact() {
        for (w, h) in [(1u32, 1u32), (256, 256), (257, 129)] {
            let pixels = gradient(w, h);
            let encoded = encode_rgba(&pixels, w, h, 9).unwrap();

            let decoded = image::load_from_memory(&encoded).unwrap().to_rgba8();
            assert_eq!(decoded.dimensions(), (w, h));
            assert_eq!(decoded.into_raw(), pixels, "{w}x{h} round trip");
        }
    }

    #[test]
    fn test_compression_level_zero_is_valid() {
        let pixels = gradient(16, 16);
        let stored = encode_rgba(&pixels, 16, 16, 0).unwrap();
        let packed = encode_rgba(&pixels, 16, 16, 9).unwrap();

        assert!(stored.len() >= packed.len());
        let decoded = image::load_from_memory(&stored).unwrap().to_rgba8();
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            encode_rgba(&[0; 16], 2, 2, 10),
            Err(CodecError::InvalidCompressionLevel(10))
        ));
        assert!(matches!(
            encode_rgba(&[0; 15], 2, 2, 9),
            Err(CodecError::InvalidBuffer { .. })
        ));
        assert!(matches!(
            encode_rgba(&[], 0, 0, 9),
            Err(CodecError::InvalidBuffer { .. })
        ));
    }
}
