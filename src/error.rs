use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the persistent tile/annotation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert would overwrite an existing row (ingestion is one-shot)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A stored row is malformed or a write argument is invalid
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Error from the underlying SQLite engine
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors raised while encoding or decoding tile images.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Pixel buffer does not match the declared dimensions
    #[error("invalid pixel buffer: expected {expected} bytes for {width}x{height} RGBA, got {actual}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// Compression level outside 0-9
    #[error("invalid compression level: {0} (must be 0-9)")]
    InvalidCompressionLevel(u32),

    /// Deflate stream could not be written
    #[error("compression failed: {message}")]
    Compression { message: String },

    /// Stored tile bytes could not be decoded into pixels
    #[error("decode failed: {message}")]
    Decode { message: String },
}

/// Errors raised by tile addressing and region rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Zoom level outside the pyramid
    #[error("zoom {zoom} out of range: pyramid has max zoom {max_zoom}")]
    ZoomOutOfRange { zoom: u32, max_zoom: u32 },

    /// A covering tile was absent from the store. Ingestion guarantees
    /// completeness, so this indicates a corrupted tile set.
    #[error("missing tile {zoom}.{row}.{col}: tile set is corrupted")]
    MissingTile { zoom: u32, row: i64, col: i64 },

    /// Rectangle bounds are inverted or otherwise unusable
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Store access failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Tile bytes could not be decoded, or the result could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised by the tile-directory ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Source directory does not exist
    #[error("source directory not found: {0}")]
    SourceNotFound(PathBuf),

    /// Tile set info file (info.json) is missing
    #[error("tile set info file not found: {0}")]
    InfoNotFound(PathBuf),

    /// Tile set info file is present but malformed
    #[error("tile set info broken: {message}")]
    InvalidInfo { message: String },

    /// A tile file the pyramid requires is missing from disk
    #[error("tile {0} not found: tile set is corrupted")]
    MissingTileFile(PathBuf),

    /// Filesystem error while reading tiles or metadata
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store write failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the snapshot build pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Snapshots input file does not exist
    #[error("snapshots file not found: {0}")]
    SnapshotsNotFound(PathBuf),

    /// Tile set info file is missing
    #[error("tile set info file not found: {0}")]
    InfoNotFound(PathBuf),

    /// Input JSON could not be parsed
    #[error("invalid input: {0}")]
    Json(#[from] serde_json::Error),

    /// Window limits are inverted or otherwise unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem error while reading inputs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store write failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Preview pre-rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),
}
