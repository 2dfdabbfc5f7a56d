//! # imtiles
//!
//! A multi-resolution tile store with spatial snapshot placement.
//!
//! This library turns directories of pre-rendered image tiles into
//! self-contained SQLite stores and places snapshot annotations into a
//! multi-resolution pyramid so that viewers can show the most important
//! annotations at every zoom level without overcrowding any tile.
//!
//! ## Features
//!
//! - **Tile ingestion**: Converts a `{zoom}.{row}.{col}.{ext}` tile directory
//!   into a single portable `.imtiles` SQLite file
//! - **Quota-bounded placement**: Assigns each annotation to the coarsest
//!   zoom level with room, bounding per-tile visual density
//! - **Spatial indexing**: Annotations are queryable by rectangle via an
//!   R*Tree index
//! - **Region rendering**: Composites stored tiles into arbitrary pixel
//!   regions and pre-renders per-annotation preview pyramids
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`pyramid`] - Tile addressing math and pyramid metadata
//! - [`codec`] - PNG encoding of rendered regions, decoding of stored tiles
//! - [`store`] - The tile/annotation store trait and its SQLite and
//!   in-memory implementations
//! - [`render`] - Region compositing and preview pyramid rendering
//! - [`place`] - Quota-bounded annotation placement
//! - [`ingest`] / [`builder`] - The two batch pipelines
//! - [`config`] - CLI and configuration types

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod place;
pub mod pyramid;
pub mod render;
pub mod store;

// Re-export commonly used types
pub use builder::{build_snapshots, load_snapshots, BuildSummary, SnapshotRecord};
pub use codec::{decode_rgba, encode_rgba, ChunkWriter, DEFAULT_COMPRESSION_LEVEL, PNG_SIGNATURE};
pub use config::{Cli, Command, ImageType, IngestConfig, SnapshotsConfig};
pub use error::{BuildError, CodecError, IngestError, RenderError, StoreError};
pub use ingest::{ingest_tiles, IngestSummary, TileSourceInfo};
pub use place::{PlacementEngine, PlacementStats, WindowMode, DEFAULT_QUOTA};
pub use pyramid::{PixelRect, TileRange, TilesetInfo, ZOOM_STEP};
pub use render::{RegionRenderer, RegionRequest, DEFAULT_MAX_PREVIEW_SIZE};
pub use store::memory::MemoryStore;
pub use store::sqlite::SqliteStore;
pub use store::{Annotation, TileKey, TileStore};
