//! On-demand region rendering.
//!
//! Fetches the stored tiles covering a pixel region, stitches them into one
//! bitmap and crops to the exact rectangle. See [`compositor`].

pub mod compositor;

pub use compositor::{RegionRenderer, RegionRequest, DEFAULT_MAX_PREVIEW_SIZE};
