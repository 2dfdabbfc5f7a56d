//! Command-line configuration.
//!
//! Two subcommands drive the batch pipelines:
//!
//! - `imtiles ingest <dir>` converts a directory of pre-rendered image tiles
//!   into an `.imtiles` store.
//! - `imtiles snapshots <file>` places snapshot annotations into a
//!   multi-resolution store, optionally pre-rendering previews from an
//!   existing `.imtiles` store.
//!
//! Options mirror env variables with the `IMTILES_` prefix where it makes
//! sense for scripting.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default name of the tile set info file next to the tiles.
pub const DEFAULT_INFO_FILE: &str = "info.json";

/// Default maximum number of annotations per tile.
pub const DEFAULT_MAX_PER_TILE: u32 = 25;

/// Default maximum preview dimension in pixels.
pub const DEFAULT_PRE_FETCH_MAX_SIZE: u32 = 512;

// =============================================================================
// CLI
// =============================================================================

/// imtiles - multi-resolution tile store and snapshot placement tooling.
#[derive(Parser, Debug)]
#[command(name = "imtiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a directory of image tiles into an .imtiles store.
    Ingest(IngestConfig),

    /// Place snapshot annotations into a multi-resolution store.
    Snapshots(SnapshotsConfig),
}

// =============================================================================
// Image type
// =============================================================================

/// Encoded format of the source tile files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageType {
    Jpg,
    Png,
    Gif,
}

impl ImageType {
    /// File extension of source tiles, also stored as the pyramid's dtype.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageType::Jpg => "jpg",
            ImageType::Png => "png",
            ImageType::Gif => "gif",
        }
    }
}

// =============================================================================
// Ingest Configuration
// =============================================================================

/// Configuration for the `ingest` subcommand.
#[derive(Args, Debug, Clone)]
pub struct IngestConfig {
    /// Directory of image tiles to be converted.
    pub dir: PathBuf,

    /// Name of the store file to be generated (default: `<dir>.imtiles`).
    #[arg(short, long, env = "IMTILES_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Name of the tile set info file inside the source directory.
    #[arg(short, long, default_value = DEFAULT_INFO_FILE)]
    pub info: String,

    /// Image tile data type.
    #[arg(short = 't', long = "imtype", value_enum, default_value_t = ImageType::Jpg)]
    pub im_type: ImageType,

    /// Overwrite the output store if it exists.
    #[arg(short = 'w', long, default_value_t = false)]
    pub overwrite: bool,

    /// Increase output verbosity.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl IngestConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.info.is_empty() {
            return Err("info file name must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Snapshots Configuration
// =============================================================================

/// Configuration for the `snapshots` subcommand.
#[derive(Args, Debug, Clone)]
pub struct SnapshotsConfig {
    /// Snapshots file to be converted.
    pub file: PathBuf,

    /// Name of the store file to be generated (default: `<dir>.multires.db`).
    #[arg(short, long, env = "IMTILES_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Name of the tile set info file (looked up next to the snapshots file
    /// if not found as given).
    #[arg(short, long, default_value = DEFAULT_INFO_FILE)]
    pub info: String,

    /// Maximum number of annotations per tile.
    #[arg(short = 'm', long = "max", default_value_t = DEFAULT_MAX_PER_TILE)]
    pub max_per_tile: u32,

    /// Preload the image pyramid for annotations from this .imtiles store.
    #[arg(short, long)]
    pub pre_fetch: Option<PathBuf>,

    /// Initial zoom for preloading (farthest zoomed out).
    #[arg(long, default_value_t = 0)]
    pub pre_fetch_zoom_from: u32,

    /// Final zoom for preloading (farthest zoomed in, default: max zoom).
    #[arg(long)]
    pub pre_fetch_zoom_to: Option<u32>,

    /// Maximum size in pixels for preloading a snapshot preview.
    #[arg(long, default_value_t = DEFAULT_PRE_FETCH_MAX_SIZE)]
    pub pre_fetch_max_size: u32,

    /// Only include snapshots whose end x is greater than this value.
    #[arg(long)]
    pub from_x: Option<f64>,

    /// Only include snapshots whose start x is smaller than this value.
    #[arg(long)]
    pub to_x: Option<f64>,

    /// Only include snapshots whose end y is greater than this value.
    #[arg(long)]
    pub from_y: Option<f64>,

    /// Only include snapshots whose start y is smaller than this value.
    #[arg(long)]
    pub to_y: Option<f64>,

    /// X limits are fractions of the full width rather than pixels.
    #[arg(long, default_value_t = false)]
    pub xlim_rel: bool,

    /// Y limits are fractions of the full height rather than pixels.
    #[arg(long, default_value_t = false)]
    pub ylim_rel: bool,

    /// Snapshots have to be fully inside the limits, not merely overlap.
    #[arg(long, default_value_t = false)]
    pub limit_excl: bool,

    /// Overwrite the output store if it exists.
    #[arg(short = 'w', long, default_value_t = false)]
    pub overwrite: bool,

    /// Increase output verbosity.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SnapshotsConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_per_tile == 0 {
            return Err("max annotations per tile must be greater than 0".to_string());
        }
        if let (Some(from), Some(to)) = (self.from_x, self.to_x) {
            if from >= to {
                return Err(format!("--from-x {from} must be smaller than --to-x {to}"));
            }
        }
        if let (Some(from), Some(to)) = (self.from_y, self.to_y) {
            if from >= to {
                return Err(format!("--from-y {from} must be smaller than --to-y {to}"));
            }
        }
        if self.pre_fetch_max_size == 0 {
            return Err("pre-fetch max size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// True if any window limit was given.
    pub fn has_window(&self) -> bool {
        self.from_x.is_some()
            || self.to_x.is_some()
            || self.from_y.is_some()
            || self.to_y.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshots_config() -> SnapshotsConfig {
        SnapshotsConfig {
            file: PathBuf::from("snapshots.json"),
            output: None,
            info: DEFAULT_INFO_FILE.to_string(),
            max_per_tile: DEFAULT_MAX_PER_TILE,
            pre_fetch: None,
            pre_fetch_zoom_from: 0,
            pre_fetch_zoom_to: None,
            pre_fetch_max_size: DEFAULT_PRE_FETCH_MAX_SIZE,
            from_x: None,
            to_x: None,
            from_y: None,
            to_y: None,
            xlim_rel: false,
            ylim_rel: false,
            limit_excl: false,
            overwrite: false,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_snapshots_config() {
        assert!(snapshots_config().validate().is_ok());
        assert!(!snapshots_config().has_window());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = snapshots_config();
        config.from_x = Some(100.0);
        config.to_x = Some(50.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_quota_rejected() {
        let mut config = snapshots_config();
        config.max_per_tile = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_window_detected() {
        let mut config = snapshots_config();
        config.to_x = Some(500.0);
        assert!(config.has_window());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_image_type_extension() {
        assert_eq!(ImageType::Jpg.extension(), "jpg");
        assert_eq!(ImageType::Png.extension(), "png");
        assert_eq!(ImageType::Gif.extension(), "gif");
    }

    #[test]
    fn test_cli_parses_ingest() {
        let cli = Cli::try_parse_from(["imtiles", "ingest", "tilesdir", "-t", "png", "-v"]).unwrap();
        match cli.command {
            Command::Ingest(config) => {
                assert_eq!(config.dir, PathBuf::from("tilesdir"));
                assert_eq!(config.im_type, ImageType::Png);
                assert!(config.verbose);
                assert!(config.validate().is_ok());
            }
            _ => panic!("expected ingest subcommand"),
        }
    }

    #[test]
    fn test_cli_parses_snapshots() {
        let cli = Cli::try_parse_from([
            "imtiles",
            "snapshots",
            "snaps.json",
            "-m",
            "10",
            "--from-x",
            "0.1",
            "--to-x",
            "0.9",
            "--xlim-rel",
            "--limit-excl",
        ])
        .unwrap();
        match cli.command {
            Command::Snapshots(config) => {
                assert_eq!(config.max_per_tile, 10);
                assert_eq!(config.from_x, Some(0.1));
                assert!(config.xlim_rel);
                assert!(config.limit_excl);
                assert!(config.validate().is_ok());
            }
            _ => panic!("expected snapshots subcommand"),
        }
    }
}
