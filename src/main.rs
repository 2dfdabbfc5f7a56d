//! imtiles - multi-resolution tile store and snapshot placement tooling.
//!
//! This binary wires the CLI to the two batch pipelines.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imtiles::{
    build_snapshots, ingest_tiles, Cli, Command, IngestConfig, SnapshotsConfig,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Ingest(config) => run_ingest(config),
        Command::Snapshots(config) => run_snapshots(config),
    }
}

// =============================================================================
// Ingest Command
// =============================================================================

fn run_ingest(config: IngestConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Converting tiles in '{}'", config.dir.display());

    match ingest_tiles(&config) {
        Ok(summary) => {
            info!(
                "Wrote {} tiles ({} zoom levels) to '{}'",
                summary.tiles_written,
                summary.info.max_zoom + 1,
                summary.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Snapshots Command
// =============================================================================

fn run_snapshots(config: SnapshotsConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Placing snapshots from '{}'", config.file.display());

    match build_snapshots(&config) {
        Ok(summary) => {
            let stats = summary.stats;
            info!(
                "Placed {} snapshots ({} dropped, {} outside window) into '{}'",
                stats.placed,
                stats.dropped,
                stats.filtered,
                summary.output.display()
            );
            if summary.previews > 0 {
                info!("Pre-rendered {} preview images", summary.previews);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Snapshot build failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "imtiles=debug" } else { "imtiles=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
