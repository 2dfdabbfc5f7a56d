//! Snapshot build orchestration.
//!
//! Drives the full snapshots pipeline: load the snapshot list, sort it by
//! descending importance, run quota-bounded placement, and persist each
//! placed annotation together with its spatial index entry. When a source
//! `.imtiles` store is supplied, each placed annotation additionally gets a
//! pyramid of pre-rendered preview images.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::SnapshotsConfig;
use crate::error::{BuildError, IngestError};
use crate::ingest::TileSourceInfo;
use crate::place::{PlacementEngine, PlacementStats, WindowMode};
use crate::pyramid::{PixelRect, TilesetInfo};
use crate::render::RegionRenderer;
use crate::store::sqlite::SqliteStore;
use crate::store::TileStore;

// =============================================================================
// Snapshot input
// =============================================================================

/// One snapshot from the input file: a rectangular region of interest with
/// its view count (importance) and display metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub views: f64,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl SnapshotRecord {
    /// Integer bounding rectangle: floor the mins, ceil the maxes, and
    /// widen to at least one pixel per axis so the rect is never degenerate.
    pub fn rect(&self) -> PixelRect {
        let x_min = self.xmin.floor() as i64;
        let mut x_max = self.xmax.ceil() as i64;
        let y_min = self.ymin.floor() as i64;
        let mut y_max = self.ymax.ceil() as i64;
        if x_max <= x_min {
            x_max = x_min + 1;
        }
        if y_max <= y_min {
            y_max = y_min + 1;
        }
        PixelRect {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Opaque payload stored alongside the placed annotation.
    pub fn fields(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "name": self.name,
            "description": self.description,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotEntry {
    snapshot: SnapshotRecord,
}

/// Load the snapshots file and sort by descending view count, so placement
/// hands the coarse zoom levels to the most-viewed snapshots first.
pub fn load_snapshots(path: &Path) -> Result<Vec<SnapshotRecord>, BuildError> {
    let data = fs::read_to_string(path)?;
    let entries: Vec<SnapshotEntry> = serde_json::from_str(&data)?;
    let mut snapshots: Vec<SnapshotRecord> = entries.into_iter().map(|e| e.snapshot).collect();
    snapshots.sort_by(|a, b| b.views.total_cmp(&a.views));
    Ok(snapshots)
}

// =============================================================================
// Placement loop
// =============================================================================

/// Preview pre-rendering settings for one build run.
pub struct Prefetch<'a, R: TileStore> {
    pub renderer: &'a RegionRenderer<R>,
    pub zoom_from: u32,
    pub zoom_to: u32,
    pub max_size: u32,
}

/// Place every snapshot and persist the results.
///
/// Each placed annotation is committed (row + spatial index entry) before
/// the next snapshot is attempted; with `prefetch` set, its preview pyramid
/// is rendered and cached under `(annotation_id, zoom)`. Returns the number
/// of preview images written.
pub fn place_all<S, R>(
    store: &mut S,
    engine: &mut PlacementEngine,
    snapshots: &[SnapshotRecord],
    prefetch: Option<Prefetch<'_, R>>,
) -> Result<u64, BuildError>
where
    S: TileStore,
    R: TileStore,
{
    let mut previews = 0u64;

    for snapshot in snapshots {
        let Some(annotation) = engine.place(snapshot.rect(), snapshot.views, snapshot.fields())
        else {
            continue;
        };
        debug!(id = annotation.id, zoom = annotation.zoom, "placed annotation");
        store.put_annotation(&annotation)?;

        if let Some(prefetch) = &prefetch {
            let images = prefetch.renderer.render_pyramid(
                &annotation.rect,
                prefetch.zoom_from,
                prefetch.zoom_to,
                prefetch.max_size,
            )?;
            for (zoom, data) in images {
                store.put_preview(annotation.id, zoom, data)?;
                previews += 1;
            }
        }
    }

    Ok(previews)
}

// =============================================================================
// Pipeline
// =============================================================================

/// Summary of one snapshot build.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub output: PathBuf,
    pub stats: PlacementStats,
    pub previews: u64,
}

/// Run the full snapshots pipeline against SQLite stores.
pub fn build_snapshots(config: &SnapshotsConfig) -> Result<BuildSummary, BuildError> {
    if !config.file.is_file() {
        return Err(BuildError::SnapshotsNotFound(config.file.clone()));
    }
    let base_dir = match config.file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let info_path = resolve_info_path(&base_dir, &config.info)?;
    let source_info = TileSourceInfo::load(&info_path).map_err(|e| match e {
        IngestError::Io(io) => BuildError::Io(io),
        other => BuildError::InvalidInput(other.to_string()),
    })?;
    let tileset = source_info
        .to_tileset_info(None)
        .map_err(|e| BuildError::InvalidInput(e.to_string()))?;

    let output = config
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.multires.db", base_dir.display())));

    let snapshots = load_snapshots(&config.file)?;
    info!(count = snapshots.len(), "loaded snapshots");

    let mut store = SqliteStore::create(&output, config.overwrite)?;
    store.put_tileset_info(&tileset)?;

    let mut engine = PlacementEngine::new(tileset.clone(), config.max_per_tile);
    if let Some((window, mode)) = resolve_window(config, &tileset)? {
        info!(?window, ?mode, "filtering snapshots by window");
        engine = engine.with_window(window, mode);
    }

    let renderer = match &config.pre_fetch {
        Some(path) => {
            let resolved = if path.is_file() {
                path.clone()
            } else {
                base_dir.join(path)
            };
            Some(RegionRenderer::new(SqliteStore::open(&resolved)?)?)
        }
        None => None,
    };
    let zoom_to = config
        .pre_fetch_zoom_to
        .unwrap_or(tileset.max_zoom)
        .min(tileset.max_zoom);

    let prefetch = renderer.as_ref().map(|renderer| Prefetch {
        renderer,
        zoom_from: config.pre_fetch_zoom_from,
        zoom_to,
        max_size: config.pre_fetch_max_size,
    });

    let previews = place_all(&mut store, &mut engine, &snapshots, prefetch)?;

    let stats = engine.stats();
    info!(
        placed = stats.placed,
        dropped = stats.dropped,
        filtered = stats.filtered,
        previews,
        "snapshot build finished"
    );

    Ok(BuildSummary {
        output,
        stats,
        previews,
    })
}

/// Locate the info file: as given, then inside `base_dir`, then the default
/// `info.json` next to the snapshots file.
fn resolve_info_path(base_dir: &Path, info_name: &str) -> Result<PathBuf, BuildError> {
    let direct = PathBuf::from(info_name);
    if direct.is_file() {
        return Ok(direct);
    }
    let candidate = base_dir.join(info_name);
    if candidate.is_file() {
        return Ok(candidate);
    }
    let fallback = base_dir.join(crate::config::DEFAULT_INFO_FILE);
    if fallback.is_file() {
        info!("using default tile set info file");
        return Ok(fallback);
    }
    Err(BuildError::InfoNotFound(candidate))
}

/// Translate the window limits into a pixel-space filter rectangle.
///
/// Missing limits are unbounded on that side. Relative limits are fractions
/// of the full pyramid width (x) or height (y).
fn resolve_window(
    config: &SnapshotsConfig,
    info: &TilesetInfo,
) -> Result<Option<(PixelRect, WindowMode)>, BuildError> {
    if !config.has_window() {
        return Ok(None);
    }

    let scale_x = if config.xlim_rel {
        info.width as f64
    } else {
        1.0
    };
    let scale_y = if config.ylim_rel {
        info.height as f64
    } else {
        1.0
    };

    // Half of the i64 range keeps unbounded sides from overflowing any
    // downstream arithmetic.
    const UNBOUNDED: i64 = i64::MAX / 2;
    let lower = |v: Option<f64>, scale: f64| {
        v.map(|v| (v * scale).round() as i64).unwrap_or(-UNBOUNDED)
    };
    let upper = |v: Option<f64>, scale: f64| {
        v.map(|v| (v * scale).round() as i64).unwrap_or(UNBOUNDED)
    };

    let window = PixelRect::new(
        lower(config.from_x, scale_x),
        upper(config.to_x, scale_x),
        lower(config.from_y, scale_y),
        upper(config.to_y, scale_y),
    )
    .map_err(|e| BuildError::InvalidInput(e.to_string()))?;

    let mode = if config.limit_excl {
        WindowMode::Within
    } else {
        WindowMode::Overlap
    };
    Ok(Some((window, mode)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn snapshot(views: f64, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> SnapshotRecord {
        SnapshotRecord {
            id: json!(1),
            created_at: Some("2018-01-01".to_string()),
            name: Some("region".to_string()),
            description: None,
            views,
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    fn tileset() -> TilesetInfo {
        TilesetInfo::new(256, 2, 1024, 1024, None).unwrap()
    }

    #[test]
    fn test_rect_rounds_outward_and_never_degenerates() {
        let rect = snapshot(1.0, 10.4, 20.6, 5.0, 5.0).rect();
        assert_eq!(rect.x_min, 10);
        assert_eq!(rect.x_max, 21);
        // Equal y bounds widen to one pixel.
        assert_eq!(rect.y_min, 5);
        assert_eq!(rect.y_max, 6);
    }

    #[test]
    fn test_load_snapshots_sorts_by_views_descending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let entries = json!([
            { "snapshot": { "id": 1, "views": 5.0,
                "xmin": 0.0, "xmax": 10.0, "ymin": 0.0, "ymax": 10.0 } },
            { "snapshot": { "id": 2, "views": 50.0,
                "xmin": 0.0, "xmax": 10.0, "ymin": 0.0, "ymax": 10.0 } },
            { "snapshot": { "id": 3, "views": 20.0,
                "xmin": 0.0, "xmax": 10.0, "ymin": 0.0, "ymax": 10.0 } },
        ]);
        fs::write(&path, entries.to_string()).unwrap();

        let snapshots = load_snapshots(&path).unwrap();
        let views: Vec<f64> = snapshots.iter().map(|s| s.views).collect();
        assert_eq!(views, vec![50.0, 20.0, 5.0]);
    }

    #[test]
    fn test_place_all_persists_annotations_and_stats() {
        let mut store = MemoryStore::new();
        store.put_tileset_info(&tileset()).unwrap();

        let snapshots = vec![
            snapshot(50.0, 0.0, 100.0, 0.0, 100.0),
            snapshot(20.0, 0.0, 100.0, 0.0, 100.0),
        ];
        let mut engine = PlacementEngine::new(tileset(), 1);

        let previews =
            place_all::<_, MemoryStore>(&mut store, &mut engine, &snapshots, None).unwrap();
        assert_eq!(previews, 0);
        assert_eq!(store.annotation_count(), 2);

        // Most-viewed snapshot claimed the coarsest level.
        let first = store.get_annotation(0).unwrap();
        assert_eq!(first.zoom, 0);
        assert_eq!(first.importance, 50.0);
        let second = store.get_annotation(1).unwrap();
        assert_eq!(second.zoom, 1);
    }

    #[test]
    fn test_place_all_with_prefetch_caches_previews() {
        // Source pyramid: 4px tiles, 8x8 image, two levels.
        let mut tiles = MemoryStore::new();
        let info = TilesetInfo::new(4, 1, 8, 8, Some("png".to_string())).unwrap();
        tiles.put_tileset_info(&info).unwrap();
        let pixels = vec![200u8; 4 * 4 * 4];
        let tile = crate::codec::png::encode_rgba(&pixels, 4, 4, 9).unwrap();
        for (zoom, per_axis) in [(0u32, 1i64), (1, 2)] {
            for row in 0..per_axis {
                for col in 0..per_axis {
                    tiles
                        .put_tile(crate::store::TileKey::new(zoom, row, col), tile.clone())
                        .unwrap();
                }
            }
        }
        let renderer = RegionRenderer::new(tiles).unwrap();

        let mut store = MemoryStore::new();
        store.put_tileset_info(&info).unwrap();
        let mut engine = PlacementEngine::new(info, 25);

        let snapshots = vec![snapshot(10.0, 0.0, 8.0, 0.0, 8.0)];
        let previews = place_all(
            &mut store,
            &mut engine,
            &snapshots,
            Some(Prefetch {
                renderer: &renderer,
                zoom_from: 0,
                zoom_to: 1,
                max_size: 512,
            }),
        )
        .unwrap();

        assert_eq!(previews, 2);
        assert!(store.get_preview(0, 0).is_ok());
        assert!(store.get_preview(0, 1).is_ok());
    }

    #[test]
    fn test_resolve_window_absolute_and_relative() {
        let info = tileset();

        let mut config = crate::config::SnapshotsConfig {
            file: PathBuf::from("s.json"),
            output: None,
            info: "info.json".to_string(),
            max_per_tile: 25,
            pre_fetch: None,
            pre_fetch_zoom_from: 0,
            pre_fetch_zoom_to: None,
            pre_fetch_max_size: 512,
            from_x: Some(100.0),
            to_x: Some(500.0),
            from_y: None,
            to_y: None,
            xlim_rel: false,
            ylim_rel: false,
            limit_excl: false,
            overwrite: false,
            verbose: false,
        };

        let (window, mode) = resolve_window(&config, &info).unwrap().unwrap();
        assert_eq!(window.x_min, 100);
        assert_eq!(window.x_max, 500);
        assert_eq!(mode, WindowMode::Overlap);
        // Unset y limits stay effectively unbounded.
        assert!(window.y_min < -1_000_000_000);
        assert!(window.y_max > 1_000_000_000);

        // Fractions scale by the pyramid extent.
        config.xlim_rel = true;
        config.from_x = Some(0.25);
        config.to_x = Some(0.75);
        config.limit_excl = true;
        let (window, mode) = resolve_window(&config, &info).unwrap().unwrap();
        assert_eq!(window.x_min, 256);
        assert_eq!(window.x_max, 768);
        assert_eq!(mode, WindowMode::Within);
    }

    #[test]
    fn test_build_snapshots_missing_file() {
        let config = crate::config::SnapshotsConfig {
            file: PathBuf::from("/nonexistent/snapshots.json"),
            output: None,
            info: "info.json".to_string(),
            max_per_tile: 25,
            pre_fetch: None,
            pre_fetch_zoom_from: 0,
            pre_fetch_zoom_to: None,
            pre_fetch_max_size: 512,
            from_x: None,
            to_x: None,
            from_y: None,
            to_y: None,
            xlim_rel: false,
            ylim_rel: false,
            limit_excl: false,
            overwrite: false,
            verbose: false,
        };
        let result = build_snapshots(&config);
        assert!(matches!(result, Err(BuildError::SnapshotsNotFound(_))));
    }
}
