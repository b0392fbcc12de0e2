//! End-to-end pyramid builds over a temporary directory.
//!
//! Uses the WorldCRS84Quad hierarchy, a 2x2 tile size and a small zoom range
//! so every level can be checked by hand.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use grid_processor::{
    discover_ranges, Band, FileRasterStore, PolygonFeature, PyramidBuilder, Raster, RasterStore,
    Stage, VectorSource, VectorTile, WebTileWriter,
};
use pyramid_common::{
    PyramidError, PyramidResult, TileCoord, TileHierarchy, TileMatrixSet, TilePathLayout,
    TilingConfig, ValueRange, ValueRangeTracker,
};
use tempfile::TempDir;
use test_utils::{assert_band_eq, cell_polygons, constant_band, count_stat, coverage_stat};

// ============================================================================
// Helpers
// ============================================================================

/// Vector tiles held in memory. Tiles in `broken` fail to load.
#[derive(Default)]
struct MemorySource {
    tiles: BTreeMap<TileCoord, VectorTile>,
    broken: BTreeSet<TileCoord>,
}

impl MemorySource {
    /// One polygon per raster cell of each tile.
    fn filled(tms: &TileMatrixSet, tiles: &[TileCoord], shape: (usize, usize)) -> Self {
        let tiles = tiles
            .iter()
            .map(|tile| {
                let bounds = tms.bounds(tile).unwrap();
                let features = cell_polygons(&bounds, shape.0, shape.1)
                    .into_iter()
                    .map(PolygonFeature::new)
                    .collect();
                (*tile, VectorTile::new("EPSG:4326", features))
            })
            .collect();
        Self {
            tiles,
            broken: BTreeSet::new(),
        }
    }
}

impl VectorSource for MemorySource {
    fn leaf_tiles(&self) -> PyramidResult<Vec<TileCoord>> {
        Ok(self
            .tiles
            .keys()
            .chain(self.broken.iter())
            .copied()
            .collect())
    }

    fn load(&self, tile: &TileCoord) -> PyramidResult<VectorTile> {
        if self.broken.contains(tile) {
            return Err(PyramidError::invalid_input(format!("cannot load {}", tile)));
        }
        self.tiles
            .get(tile)
            .cloned()
            .ok_or_else(|| PyramidError::invalid_input(format!("no data for {}", tile)))
    }
}

fn config(dir: &Path, z_range: (u32, u32)) -> TilingConfig {
    TilingConfig {
        geotiff_dir: dir.join("rasters"),
        web_tiles_dir: dir.join("web"),
        z_range,
        tile_size: (2, 2),
        statistics: vec![count_stat()],
        max_workers: Some(2),
        ..Default::default()
    }
}

struct Fixture {
    _dir: TempDir,
    tms: Arc<TileMatrixSet>,
    store: Arc<FileRasterStore>,
    builder: PyramidBuilder,
}

fn fixture(z_range: (u32, u32)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), z_range);
    let tms = Arc::new(TileMatrixSet::from_id(&config.tms_id).unwrap());
    let store = Arc::new(FileRasterStore::new(
        TilePathLayout::rasters(&config).unwrap(),
    ));
    let builder = PyramidBuilder::new(config, tms.clone(), store.clone()).unwrap();
    Fixture {
        _dir: dir,
        tms,
        store,
        builder,
    }
}

fn band_sum(store: &FileRasterStore, tile: &TileCoord) -> f64 {
    let raster = store.read(tile).unwrap().unwrap();
    raster.summary()[0].sum.unwrap_or(0.0)
}

/// Four leaves under (1, 0, 0) and one under (1, 2, 1).
fn leaves() -> Vec<TileCoord> {
    vec![
        TileCoord::new(2, 0, 0),
        TileCoord::new(2, 1, 0),
        TileCoord::new(2, 0, 1),
        TileCoord::new(2, 1, 1),
        TileCoord::new(2, 4, 2),
    ]
}

// ============================================================================
// Full builds
// ============================================================================

#[test]
fn test_build_creates_every_level() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(&f.tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);

    let report = f.builder.build(&source, &mut tracker).unwrap();

    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.tiles_at(2).len(), 5);
    assert_eq!(
        report.tiles_at(1),
        &[TileCoord::new(1, 0, 0), TileCoord::new(1, 2, 1)]
    );
    assert_eq!(
        report.tiles_at(0),
        &[TileCoord::new(0, 0, 0), TileCoord::new(0, 1, 0)]
    );
    assert_eq!(report.total_created(), 9);
}

#[test]
fn test_count_is_conserved_across_levels() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(&f.tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    let report = f.builder.build(&source, &mut tracker).unwrap();

    for z in 0..=2 {
        let total: f64 = report
            .tiles_at(z)
            .iter()
            .map(|tile| band_sum(&f.store, tile))
            .sum();
        assert_eq!(total, 20.0, "polygon count at z={}", z);
    }
}

#[test]
fn test_parent_with_missing_children_has_nodata() {
    let f = fixture((1, 2));
    let source = MemorySource::filled(&f.tms, &[TileCoord::new(2, 4, 2)], (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    f.builder.build(&source, &mut tracker).unwrap();

    let parent = f.store.read(&TileCoord::new(1, 2, 1)).unwrap().unwrap();
    assert_band_eq!(
        parent.bands()[0].data,
        vec![vec![Some(4.0), None], vec![None, None]]
    );
}

#[test]
fn test_build_discovers_per_zoom_ranges() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(&f.tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    let report = f.builder.build(&source, &mut tracker).unwrap();

    // (0, 1, 0) only holds the 4 polygons of (2, 4, 2).
    let expected = [(2, 1.0, 1.0), (1, 4.0, 4.0), (0, 4.0, 16.0)];
    for (z, min, max) in expected {
        assert_eq!(
            tracker.get("polygon_count", Some(z), false).unwrap(),
            Some(ValueRange::new(Some(min), Some(max))),
            "range at z={}",
            z
        );
    }
    // Two endpoints per level.
    assert_eq!(report.range_updates.len(), 6);
}

#[test]
fn test_configured_ranges_are_kept() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), (1, 2));
    config.statistics[0].val_range = Some(ValueRange::new(Some(0.0), Some(100.0)));
    let tms = Arc::new(TileMatrixSet::from_id(&config.tms_id).unwrap());
    let store = Arc::new(FileRasterStore::new(
        TilePathLayout::rasters(&config).unwrap(),
    ));
    let builder = PyramidBuilder::new(config, tms.clone(), store).unwrap();

    let source = MemorySource::filled(&tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&builder.config().statistics);
    let report = builder.build(&source, &mut tracker).unwrap();

    assert!(report.range_updates.is_empty());
    assert_eq!(tracker.get("polygon_count", Some(2), false).unwrap(), None);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_failed_leaf_does_not_stop_siblings() {
    let f = fixture((1, 2));
    let mut source = MemorySource::filled(&f.tms, &[TileCoord::new(2, 0, 0)], (2, 2));
    source.broken.insert(TileCoord::new(2, 1, 0));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);

    let report = f.builder.build(&source, &mut tracker).unwrap();

    assert_eq!(report.tiles_at(2), &[TileCoord::new(2, 0, 0)]);
    assert_eq!(report.tiles_at(1), &[TileCoord::new(1, 0, 0)]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].tile, TileCoord::new(2, 1, 0));
    assert_eq!(report.failures[0].stage, Stage::Load);
    assert!(!report.is_success());
}

#[test]
fn test_leaf_at_wrong_zoom_is_reported() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(
        &f.tms,
        &[TileCoord::new(2, 0, 0), TileCoord::new(1, 0, 0)],
        (2, 2),
    );
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);

    let report = f.builder.build(&source, &mut tracker).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].tile, TileCoord::new(1, 0, 0));
    assert_eq!(report.failures[0].kind, "InvalidInput");
    assert_eq!(report.tiles_at(2), &[TileCoord::new(2, 0, 0)]);
}

#[test]
fn test_corrupt_child_is_skipped() {
    let f = fixture((1, 2));
    let source = MemorySource::filled(
        &f.tms,
        &[TileCoord::new(2, 0, 0), TileCoord::new(2, 1, 0)],
        (2, 2),
    );
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    f.builder.build(&source, &mut tracker).unwrap();

    // Corrupt one child and rebuild the parent from the stored leaves.
    let corrupt = TileCoord::new(2, 1, 0);
    std::fs::write(f.store.path(&corrupt), b"garbage").unwrap();
    let report = f
        .builder
        .build_parents(
            &[TileCoord::new(2, 0, 0), corrupt],
            2,
            &mut tracker,
        )
        .unwrap();

    assert_eq!(report.tiles_at(1), &[TileCoord::new(1, 0, 0)]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].tile, corrupt);
    assert_eq!(report.failures[0].stage, Stage::Read);
    assert_eq!(band_sum(&f.store, &TileCoord::new(1, 0, 0)), 4.0);
}

#[test]
fn test_unmergeable_children_fail_only_their_parent() {
    let f = fixture((1, 2));
    let store_leaf = |tile: TileCoord, band_names: &[&str]| {
        let bands = band_names
            .iter()
            .map(|name| Band::new(*name, constant_band(2, 2, 1.0)))
            .collect();
        let mut raster =
            Raster::new(f.tms.bounds(&tile).unwrap(), "EPSG:4326", bands, false).unwrap();
        f.store.write(&tile, &mut raster).unwrap();
    };
    // (1, 0, 0) gets children with one and two bands; (1, 2, 1) is consistent.
    store_leaf(TileCoord::new(2, 0, 0), &["polygon_count"]);
    store_leaf(TileCoord::new(2, 1, 0), &["polygon_count", "extra"]);
    store_leaf(TileCoord::new(2, 4, 2), &["polygon_count"]);
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);

    let report = f
        .builder
        .build_parents(&leaves(), 2, &mut tracker)
        .unwrap();

    assert_eq!(report.tiles_at(1), &[TileCoord::new(1, 2, 1)]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].tile, TileCoord::new(1, 0, 0));
    assert_eq!(report.failures[0].stage, Stage::Merge);
    assert_eq!(report.failures[0].kind, "Merge");
    assert!(f.store.read(&TileCoord::new(1, 0, 0)).unwrap().is_none());
    assert_eq!(band_sum(&f.store, &TileCoord::new(1, 2, 1)), 4.0);
}

#[test]
fn test_invalid_config_rejected_before_build() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), (0, 2));
    config.statistics.push(count_stat());
    let tms = Arc::new(TileMatrixSet::from_id(&config.tms_id).unwrap());
    let store = Arc::new(FileRasterStore::new(
        TilePathLayout::rasters(&config).unwrap(),
    ));

    let result = PyramidBuilder::new(config, tms, store);
    assert!(matches!(result, Err(PyramidError::Configuration(_))));
}

// ============================================================================
// Parents only and cancellation
// ============================================================================

#[test]
fn test_build_parents_from_stored_leaves() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(&f.tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    f.builder.build(&source, &mut tracker).unwrap();

    let mut fresh = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    let report = f.builder.build_parents(&leaves(), 2, &mut fresh).unwrap();

    assert!(report.tiles_at(2).is_empty());
    assert_eq!(report.tiles_at(1).len(), 2);
    assert_eq!(report.tiles_at(0).len(), 2);
    assert_eq!(band_sum(&f.store, &TileCoord::new(0, 0, 0)), 16.0);
}

#[test]
fn test_cancelled_build_creates_nothing() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(&f.tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);

    f.builder.cancel();
    let report = f.builder.build(&source, &mut tracker).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.total_created(), 0);
    assert!(!report.is_success());
    assert!(f.store.read(&TileCoord::new(2, 0, 0)).unwrap().is_none());
}

// ============================================================================
// Ranges from stored rasters
// ============================================================================

#[test]
fn test_discover_ranges_per_zoom() {
    let f = fixture((0, 2));
    let source = MemorySource::filled(&f.tms, &leaves(), (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);
    let report = f.builder.build(&source, &mut tracker).unwrap();

    let tiles: Vec<TileCoord> = report.created.values().flatten().copied().collect();
    let discovered = discover_ranges(f.store.as_ref(), &["polygon_count"], &tiles);

    assert_eq!(discovered.len(), 3);
    let leaf = discovered.iter().find(|d| d.z == 2).unwrap();
    assert_eq!((leaf.min, leaf.max), (Some(1.0), Some(1.0)));
    let top = discovered.iter().find(|d| d.z == 0).unwrap();
    assert_eq!((top.min, top.max), (Some(4.0), Some(16.0)));
}

// ============================================================================
// Web tiles
// ============================================================================

#[test]
fn test_web_tiles_written_per_statistic() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), (1, 2));
    config.statistics.push(coverage_stat());
    let tms = Arc::new(TileMatrixSet::from_id(&config.tms_id).unwrap());
    let store = Arc::new(FileRasterStore::new(
        TilePathLayout::rasters(&config).unwrap(),
    ));
    let builder = PyramidBuilder::new(config.clone(), tms.clone(), store.clone()).unwrap();

    let source = MemorySource::filled(&tms, &leaves()[..4], (2, 2));
    let mut tracker = ValueRangeTracker::from_statistics(&config.statistics);
    let report = builder.build(&source, &mut tracker).unwrap();
    let tiles: Vec<TileCoord> = report.created.values().flatten().copied().collect();

    let writer = WebTileWriter::new(&config).unwrap();
    let web = writer.write_tiles(store.as_ref(), &tiles, &tracker);

    assert!(web.failures.is_empty());
    // Five tiles, two statistics each.
    assert_eq!(web.written.len(), 10);

    let png = writer
        .layout()
        .path(&TileCoord::new(1, 0, 0), Some("coverage"));
    assert!(png.starts_with(dir.path().join("web").join("WorldCRS84Quad").join("coverage")));
    let bytes = std::fs::read(&png).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn test_web_tiles_skip_missing_rasters() {
    let f = fixture((0, 2));
    let writer = WebTileWriter::new(f.builder.config()).unwrap();
    let tracker = ValueRangeTracker::from_statistics(&f.builder.config().statistics);

    let web = writer.write_tiles(f.store.as_ref(), &[TileCoord::new(2, 3, 3)], &tracker);
    assert!(web.written.is_empty());
    assert!(web.failures.is_empty());
}
