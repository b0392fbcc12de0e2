//! Bottom-up pyramid construction.
//!
//! The leaf level is binned from vector tiles. Every coarser level is built
//! from the four children of each parent, read back from the store. Levels
//! run strictly in sequence; tiles within a level run on the builder's
//! thread pool. Value ranges are reconciled between levels.
//!
//! ```text
//! leaf tiles (max_zoom) ──bin──► store
//!        │
//!        ▼ parents_of
//! parents (z - 1) ──read children──► merge_and_resample ──► store
//!        │
//!        ▼ ... until min_zoom or no parents
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pyramid_common::{
    DiscoveredRange, PyramidError, PyramidResult, RangeUpdate, ResamplingMethod, TileCoord,
    TileHierarchy, TilingConfig, ValueRangeTracker,
};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::binner::GridBinner;
use crate::raster::Raster;
use crate::store::RasterStore;
use crate::vector::VectorTile;

/// Source of leaf-level polygons.
pub trait VectorSource: Send + Sync {
    /// Tiles that have vector data.
    fn leaf_tiles(&self) -> PyramidResult<Vec<TileCoord>>;

    /// Polygons of one tile.
    fn load(&self, tile: &TileCoord) -> PyramidResult<VectorTile>;
}

/// Step of tile processing where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bounds,
    Load,
    Bin,
    Read,
    Merge,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Bounds => "bounds",
            Stage::Load => "load",
            Stage::Bin => "bin",
            Stage::Read => "read",
            Stage::Merge => "merge",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// A tile that could not be produced (or read), and why.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFailure {
    pub tile: TileCoord,
    pub stage: Stage,
    pub kind: &'static str,
    pub message: String,
}

impl TileFailure {
    pub(crate) fn new(tile: TileCoord, stage: Stage, err: &PyramidError) -> Self {
        Self {
            tile,
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub(crate) fn log(&self) {
        error!(
            tile = %self.tile,
            stage = %self.stage,
            kind = self.kind,
            error = %self.message,
            "Tile failed"
        );
    }
}

/// Outcome of a build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Tiles written, per zoom level.
    pub created: BTreeMap<u32, Vec<TileCoord>>,
    pub failures: Vec<TileFailure>,
    /// Range endpoints filled in from discovered extrema.
    pub range_updates: Vec<RangeUpdate>,
    pub cancelled: bool,
}

impl BuildReport {
    pub fn tiles_at(&self, z: u32) -> &[TileCoord] {
        self.created.get(&z).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_created(&self) -> usize {
        self.created.values().map(Vec::len).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Per-band `(min, max)` of one tile or level.
type Extrema = Vec<(Option<f64>, Option<f64>)>;

/// Result of one tile task.
struct TileOutcome {
    tile: TileCoord,
    /// `Ok(None)` when the tile was skipped.
    result: Result<Option<Extrema>, TileFailure>,
    /// Failures that did not stop the tile (unreadable children).
    side_failures: Vec<TileFailure>,
}

/// Builds every zoom level of a pyramid into a [`RasterStore`].
pub struct PyramidBuilder {
    config: TilingConfig,
    hierarchy: Arc<dyn TileHierarchy>,
    store: Arc<dyn RasterStore>,
    binner: GridBinner,
    methods: Vec<ResamplingMethod>,
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
}

impl PyramidBuilder {
    /// Validate `config` and create a builder. Configuration errors are
    /// returned here, before any tile is touched.
    pub fn new(
        config: TilingConfig,
        hierarchy: Arc<dyn TileHierarchy>,
        store: Arc<dyn RasterStore>,
    ) -> PyramidResult<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers.unwrap_or(0))
            .thread_name(|i| format!("pyramid-worker-{}", i))
            .build()
            .map_err(|e| PyramidError::configuration(format!("cannot start worker pool: {}", e)))?;

        let binner = GridBinner::new(config.shape(), config.statistics.clone())
            .with_centroid_fields(config.centroid_properties.clone());
        let methods = config.resampling_methods();

        info!(
            tms = %hierarchy.identifier(),
            z_min = config.min_zoom(),
            z_max = config.max_zoom(),
            statistics = ?config.stat_names(),
            workers = pool.current_num_threads(),
            "Created pyramid builder"
        );

        Ok(Self {
            config,
            hierarchy,
            store,
            binner,
            methods,
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    /// Flag that stops scheduling new tiles once set. In-flight tiles finish.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Bin every leaf tile of `source`, then build all coarser levels.
    pub fn build(
        &self,
        source: &dyn VectorSource,
        tracker: &mut ValueRangeTracker,
    ) -> PyramidResult<BuildReport> {
        let max_zoom = self.config.max_zoom();
        let mut report = BuildReport::default();

        let mut leaves = BTreeSet::new();
        for tile in source.leaf_tiles()? {
            if tile.z == max_zoom {
                leaves.insert(tile);
            } else {
                let err = PyramidError::invalid_input(format!(
                    "leaf tile is at z={}, expected z={}",
                    tile.z, max_zoom
                ));
                let failure = TileFailure::new(tile, Stage::Bounds, &err);
                failure.log();
                report.failures.push(failure);
            }
        }

        let created = self.run_level(max_zoom, &leaves, tracker, &mut report, |tile| {
            self.build_leaf(source, tile)
        })?;

        self.build_composite_levels(created, max_zoom, tracker, &mut report)?;
        report.cancelled = self.is_cancelled();
        Ok(report)
    }

    /// Build the levels above `start_zoom` from `start_tiles`, which must
    /// already be in the store.
    pub fn build_parents(
        &self,
        start_tiles: &[TileCoord],
        start_zoom: u32,
        tracker: &mut ValueRangeTracker,
    ) -> PyramidResult<BuildReport> {
        let mut report = BuildReport::default();
        let start: BTreeSet<TileCoord> = start_tiles.iter().copied().collect();
        self.build_composite_levels(start, start_zoom, tracker, &mut report)?;
        report.cancelled = self.is_cancelled();
        Ok(report)
    }

    fn build_composite_levels(
        &self,
        mut current: BTreeSet<TileCoord>,
        mut z: u32,
        tracker: &mut ValueRangeTracker,
        report: &mut BuildReport,
    ) -> PyramidResult<()> {
        let min_zoom = self.config.min_zoom();

        while z > min_zoom && !current.is_empty() && !self.is_cancelled() {
            let parent_z = z - 1;
            let parents: BTreeSet<TileCoord> = current
                .iter()
                .flat_map(|tile| self.hierarchy.parents_of(tile, parent_z))
                .collect();

            current = self.run_level(parent_z, &parents, tracker, report, |tile| {
                self.build_parent(tile)
            })?;
            z = parent_z;
        }
        Ok(())
    }

    /// Run `task` for every tile of one level, then reconcile the level's
    /// ranges. Returns the tiles that were created.
    fn run_level<F>(
        &self,
        z: u32,
        tiles: &BTreeSet<TileCoord>,
        tracker: &mut ValueRangeTracker,
        report: &mut BuildReport,
        task: F,
    ) -> PyramidResult<BTreeSet<TileCoord>>
    where
        F: Fn(&TileCoord) -> TileOutcome + Sync,
    {
        let start = Instant::now();
        info!(z = z, tiles = tiles.len(), "Processing level");

        let outcomes: Vec<TileOutcome> = self.pool.install(|| {
            tiles
                .par_iter()
                .map(|tile| {
                    if self.is_cancelled() {
                        return TileOutcome {
                            tile: *tile,
                            result: Ok(None),
                            side_failures: Vec::new(),
                        };
                    }
                    task(tile)
                })
                .collect()
        });

        let mut created = BTreeSet::new();
        let mut level_extrema: Option<Extrema> = None;
        for outcome in outcomes {
            for failure in outcome.side_failures {
                failure.log();
                report.failures.push(failure);
            }
            match outcome.result {
                Ok(Some(extrema)) => {
                    created.insert(outcome.tile);
                    level_extrema = Some(match level_extrema {
                        None => extrema,
                        Some(acc) => combine(acc, &extrema),
                    });
                }
                Ok(None) => {}
                Err(failure) => {
                    failure.log();
                    report.failures.push(failure);
                }
            }
        }

        if !created.is_empty() {
            report.created.insert(z, created.iter().copied().collect());
        }

        if let Some(extrema) = level_extrema {
            let discovered = self.discovered(z, &extrema);
            let updates = tracker.reconcile(&discovered)?;
            for update in &updates {
                info!(
                    stat = %update.stat,
                    z = update.z,
                    endpoint = %update.endpoint,
                    value = update.value,
                    "Set value range"
                );
            }
            report.range_updates.extend(updates);
        }

        info!(
            z = z,
            created = created.len(),
            failures_total = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Level complete"
        );
        Ok(created)
    }

    fn discovered(&self, z: u32, extrema: &Extrema) -> Vec<DiscoveredRange> {
        self.config
            .statistics
            .iter()
            .zip(extrema)
            .map(|(stat, (min, max))| DiscoveredRange {
                stat: stat.name.clone(),
                z,
                min: *min,
                max: *max,
            })
            .collect()
    }

    fn build_leaf(&self, source: &dyn VectorSource, tile: &TileCoord) -> TileOutcome {
        TileOutcome {
            tile: *tile,
            result: self.leaf_raster(source, tile).map(Some),
            side_failures: Vec::new(),
        }
    }

    fn leaf_raster(
        &self,
        source: &dyn VectorSource,
        tile: &TileCoord,
    ) -> Result<Extrema, TileFailure> {
        let bounds = self
            .hierarchy
            .bounds(tile)
            .map_err(|e| TileFailure::new(*tile, Stage::Bounds, &e))?;
        let vectors = source
            .load(tile)
            .map_err(|e| TileFailure::new(*tile, Stage::Load, &e))?;
        let mut raster = self
            .binner
            .bin(&vectors, &bounds)
            .map_err(|e| TileFailure::new(*tile, Stage::Bin, &e))?;
        self.store
            .write(tile, &mut raster)
            .map_err(|e| TileFailure::new(*tile, Stage::Write, &e))?;
        debug!(tile = %tile, polygons = vectors.features.len(), "Created leaf raster");
        Ok(extrema_of(&raster))
    }

    fn build_parent(&self, tile: &TileCoord) -> TileOutcome {
        let mut side_failures = Vec::new();
        let mut children = Vec::with_capacity(4);
        for child in self.hierarchy.children_of(tile) {
            match self.store.read(&child) {
                Ok(Some(raster)) => children.push(raster),
                Ok(None) => {}
                Err(e) => {
                    warn!(tile = %tile, child = %child, error = %e, "Skipping unreadable child");
                    side_failures.push(TileFailure::new(child, Stage::Read, &e));
                }
            }
        }

        let result = if children.is_empty() {
            debug!(tile = %tile, "No children, skipping parent");
            Ok(None)
        } else {
            self.merge_children(tile, &children)
        };

        TileOutcome {
            tile: *tile,
            result,
            side_failures,
        }
    }

    fn merge_children(
        &self,
        tile: &TileCoord,
        children: &[Raster],
    ) -> Result<Option<Extrema>, TileFailure> {
        let bounds = self
            .hierarchy
            .bounds(tile)
            .map_err(|e| TileFailure::new(*tile, Stage::Bounds, &e))?;
        let mut merged =
            Raster::merge_and_resample(children, &self.methods, &bounds, self.config.shape())
                .map_err(|e| TileFailure::new(*tile, Stage::Merge, &e))?;
        self.store
            .write(tile, &mut merged)
            .map_err(|e| TileFailure::new(*tile, Stage::Write, &e))?;
        debug!(tile = %tile, children = children.len(), "Created parent raster");
        Ok(Some(extrema_of(&merged)))
    }
}

fn extrema_of(raster: &Raster) -> Extrema {
    raster.summary().iter().map(|s| (s.min, s.max)).collect()
}

fn combine(acc: Extrema, other: &Extrema) -> Extrema {
    let pick = |a: Option<f64>, b: Option<f64>, f: fn(f64, f64) -> f64| match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    };
    acc.into_iter()
        .zip(other)
        .map(|((min_a, max_a), (min_b, max_b))| {
            (pick(min_a, *min_b, f64::min), pick(max_a, *max_b, f64::max))
        })
        .collect()
}

/// Extrema of the stored rasters of `tiles`, per zoom level and statistic.
///
/// Bands are matched to `stat_names` by position. Missing or unreadable
/// rasters are skipped.
pub fn discover_ranges(
    store: &dyn RasterStore,
    stat_names: &[&str],
    tiles: &[TileCoord],
) -> Vec<DiscoveredRange> {
    let mut per_zoom: BTreeMap<u32, Extrema> = BTreeMap::new();
    for tile in tiles {
        let raster = match store.read(tile) {
            Ok(Some(raster)) => raster,
            Ok(None) => continue,
            Err(e) => {
                warn!(tile = %tile, error = %e, "Skipping unreadable raster");
                continue;
            }
        };
        let extrema = extrema_of(&raster);
        let entry = per_zoom.remove(&tile.z);
        per_zoom.insert(
            tile.z,
            match entry {
                None => extrema,
                Some(acc) => combine(acc, &extrema),
            },
        );
    }

    per_zoom
        .into_iter()
        .flat_map(|(z, extrema)| {
            stat_names
                .iter()
                .zip(extrema)
                .map(move |(stat, (min, max))| DiscoveredRange {
                    stat: stat.to_string(),
                    z,
                    min,
                    max,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
