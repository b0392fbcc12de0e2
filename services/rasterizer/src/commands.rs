//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use grid_processor::{discover_ranges, FileRasterStore, PyramidBuilder, WebTileWriter};
use pyramid_common::{
    BoundingBox, TileCoord, TileMatrixSet, TilePathLayout, TilingConfig, ValueRangeTracker,
};
use tracing::{info, warn};
use wmts_protocol::{CapabilitiesBuilder, CAPABILITIES_FILE};

use crate::discovery::stored_tiles;

/// Build every level above `from_zoom` (default: max zoom) from the stored
/// rasters. Returns the config with the discovered ranges filled in.
pub fn parents(config: &TilingConfig, from_zoom: Option<u32>) -> Result<TilingConfig> {
    let hierarchy = Arc::new(TileMatrixSet::from_id(&config.tms_id)?);
    let layout = TilePathLayout::rasters(config)?;
    let store = Arc::new(FileRasterStore::new(layout.clone()));

    let start_zoom = from_zoom.unwrap_or(config.max_zoom());
    let tiles = stored_tiles(&layout, Some(start_zoom))?;
    if tiles.is_empty() {
        warn!(
            z = start_zoom,
            dir = %layout.base_dir().display(),
            "No stored rasters to build parents from"
        );
    }

    let mut tracker = ValueRangeTracker::from_statistics(&config.statistics);
    let start_ranges = discover_ranges(store.as_ref(), &config.stat_names(), &tiles);
    tracker.reconcile(&start_ranges)?;

    let builder = PyramidBuilder::new(config.clone(), hierarchy, store)?;
    let report = builder.build_parents(&tiles, start_zoom, &mut tracker)?;

    info!(
        start_tiles = tiles.len(),
        created = report.total_created(),
        failures = report.failures.len(),
        "Parent levels complete"
    );
    if !report.failures.is_empty() {
        warn!(failures = report.failures.len(), "Some tiles failed, see errors above");
    }

    let mut updated = config.clone();
    tracker.apply_to(&mut updated.statistics);
    Ok(updated)
}

/// Render web tiles for the stored rasters, optionally only at `zooms`.
pub fn web_tiles(config: &TilingConfig, zooms: &[u32]) -> Result<()> {
    let layout = TilePathLayout::rasters(config)?;
    let store = FileRasterStore::new(layout.clone());

    let mut tiles = stored_tiles(&layout, None)?;
    if !zooms.is_empty() {
        tiles.retain(|tile| zooms.contains(&tile.z));
    }

    let tracker = ValueRangeTracker::from_statistics(&config.statistics);
    let writer = WebTileWriter::new(config)?;
    let report = writer.write_tiles(&store, &tiles, &tracker);

    if !report.failures.is_empty() {
        bail!(
            "{} of {} tiles could not be rendered",
            report.failures.len(),
            tiles.len()
        );
    }
    Ok(())
}

/// Write the capabilities document. Layer bounds cover the stored rasters
/// at the max zoom, or the whole matrix set when there are none.
pub fn capabilities(
    config: &TilingConfig,
    title: &str,
    base_url: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let tms = TileMatrixSet::from_id(&config.tms_id)?;
    let layout = TilePathLayout::rasters(config)?;
    let tiles = stored_tiles(&layout, Some(config.max_zoom()))?;

    let bounds = lonlat_extent(&tms, &tiles)
        .or_else(|| lonlat_extent(&tms, &level_zero(&tms)))
        .context("cannot determine the layer extent")?;

    let xml = CapabilitiesBuilder::from_config(config, title, base_url, bounds)?.build();
    let output = output.unwrap_or_else(|| config.web_tiles_dir.join(CAPABILITIES_FILE));
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, xml).with_context(|| format!("cannot write {}", output.display()))?;

    info!(path = %output.display(), tiles = tiles.len(), "Wrote WMTS capabilities");
    Ok(())
}

/// Fill missing ranges from every stored raster. Returns the updated config.
pub fn ranges(config: &TilingConfig) -> Result<TilingConfig> {
    let layout = TilePathLayout::rasters(config)?;
    let store = FileRasterStore::new(layout.clone());
    let tiles = stored_tiles(&layout, None)?;

    let discovered = discover_ranges(&store, &config.stat_names(), &tiles);
    let mut tracker = ValueRangeTracker::from_statistics(&config.statistics);
    let updates = tracker.reconcile(&discovered)?;
    for update in &updates {
        info!(update = %update, "Set value range");
    }
    info!(tiles = tiles.len(), updates = updates.len(), "Range discovery complete");

    let mut updated = config.clone();
    tracker.apply_to(&mut updated.statistics);
    Ok(updated)
}

fn lonlat_extent(tms: &TileMatrixSet, tiles: &[TileCoord]) -> Option<BoundingBox> {
    tiles
        .iter()
        .filter_map(|tile| tms.tile_bounds_lonlat(tile))
        .reduce(|a, b| a.union(&b))
}

fn level_zero(tms: &TileMatrixSet) -> Vec<TileCoord> {
    let Some(matrix) = tms.get_matrix_by_zoom(0) else {
        return Vec::new();
    };
    (0..matrix.matrix_width)
        .flat_map(|x| (0..matrix.matrix_height).map(move |y| TileCoord::new(0, x, y)))
        .collect()
}
