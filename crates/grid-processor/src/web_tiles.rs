//! Rendering stored rasters to color-mapped web tiles.

use std::path::PathBuf;
use std::time::Instant;

use pyramid_common::{
    PyramidResult, TileCoord, TilePathLayout, TilingConfig, ValueRangeTracker,
};
use rayon::prelude::*;
use renderer::{Palette, WebImage};
use tracing::{debug, info};

use crate::pyramid::{Stage, TileFailure};
use crate::raster::Raster;
use crate::store::RasterStore;

/// Outcome of rendering a set of tiles.
#[derive(Debug, Clone, Default)]
pub struct WebTileReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<TileFailure>,
}

/// Writes one image per statistic for each raster tile.
#[derive(Debug, Clone)]
pub struct WebTileWriter {
    layout: TilePathLayout,
    palettes: Vec<(String, Palette)>,
}

impl WebTileWriter {
    pub fn new(config: &TilingConfig) -> PyramidResult<Self> {
        let palettes = config
            .statistics
            .iter()
            .map(|s| Ok((s.name.clone(), Palette::for_statistic(s)?)))
            .collect::<PyramidResult<Vec<_>>>()?;
        Ok(Self {
            layout: TilePathLayout::web_tiles(config)?,
            palettes,
        })
    }

    pub fn layout(&self) -> &TilePathLayout {
        &self.layout
    }

    /// Palette used for `stat`, if configured.
    pub fn palette(&self, stat: &str) -> Option<&Palette> {
        self.palettes.iter().find(|(n, _)| n == stat).map(|(_, p)| p)
    }

    /// Render every band of `raster` with its statistic's palette and the
    /// tracker's range at the tile's zoom (general range substituted).
    /// Missing endpoints fall back to the band's own extrema.
    pub fn write_tile(
        &self,
        tile: &TileCoord,
        raster: &Raster,
        tracker: &ValueRangeTracker,
    ) -> PyramidResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(raster.bands().len());

        for ((stat, palette), band) in self.palettes.iter().zip(raster.bands()) {
            let range = tracker.get(stat, Some(tile.z), true)?;
            let image = WebImage::new(
                &band.data,
                palette,
                range.and_then(|r| r.min),
                range.and_then(|r| r.max),
            );
            let path = self.layout.path(tile, Some(stat));
            image.save(&path)?;
            debug!(tile = %tile, stat = %stat, range = ?image.value_range(), "Wrote web tile");
            written.push(path);
        }
        Ok(written)
    }

    /// Render the stored rasters of `tiles` in parallel. Tiles absent from
    /// the store are skipped.
    pub fn write_tiles(
        &self,
        store: &dyn RasterStore,
        tiles: &[TileCoord],
        tracker: &ValueRangeTracker,
    ) -> WebTileReport {
        let start = Instant::now();
        let results: Vec<Result<Vec<PathBuf>, TileFailure>> = tiles
            .par_iter()
            .map(|tile| {
                let raster = match store.read(tile) {
                    Ok(Some(raster)) => raster,
                    Ok(None) => return Ok(Vec::new()),
                    Err(e) => return Err(TileFailure::new(*tile, Stage::Read, &e)),
                };
                self.write_tile(tile, &raster, tracker)
                    .map_err(|e| TileFailure::new(*tile, Stage::Write, &e))
            })
            .collect();

        let mut report = WebTileReport::default();
        for result in results {
            match result {
                Ok(paths) => report.written.extend(paths),
                Err(failure) => {
                    failure.log();
                    report.failures.push(failure);
                }
            }
        }

        info!(
            tiles = tiles.len(),
            images = report.written.len(),
            failed = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Web tiles complete"
        );
        report
    }
}
