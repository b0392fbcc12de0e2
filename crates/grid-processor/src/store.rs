//! Raster persistence keyed by tile.

use std::path::PathBuf;

use pyramid_common::{PyramidResult, TileCoord, TilePathLayout};
use tracing::debug;

use crate::raster::Raster;

/// Storage for the rasters of a pyramid.
///
/// Reads may run concurrently; each tile has a single writer.
pub trait RasterStore: Send + Sync {
    /// Load a tile, `Ok(None)` when it was never written.
    fn read(&self, tile: &TileCoord) -> PyramidResult<Option<Raster>>;

    /// Persist a tile, replacing any existing raster.
    fn write(&self, tile: &TileCoord, raster: &mut Raster) -> PyramidResult<()>;
}

/// Stores rasters as files under a [`TilePathLayout`].
#[derive(Debug, Clone)]
pub struct FileRasterStore {
    layout: TilePathLayout,
}

impl FileRasterStore {
    pub fn new(layout: TilePathLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &TilePathLayout {
        &self.layout
    }

    /// Rasters hold every statistic as a band, so the path has no
    /// statistic component.
    pub fn path(&self, tile: &TileCoord) -> PathBuf {
        self.layout.path(tile, None)
    }
}

impl RasterStore for FileRasterStore {
    fn read(&self, tile: &TileCoord) -> PyramidResult<Option<Raster>> {
        let path = self.path(tile);
        if !path.exists() {
            return Ok(None);
        }
        Raster::read(&path).map(Some)
    }

    fn write(&self, tile: &TileCoord, raster: &mut Raster) -> PyramidResult<()> {
        let path = self.path(tile);
        raster.write(&path)?;
        debug!(tile = %tile, path = %path.display(), "Wrote raster");
        Ok(())
    }
}
