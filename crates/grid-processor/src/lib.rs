//! Raster pyramid construction from tiled vector polygons.
//!
//! - [`GridBinner`] rasterizes the polygons of a leaf tile into one band per
//!   statistic.
//! - [`Raster`] holds the bands, their summaries and the file codec.
//! - [`Raster::merge_and_resample`] turns up to four children into a parent.
//! - [`PyramidBuilder`] drives the levels from `max_zoom` down to `min_zoom`.
//! - [`WebTileWriter`] renders stored rasters to PNG tiles.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grid_processor::{FileRasterStore, PyramidBuilder};
//! use pyramid_common::{TileMatrixSet, TilePathLayout, TilingConfig, ValueRangeTracker};
//!
//! let config = TilingConfig::from_file("config.json")?;
//! let tms = Arc::new(TileMatrixSet::from_id(&config.tms_id)?);
//! let store = Arc::new(FileRasterStore::new(TilePathLayout::rasters(&config)?));
//! let mut tracker = ValueRangeTracker::from_statistics(&config.statistics);
//!
//! let builder = PyramidBuilder::new(config, tms, store)?;
//! let report = builder.build(&my_vector_source, &mut tracker)?;
//! ```

pub mod binner;
pub mod clip;
pub mod codec;
pub mod dtype;
pub mod merge;
pub mod pyramid;
pub mod raster;
pub mod resample;
pub mod store;
pub mod vector;
pub mod web_tiles;

pub use binner::{bin_polygons, GridBinner};
pub use dtype::DataType;
pub use pyramid::{discover_ranges, BuildReport, PyramidBuilder, Stage, TileFailure, VectorSource};
pub use raster::{Band, BandSummary, Raster};
pub use resample::resample;
pub use store::{FileRasterStore, RasterStore};
pub use vector::{PolygonFeature, VectorTile};
pub use web_tiles::{WebTileReport, WebTileWriter};
