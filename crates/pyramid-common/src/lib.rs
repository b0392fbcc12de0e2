//! Common types shared across the raster pyramid crates.

pub mod bbox;
pub mod config;
pub mod error;
pub mod paths;
pub mod ranges;
pub mod tile;

pub use bbox::BoundingBox;
pub use config::{
    AggregationMethod, ResamplingMethod, StatProperty, StatisticConfig, TilingConfig, WeightBy,
    ZoomConfig,
};
pub use error::{PyramidError, PyramidResult};
pub use paths::TilePathLayout;
pub use ranges::{DiscoveredRange, RangeEndpoint, RangeUpdate, ValueRange, ValueRangeTracker};
pub use tile::{TileCoord, TileHierarchy, TileMatrix, TileMatrixSet};
