//! Common test fixtures for raster pyramid tests.

use pyramid_common::{
    AggregationMethod, BoundingBox, ResamplingMethod, StatProperty, StatisticConfig, WeightBy,
};

/// Common bounding box definitions for testing.
pub mod bbox {
    use pyramid_common::BoundingBox;

    /// Unit square.
    pub const UNIT: BoundingBox = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 1.0,
        max_y: 1.0,
    };

    /// 2x2 units anchored at the origin.
    pub const TWO_BY_TWO: BoundingBox = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 2.0,
        max_y: 2.0,
    };

    /// WorldCRS84Quad tile z=1, x=1, y=0 (north-west quarter of the globe).
    pub const CRS84_Z1_X1_Y0: BoundingBox = BoundingBox {
        min_x: -90.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 90.0,
    };
}

/// A statistic config with the default palette and no ranges.
pub fn stat(
    name: &str,
    weight_by: WeightBy,
    property: &str,
    aggregation_method: AggregationMethod,
    resampling_method: ResamplingMethod,
) -> StatisticConfig {
    StatisticConfig {
        name: name.to_string(),
        weight_by,
        property: StatProperty::from(property.to_string()),
        aggregation_method,
        resampling_method,
        val_range: None,
        z_config: Default::default(),
        palette: vec!["#FFFFFF".to_string(), "#000000".to_string()],
        nodata_color: "#ffffff00".to_string(),
    }
}

/// `centroids_per_pixel` summed, resampled by sum.
pub fn count_stat() -> StatisticConfig {
    stat(
        "polygon_count",
        WeightBy::Count,
        "centroids_per_pixel",
        AggregationMethod::Sum,
        ResamplingMethod::Sum,
    )
}

/// `area_per_pixel_area` summed, resampled by average.
pub fn coverage_stat() -> StatisticConfig {
    stat(
        "coverage",
        WeightBy::Area,
        "area_per_pixel_area",
        AggregationMethod::Sum,
        ResamplingMethod::Average,
    )
}

/// Bounds of a `rows x cols` grid of unit cells with its top-left at the origin.
pub fn unit_grid_bounds(rows: usize, cols: usize) -> BoundingBox {
    BoundingBox::new(0.0, -(rows as f64), cols as f64, 0.0)
}
