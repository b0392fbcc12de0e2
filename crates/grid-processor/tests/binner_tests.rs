//! Tests for binning polygons into statistic grids.
//!
//! Covers the count and area weightings, attribute aggregation, output
//! type selection, input validation, and the conservation properties.

use geo::point;
use grid_processor::{bin_polygons, DataType, GridBinner, PolygonFeature, VectorTile};
use proptest::prelude::*;
use pyramid_common::{AggregationMethod, PyramidError, ResamplingMethod, WeightBy};
use test_utils::fixtures::bbox;
use test_utils::{
    assert_approx_eq, assert_band_eq, cell_polygons, count_stat, coverage_stat, rect, square,
    square_with_hole, stat, vertical_strips,
};

fn tile_of(polygons: Vec<geo::Polygon<f64>>) -> VectorTile {
    VectorTile::new(
        "EPSG:4326",
        polygons.into_iter().map(PolygonFeature::new).collect(),
    )
}

// ============================================================================
// Count weighting
// ============================================================================

#[test]
fn test_two_polygons_in_diagonal_cells() {
    let tile = tile_of(vec![square(0.5, 1.5, 0.25), square(1.5, 0.5, 0.25)]);
    let raster = bin_polygons(&tile, &bbox::TWO_BY_TWO, (2, 2), &[count_stat()]).unwrap();

    assert_eq!(raster.band_names(), vec!["polygon_count"]);
    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(1.0), Some(0.0)], vec![Some(0.0), Some(1.0)]]
    );
    assert_eq!(raster.dtype(), DataType::U8);
    assert_eq!(raster.summary()[0].sum, Some(2.0));
}

/// Bin one square whose precomputed centroid is `(cx, cy)`.
fn bin_at_centroid(cx: f64, cy: f64) -> grid_processor::Raster {
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![PolygonFeature::new(square(1.0, 1.0, 0.5))
            .with_property("cx", cx)
            .with_property("cy", cy)],
    );
    GridBinner::new((2, 2), vec![count_stat()])
        .with_centroid_fields(Some(("cx".to_string(), "cy".to_string())))
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap()
}

#[test]
fn test_centroid_on_cell_edge_uses_half_open_intervals() {
    // (1, 1) is the right edge of column 0 and the bottom edge of row 0.
    let raster = bin_at_centroid(1.0, 1.0);
    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(1.0), Some(0.0)], vec![Some(0.0), Some(0.0)]]
    );

    // The tile's right and bottom edges are inside the grid.
    let raster = bin_at_centroid(2.0, 0.0);
    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(0.0), Some(0.0)], vec![Some(0.0), Some(1.0)]]
    );
}

#[test]
fn test_centroid_on_left_or_top_edge_is_dropped() {
    assert_eq!(bin_at_centroid(0.0, 1.5).summary()[0].sum, Some(0.0));
    assert_eq!(bin_at_centroid(0.5, 2.0).summary()[0].sum, Some(0.0));
}

#[test]
fn test_non_finite_centroid_is_dropped() {
    for (cx, cy) in [
        (f64::NAN, f64::NAN),
        (f64::NAN, 0.5),
        (0.5, f64::NAN),
        (f64::INFINITY, 0.5),
    ] {
        let raster = bin_at_centroid(cx, cy);
        assert_band_eq!(
            raster.bands()[0].data,
            vec![vec![Some(0.0), Some(0.0)], vec![Some(0.0), Some(0.0)]]
        );
    }
}

#[test]
fn test_centroid_outside_bounds_is_dropped() {
    let tile = tile_of(vec![square(5.0, 5.0, 0.25), square(0.5, 0.5, 0.25)]);
    let raster = GridBinner::new((2, 2), vec![count_stat()])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();
    assert_eq!(raster.summary()[0].sum, Some(1.0));
}

#[test]
fn test_centroid_fields_used_when_present() {
    // Geometry sits in cell (0, 0) but the precomputed centroid is in (1, 1).
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![PolygonFeature::new(square(0.5, 1.5, 0.25))
            .with_property("cx", 1.5)
            .with_property("cy", 0.5)],
    );
    let binner = GridBinner::new((2, 2), vec![count_stat()])
        .with_centroid_fields(Some(("cx".to_string(), "cy".to_string())));
    let raster = binner.bin(&tile, &bbox::TWO_BY_TWO).unwrap();

    assert_eq!(raster.bands()[0].data[[1, 1]], Some(1.0));
    assert_eq!(raster.bands()[0].data[[0, 0]], Some(0.0));
}

#[test]
fn test_centroid_fields_missing_falls_back_to_geometry() {
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![
            PolygonFeature::new(square(0.5, 1.5, 0.25)).with_property("cx", 1.5),
            PolygonFeature::new(square(1.5, 0.5, 0.25)),
        ],
    );
    let binner = GridBinner::new((2, 2), vec![count_stat()])
        .with_centroid_fields(Some(("cx".to_string(), "cy".to_string())));
    let raster = binner.bin(&tile, &bbox::TWO_BY_TWO).unwrap();

    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(1.0), Some(0.0)], vec![Some(0.0), Some(1.0)]]
    );
}

// ============================================================================
// Attribute aggregation
// ============================================================================

#[test]
fn test_attribute_mean_per_cell() {
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![
            PolygonFeature::new(square(0.3, 1.5, 0.1)).with_property("height", 2.0),
            PolygonFeature::new(square(0.7, 1.5, 0.1)).with_property("height", 3.0),
            PolygonFeature::new(square(1.5, 0.5, 0.1)).with_property("height", 10.0),
        ],
    );
    let mean_height = stat(
        "mean_height",
        WeightBy::Count,
        "height",
        AggregationMethod::Mean,
        ResamplingMethod::Average,
    );
    let raster = GridBinner::new((2, 2), vec![mean_height])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();

    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(2.5), Some(0.0)], vec![Some(0.0), Some(10.0)]]
    );
    assert!(raster.dtype().is_float());
}

#[test]
fn test_missing_attribute_is_skipped() {
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![
            PolygonFeature::new(square(0.3, 1.5, 0.1)).with_property("height", 4.0),
            PolygonFeature::new(square(0.7, 1.5, 0.1)),
            PolygonFeature::new(square(1.5, 0.5, 0.1)),
        ],
    );
    let height_count = stat(
        "height_count",
        WeightBy::Count,
        "height",
        AggregationMethod::Count,
        ResamplingMethod::Max,
    );
    let raster = GridBinner::new((2, 2), vec![height_count])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();

    assert_eq!(raster.bands()[0].data[[0, 0]], Some(1.0));
    assert_eq!(raster.bands()[0].data[[1, 1]], Some(0.0));
}

#[test]
fn test_area_weighted_attribute_takes_polygon_value_per_fragment() {
    // One strip spanning both columns of the top row.
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![PolygonFeature::new(rect(0.0, 1.0, 2.0, 2.0)).with_property("class", 7.0)],
    );
    let class_max = stat(
        "class",
        WeightBy::Area,
        "class",
        AggregationMethod::Max,
        ResamplingMethod::Mode,
    );
    let raster = GridBinner::new((2, 2), vec![class_max])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();

    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(7.0), Some(7.0)], vec![Some(0.0), Some(0.0)]]
    );
    assert_eq!(raster.dtype(), DataType::U8);
}

// ============================================================================
// Area weighting
// ============================================================================

#[test]
fn test_area_per_pixel_area_of_partial_cover() {
    // Straddles the boundary between cells (0, 0) and (0, 1).
    let tile = tile_of(vec![rect(0.5, 1.0, 1.5, 2.0)]);
    let raster = GridBinner::new((2, 2), vec![coverage_stat()])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();

    assert_band_eq!(
        raster.bands()[0].data,
        vec![vec![Some(0.5), Some(0.5)], vec![Some(0.0), Some(0.0)]]
    );
    assert!(raster.dtype().is_float());
}

#[test]
fn test_area_within_pixel_subtracts_holes() {
    let area = stat(
        "area",
        WeightBy::Area,
        "area_within_pixel",
        AggregationMethod::Sum,
        ResamplingMethod::Sum,
    );
    let tile = tile_of(vec![square_with_hole(1.0, 1.0, 1.0, 0.5)]);
    let raster = GridBinner::new((2, 2), vec![area])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();

    // Each quadrant holds 1 - 0.25 of polygon area.
    for v in raster.bands()[0].data.iter() {
        assert_approx_eq!(v.unwrap(), 0.75, 1e-12);
    }
}

#[test]
fn test_count_and_area_bands_share_grid() {
    let tile = tile_of(vec![square(0.5, 1.5, 0.5)]);
    let raster = GridBinner::new((2, 2), vec![count_stat(), coverage_stat()])
        .bin(&tile, &bbox::TWO_BY_TWO)
        .unwrap();

    assert_eq!(raster.band_names(), vec!["polygon_count", "coverage"]);
    assert_eq!(raster.bands()[0].data[[0, 0]], Some(1.0));
    assert_eq!(raster.bands()[1].data[[0, 0]], Some(1.0));
    assert_eq!(raster.bands()[1].data[[1, 1]], Some(0.0));
    // The coverage band forces a float type for both bands.
    assert_eq!(raster.dtype(), DataType::F32);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_rejects_empty_tile() {
    let result = GridBinner::new((2, 2), vec![count_stat()]).bin(&tile_of(vec![]), &bbox::UNIT);
    assert!(matches!(result, Err(PyramidError::InvalidInput(_))));
}

#[test]
fn test_rejects_missing_crs() {
    let tile = VectorTile {
        crs: None,
        features: vec![PolygonFeature::new(square(0.5, 0.5, 0.1))],
    };
    let result = GridBinner::new((2, 2), vec![count_stat()]).bin(&tile, &bbox::UNIT);
    assert!(matches!(result, Err(PyramidError::InvalidInput(_))));
}

#[test]
fn test_rejects_non_polygon() {
    let tile = VectorTile::new(
        "EPSG:4326",
        vec![PolygonFeature::new(point!(x: 0.5, y: 0.5))],
    );
    let result = GridBinner::new((2, 2), vec![count_stat()]).bin(&tile, &bbox::UNIT);
    assert!(matches!(result, Err(PyramidError::InvalidInput(_))));
}

#[test]
fn test_rejects_keyword_with_wrong_weighting() {
    let bad = stat(
        "bad",
        WeightBy::Count,
        "area_per_pixel_area",
        AggregationMethod::Sum,
        ResamplingMethod::Sum,
    );
    let tile = tile_of(vec![square(0.5, 0.5, 0.1)]);
    let result = GridBinner::new((2, 2), vec![bad]).bin(&tile, &bbox::UNIT);
    assert!(matches!(result, Err(PyramidError::Configuration(_))));
}

// ============================================================================
// Conservation properties
// ============================================================================

proptest! {
    #[test]
    fn prop_count_conservation(
        centers in prop::collection::vec((0.05f64..1.95, 0.05f64..1.95), 1..40),
        rows in 1usize..8,
        cols in 1usize..8,
    ) {
        let polygons = centers.iter().map(|(x, y)| square(*x, *y, 0.01)).collect();
        let raster = GridBinner::new((rows, cols), vec![count_stat()])
            .bin(&tile_of(polygons), &bbox::TWO_BY_TWO)
            .unwrap();

        prop_assert_eq!(raster.summary()[0].sum, Some(centers.len() as f64));
    }

    #[test]
    fn prop_area_conservation(
        poly_rows in 1usize..5,
        poly_cols in 1usize..5,
        rows in 1usize..8,
        cols in 1usize..8,
    ) {
        let polygons = cell_polygons(&bbox::TWO_BY_TWO, poly_rows, poly_cols);
        let raster = GridBinner::new((rows, cols), vec![coverage_stat()])
            .bin(&tile_of(polygons), &bbox::TWO_BY_TWO)
            .unwrap();

        let total = raster.summary()[0].sum.unwrap();
        prop_assert!((total - (rows * cols) as f64).abs() < 1e-9);
        for v in raster.bands()[0].data.iter() {
            prop_assert!((v.unwrap() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_area_conservation_uneven_strips(
        cut in 0.05f64..0.95,
        rows in 1usize..6,
        cols in 1usize..6,
    ) {
        let polygons = vertical_strips(&bbox::TWO_BY_TWO, &[cut]);
        let raster = GridBinner::new((rows, cols), vec![coverage_stat()])
            .bin(&tile_of(polygons), &bbox::TWO_BY_TWO)
            .unwrap();

        let total = raster.summary()[0].sum.unwrap();
        prop_assert!((total - (rows * cols) as f64).abs() < 1e-9);
    }
}
