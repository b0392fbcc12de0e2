//! Rasterization of leaf-tile polygons into per-cell statistics.
//!
//! Count-weighted statistics assign each polygon to the one cell holding its
//! centroid. Area-weighted statistics clip each polygon against every cell
//! it overlaps and record one fragment per cell. Each statistic then
//! aggregates its observations per cell; cells without observations read 0.

use std::collections::BTreeMap;
use std::time::Instant;

use geo::{BoundingRect, Centroid, Polygon};
use itertools::iproduct;
use ndarray::Array2;
use pyramid_common::{
    AggregationMethod, BoundingBox, PyramidError, PyramidResult, StatProperty, StatisticConfig,
    WeightBy,
};
use tracing::{debug, warn};

use crate::clip::clipped_area;
use crate::raster::{Band, Raster};
use crate::resample::quantile;
use crate::vector::VectorTile;

/// A polygon assigned to one cell.
#[derive(Debug, Clone, Copy)]
struct Observation {
    row: usize,
    col: usize,
    feature: usize,
    /// Clipped area (area weighting only).
    area: f64,
}

/// Bins the polygons of a tile into a `rows x cols` raster.
#[derive(Debug, Clone)]
pub struct GridBinner {
    shape: (usize, usize),
    statistics: Vec<StatisticConfig>,
    centroid_fields: Option<(String, String)>,
}

impl GridBinner {
    /// `shape` is `(rows, cols)`.
    pub fn new(shape: (usize, usize), statistics: Vec<StatisticConfig>) -> Self {
        Self {
            shape,
            statistics,
            centroid_fields: None,
        }
    }

    /// Use precomputed centroid attributes `(x_field, y_field)` when every
    /// feature carries them.
    pub fn with_centroid_fields(mut self, fields: Option<(String, String)>) -> Self {
        self.centroid_fields = fields;
        self
    }

    pub fn statistics(&self) -> &[StatisticConfig] {
        &self.statistics
    }

    /// Rasterize `tile` over `bounds`.
    pub fn bin(&self, tile: &VectorTile, bounds: &BoundingBox) -> PyramidResult<Raster> {
        let start = Instant::now();

        if tile.is_empty() {
            return Err(PyramidError::invalid_input("tile has no polygons"));
        }
        let Some(crs) = tile.crs.as_deref() else {
            return Err(PyramidError::invalid_input("tile has no CRS"));
        };
        self.check_statistics()?;
        let (rows, cols) = self.shape;
        if rows == 0 || cols == 0 || !bounds.is_valid() {
            return Err(PyramidError::invalid_input(format!(
                "cannot bin into {}x{} cells over {:?}",
                rows, cols, bounds
            )));
        }

        let polygons = tile
            .features
            .iter()
            .map(|f| f.polygon())
            .collect::<PyramidResult<Vec<_>>>()?;

        let needs = |w: WeightBy| self.statistics.iter().any(|s| s.weight_by == w);
        let by_centroid = if needs(WeightBy::Count) {
            self.grid_by_centroid(tile, &polygons, bounds)
        } else {
            Vec::new()
        };
        let by_area = if needs(WeightBy::Area) {
            self.grid_by_area(&polygons, bounds)
        } else {
            Vec::new()
        };

        let (cell_width, cell_height) = bounds.cell_size(rows, cols);
        let cell_area = cell_width * cell_height;

        let bands = self
            .statistics
            .iter()
            .map(|stat| {
                let observations = match stat.weight_by {
                    WeightBy::Count => &by_centroid,
                    WeightBy::Area => &by_area,
                };
                let data = aggregate_band(stat, observations, tile, cell_area, self.shape);
                Band::new(stat.name.clone(), data)
            })
            .collect();

        let force_float = self.statistics.iter().any(|s| s.needs_float());
        let raster = Raster::new(*bounds, crs, bands, force_float)?;

        debug!(
            polygons = polygons.len(),
            centroid_cells = by_centroid.len(),
            area_fragments = by_area.len(),
            dtype = %raster.dtype(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Binned polygons"
        );
        Ok(raster)
    }

    fn check_statistics(&self) -> PyramidResult<()> {
        if self.statistics.is_empty() {
            return Err(PyramidError::configuration("no statistics configured"));
        }
        for stat in &self.statistics {
            if let Some(required) = stat.property.required_weighting() {
                if required != stat.weight_by {
                    return Err(PyramidError::configuration(format!(
                        "statistic '{}': property '{}' requires weight_by '{}'",
                        stat.name, stat.property, required
                    )));
                }
            }
        }
        Ok(())
    }

    /// Centroid of each feature, from the configured attributes when every
    /// feature has both, otherwise from the geometry.
    fn centroids(&self, tile: &VectorTile, polygons: &[&Polygon<f64>]) -> Vec<Option<(f64, f64)>> {
        if let Some((x_field, y_field)) = &self.centroid_fields {
            let from_fields: Option<Vec<_>> = tile
                .features
                .iter()
                .map(|f| Some(Some((f.property(x_field)?, f.property(y_field)?))))
                .collect();
            match from_fields {
                Some(centroids) => return centroids,
                None => warn!(
                    x_field = %x_field,
                    y_field = %y_field,
                    "Centroid properties missing from vector data, computing centroids from geometry"
                ),
            }
        }

        polygons
            .iter()
            .map(|p| p.centroid().map(|c| (c.x(), c.y())))
            .collect()
    }

    fn grid_by_centroid(
        &self,
        tile: &VectorTile,
        polygons: &[&Polygon<f64>],
        bounds: &BoundingBox,
    ) -> Vec<Observation> {
        let (rows, cols) = self.shape;
        let (cell_width, cell_height) = bounds.cell_size(rows, cols);

        self.centroids(tile, polygons)
            .into_iter()
            .enumerate()
            .filter_map(|(feature, centroid)| {
                let (x, y) = centroid?;
                let col = cell_index(x - bounds.left(), cell_width, cols)?;
                let row = cell_index(bounds.top() - y, cell_height, rows)?;
                Some(Observation {
                    row,
                    col,
                    feature,
                    area: 0.0,
                })
            })
            .collect()
    }

    fn grid_by_area(&self, polygons: &[&Polygon<f64>], bounds: &BoundingBox) -> Vec<Observation> {
        let (rows, cols) = self.shape;
        let (cell_width, cell_height) = bounds.cell_size(rows, cols);
        let mut fragments = Vec::new();

        for (feature, polygon) in polygons.iter().enumerate() {
            let Some(rect) = polygon.bounding_rect() else {
                continue;
            };
            let col_range = cell_span(
                rect.min().x - bounds.left(),
                rect.max().x - bounds.left(),
                cell_width,
                cols,
            );
            let row_range = cell_span(
                bounds.top() - rect.max().y,
                bounds.top() - rect.min().y,
                cell_height,
                rows,
            );

            for (row, col) in iproduct!(row_range, col_range) {
                let left = bounds.left() + col as f64 * cell_width;
                let top = bounds.top() - row as f64 * cell_height;
                let cell = BoundingBox::from_edges(left, left + cell_width, top - cell_height, top);
                let area = clipped_area(polygon, &cell);
                if area > 0.0 {
                    fragments.push(Observation {
                        row,
                        col,
                        feature,
                        area,
                    });
                }
            }
        }
        fragments
    }
}

/// Cell holding `offset` (distance from the grid's left or top edge), with
/// each cell closed on its far side: `(i * cell, (i + 1) * cell]`. Offsets on
/// the near edge of the grid, beyond it, or not finite have no cell.
fn cell_index(offset: f64, cell: f64, count: usize) -> Option<usize> {
    if !offset.is_finite() {
        return None;
    }
    let index = (offset / cell).ceil() - 1.0;
    if index < 0.0 || index >= count as f64 {
        return None;
    }
    Some(index as usize)
}

/// Cell indices overlapped by the offset interval `[lo, hi]`.
fn cell_span(lo: f64, hi: f64, cell: f64, count: usize) -> std::ops::Range<usize> {
    let start = (lo / cell).floor().max(0.0) as usize;
    let end = ((hi / cell).ceil().max(0.0) as usize).min(count);
    start.min(end)..end
}

fn aggregate_band(
    stat: &StatisticConfig,
    observations: &[Observation],
    tile: &VectorTile,
    cell_area: f64,
    shape: (usize, usize),
) -> Array2<Option<f64>> {
    let mut per_cell: BTreeMap<(usize, usize), Vec<f64>> = BTreeMap::new();
    for obs in observations {
        let value = match &stat.property {
            StatProperty::CentroidsPerPixel => Some(1.0),
            StatProperty::AreaWithinPixel => Some(obs.area),
            StatProperty::AreaPerPixelArea => Some(obs.area / cell_area),
            StatProperty::Attribute(name) => tile.features[obs.feature].property(name),
        };
        if let Some(value) = value.filter(|v| !v.is_nan()) {
            per_cell.entry((obs.row, obs.col)).or_default().push(value);
        }
    }

    let mut data = Array2::from_elem(shape, Some(0.0));
    for ((row, col), mut values) in per_cell {
        data[[row, col]] = Some(aggregate(&mut values, stat.aggregation_method));
    }
    data
}

/// Reduce the observations of one cell. `values` is in feature order and
/// never empty.
fn aggregate(values: &mut [f64], method: AggregationMethod) -> f64 {
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();

    match method {
        AggregationMethod::Sum => sum,
        AggregationMethod::Mean => sum / n,
        AggregationMethod::Count => n,
        AggregationMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationMethod::Std => sample_var(values, sum / n).sqrt(),
        AggregationMethod::Var => sample_var(values, sum / n),
        AggregationMethod::First => values[0],
        AggregationMethod::Last => values[values.len() - 1],
        AggregationMethod::Median => quantile(values, 0.5),
    }
}

/// Sample variance (n - 1); 0 for a single value.
fn sample_var(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Bin `tile` over `bounds` into a `shape` raster with one band per
/// statistic, using geometric centroids.
pub fn bin_polygons(
    tile: &VectorTile,
    bounds: &BoundingBox,
    shape: (usize, usize),
    statistics: &[StatisticConfig],
) -> PyramidResult<Raster> {
    GridBinner::new(shape, statistics.to_vec()).bin(tile, bounds)
}
