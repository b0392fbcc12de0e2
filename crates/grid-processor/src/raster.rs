//! Multi-band raster container.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use pyramid_common::{BoundingBox, PyramidError, PyramidResult};
use serde::{Deserialize, Serialize};

use crate::dtype::DataType;
use crate::resample::quantile;

/// One named band. `None` cells are no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub data: Array2<Option<f64>>,
}

impl Band {
    pub fn new(name: impl Into<String>, data: Array2<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Iterator over valid (non-missing, non-NaN) cell values.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().filter_map(|v| v.filter(|v| !v.is_nan()))
    }

    pub fn has_nodata(&self) -> bool {
        self.data.iter().any(|v| v.map_or(true, |v| v.is_nan()))
    }
}

/// Statistics over the valid cells of one band.
///
/// Every field is `None` for a band without valid cells. `std` and `var`
/// are population statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSummary {
    pub name: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub var: Option<f64>,
    pub sum: Option<f64>,
    pub valid_count: usize,
}

impl BandSummary {
    pub fn of(band: &Band) -> Self {
        let mut values: Vec<f64> = band.valid_values().collect();
        let n = values.len();
        if n == 0 {
            return Self {
                name: band.name.clone(),
                min: None,
                max: None,
                mean: None,
                median: None,
                std: None,
                var: None,
                sum: None,
                valid_count: 0,
            };
        }

        let sum: f64 = values.iter().sum();
        let mean = sum / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            name: band.name.clone(),
            min: Some(min),
            max: Some(max),
            mean: Some(mean),
            median: Some(quantile(&mut values, 0.5)),
            std: Some(var.sqrt()),
            var: Some(var),
            sum: Some(sum),
            valid_count: n,
        }
    }
}

/// A georeferenced grid with one band per statistic.
#[derive(Debug, Clone)]
pub struct Raster {
    bounds: BoundingBox,
    crs: String,
    bands: Vec<Band>,
    dtype: DataType,
    summary: Vec<BandSummary>,
    path: Option<PathBuf>,
}

impl Raster {
    /// Build a raster, choosing the narrowest storage type for its values.
    ///
    /// All bands must share one shape and there must be at least one band.
    pub fn new(
        bounds: BoundingBox,
        crs: impl Into<String>,
        bands: Vec<Band>,
        force_float: bool,
    ) -> PyramidResult<Self> {
        let dtype = DataType::narrowest(bands.iter().flat_map(|b| b.valid_values()), force_float);
        Self::with_dtype(bounds, crs, bands, dtype)
    }

    /// Build a raster with an explicit storage type.
    pub fn with_dtype(
        bounds: BoundingBox,
        crs: impl Into<String>,
        bands: Vec<Band>,
        dtype: DataType,
    ) -> PyramidResult<Self> {
        let Some(first) = bands.first() else {
            return Err(PyramidError::invalid_input("a raster needs at least one band"));
        };
        let shape = first.data.dim();
        if let Some(bad) = bands.iter().find(|b| b.data.dim() != shape) {
            return Err(PyramidError::invalid_input(format!(
                "band '{}' has shape {:?}, expected {:?}",
                bad.name,
                bad.data.dim(),
                shape
            )));
        }
        if shape.0 == 0 || shape.1 == 0 {
            return Err(PyramidError::invalid_input("raster shape must be non-empty"));
        }

        let summary = bands.iter().map(BandSummary::of).collect();
        Ok(Self {
            bounds,
            crs: crs.into(),
            bands,
            dtype,
            summary,
            path: None,
        })
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn width(&self) -> usize {
        self.bands[0].data.ncols()
    }

    pub fn height(&self) -> usize {
        self.bands[0].data.nrows()
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].data.dim()
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn summary(&self) -> &[BandSummary] {
        &self.summary
    }

    /// File this raster was read from or last written to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist to `path`, creating parent directories, and remember it
    /// as the raster's origin.
    pub fn write(&mut self, path: impl AsRef<Path>) -> PyramidResult<()> {
        let path = path.as_ref();
        self.save(path)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Persist to `path` without updating the origin path.
    pub fn save(&self, path: impl AsRef<Path>) -> PyramidResult<()> {
        let path = path.as_ref();
        let bytes = crate::codec::encode(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a raster file. The summary is recomputed from the cells.
    pub fn read(path: impl AsRef<Path>) -> PyramidResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut raster = crate::codec::decode(&bytes)
            .map_err(|e| PyramidError::format(format!("{}: {}", path.display(), e)))?;
        raster.path = Some(path.to_path_buf());
        Ok(raster)
    }
}
