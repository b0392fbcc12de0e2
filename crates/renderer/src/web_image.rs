//! A rendered web tile that can be written as PNG.

use std::path::Path;

use ndarray::Array2;
use pyramid_common::PyramidResult;
use tracing::debug;

use crate::palette::{Palette, Rgba};
use crate::png::create_png_auto;

/// RGBA pixels for one tile, plus the value range used to color them.
#[derive(Debug, Clone)]
pub struct WebImage {
    width: usize,
    height: usize,
    min: f64,
    max: f64,
    pixels: Vec<u8>,
}

impl WebImage {
    /// Color a grid. Missing `min`/`max` default to the grid's own extrema.
    pub fn new(
        grid: &Array2<Option<f64>>,
        palette: &Palette,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        let (data_min, data_max) = extrema(grid.iter().filter_map(|v| *v));
        let min = min.unwrap_or(data_min);
        let max = max.unwrap_or(data_max);
        let (height, width) = grid.dim();

        Self {
            width,
            height,
            min,
            max,
            pixels: palette.render(grid, min, max),
        }
    }

    /// Color plain row-major values, treating `nodata_value` as missing.
    pub fn from_values(
        values: &[f64],
        width: usize,
        height: usize,
        palette: &Palette,
        min: Option<f64>,
        max: Option<f64>,
        nodata_value: Option<f64>,
    ) -> PyramidResult<Self> {
        let valid = values
            .iter()
            .copied()
            .filter(|v| nodata_value.map_or(true, |nd| *v != nd));
        let (data_min, data_max) = extrema(valid);
        let min = min.unwrap_or(data_min);
        let max = max.unwrap_or(data_max);

        Ok(Self {
            width,
            height,
            min,
            max,
            pixels: palette.render_values(values, width, height, min, max, nodata_value)?,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The `(min, max)` mapped to the first and last palette entries.
    pub fn value_range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Row-major RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, row: usize, col: usize) -> Rgba {
        let i = (row * self.width + col) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn to_png(&self) -> PyramidResult<Vec<u8>> {
        create_png_auto(&self.pixels, self.width, self.height)
    }

    /// Encode as PNG and write to `path`, creating parent directories.
    /// An existing file is replaced.
    pub fn save(&self, path: impl AsRef<Path>) -> PyramidResult<()> {
        let path = path.as_ref();
        let png = self.to_png()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &png)?;
        debug!(path = %path.display(), bytes = png.len(), "Saved web tile");
        Ok(())
    }
}

/// Finite min and max of the values, `(0, 0)` when there are none.
fn extrema(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0))
}
