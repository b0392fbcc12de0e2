//! Color palettes for web tiles.
//!
//! A palette is a list of CSS colors interpolated in LCh into a 256-step
//! gradient, followed by one reserved no-data entry.

use ndarray::Array2;
use palette::{FromColor, Lcha, Mix, Srgba};
use pyramid_common::{PyramidError, PyramidResult, StatisticConfig};
use rayon::prelude::*;

/// Number of gradient entries.
pub const GRADIENT_STEPS: usize = 256;

/// Index of the no-data entry.
pub const NODATA_INDEX: usize = GRADIENT_STEPS;

/// Total lookup table size.
pub const PALETTE_SIZE: usize = GRADIENT_STEPS + 1;

/// Default gradient: white to black.
pub const DEFAULT_COLORS: [&str; 2] = ["#FFFFFF", "#000000"];

/// Default no-data color: fully transparent white.
pub const DEFAULT_NODATA_COLOR: &str = "#ffffff00";

/// RGBA color with 8-bit channels.
pub type Rgba = [u8; 4];

/// A 257-entry lookup table from normalized value index to RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<String>,
    nodata_color: String,
    table: Vec<Rgba>,
}

impl Palette {
    /// Build a palette from at least two CSS colors and a no-data color.
    pub fn build<S: AsRef<str>>(colors: &[S], nodata_color: &str) -> PyramidResult<Self> {
        if colors.len() < 2 {
            return Err(PyramidError::configuration(format!(
                "a palette needs at least 2 colors, got {}",
                colors.len()
            )));
        }

        let stops = colors
            .iter()
            .map(|c| parse_color(c.as_ref()))
            .collect::<PyramidResult<Vec<_>>>()?;
        let nodata = parse_color(nodata_color)?;

        let lch_stops: Vec<Lcha> = stops.iter().map(|c| Lcha::from_color(*c)).collect();
        let segments = lch_stops.len() - 1;

        let mut table: Vec<Rgba> = (0..GRADIENT_STEPS)
            .map(|i| {
                let t = i as f32 / (GRADIENT_STEPS - 1) as f32;
                let scaled = t * segments as f32;
                let segment = (scaled.floor() as usize).min(segments - 1);
                let local = scaled - segment as f32;
                let mixed = lch_stops[segment].mix(lch_stops[segment + 1], local);
                to_rgba8(Srgba::from_color(mixed))
            })
            .collect();

        // The ends are the configured stops, not a round trip through LCh.
        table[0] = to_rgba8(stops[0]);
        table[GRADIENT_STEPS - 1] = to_rgba8(stops[segments]);
        table.push(to_rgba8(nodata));

        Ok(Self {
            colors: colors.iter().map(|c| c.as_ref().to_string()).collect(),
            nodata_color: nodata_color.to_string(),
            table,
        })
    }

    /// The default white-to-black palette with a transparent no-data color.
    pub fn default_palette() -> PyramidResult<Self> {
        Self::build(&DEFAULT_COLORS, DEFAULT_NODATA_COLOR)
    }

    /// Palette configured for a statistic.
    pub fn for_statistic(stat: &StatisticConfig) -> PyramidResult<Self> {
        Self::build(&stat.palette, &stat.nodata_color)
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn nodata_color(&self) -> &str {
        &self.nodata_color
    }

    /// The full lookup table (257 entries).
    pub fn table(&self) -> &[Rgba] {
        &self.table
    }

    pub fn color(&self, index: usize) -> Rgba {
        self.table[index.min(NODATA_INDEX)]
    }

    pub fn nodata(&self) -> Rgba {
        self.table[NODATA_INDEX]
    }

    /// Lookup index for one cell.
    ///
    /// Missing or non-finite values, and values equal to `nodata_value`,
    /// map to [`NODATA_INDEX`]. Others are clamped to `[min, max]` and scaled
    /// to `0..=255`. A collapsed range (`max <= min`) maps to index 0.
    pub fn index_of(value: Option<f64>, min: f64, max: f64, nodata_value: Option<f64>) -> usize {
        let Some(v) = value.filter(|v| v.is_finite()) else {
            return NODATA_INDEX;
        };
        if nodata_value.is_some_and(|nd| nd == v) {
            return NODATA_INDEX;
        }
        if !(max > min) {
            return 0;
        }
        let normalized = (v.clamp(min, max) - min) / (max - min);
        (normalized * (GRADIENT_STEPS - 1) as f64).round() as usize
    }

    /// Render a grid into a row-major RGBA buffer (`rows * cols * 4` bytes).
    pub fn render(&self, grid: &Array2<Option<f64>>, min: f64, max: f64) -> Vec<u8> {
        let (rows, cols) = grid.dim();
        let mut pixels = vec![0u8; rows * cols * 4];
        if cols == 0 {
            return pixels;
        }

        pixels
            .par_chunks_mut(cols * 4)
            .enumerate()
            .for_each(|(row, out)| {
                for (col, px) in out.chunks_exact_mut(4).enumerate() {
                    let index = Self::index_of(grid[[row, col]], min, max, None);
                    px.copy_from_slice(&self.color(index));
                }
            });

        pixels
    }

    /// Render plain values, treating `nodata_value` as missing.
    pub fn render_values(
        &self,
        values: &[f64],
        width: usize,
        height: usize,
        min: f64,
        max: f64,
        nodata_value: Option<f64>,
    ) -> PyramidResult<Vec<u8>> {
        if values.len() != width * height {
            return Err(PyramidError::Render(format!(
                "expected {}x{} = {} values, got {}",
                width,
                height,
                width * height,
                values.len()
            )));
        }

        let mut pixels = Vec::with_capacity(values.len() * 4);
        for v in values {
            let index = Self::index_of(Some(*v), min, max, nodata_value);
            pixels.extend_from_slice(&self.color(index));
        }
        Ok(pixels)
    }
}

fn parse_color(color: &str) -> PyramidResult<Srgba> {
    let parsed = csscolorparser::parse(color)
        .map_err(|e| PyramidError::configuration(format!("Invalid color '{}': {}", color, e)))?;
    Ok(Srgba::new(
        parsed.r as f32,
        parsed.g as f32,
        parsed.b as f32,
        parsed.a as f32,
    ))
}

fn to_rgba8(color: Srgba) -> Rgba {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [
        channel(color.red),
        channel(color.green),
        channel(color.blue),
        channel(color.alpha),
    ]
}
