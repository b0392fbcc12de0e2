//! Mosaicking child rasters into a parent tile.

use ndarray::Array2;
use pyramid_common::{BoundingBox, PyramidError, PyramidResult, ResamplingMethod};
use tracing::warn;

use crate::raster::{Band, Raster};
use crate::resample::resample;

impl Raster {
    /// Merge `rasters` into one raster covering `bounds` with `shape`
    /// (`rows`, `cols`), resampling band `i` with `methods[i]`.
    ///
    /// Children are placed by their bounds onto a mosaic at the first
    /// child's cell size; cells no child covers are no-data. Where children
    /// overlap, the first child with a value wins. When `methods` is shorter
    /// than the band list, the last method is reused.
    pub fn merge_and_resample(
        rasters: &[Raster],
        methods: &[ResamplingMethod],
        bounds: &BoundingBox,
        shape: (usize, usize),
    ) -> PyramidResult<Raster> {
        let Some(first) = rasters.first() else {
            return Err(PyramidError::merge("no rasters to merge"));
        };
        let band_count = first.bands().len();

        for other in &rasters[1..] {
            if other.crs() != first.crs() {
                return Err(PyramidError::merge(format!(
                    "CRS mismatch: {} vs {}",
                    first.crs(),
                    other.crs()
                )));
            }
            if other.bands().len() != band_count {
                return Err(PyramidError::merge(format!(
                    "band count mismatch: {} vs {}",
                    band_count,
                    other.bands().len()
                )));
            }
            if other.band_names() != first.band_names() {
                warn!(
                    expected = ?first.band_names(),
                    found = ?other.band_names(),
                    "Band names differ between merged rasters, using the first raster's names"
                );
            }
        }

        let (child_rows, child_cols) = first.shape();
        let (cell_width, cell_height) = first.bounds().cell_size(child_rows, child_cols);
        let mosaic_cols = ((bounds.width() / cell_width).round() as usize).max(1);
        let mosaic_rows = ((bounds.height() / cell_height).round() as usize).max(1);

        let mut mosaics: Vec<Array2<Option<f64>>> =
            vec![Array2::from_elem((mosaic_rows, mosaic_cols), None); band_count];

        for raster in rasters {
            let col_offset = ((raster.bounds().left() - bounds.left()) / cell_width).round() as i64;
            let row_offset = ((bounds.top() - raster.bounds().top()) / cell_height).round() as i64;

            for (mosaic, band) in mosaics.iter_mut().zip(raster.bands()) {
                for ((r, c), value) in band.data.indexed_iter() {
                    let Some(value) = value else {
                        continue;
                    };
                    let (mr, mc) = (row_offset + r as i64, col_offset + c as i64);
                    if mr < 0 || mc < 0 || mr >= mosaic_rows as i64 || mc >= mosaic_cols as i64 {
                        continue;
                    }
                    let cell = &mut mosaic[[mr as usize, mc as usize]];
                    if cell.is_none() {
                        *cell = Some(*value);
                    }
                }
            }
        }

        let bands = mosaics
            .iter()
            .zip(first.bands())
            .enumerate()
            .map(|(i, (mosaic, band))| {
                let method = methods
                    .get(i)
                    .or(methods.last())
                    .copied()
                    .unwrap_or(ResamplingMethod::Nearest);
                Band::new(band.name.clone(), resample(mosaic, shape, method))
            })
            .collect();

        let force_float = rasters.iter().any(|r| r.dtype().is_float());
        Raster::new(*bounds, first.crs(), bands, force_float)
    }
}
