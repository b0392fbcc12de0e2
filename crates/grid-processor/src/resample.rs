//! Block resampling of bands between grid shapes.
//!
//! Every output cell reduces the window of source cells it covers. Missing
//! cells are ignored by every reducer, and a window with no valid cell
//! stays missing.

use ndarray::Array2;
use pyramid_common::ResamplingMethod;

/// Resample `band` to `shape` (`rows`, `cols`) with `method`.
pub fn resample(
    band: &Array2<Option<f64>>,
    shape: (usize, usize),
    method: ResamplingMethod,
) -> Array2<Option<f64>> {
    let (src_rows, src_cols) = band.dim();
    let (dst_rows, dst_cols) = shape;

    if src_rows == 0 || src_cols == 0 {
        return Array2::from_elem(shape, None);
    }
    if (src_rows, src_cols) == shape {
        return band.clone();
    }

    let mut window = Vec::new();
    Array2::from_shape_fn(shape, |(row, col)| {
        if method == ResamplingMethod::Nearest {
            let r = nearest_index(row, src_rows, dst_rows);
            let c = nearest_index(col, src_cols, dst_cols);
            return band[[r, c]];
        }

        let (r0, r1) = window_bounds(row, src_rows, dst_rows);
        let (c0, c1) = window_bounds(col, src_cols, dst_cols);

        window.clear();
        for r in r0..r1 {
            for c in c0..c1 {
                if let Some(v) = band[[r, c]].filter(|v| !v.is_nan()) {
                    window.push(v);
                }
            }
        }
        reduce(&mut window, method)
    })
}

/// Source index sampled by output index `i` (pixel centers).
#[inline]
fn nearest_index(i: usize, src: usize, dst: usize) -> usize {
    (((2 * i + 1) * src) / (2 * dst)).min(src - 1)
}

/// Half-open source window `[start, end)` covered by output index `i`.
/// When downsampling, the windows partition the source, so a ratio that is
/// not a whole number never counts a source cell twice. When upsampling,
/// each window is the single source cell under the output cell.
#[inline]
fn window_bounds(i: usize, src: usize, dst: usize) -> (usize, usize) {
    let start = (i * src) / dst;
    let end = ((i + 1) * src) / dst;
    (start, end.max(start + 1).min(src))
}

/// Reduce the valid values of one window.
fn reduce(values: &mut [f64], method: ResamplingMethod) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;

    let result = match method {
        ResamplingMethod::Nearest => values[0],
        ResamplingMethod::Average => values.iter().sum::<f64>() / n,
        ResamplingMethod::Sum => values.iter().sum(),
        ResamplingMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        ResamplingMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ResamplingMethod::Rms => (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
        ResamplingMethod::Mode => mode(values),
        ResamplingMethod::Med => quantile(values, 0.5),
        ResamplingMethod::Q1 => quantile(values, 0.25),
        ResamplingMethod::Q3 => quantile(values, 0.75),
    };
    Some(result)
}

/// Most frequent value; ties go to the smallest.
fn mode(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);

    let mut best = values[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < values.len() {
        let mut j = i;
        while j < values.len() && values[j] == values[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best = values[i];
        }
        i = j;
    }
    best
}

/// Quantile with linear interpolation between closest ranks.
pub(crate) fn quantile(values: &mut [f64], q: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid_1_to_16() -> Array2<Option<f64>> {
        Array2::from_shape_fn((4, 4), |(r, c)| Some((r * 4 + c + 1) as f64))
    }

    #[test]
    fn test_average_2x() {
        let result = resample(&grid_1_to_16(), (2, 2), ResamplingMethod::Average);
        // Top-left block: 1,2,5,6 -> 3.5
        assert_eq!(result[[0, 0]], Some(3.5));
        // Top-right block: 3,4,7,8 -> 5.5
        assert_eq!(result[[0, 1]], Some(5.5));
    }

    #[test]
    fn test_max_and_min_2x() {
        let max = resample(&grid_1_to_16(), (2, 2), ResamplingMethod::Max);
        assert_eq!(max[[0, 0]], Some(6.0));
        assert_eq!(max[[1, 1]], Some(16.0));

        let min = resample(&grid_1_to_16(), (2, 2), ResamplingMethod::Min);
        assert_eq!(min[[0, 1]], Some(3.0));
    }

    #[test]
    fn test_sum_2x() {
        let ones = Array2::from_elem((4, 4), Some(1.0));
        let result = resample(&ones, (2, 2), ResamplingMethod::Sum);
        assert!(result.iter().all(|v| *v == Some(4.0)));
    }

    #[test]
    fn test_sum_uneven_ratio_counts_each_cell_once() {
        let ones = Array2::from_elem((3, 5), Some(1.0));
        let result = resample(&ones, (2, 2), ResamplingMethod::Sum);
        let total: f64 = result.iter().map(|v| v.unwrap()).sum();
        assert_eq!(total, 15.0);
        assert_eq!(result[[0, 0]], Some(2.0));
        assert_eq!(result[[1, 1]], Some(6.0));
    }

    #[test]
    fn test_windows_partition_source() {
        for (src, dst) in [(4, 2), (5, 2), (7, 3), (9, 4)] {
            let mut next = 0;
            for i in 0..dst {
                let (start, end) = window_bounds(i, src, dst);
                assert_eq!(start, next, "window {} of {} -> {}", i, src, dst);
                assert!(end > start);
                next = end;
            }
            assert_eq!(next, src);
        }
    }

    #[test]
    fn test_nearest_picks_center() {
        let result = resample(&grid_1_to_16(), (2, 2), ResamplingMethod::Nearest);
        // Output pixel 0 centers on source index 1.
        assert_eq!(result[[0, 0]], Some(6.0));
        assert_eq!(result[[1, 1]], Some(16.0));
    }

    #[test]
    fn test_missing_cells_ignored() {
        let band = array![[Some(1.0), None], [Some(3.0), Some(4.0)]];
        let result = resample(&band, (1, 1), ResamplingMethod::Average);
        assert_eq!(result[[0, 0]], Some(8.0 / 3.0));

        let empty: Array2<Option<f64>> = Array2::from_elem((2, 2), None);
        let result = resample(&empty, (1, 1), ResamplingMethod::Sum);
        assert_eq!(result[[0, 0]], None);
    }

    #[test]
    fn test_mode_ties_take_smallest() {
        let band = array![[Some(2.0), Some(1.0)], [Some(2.0), Some(1.0)]];
        let result = resample(&band, (1, 1), ResamplingMethod::Mode);
        assert_eq!(result[[0, 0]], Some(1.0));
    }

    #[test]
    fn test_quantiles() {
        let band = array![[Some(1.0), Some(2.0)], [Some(3.0), Some(4.0)]];
        assert_eq!(resample(&band, (1, 1), ResamplingMethod::Med)[[0, 0]], Some(2.5));
        assert_eq!(resample(&band, (1, 1), ResamplingMethod::Q1)[[0, 0]], Some(1.75));
        assert_eq!(resample(&band, (1, 1), ResamplingMethod::Q3)[[0, 0]], Some(3.25));
    }

    #[test]
    fn test_rms() {
        let band = array![[Some(3.0), Some(4.0)]];
        let result = resample(&band, (1, 1), ResamplingMethod::Rms);
        assert_eq!(result[[0, 0]], Some((12.5f64).sqrt()));
    }

    #[test]
    fn test_same_shape_is_identity() {
        let band = grid_1_to_16();
        assert_eq!(resample(&band, (4, 4), ResamplingMethod::Sum), band);
    }

    #[test]
    fn test_upsample_repeats_values() {
        let band = array![[Some(1.0), Some(2.0)]];
        let result = resample(&band, (2, 4), ResamplingMethod::Average);
        assert_eq!(result.row(0).to_vec(), vec![Some(1.0), Some(1.0), Some(2.0), Some(2.0)]);
        assert_eq!(result.row(1), result.row(0));
    }
}
