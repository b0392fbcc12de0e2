//! Shared test utilities for the raster pyramid workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Polygon and grid generators
//! - Common test fixtures (bounds, statistic configs)
//! - Approximate float assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that a band holds `expected` (row-major), with `None` as no-data.
#[macro_export]
macro_rules! assert_band_eq {
    ($band:expr, $expected:expr) => {{
        let band = &$band;
        let expected: Vec<Vec<Option<f64>>> = $expected;
        let (rows, cols) = band.dim();
        assert_eq!(rows, expected.len(), "row count");
        for (r, row) in expected.iter().enumerate() {
            assert_eq!(cols, row.len(), "column count in row {}", r);
            for (c, want) in row.iter().enumerate() {
                let got = band[[r, c]];
                match (got, *want) {
                    (Some(g), Some(w)) => $crate::assert_approx_eq!(g, w, 1e-9),
                    (g, w) => assert_eq!(g, w, "cell ({}, {})", r, c),
                }
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_band_eq() {
        let band = ndarray::array![[Some(1.0), None], [Some(0.0), Some(2.5)]];
        assert_band_eq!(band, vec![vec![Some(1.0), None], vec![Some(0.0), Some(2.5)]]);
    }
}
