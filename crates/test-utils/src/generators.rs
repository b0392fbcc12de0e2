//! Generators for synthetic polygons and grids.
//!
//! These create predictable shapes whose centroids and areas are known
//! exactly, so binning results can be checked by hand.

use geo::{coord, LineString, Polygon};
use ndarray::Array2;
use pyramid_common::BoundingBox;

/// Axis-aligned rectangle polygon.
pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            coord! { x: min_x, y: min_y },
            coord! { x: max_x, y: min_y },
            coord! { x: max_x, y: max_y },
            coord! { x: min_x, y: max_y },
            coord! { x: min_x, y: min_y },
        ]),
        vec![],
    )
}

/// Square of side `2 * half` centered at `(cx, cy)`.
pub fn square(cx: f64, cy: f64, half: f64) -> Polygon<f64> {
    rect(cx - half, cy - half, cx + half, cy + half)
}

/// Square with a square hole of side `2 * hole_half`, sharing its center.
pub fn square_with_hole(cx: f64, cy: f64, half: f64, hole_half: f64) -> Polygon<f64> {
    let hole = square(cx, cy, hole_half).exterior().clone();
    Polygon::new(square(cx, cy, half).exterior().clone(), vec![hole])
}

/// Right triangle with legs along the x and y axes from `(x, y)`.
pub fn triangle(x: f64, y: f64, leg: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            coord! { x: x, y: y },
            coord! { x: x + leg, y: y },
            coord! { x: x, y: y + leg },
            coord! { x: x, y: y },
        ]),
        vec![],
    )
}

/// One rectangle per cell of a `rows x cols` split of `bounds`, row 0 at the top.
pub fn cell_polygons(bounds: &BoundingBox, rows: usize, cols: usize) -> Vec<Polygon<f64>> {
    let (cw, ch) = bounds.cell_size(rows, cols);
    let mut polygons = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let left = bounds.min_x + c as f64 * cw;
            let top = bounds.max_y - r as f64 * ch;
            polygons.push(rect(left, top - ch, left + cw, top));
        }
    }
    polygons
}

/// Vertical strips covering `bounds`, split at the given fractions of its width.
///
/// `cuts` must be sorted and within `(0, 1)`.
pub fn vertical_strips(bounds: &BoundingBox, cuts: &[f64]) -> Vec<Polygon<f64>> {
    let mut edges = vec![bounds.min_x];
    edges.extend(cuts.iter().map(|f| bounds.min_x + f * bounds.width()));
    edges.push(bounds.max_x);
    edges
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| rect(w[0], bounds.min_y, w[1], bounds.max_y))
        .collect()
}

/// A band filled with `value` everywhere.
pub fn constant_band(rows: usize, cols: usize, value: f64) -> Array2<Option<f64>> {
    Array2::from_elem((rows, cols), Some(value))
}

/// A band whose cell `(r, c)` holds `r * cols + c`.
pub fn sequential_band(rows: usize, cols: usize) -> Array2<Option<f64>> {
    Array2::from_shape_fn((rows, cols), |(r, c)| Some((r * cols + c) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn test_square_area() {
        assert_eq!(square(0.0, 0.0, 1.5).unsigned_area(), 9.0);
        assert_eq!(square_with_hole(0.0, 0.0, 2.0, 1.0).unsigned_area(), 12.0);
    }

    #[test]
    fn test_cell_polygons_cover_bounds() {
        let bounds = BoundingBox::new(0.0, 0.0, 4.0, 2.0);
        let cells = cell_polygons(&bounds, 2, 4);
        assert_eq!(cells.len(), 8);
        let total: f64 = cells.iter().map(|p| p.unsigned_area()).sum();
        assert_eq!(total, bounds.area());
    }

    #[test]
    fn test_vertical_strips() {
        let bounds = BoundingBox::new(0.0, 0.0, 10.0, 1.0);
        let strips = vertical_strips(&bounds, &[0.25, 0.5]);
        assert_eq!(strips.len(), 3);
    }
}
