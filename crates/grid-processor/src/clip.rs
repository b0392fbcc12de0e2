//! Polygon clipping against grid cells.

use geo::{Area, Coord, LineString, Polygon};
use pyramid_common::BoundingBox;

/// Area of `polygon` inside `cell`: the clipped exterior minus the clipped
/// holes. Never negative.
pub fn clipped_area(polygon: &Polygon<f64>, cell: &BoundingBox) -> f64 {
    let exterior = ring_area(&clip_ring(polygon.exterior(), cell));
    if exterior <= 0.0 {
        return 0.0;
    }
    let holes: f64 = polygon
        .interiors()
        .iter()
        .map(|hole| ring_area(&clip_ring(hole, cell)))
        .sum();
    (exterior - holes).max(0.0)
}

fn ring_area(coords: &[Coord<f64>]) -> f64 {
    if coords.len() < 3 {
        return 0.0;
    }
    Polygon::new(LineString::from(coords.to_vec()), vec![]).unsigned_area()
}

#[derive(Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Edge {
    fn inside(&self, c: Coord<f64>) -> bool {
        match *self {
            Edge::Left(x) => c.x >= x,
            Edge::Right(x) => c.x <= x,
            Edge::Bottom(y) => c.y >= y,
            Edge::Top(y) => c.y <= y,
        }
    }

    fn intersect(&self, a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
        match *self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Coord {
                    x,
                    y: a.y + t * (b.y - a.y),
                }
            }
            Edge::Bottom(y) | Edge::Top(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Coord {
                    x: a.x + t * (b.x - a.x),
                    y,
                }
            }
        }
    }
}

/// Sutherland-Hodgman clip of one ring against an axis-aligned box.
///
/// The result is an open ring (first vertex not repeated). Collinear
/// leftovers along the box edges have zero area.
fn clip_ring(ring: &LineString<f64>, cell: &BoundingBox) -> Vec<Coord<f64>> {
    let mut output: Vec<Coord<f64>> = ring.coords().copied().collect();
    if output.len() > 1 && output.first() == output.last() {
        output.pop();
    }

    for edge in [
        Edge::Left(cell.left()),
        Edge::Right(cell.right()),
        Edge::Bottom(cell.bottom()),
        Edge::Top(cell.top()),
    ] {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &current in &input {
            match (edge.inside(current), edge.inside(prev)) {
                (true, true) => output.push(current),
                (true, false) => {
                    output.push(edge.intersect(prev, current));
                    output.push(current);
                }
                (false, true) => output.push(edge.intersect(prev, current)),
                (false, false) => {}
            }
            prev = current;
        }
    }
    output
}
