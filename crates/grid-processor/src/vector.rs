//! Vector input for leaf tiles.

use std::collections::BTreeMap;

use geo::{Coord, Geometry, Polygon};
use itertools::Itertools;
use pyramid_common::{PyramidError, PyramidResult};

/// One polygon with its numeric attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonFeature {
    pub geometry: Geometry<f64>,
    pub properties: BTreeMap<String, f64>,
}

impl PolygonFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    /// The feature's polygon, rejecting other geometry types and
    /// malformed rings.
    pub fn polygon(&self) -> PyramidResult<&Polygon<f64>> {
        let Geometry::Polygon(polygon) = &self.geometry else {
            return Err(PyramidError::invalid_input(format!(
                "expected Polygon geometry, got {}",
                geometry_name(&self.geometry)
            )));
        };

        let all_coords = polygon
            .exterior()
            .coords()
            .chain(polygon.interiors().iter().flat_map(|r| r.coords()));
        if all_coords.into_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(PyramidError::invalid_input("polygon has non-finite coordinates"));
        }

        let distinct = distinct_vertices(polygon.exterior().coords().copied());
        if distinct < 3 {
            return Err(PyramidError::invalid_input(format!(
                "polygon exterior has {} distinct vertices, need at least 3",
                distinct
            )));
        }
        Ok(polygon)
    }
}

/// The polygons of one leaf tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorTile {
    /// CRS identifier, e.g. "EPSG:4326".
    pub crs: Option<String>,
    pub features: Vec<PolygonFeature>,
}

impl VectorTile {
    pub fn new(crs: impl Into<String>, features: Vec<PolygonFeature>) -> Self {
        Self {
            crs: Some(crs.into()),
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Number of distinct finite coordinates. Adding 0.0 folds -0.0 into 0.0.
fn distinct_vertices(coords: impl Iterator<Item = Coord<f64>>) -> usize {
    coords
        .map(|c| ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits()))
        .unique()
        .count()
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
        #[allow(unreachable_patterns)]
        _ => "unknown geometry",
    }
}
