//! Tile coordinates and the quadtree tile matrix sets used by the pyramid.
//!
//! Follows the OGC tile matrix set model: every zoom level is a regular grid
//! of tiles anchored at the top-left corner of the set's extent, and each
//! tile at level `z` is split into exactly four tiles at level `z + 1`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, PyramidError, PyramidResult};

/// Standard rendering pixel size in meters (OGC WMTS).
const STANDARD_PIXEL_SIZE: f64 = 0.00028;

/// Meters per degree at the equator for the WGS84 ellipsoid.
const METERS_PER_DEGREE: f64 = 111319.49079327357;

/// Half the Web Mercator extent in meters.
const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Deepest zoom level generated for the built-in matrix sets.
const MAX_ZOOM: u32 = 24;

/// A tile coordinate (z/x/y).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileCoord {
    /// Zoom level (TileMatrix identifier)
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Get the ancestor of this tile at `zoom`, or the tile itself when
    /// `zoom == self.z`.
    pub fn ancestor(&self, zoom: u32) -> Option<TileCoord> {
        if zoom > self.z {
            return None;
        }
        let dz = self.z - zoom;
        Some(TileCoord {
            z: zoom,
            x: self.x >> dz,
            y: self.y >> dz,
        })
    }

    /// Get the four children tiles (zoom + 1).
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Capability consumed by the pyramid builder: bounds and tile relations.
pub trait TileHierarchy: Send + Sync {
    /// Identifier of the tile matrix set (e.g. "WorldCRS84Quad").
    fn identifier(&self) -> &str;

    /// CRS of the tile bounds.
    fn crs(&self) -> &str;

    /// Bounding box of a tile in the set's CRS.
    fn bounds(&self, tile: &TileCoord) -> PyramidResult<BoundingBox>;

    /// Tiles at `zoom` that cover `tile`.
    fn parents_of(&self, tile: &TileCoord, zoom: u32) -> Vec<TileCoord>;

    /// The four tiles one level down that subdivide `tile`.
    fn children_of(&self, tile: &TileCoord) -> [TileCoord; 4] {
        tile.children()
    }
}

/// A single tile matrix (zoom level) definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileMatrix {
    /// Identifier (usually zoom level as string)
    pub identifier: String,

    /// Scale denominator
    pub scale_denominator: f64,

    /// Top-left corner coordinates
    pub top_left_corner: (f64, f64),

    /// Tile width in pixels
    pub tile_width: u32,

    /// Tile height in pixels
    pub tile_height: u32,

    /// Number of tile columns
    pub matrix_width: u32,

    /// Number of tile rows
    pub matrix_height: u32,

    /// Tile extent in CRS units (x, y)
    pub tile_span: (f64, f64),
}

impl TileMatrix {
    /// Calculate the resolution (CRS units per pixel) for this matrix.
    pub fn resolution(&self) -> f64 {
        self.tile_span.0 / self.tile_width as f64
    }

    /// Whether `(col, row)` lies inside the matrix.
    pub fn contains(&self, col: u32, row: u32) -> bool {
        col < self.matrix_width && row < self.matrix_height
    }

    /// Get the bounding box for a specific tile.
    pub fn tile_bbox(&self, col: u32, row: u32) -> BoundingBox {
        let (span_x, span_y) = self.tile_span;

        let min_x = self.top_left_corner.0 + col as f64 * span_x;
        let max_y = self.top_left_corner.1 - row as f64 * span_y;
        let max_x = min_x + span_x;
        let min_y = max_y - span_y;

        BoundingBox::new(min_x, min_y, max_x, max_y)
    }
}

/// A complete tile matrix set definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileMatrixSet {
    /// Identifier for the tile matrix set
    pub identifier: String,

    /// Coordinate reference system code (e.g. "EPSG:4326")
    pub crs: String,

    /// CRS URI used in capabilities documents
    pub crs_uri: String,

    /// Bounding box of the tile matrix set
    pub bounding_box: BoundingBox,

    /// Well-known scale set URI (optional)
    pub well_known_scale_set: Option<String>,

    /// Individual tile matrices (zoom levels)
    pub tile_matrices: Vec<TileMatrix>,
}

impl TileMatrixSet {
    /// Look up a built-in tile matrix set by identifier.
    pub fn from_id(identifier: &str) -> PyramidResult<Self> {
        match identifier {
            "WorldCRS84Quad" | "WGS1984Quad" => {
                let mut tms = wgs84_tile_matrix_set();
                tms.identifier = identifier.to_string();
                Ok(tms)
            }
            "WebMercatorQuad" => Ok(web_mercator_tile_matrix_set()),
            other => Err(PyramidError::configuration(format!(
                "Unsupported tile matrix set '{}'. Supported: WorldCRS84Quad, WGS1984Quad, WebMercatorQuad",
                other
            ))),
        }
    }

    /// Get a tile matrix by zoom level number.
    pub fn get_matrix_by_zoom(&self, zoom: u32) -> Option<&TileMatrix> {
        self.tile_matrices.get(zoom as usize)
    }

    /// Get the bounding box for a tile.
    pub fn tile_bbox(&self, coord: &TileCoord) -> Option<BoundingBox> {
        self.get_matrix_by_zoom(coord.z)
            .filter(|m| m.contains(coord.x, coord.y))
            .map(|m| m.tile_bbox(coord.x, coord.y))
    }

    /// Whether the set's CRS is geographic (degrees).
    pub fn is_geographic(&self) -> bool {
        self.crs == "EPSG:4326"
    }

    /// Bounds of a tile converted to longitude/latitude degrees.
    pub fn tile_bounds_lonlat(&self, coord: &TileCoord) -> Option<BoundingBox> {
        let bbox = self.tile_bbox(coord)?;
        if self.is_geographic() {
            return Some(bbox);
        }
        let (lon_min, lat_min) = mercator_to_lonlat(bbox.min_x, bbox.min_y);
        let (lon_max, lat_max) = mercator_to_lonlat(bbox.max_x, bbox.max_y);
        Some(BoundingBox::new(lon_min, lat_min, lon_max, lat_max))
    }
}

impl TileHierarchy for TileMatrixSet {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn crs(&self) -> &str {
        &self.crs
    }

    fn bounds(&self, tile: &TileCoord) -> PyramidResult<BoundingBox> {
        self.tile_bbox(tile).ok_or_else(|| {
            PyramidError::invalid_input(format!(
                "Tile {} is outside tile matrix set {}",
                tile, self.identifier
            ))
        })
    }

    fn parents_of(&self, tile: &TileCoord, zoom: u32) -> Vec<TileCoord> {
        tile.ancestor(zoom).into_iter().collect()
    }
}

/// Standard Web Mercator (Google/OSM) tile matrix set.
pub fn web_mercator_tile_matrix_set() -> TileMatrixSet {
    let full_extent = 2.0 * WEB_MERCATOR_EXTENT;

    let tile_matrices: Vec<TileMatrix> = (0..=MAX_ZOOM)
        .map(|z| {
            let n = 2u32.pow(z);
            let span = full_extent / n as f64;
            let scale = span / 256.0 / STANDARD_PIXEL_SIZE;

            TileMatrix {
                identifier: z.to_string(),
                scale_denominator: scale,
                top_left_corner: (-WEB_MERCATOR_EXTENT, WEB_MERCATOR_EXTENT),
                tile_width: 256,
                tile_height: 256,
                matrix_width: n,
                matrix_height: n,
                tile_span: (span, span),
            }
        })
        .collect();

    TileMatrixSet {
        identifier: "WebMercatorQuad".to_string(),
        crs: "EPSG:3857".to_string(),
        crs_uri: "urn:ogc:def:crs:EPSG::3857".to_string(),
        bounding_box: BoundingBox::new(
            -WEB_MERCATOR_EXTENT,
            -WEB_MERCATOR_EXTENT,
            WEB_MERCATOR_EXTENT,
            WEB_MERCATOR_EXTENT,
        ),
        well_known_scale_set: Some(
            "http://www.opengis.net/def/wkss/OGC/1.0/GoogleMapsCompatible".to_string(),
        ),
        tile_matrices,
    }
}

/// Standard WGS84 (geographic) tile matrix set.
///
/// WorldCRS84Quad uses a 2:1 aspect ratio grid:
/// - matrix_width = 2^(z+1) columns
/// - matrix_height = 2^z rows
/// - Top-left origin at (-180, 90)
pub fn wgs84_tile_matrix_set() -> TileMatrixSet {
    let tile_matrices: Vec<TileMatrix> = (0..=MAX_ZOOM)
        .map(|z| {
            let n_cols = 2u32.pow(z + 1);
            let n_rows = 2u32.pow(z);
            let span = 180.0 / n_rows as f64;
            let scale = span / 256.0 * METERS_PER_DEGREE / STANDARD_PIXEL_SIZE;

            TileMatrix {
                identifier: z.to_string(),
                scale_denominator: scale,
                top_left_corner: (-180.0, 90.0),
                tile_width: 256,
                tile_height: 256,
                matrix_width: n_cols,
                matrix_height: n_rows,
                tile_span: (span, span),
            }
        })
        .collect();

    TileMatrixSet {
        identifier: "WorldCRS84Quad".to_string(),
        crs: "EPSG:4326".to_string(),
        crs_uri: "http://www.opengis.net/def/crs/OGC/1.3/CRS84".to_string(),
        bounding_box: BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
        well_known_scale_set: Some(
            "http://www.opengis.net/def/wkss/OGC/1.0/GoogleCRS84Quad".to_string(),
        ),
        tile_matrices,
    }
}

/// Convert Web Mercator meters to longitude/latitude degrees.
fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = x / WEB_MERCATOR_EXTENT * 180.0;
    let lat = (y / WEB_MERCATOR_EXTENT * std::f64::consts::PI)
        .sinh()
        .atan()
        .to_degrees();
    (lon, lat)
}
