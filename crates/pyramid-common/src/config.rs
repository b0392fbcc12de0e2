//! Tiling configuration: tile matrix set, directories, zoom range and the
//! statistics that become raster bands and web tile layers.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ranges::ValueRange;
use crate::{PyramidError, PyramidResult};

/// How polygons are assigned to grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightBy {
    /// One cell per polygon, chosen by centroid.
    Count,
    /// Every overlapped cell, weighted by clipped area.
    Area,
}

impl WeightBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Area => "area",
        }
    }
}

impl fmt::Display for WeightBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value a statistic aggregates: a derived keyword or a polygon attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatProperty {
    /// `centroids_per_pixel`: each polygon contributes 1 (count weighting).
    CentroidsPerPixel,
    /// `area_within_pixel`: clipped polygon area (area weighting).
    AreaWithinPixel,
    /// `area_per_pixel_area`: clipped area divided by cell area (area weighting).
    AreaPerPixelArea,
    /// Any other name refers to a numeric polygon attribute.
    Attribute(String),
}

impl StatProperty {
    /// The weighting a keyword requires. Attributes work with either.
    pub fn required_weighting(&self) -> Option<WeightBy> {
        match self {
            Self::CentroidsPerPixel => Some(WeightBy::Count),
            Self::AreaWithinPixel | Self::AreaPerPixelArea => Some(WeightBy::Area),
            Self::Attribute(_) => None,
        }
    }

    /// Whether the property is one of the area keywords.
    pub fn is_area_keyword(&self) -> bool {
        matches!(self, Self::AreaWithinPixel | Self::AreaPerPixelArea)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CentroidsPerPixel => "centroids_per_pixel",
            Self::AreaWithinPixel => "area_within_pixel",
            Self::AreaPerPixelArea => "area_per_pixel_area",
            Self::Attribute(name) => name,
        }
    }
}

impl From<String> for StatProperty {
    fn from(s: String) -> Self {
        match s.as_str() {
            "centroids_per_pixel" => Self::CentroidsPerPixel,
            "area_within_pixel" => Self::AreaWithinPixel,
            "area_per_pixel_area" => Self::AreaPerPixelArea,
            _ => Self::Attribute(s),
        }
    }
}

impl From<StatProperty> for String {
    fn from(p: StatProperty) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for StatProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cell aggregation of the values that land in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    Median,
    Std,
    Var,
    First,
    Last,
}

impl AggregationMethod {
    /// Whether the aggregation can produce non-integral values from
    /// integral inputs.
    pub fn is_fractional(&self) -> bool {
        matches!(self, Self::Mean | Self::Median | Self::Std | Self::Var)
    }
}

/// Resampling applied to one band when four children merge into a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    Nearest,
    #[serde(alias = "mean")]
    Average,
    Sum,
    Mode,
    Min,
    Max,
    #[serde(alias = "median")]
    Med,
    Q1,
    Q3,
    Rms,
}

impl ResamplingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Average => "average",
            Self::Sum => "sum",
            Self::Mode => "mode",
            Self::Min => "min",
            Self::Max => "max",
            Self::Med => "med",
            Self::Q1 => "q1",
            Self::Q3 => "q3",
            Self::Rms => "rms",
        }
    }
}

impl fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zoom-specific overrides for a statistic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_range: Option<ValueRange>,
}

/// One statistic: one raster band and one web tile layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticConfig {
    pub name: String,
    pub weight_by: WeightBy,
    pub property: StatProperty,
    pub aggregation_method: AggregationMethod,
    pub resampling_method: ResamplingMethod,

    /// Range used for every zoom level without its own range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_range: Option<ValueRange>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub z_config: BTreeMap<u32, ZoomConfig>,

    #[serde(default = "default_palette")]
    pub palette: Vec<String>,

    #[serde(default = "default_nodata_color")]
    pub nodata_color: String,
}

fn default_palette() -> Vec<String> {
    vec!["#FFFFFF".to_string(), "#000000".to_string()]
}

fn default_nodata_color() -> String {
    "#ffffff00".to_string()
}

impl StatisticConfig {
    /// Whether the band this statistic produces must be stored as a float.
    pub fn needs_float(&self) -> bool {
        self.aggregation_method.is_fractional() || self.property.is_area_keyword()
    }

    /// Check the property keyword against the weighting and the palette colors.
    pub fn validate(&self) -> PyramidResult<()> {
        if self.name.is_empty() {
            return Err(PyramidError::configuration("statistic name must not be empty"));
        }

        if let Some(required) = self.property.required_weighting() {
            if required != self.weight_by {
                return Err(PyramidError::configuration(format!(
                    "statistic '{}': property '{}' requires weight_by '{}', got '{}'",
                    self.name, self.property, required, self.weight_by
                )));
            }
        }

        if self.palette.len() < 2 {
            return Err(PyramidError::configuration(format!(
                "statistic '{}': palette needs at least 2 colors, got {}",
                self.name,
                self.palette.len()
            )));
        }

        for color in self.palette.iter().chain(std::iter::once(&self.nodata_color)) {
            if csscolorparser::parse(color).is_err() {
                return Err(PyramidError::configuration(format!(
                    "statistic '{}': cannot parse color '{}'",
                    self.name, color
                )));
            }
        }

        Ok(())
    }
}

/// Full tiling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Tile matrix set identifier (e.g. "WorldCRS84Quad").
    pub tms_id: String,

    /// Path components, e.g. `["tms", "stat", "z", "x", "y"]`.
    pub tile_path_structure: Vec<String>,

    /// Directory for multi-band rasters.
    pub geotiff_dir: PathBuf,

    /// Directory for web image tiles.
    pub web_tiles_dir: PathBuf,

    /// Extension of web tiles, including the dot.
    pub web_tiles_type: String,

    /// `[min_zoom, max_zoom]`, both inclusive.
    pub z_range: (u32, u32),

    /// `[width, height]` of every tile in pixels.
    pub tile_size: (usize, usize),

    pub statistics: Vec<StatisticConfig>,

    /// Worker threads per level. `None` uses every core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// Attribute names `(x, y)` holding precomputed centroids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid_properties: Option<(String, String)>,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tms_id: "WorldCRS84Quad".to_string(),
            tile_path_structure: ["tms", "stat", "z", "x", "y"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            geotiff_dir: PathBuf::from("geotiff"),
            web_tiles_dir: PathBuf::from("web_tiles"),
            web_tiles_type: ".png".to_string(),
            z_range: (0, 13),
            tile_size: (256, 256),
            statistics: vec![
                StatisticConfig {
                    name: "polygon_count".to_string(),
                    weight_by: WeightBy::Count,
                    property: StatProperty::CentroidsPerPixel,
                    aggregation_method: AggregationMethod::Sum,
                    resampling_method: ResamplingMethod::Sum,
                    val_range: Some(ValueRange::new(Some(0.0), None)),
                    z_config: BTreeMap::new(),
                    palette: default_palette(),
                    nodata_color: default_nodata_color(),
                },
                StatisticConfig {
                    name: "coverage".to_string(),
                    weight_by: WeightBy::Area,
                    property: StatProperty::AreaPerPixelArea,
                    aggregation_method: AggregationMethod::Sum,
                    resampling_method: ResamplingMethod::Average,
                    val_range: Some(ValueRange::new(Some(0.0), Some(1.0))),
                    z_config: BTreeMap::new(),
                    palette: default_palette(),
                    nodata_color: default_nodata_color(),
                },
            ],
            max_workers: None,
            centroid_properties: None,
        }
    }
}

impl TilingConfig {
    /// Load a configuration file. `.yaml`/`.yml` files are read as YAML,
    /// everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> PyramidResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loading tiling config");
        if is_yaml(path) {
            serde_yaml::from_str(&text).map_err(|e| {
                PyramidError::configuration(format!("{}: {}", path.display(), e))
            })
        } else {
            serde_json::from_str(&text).map_err(|e| {
                PyramidError::configuration(format!("{}: {}", path.display(), e))
            })
        }
    }

    /// Save the configuration, in the format implied by the extension.
    pub fn write(&self, path: impl AsRef<Path>) -> PyramidResult<()> {
        let path = path.as_ref();
        let text = if is_yaml(path) {
            serde_yaml::to_string(self)
                .map_err(|e| PyramidError::format(format!("YAML error: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override directories and worker count from environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("PYRAMID_GEOTIFF_DIR") {
            self.geotiff_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("PYRAMID_WEB_TILES_DIR") {
            self.web_tiles_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("PYRAMID_MAX_WORKERS") {
            if let Ok(workers) = val.parse() {
                self.max_workers = Some(workers);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PyramidResult<()> {
        let (min_z, max_z) = self.z_range;
        if min_z > max_z {
            return Err(PyramidError::configuration(format!(
                "z_range min ({}) must not exceed max ({})",
                min_z, max_z
            )));
        }

        if self.tile_size.0 == 0 || self.tile_size.1 == 0 {
            return Err(PyramidError::configuration("tile_size must be > 0"));
        }

        if self.statistics.is_empty() {
            return Err(PyramidError::configuration("at least one statistic is required"));
        }

        if self.max_workers == Some(0) {
            return Err(PyramidError::configuration("max_workers must be > 0"));
        }

        let mut seen = HashSet::new();
        for stat in &self.statistics {
            if !seen.insert(stat.name.as_str()) {
                return Err(PyramidError::configuration(format!(
                    "duplicate statistic name '{}'",
                    stat.name
                )));
            }
            stat.validate()?;
        }

        Ok(())
    }

    pub fn min_zoom(&self) -> u32 {
        self.z_range.0
    }

    pub fn max_zoom(&self) -> u32 {
        self.z_range.1
    }

    /// Grid shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.tile_size.1, self.tile_size.0)
    }

    pub fn stat_names(&self) -> Vec<&str> {
        self.statistics.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn stat(&self, name: &str) -> Option<&StatisticConfig> {
        self.statistics.iter().find(|s| s.name == name)
    }

    pub fn resampling_methods(&self) -> Vec<ResamplingMethod> {
        self.statistics.iter().map(|s| s.resampling_method).collect()
    }

    /// Describe how the statistic ranges differ from `original`.
    pub fn list_updates(&self, original: &TilingConfig) -> Vec<String> {
        let mut updates = Vec::new();

        for stat in &self.statistics {
            let Some(old) = original.stat(&stat.name) else {
                updates.push(format!("statistics->{} added", stat.name));
                continue;
            };

            if stat.val_range != old.val_range {
                updates.push(format!(
                    "statistics->{}->val_range changed from {} to {}",
                    stat.name,
                    describe_range(old.val_range.as_ref()),
                    describe_range(stat.val_range.as_ref())
                ));
            }

            for (z, zoom) in &stat.z_config {
                let old_range = old.z_config.get(z).and_then(|c| c.val_range.as_ref());
                if zoom.val_range.as_ref() != old_range {
                    updates.push(format!(
                        "statistics->{}->z_config->{} changed from {} to {}",
                        stat.name,
                        z,
                        describe_range(old_range),
                        describe_range(zoom.val_range.as_ref())
                    ));
                }
            }
        }

        for stat in &original.statistics {
            if self.stat(&stat.name).is_none() {
                updates.push(format!("statistics->{} removed", stat.name));
            }
        }

        updates
    }
}

fn describe_range(range: Option<&ValueRange>) -> String {
    match range {
        Some(r) => r.to_string(),
        None => "none".to_string(),
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
