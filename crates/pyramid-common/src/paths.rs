//! Mapping between tiles and file paths.
//!
//! A layout is a list of components such as `["tms", "stat", "z", "x", "y"]`.
//! `tms` becomes the tile matrix set id, `stat` (or `style`) the statistic
//! name, and `z`/`x`/`y` the tile numbers. Any other component is used as a
//! literal directory name. The extension is appended to the last component.

use std::path::{Path, PathBuf};

use crate::{PyramidError, PyramidResult, TileCoord, TilingConfig};

/// Extension used for stored multi-band rasters.
pub const RASTER_EXTENSION: &str = ".pgrt";

/// Tile path layout rooted at a base directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePathLayout {
    base_dir: PathBuf,
    tms_id: String,
    structure: Vec<String>,
    extension: String,
}

impl TilePathLayout {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        tms_id: impl Into<String>,
        structure: Vec<String>,
        extension: impl Into<String>,
    ) -> PyramidResult<Self> {
        for required in ["z", "x", "y"] {
            if !structure.iter().any(|c| c == required) {
                return Err(PyramidError::configuration(format!(
                    "tile_path_structure must contain '{}'",
                    required
                )));
            }
        }

        Ok(Self {
            base_dir: base_dir.into(),
            tms_id: tms_id.into(),
            structure,
            extension: extension.into(),
        })
    }

    /// Layout for multi-band rasters under `geotiff_dir`.
    pub fn rasters(config: &TilingConfig) -> PyramidResult<Self> {
        Self::new(
            &config.geotiff_dir,
            &config.tms_id,
            config.tile_path_structure.clone(),
            RASTER_EXTENSION,
        )
    }

    /// Layout for web tiles under `web_tiles_dir`.
    pub fn web_tiles(config: &TilingConfig) -> PyramidResult<Self> {
        Self::new(
            &config.web_tiles_dir,
            &config.tms_id,
            config.tile_path_structure.clone(),
            &config.web_tiles_type,
        )
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn is_stat_component(component: &str) -> bool {
        component == "stat" || component == "style"
    }

    /// Relative path components for a tile, without the base directory.
    pub fn components(&self, tile: &TileCoord, stat: Option<&str>) -> Vec<String> {
        let mut parts: Vec<String> = self
            .structure
            .iter()
            .filter_map(|component| match component.as_str() {
                "tms" => Some(self.tms_id.clone()),
                "z" => Some(tile.z.to_string()),
                "x" => Some(tile.x.to_string()),
                "y" => Some(tile.y.to_string()),
                c if Self::is_stat_component(c) => stat.map(str::to_string),
                literal => Some(literal.to_string()),
            })
            .collect();

        if let Some(last) = parts.last_mut() {
            last.push_str(&self.extension);
        }
        parts
    }

    /// Full path for a tile. `stat` is omitted for multi-band rasters.
    pub fn path(&self, tile: &TileCoord, stat: Option<&str>) -> PathBuf {
        let mut path = self.base_dir.clone();
        path.extend(self.components(tile, stat));
        path
    }

    /// Recover the tile (and statistic, if present) from a path produced by
    /// [`TilePathLayout::path`].
    pub fn tile_from_path(&self, path: &Path) -> Option<(TileCoord, Option<String>)> {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        let mut parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        let last = parts.last_mut()?;
        let stripped = last.strip_suffix(self.extension.as_str())?.to_string();
        *last = stripped;

        let has_stat = parts.len() == self.structure.len();
        let expected = if has_stat {
            self.structure.len()
        } else {
            self.structure
                .iter()
                .filter(|c| !Self::is_stat_component(c))
                .count()
        };
        if parts.len() != expected {
            return None;
        }

        let components = self
            .structure
            .iter()
            .filter(|c| has_stat || !Self::is_stat_component(c));

        let (mut z, mut x, mut y, mut stat) = (None, None, None, None);
        for (component, part) in components.zip(parts) {
            match component.as_str() {
                "z" => z = part.parse().ok(),
                "x" => x = part.parse().ok(),
                "y" => y = part.parse().ok(),
                "tms" if part != self.tms_id => return None,
                c if Self::is_stat_component(c) => stat = Some(part),
                _ => {}
            }
        }

        Some((TileCoord::new(z?, x?, y?), stat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TilePathLayout {
        TilePathLayout::new(
            "/data/tiles",
            "WorldCRS84Quad",
            vec!["tms".into(), "style".into(), "z".into(), "x".into(), "y".into()],
            ".png",
        )
        .unwrap()
    }

    #[test]
    fn test_path_with_stat() {
        let path = layout().path(&TileCoord::new(3, 5, 2), Some("coverage"));
        assert_eq!(
            path,
            PathBuf::from("/data/tiles/WorldCRS84Quad/coverage/3/5/2.png")
        );
    }

    #[test]
    fn test_path_without_stat() {
        let path = layout().path(&TileCoord::new(3, 5, 2), None);
        assert_eq!(path, PathBuf::from("/data/tiles/WorldCRS84Quad/3/5/2.png"));
    }

    #[test]
    fn test_tile_from_path_roundtrip() {
        let layout = layout();
        let tile = TileCoord::new(11, 1234, 567);

        let with_stat = layout.path(&tile, Some("polygon_count"));
        assert_eq!(
            layout.tile_from_path(&with_stat),
            Some((tile, Some("polygon_count".to_string())))
        );

        let without_stat = layout.path(&tile, None);
        assert_eq!(layout.tile_from_path(&without_stat), Some((tile, None)));
    }

    #[test]
    fn test_tile_from_foreign_path() {
        let layout = layout();
        assert_eq!(
            layout.tile_from_path(Path::new("/data/tiles/WebMercatorQuad/3/5/2.png")),
            None
        );
        assert_eq!(
            layout.tile_from_path(Path::new("/data/tiles/WorldCRS84Quad/3/5/2.tif")),
            None
        );
    }

    #[test]
    fn test_structure_requires_zxy() {
        let err =
            TilePathLayout::new("/tmp", "WorldCRS84Quad", vec!["z".into(), "x".into()], ".png");
        assert!(err.is_err());
    }
}
