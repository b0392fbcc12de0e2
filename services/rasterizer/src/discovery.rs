//! Finding rasters already in the store.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use pyramid_common::{TileCoord, TilePathLayout};
use tracing::debug;
use walkdir::WalkDir;

/// Tiles with a raster file under `layout`, sorted, optionally limited to
/// one zoom level. Files that do not match the layout are ignored.
pub fn stored_tiles(layout: &TilePathLayout, zoom: Option<u32>) -> Result<Vec<TileCoord>> {
    let base = layout.base_dir();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut tiles = BTreeSet::new();
    for entry in WalkDir::new(base) {
        let entry = entry.with_context(|| format!("cannot list {}", base.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        match layout.tile_from_path(entry.path()) {
            Some((tile, None)) if zoom.map_or(true, |z| tile.z == z) => {
                tiles.insert(tile);
            }
            Some(_) => {}
            None => debug!(path = %entry.path().display(), "Ignoring file outside the layout"),
        }
    }

    Ok(tiles.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> TilePathLayout {
        TilePathLayout::new(
            dir.path(),
            "WorldCRS84Quad",
            vec!["tms".into(), "stat".into(), "z".into(), "x".into(), "y".into()],
            ".pgrt",
        )
        .unwrap()
    }

    fn touch(layout: &TilePathLayout, tile: TileCoord) {
        let path = layout.path(&tile, None);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_lists_tiles_sorted() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        touch(&layout, TileCoord::new(2, 3, 1));
        touch(&layout, TileCoord::new(1, 0, 0));
        touch(&layout, TileCoord::new(2, 0, 1));
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let tiles = stored_tiles(&layout, None).unwrap();
        assert_eq!(
            tiles,
            vec![
                TileCoord::new(1, 0, 0),
                TileCoord::new(2, 0, 1),
                TileCoord::new(2, 3, 1),
            ]
        );
    }

    #[test]
    fn test_filters_by_zoom() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        touch(&layout, TileCoord::new(2, 3, 1));
        touch(&layout, TileCoord::new(1, 0, 0));

        assert_eq!(
            stored_tiles(&layout, Some(1)).unwrap(),
            vec![TileCoord::new(1, 0, 0)]
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let layout = TilePathLayout::new(
            dir.path().join("absent"),
            "WorldCRS84Quad",
            vec!["z".into(), "x".into(), "y".into()],
            ".pgrt",
        )
        .unwrap();
        assert!(stored_tiles(&layout, None).unwrap().is_empty());
    }
}
