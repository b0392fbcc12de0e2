//! Tests for PNG encoding and saving web tiles.

use ndarray::Array2;
use renderer::png::{create_png, create_png_auto, create_png_indexed, PNG_SIGNATURE};
use renderer::{Palette, WebImage};

// ============================================================================
// Helper functions
// ============================================================================

/// Walk the chunks of a PNG and return their types in order.
fn chunk_types(png: &[u8]) -> Vec<String> {
    let mut types = Vec::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= png.len() {
        let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
        types.push(String::from_utf8_lossy(&png[pos + 4..pos + 8]).into_owned());
        pos += 12 + len;
    }
    types
}

/// Color type byte from the IHDR chunk.
fn color_type(png: &[u8]) -> u8 {
    png[PNG_SIGNATURE.len() + 8 + 9]
}

fn gradient_grid(rows: usize, cols: usize) -> Array2<Option<f64>> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if (r + c) % 7 == 0 {
            None
        } else {
            Some((r * cols + c) as f64)
        }
    })
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_palette_tile_is_indexed() {
    let palette = Palette::default_palette().unwrap();
    let image = WebImage::new(&gradient_grid(16, 16), &palette, None, None);
    let png = image.to_png().unwrap();

    assert_eq!(&png[..8], &PNG_SIGNATURE);
    assert_eq!(color_type(&png), 3);
    assert_eq!(chunk_types(&png), vec!["IHDR", "PLTE", "tRNS", "IDAT", "IEND"]);
}

#[test]
fn test_opaque_indexed_has_no_trns() {
    let png = create_png_indexed(2, 1, &[[255, 0, 0, 255], [0, 0, 255, 255]], &[0, 1]).unwrap();
    assert_eq!(chunk_types(&png), vec!["IHDR", "PLTE", "IDAT", "IEND"]);
}

#[test]
fn test_many_colors_fall_back_to_rgba() {
    let pixels: Vec<u8> = (0..300u32)
        .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 7, 255])
        .collect();
    let png = create_png_auto(&pixels, 300, 1).unwrap();
    assert_eq!(color_type(&png), 6);
    assert_eq!(png, create_png(&pixels, 300, 1).unwrap());
}

#[test]
fn test_indexed_smaller_than_rgba() {
    let palette = Palette::default_palette().unwrap();
    let banded = Array2::from_shape_fn((256, 256), |(r, _)| Some((r / 16) as f64));
    let image = WebImage::new(&banded, &palette, None, None);
    let indexed = create_png_auto(image.pixels(), 256, 256).unwrap();
    let rgba = create_png(image.pixels(), 256, 256).unwrap();
    assert!(indexed.len() < rgba.len());
}

// ============================================================================
// Saving
// ============================================================================

#[test]
fn test_save_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WorldCRS84Quad/coverage/3/1/2.png");

    let palette = Palette::default_palette().unwrap();
    let image = WebImage::new(&gradient_grid(8, 8), &palette, None, None);
    image.save(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], &PNG_SIGNATURE);
    assert_eq!(u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 8);
}
