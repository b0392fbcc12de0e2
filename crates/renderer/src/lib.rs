//! Web tile rendering for raster pyramid statistics.
//!
//! - `palette`: CSS color gradients interpolated in LCh into a lookup table
//! - `png`: indexed and RGBA PNG encoding
//! - `web_image`: a colored tile that can be saved to disk

pub mod palette;
pub mod png;
pub mod web_image;

pub use palette::{Palette, Rgba, NODATA_INDEX, PALETTE_SIZE};
pub use web_image::WebImage;
