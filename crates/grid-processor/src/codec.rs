//! Raster file encoding.
//!
//! Layout:
//! ```text
//! "PGRT" | version: u32 LE | header_len: u32 LE | header (JSON) | zlib payload
//! ```
//! The payload holds every band's cells in the stored type, row-major,
//! followed by a one-byte-per-cell validity mask for each band whose header
//! entry has `has_mask` set. Missing cells are written as zero.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::Array2;
use pyramid_common::{BoundingBox, PyramidError, PyramidResult};
use serde::{Deserialize, Serialize};

use crate::dtype::DataType;
use crate::raster::{Band, Raster};

/// File magic.
pub const MAGIC: &[u8; 4] = b"PGRT";

/// Current format version.
pub const VERSION: u32 = 1;

const PREAMBLE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    width: usize,
    height: usize,
    dtype: DataType,
    crs: String,
    bounds: BoundingBox,
    bands: Vec<BandHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BandHeader {
    name: String,
    has_mask: bool,
}

/// Serialize a raster to bytes.
pub fn encode(raster: &Raster) -> PyramidResult<Vec<u8>> {
    let (height, width) = raster.shape();
    let dtype = raster.dtype();
    let header = Header {
        width,
        height,
        dtype,
        crs: raster.crs().to_string(),
        bounds: *raster.bounds(),
        bands: raster
            .bands()
            .iter()
            .map(|b| BandHeader {
                name: b.name.clone(),
                has_mask: b.has_nodata(),
            })
            .collect(),
    };
    let header_json = serde_json::to_vec(&header)?;

    let cells = width * height;
    let mut payload = Vec::with_capacity(raster.bands().len() * cells * dtype.size());
    for band in raster.bands() {
        for v in band.data.iter() {
            dtype.write_value(&mut payload, v.filter(|v| !v.is_nan()).unwrap_or(0.0));
        }
    }
    for (band, bh) in raster.bands().iter().zip(&header.bands) {
        if bh.has_mask {
            payload.extend(band.data.iter().map(|v| v.is_some_and(|v| !v.is_nan()) as u8));
        }
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload)?;
    let compressed = encoder.finish()?;

    let mut out = Vec::with_capacity(PREAMBLE_LEN + header_json.len() + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Parse bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> PyramidResult<Raster> {
    if bytes.len() < PREAMBLE_LEN || &bytes[0..4] != MAGIC {
        return Err(PyramidError::format("missing PGRT magic"));
    }
    let version = read_u32(&bytes[4..8]);
    if version != VERSION {
        return Err(PyramidError::format(format!("unsupported version {}", version)));
    }
    let header_len = read_u32(&bytes[8..12]) as usize;
    let header_end = PREAMBLE_LEN
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| PyramidError::format("truncated header"))?;
    let header: Header = serde_json::from_slice(&bytes[PREAMBLE_LEN..header_end])?;

    let mut payload = Vec::new();
    ZlibDecoder::new(&bytes[header_end..])
        .read_to_end(&mut payload)
        .map_err(|e| PyramidError::format(format!("corrupt payload: {}", e)))?;

    let size = header.dtype.size();
    let masks = header.bands.iter().filter(|b| b.has_mask).count();
    let oversized = || {
        PyramidError::format(format!(
            "header dimensions {}x{} with {} bands overflow",
            header.width,
            header.height,
            header.bands.len()
        ))
    };
    let cells = header.width.checked_mul(header.height).ok_or_else(oversized)?;
    let band_bytes = cells.checked_mul(size).ok_or_else(oversized)?;
    let values_len = header
        .bands
        .len()
        .checked_mul(band_bytes)
        .ok_or_else(oversized)?;
    let expected = masks
        .checked_mul(cells)
        .and_then(|mask_len| values_len.checked_add(mask_len))
        .ok_or_else(oversized)?;
    if payload.len() != expected {
        return Err(PyramidError::format(format!(
            "payload has {} bytes, expected {}",
            payload.len(),
            expected
        )));
    }

    let shape = (header.height, header.width);
    let (values, mut mask_bytes) = payload.split_at(values_len);
    let mut bands = Vec::with_capacity(header.bands.len());
    for (i, bh) in header.bands.into_iter().enumerate() {
        let raw = &values[i * band_bytes..(i + 1) * band_bytes];
        let mask = if bh.has_mask {
            let (mask, rest) = mask_bytes.split_at(cells);
            mask_bytes = rest;
            Some(mask)
        } else {
            None
        };

        let data: Vec<Option<f64>> = raw
            .chunks_exact(size)
            .enumerate()
            .map(|(j, chunk)| {
                let valid = mask.map_or(true, |m| m[j] != 0);
                valid.then(|| header.dtype.read_value(chunk))
            })
            .collect();
        let data = Array2::from_shape_vec(shape, data)
            .map_err(|e| PyramidError::format(format!("bad band shape: {}", e)))?;
        bands.push(Band::new(bh.name, data));
    }

    Raster::with_dtype(header.bounds, header.crs, bands, header.dtype)
        .map_err(|e| PyramidError::format(e.to_string()))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
