//! Numeric storage types for raster bands.

use serde::{Deserialize, Serialize};

/// Storage type of every band in a raster.
///
/// Ordered from narrowest to widest within each family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl DataType {
    /// Integer candidates in the order they are tried.
    const INTEGERS: [DataType; 6] = [
        DataType::U8,
        DataType::I8,
        DataType::U16,
        DataType::I16,
        DataType::U32,
        DataType::I32,
    ];

    /// Size of one value in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Inclusive value range of an integer type.
    fn integer_range(&self) -> Option<(f64, f64)> {
        match self {
            DataType::U8 => Some((0.0, u8::MAX as f64)),
            DataType::I8 => Some((i8::MIN as f64, i8::MAX as f64)),
            DataType::U16 => Some((0.0, u16::MAX as f64)),
            DataType::I16 => Some((i16::MIN as f64, i16::MAX as f64)),
            DataType::U32 => Some((0.0, u32::MAX as f64)),
            DataType::I32 => Some((i32::MIN as f64, i32::MAX as f64)),
            DataType::F32 | DataType::F64 => None,
        }
    }

    /// Narrowest type that stores every value exactly.
    ///
    /// Integral values pick the first integer type whose range holds them,
    /// falling back to `F64` beyond `i32`/`u32`. Non-integral values, or
    /// `force_float`, pick `F32` when every value survives a round trip
    /// through `f32`, otherwise `F64`.
    pub fn narrowest<I>(values: I, force_float: bool) -> DataType
    where
        I: IntoIterator<Item = f64>,
    {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut integral = true;
        let mut fits_f32 = true;

        for v in values {
            min = min.min(v);
            max = max.max(v);
            integral &= v.fract() == 0.0;
            fits_f32 &= (v as f32) as f64 == v;
        }

        if force_float || !integral {
            return if fits_f32 { DataType::F32 } else { DataType::F64 };
        }

        if min > max {
            return DataType::U8;
        }

        Self::INTEGERS
            .iter()
            .copied()
            .find(|t| {
                t.integer_range()
                    .is_some_and(|(lo, hi)| min >= lo && max <= hi)
            })
            .unwrap_or(DataType::F64)
    }

    /// Append `value` in little-endian byte order.
    pub fn write_value(&self, out: &mut Vec<u8>, value: f64) {
        match self {
            DataType::U8 => out.push(value as u8),
            DataType::I8 => out.push(value as i8 as u8),
            DataType::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            DataType::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            DataType::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
            DataType::I32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
            DataType::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            DataType::F64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    /// Decode one value from exactly `self.size()` little-endian bytes.
    pub fn read_value(&self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
        match self {
            DataType::U8 => buf[0] as f64,
            DataType::I8 => buf[0] as i8 as f64,
            DataType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            DataType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            DataType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            DataType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            DataType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            DataType::F64 => f64::from_le_bytes(buf),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::U8 => "uint8",
            DataType::I8 => "int8",
            DataType::U16 => "uint16",
            DataType::I16 => "int16",
            DataType::U32 => "uint32",
            DataType::I32 => "int32",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
        };
        f.write_str(name)
    }
}
