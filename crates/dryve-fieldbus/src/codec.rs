//! Little-endian value codec for SDO payloads.
//!
//! Values are multiplied by the object's scale before packing and divided by
//! it after unpacking. Conversion to the wire type truncates toward zero;
//! no other rounding is applied, so a scale that is too coarse for the
//! values in use silently loses precision.

use dryve_common::error::{DryveError, DryveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire data types understood by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit.
    U8,
    /// Signed 8-bit.
    I8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// IEEE-754 single precision.
    F32,
}

impl DataType {
    /// Encoded width in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
        }
    }

    /// Name used in configuration and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
            Self::F32 => "float32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = DryveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint8" | "u8" => Ok(Self::U8),
            "int8" | "i8" => Ok(Self::I8),
            "uint16" | "u16" => Ok(Self::U16),
            "int16" | "i16" => Ok(Self::I16),
            "uint32" | "u32" => Ok(Self::U32),
            "int32" | "i32" => Ok(Self::I32),
            "float32" | "f32" => Ok(Self::F32),
            other => Err(DryveError::UnsupportedType(other.to_string())),
        }
    }
}

/// A decoded or to-be-encoded object value.
///
/// Integer objects with a scale of 1 decode to [`Value::Int`]; floats and
/// scaled objects decode to [`Value::Float`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Exact integer value.
    Int(i64),
    /// Floating-point or scaled value.
    Float(f64),
}

impl Value {
    /// Value as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Value as `i64`, truncating floats toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v.trunc() as i64,
        }
    }

    /// Value as a 16-bit register, if it fits.
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        u16::try_from(self.as_i64()).ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(u8, i8, u16, i16, u32, i32, i64);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Apply `scale` and truncate to an integer.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scaled_integer(value: Value, scale: u32) -> DryveResult<i64> {
    match value {
        Value::Int(v) if scale == 1 => Ok(v),
        Value::Int(v) => v
            .checked_mul(i64::from(scale))
            .ok_or_else(|| DryveError::ValueOutOfRange(format!("{v} * {scale} overflows"))),
        Value::Float(v) => {
            let scaled = if scale == 1 { v } else { v * f64::from(scale) };
            if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
                return Err(DryveError::ValueOutOfRange(format!("{v} * {scale}")));
            }
            Ok(scaled.trunc() as i64)
        }
    }
}

fn narrow<T: TryFrom<i64>>(raw: i64, data_type: DataType) -> DryveResult<T> {
    T::try_from(raw)
        .map_err(|_| DryveError::ValueOutOfRange(format!("{raw} does not fit {data_type}")))
}

/// Encode `value` as the little-endian representation of `data_type`.
///
/// # Errors
///
/// Returns [`DryveError::ValueOutOfRange`] if the scaled value does not fit
/// the data type.
#[allow(clippy::cast_possible_truncation)]
pub fn pack(value: Value, data_type: DataType, scale: u32) -> DryveResult<Vec<u8>> {
    if data_type == DataType::F32 {
        let scaled = if scale == 1 {
            value.as_f64()
        } else {
            value.as_f64() * f64::from(scale)
        };
        return Ok((scaled as f32).to_le_bytes().to_vec());
    }

    let raw = scaled_integer(value, scale)?;
    let bytes = match data_type {
        DataType::U8 => narrow::<u8>(raw, data_type)?.to_le_bytes().to_vec(),
        DataType::I8 => narrow::<i8>(raw, data_type)?.to_le_bytes().to_vec(),
        DataType::U16 => narrow::<u16>(raw, data_type)?.to_le_bytes().to_vec(),
        DataType::I16 => narrow::<i16>(raw, data_type)?.to_le_bytes().to_vec(),
        DataType::U32 => narrow::<u32>(raw, data_type)?.to_le_bytes().to_vec(),
        DataType::I32 => narrow::<i32>(raw, data_type)?.to_le_bytes().to_vec(),
        DataType::F32 => unreachable!("handled above"),
    };
    Ok(bytes)
}

/// Decode little-endian `bytes` of `data_type`, dividing by `scale`.
///
/// # Errors
///
/// Returns [`DryveError::LengthMismatch`] if `bytes` is not exactly as wide
/// as the data type.
#[allow(clippy::cast_precision_loss)]
pub fn unpack(bytes: &[u8], data_type: DataType, scale: u32) -> DryveResult<Value> {
    if bytes.len() != data_type.width() {
        return Err(DryveError::LengthMismatch {
            expected: data_type.width(),
            actual: bytes.len(),
        });
    }

    let raw = match data_type {
        DataType::U8 => Value::Int(i64::from(bytes[0])),
        DataType::I8 => Value::Int(i64::from(i8::from_le_bytes([bytes[0]]))),
        DataType::U16 => Value::Int(i64::from(u16::from_le_bytes([bytes[0], bytes[1]]))),
        DataType::I16 => Value::Int(i64::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
        DataType::U32 => Value::Int(i64::from(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        DataType::I32 => Value::Int(i64::from(i32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        DataType::F32 => Value::Float(f64::from(f32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
    };

    if scale == 1 {
        return Ok(raw);
    }
    Ok(Value::Float(raw.as_f64() / f64::from(scale)))
}
