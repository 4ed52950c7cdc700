#![forbid(unsafe_code)]

use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime element-type tag shared by columns and scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool8,
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    Float32,
    Float64,
    TimestampDays,
    TimestampSeconds,
    TimestampMilliseconds,
    TimestampMicroseconds,
    TimestampNanoseconds,
    DurationDays,
    DurationSeconds,
    DurationMilliseconds,
    DurationMicroseconds,
    DurationNanoseconds,
    Utf8,
}

/// Physical storage shape of a dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    FixedWidth { width: usize },
    VariableLength,
}

/// Native representation backing a fixed-width dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NativeType {
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

impl DType {
    pub const ALL: [DType; 22] = [
        DType::Bool8,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::UInt8,
        DType::UInt16,
        DType::UInt32,
        DType::UInt64,
        DType::Float32,
        DType::Float64,
        DType::TimestampDays,
        DType::TimestampSeconds,
        DType::TimestampMilliseconds,
        DType::TimestampMicroseconds,
        DType::TimestampNanoseconds,
        DType::DurationDays,
        DType::DurationSeconds,
        DType::DurationMilliseconds,
        DType::DurationMicroseconds,
        DType::DurationNanoseconds,
        DType::Utf8,
    ];

    /// Native type of a fixed-width dtype; `None` for variable-length types.
    #[must_use]
    pub fn native(self) -> Option<NativeType> {
        let native = match self {
            Self::Bool8 => NativeType::Bool,
            Self::Int8 => NativeType::I8,
            Self::Int16 => NativeType::I16,
            Self::Int32 | Self::TimestampDays | Self::DurationDays => NativeType::I32,
            Self::Int64
            | Self::TimestampSeconds
            | Self::TimestampMilliseconds
            | Self::TimestampMicroseconds
            | Self::TimestampNanoseconds
            | Self::DurationSeconds
            | Self::DurationMilliseconds
            | Self::DurationMicroseconds
            | Self::DurationNanoseconds => NativeType::I64,
            Self::UInt8 => NativeType::U8,
            Self::UInt16 => NativeType::U16,
            Self::UInt32 => NativeType::U32,
            Self::UInt64 => NativeType::U64,
            Self::Float32 => NativeType::F32,
            Self::Float64 => NativeType::F64,
            Self::Utf8 => return None,
        };
        Some(native)
    }

    #[must_use]
    pub fn layout(self) -> Layout {
        match self.native() {
            Some(native) => Layout::FixedWidth {
                width: native.width(),
            },
            None => Layout::VariableLength,
        }
    }

    #[must_use]
    pub fn width(self) -> Option<usize> {
        self.native().map(NativeType::width)
    }

    #[must_use]
    pub fn is_fixed_width(self) -> bool {
        matches!(self.layout(), Layout::FixedWidth { .. })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool8 => "bool8",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::TimestampDays => "timestamp_days",
            Self::TimestampSeconds => "timestamp_seconds",
            Self::TimestampMilliseconds => "timestamp_milliseconds",
            Self::TimestampMicroseconds => "timestamp_microseconds",
            Self::TimestampNanoseconds => "timestamp_nanoseconds",
            Self::DurationDays => "duration_days",
            Self::DurationSeconds => "duration_seconds",
            Self::DurationMilliseconds => "duration_milliseconds",
            Self::DurationMicroseconds => "duration_microseconds",
            Self::DurationNanoseconds => "duration_nanoseconds",
            Self::Utf8 => "utf8",
        }
    }

    /// Smallest representable value, as a valid scalar.
    ///
    /// Temporal types use the min of their tick representation.
    #[must_use]
    pub fn lowest(self) -> Option<Scalar> {
        self.bound(false)
    }

    /// Largest representable value, as a valid scalar.
    #[must_use]
    pub fn highest(self) -> Option<Scalar> {
        self.bound(true)
    }

    fn bound(self, high: bool) -> Option<Scalar> {
        let scalar = match self.native()? {
            NativeType::Bool => Scalar::from_native(self, high),
            NativeType::I8 => Scalar::from_native(self, if high { i8::MAX } else { i8::MIN }),
            NativeType::I16 => Scalar::from_native(self, if high { i16::MAX } else { i16::MIN }),
            NativeType::I32 => Scalar::from_native(self, if high { i32::MAX } else { i32::MIN }),
            NativeType::I64 => Scalar::from_native(self, if high { i64::MAX } else { i64::MIN }),
            NativeType::U8 => Scalar::from_native(self, if high { u8::MAX } else { u8::MIN }),
            NativeType::U16 => Scalar::from_native(self, if high { u16::MAX } else { u16::MIN }),
            NativeType::U32 => Scalar::from_native(self, if high { u32::MAX } else { u32::MIN }),
            NativeType::U64 => Scalar::from_native(self, if high { u64::MAX } else { u64::MIN }),
            NativeType::F32 => Scalar::from_native(self, if high { f32::MAX } else { f32::MIN }),
            NativeType::F64 => Scalar::from_native(self, if high { f64::MAX } else { f64::MIN }),
        };
        Some(scalar)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust value types that can be stored in a fixed-width column.
///
/// Values are stored little-endian; `read_le`/`write_le` expect a slice of
/// at least `NATIVE.width()` bytes.
pub trait FixedWidth: Copy + Send + Sync + PartialEq + fmt::Debug + 'static {
    const NATIVE: NativeType;

    fn write_le(self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_fixed_width {
    ($($ty:ty => $native:ident),* $(,)?) => {
        $(
            impl FixedWidth for $ty {
                const NATIVE: NativeType = NativeType::$native;

                fn write_le(self, out: &mut [u8]) {
                    out[..size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0_u8; size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..size_of::<$ty>()]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_fixed_width! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl FixedWidth for bool {
    const NATIVE: NativeType = NativeType::Bool;

    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("native type {native:?} cannot represent dtype {dtype}")]
    NativeMismatch { dtype: DType, native: NativeType },
    #[error("dtype {dtype} is not a string type")]
    NotAString { dtype: DType },
    #[error("string payload is not valid utf-8")]
    InvalidUtf8,
    #[error("dtype {dtype} needs a {expected}-byte payload, got {actual} bytes")]
    PayloadWidth {
        dtype: DType,
        expected: usize,
        actual: usize,
    },
}

/// A single typed value with its own validity flag.
///
/// An invalid scalar keeps its dtype; its payload is zeroed for fixed-width
/// types and empty for strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawScalar")]
pub struct Scalar {
    dtype: DType,
    valid: bool,
    payload: Vec<u8>,
}

#[derive(Deserialize)]
struct RawScalar {
    dtype: DType,
    valid: bool,
    payload: Vec<u8>,
}

// Payloads must be exactly the dtype's width, or UTF-8 for strings.
impl TryFrom<RawScalar> for Scalar {
    type Error = TypeError;

    fn try_from(raw: RawScalar) -> Result<Self, Self::Error> {
        match raw.dtype.width() {
            Some(expected) if raw.payload.len() != expected => {
                return Err(TypeError::PayloadWidth {
                    dtype: raw.dtype,
                    expected,
                    actual: raw.payload.len(),
                });
            }
            Some(_) => {}
            None => {
                std::str::from_utf8(&raw.payload).map_err(|_| TypeError::InvalidUtf8)?;
            }
        }
        Ok(Self {
            dtype: raw.dtype,
            valid: raw.valid,
            payload: raw.payload,
        })
    }
}

impl Scalar {
    /// Build a valid fixed-width scalar, checking that `T` is the native
    /// representation of `dtype`.
    pub fn new<T: FixedWidth>(dtype: DType, value: T) -> Result<Self, TypeError> {
        if dtype.native() != Some(T::NATIVE) {
            return Err(TypeError::NativeMismatch {
                dtype,
                native: T::NATIVE,
            });
        }
        Ok(Self::from_native(dtype, value))
    }

    fn from_native<T: FixedWidth>(dtype: DType, value: T) -> Self {
        let mut payload = vec![0_u8; T::NATIVE.width()];
        value.write_le(&mut payload);
        Self {
            dtype,
            valid: true,
            payload,
        }
    }

    #[must_use]
    pub fn null(dtype: DType) -> Self {
        Self {
            dtype,
            valid: false,
            payload: vec![0_u8; dtype.width().unwrap_or(0)],
        }
    }

    #[must_use]
    pub fn utf8(value: impl Into<String>) -> Self {
        Self {
            dtype: DType::Utf8,
            valid: true,
            payload: value.into().into_bytes(),
        }
    }

    #[must_use]
    pub fn bool8(value: bool) -> Self {
        Self::from_native(DType::Bool8, value)
    }

    #[must_use]
    pub fn int32(value: i32) -> Self {
        Self::from_native(DType::Int32, value)
    }

    #[must_use]
    pub fn int64(value: i64) -> Self {
        Self::from_native(DType::Int64, value)
    }

    #[must_use]
    pub fn float64(value: f64) -> Self {
        Self::from_native(DType::Float64, value)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Raw little-endian (or UTF-8) payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Typed value, or `None` when the scalar is null.
    pub fn value<T: FixedWidth>(&self) -> Result<Option<T>, TypeError> {
        if self.dtype.native() != Some(T::NATIVE) {
            return Err(TypeError::NativeMismatch {
                dtype: self.dtype,
                native: T::NATIVE,
            });
        }
        if !self.valid {
            return Ok(None);
        }
        Ok(Some(T::read_le(&self.payload)))
    }

    pub fn as_str(&self) -> Result<Option<&str>, TypeError> {
        if self.dtype != DType::Utf8 {
            return Err(TypeError::NotAString { dtype: self.dtype });
        }
        if !self.valid {
            return Ok(None);
        }
        std::str::from_utf8(&self.payload)
            .map(Some)
            .map_err(|_| TypeError::InvalidUtf8)
    }

    /// Number of string bytes this scalar contributes as a fill value.
    #[must_use]
    pub fn string_len(&self) -> usize {
        if self.valid && self.dtype == DType::Utf8 {
            self.payload.len()
        } else {
            0
        }
    }
}
