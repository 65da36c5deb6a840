//! Primitive on-disk values.

use std::hash::Hasher;

use skein_common::{half, BinaryReader, BinaryWriter, Endian};

use crate::schema::IntKind;
use crate::{Error, Result};

/// Read cap for null-terminated strings.
pub const ZSTRING_MAX: usize = 1_000;
/// Cap on length-prefixed string payloads, bounding reads of corrupt
/// lengths before any allocation happens.
pub const SIZED_STRING_MAX: usize = 10_000;
/// Sanity cap on undecoded trailing blobs.
pub const BLOB_MAX: usize = 16_000_000;

/// A primitive value with its on-disk encoding.
///
/// Integer variants are parameterized by width and signedness; `F16`
/// keeps the raw half bits so round trips are bit-exact regardless of
/// codec behavior on NaN payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum BasicValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    /// Half-precision float, stored as raw bits.
    F16(u16),
    /// Null-terminated byte string (terminator not stored).
    ZString(Vec<u8>),
    /// 4-byte length-prefixed byte string.
    SizedString(Vec<u8>),
    /// Exactly `len` bytes; content shorter than `len` is zero-padded.
    FixedString { len: usize, data: Vec<u8> },
    /// Undecoded remainder of the stream.
    Blob(Vec<u8>),
}

impl BasicValue {
    /// Default-construct a value of the given kind. `arg` supplies the
    /// byte length for fixed-length strings.
    pub(crate) fn new(kind: crate::schema::BasicKind, arg: i64) -> Self {
        use crate::schema::BasicKind::*;
        match kind {
            Int(IntKind::U8) => Self::U8(0),
            Int(IntKind::I8) => Self::I8(0),
            Int(IntKind::U16) => Self::U16(0),
            Int(IntKind::I16) => Self::I16(0),
            Int(IntKind::U32) => Self::U32(0),
            Int(IntKind::I32) => Self::I32(0),
            Int(IntKind::U64) => Self::U64(0),
            Int(IntKind::I64) => Self::I64(0),
            Float32 => Self::F32(0.0),
            Float16 => Self::F16(0),
            ZString => Self::ZString(Vec::new()),
            SizedString => Self::SizedString(Vec::new()),
            FixedString => {
                let len = arg.max(0) as usize;
                Self::FixedString {
                    len,
                    data: vec![0; len],
                }
            }
            Blob => Self::Blob(Vec::new()),
        }
    }

    /// The integer kind of this value, if it is an integer.
    pub fn int_kind(&self) -> Option<IntKind> {
        Some(match self {
            Self::U8(_) => IntKind::U8,
            Self::I8(_) => IntKind::I8,
            Self::U16(_) => IntKind::U16,
            Self::I16(_) => IntKind::I16,
            Self::U32(_) => IntKind::U32,
            Self::I32(_) => IntKind::I32,
            Self::U64(_) => IntKind::U64,
            Self::I64(_) => IntKind::I64,
            _ => return None,
        })
    }

    /// Overwrite from the stream. `arg` re-supplies the fixed-string
    /// length, which may depend on a sibling attribute read just before.
    pub(crate) fn read(
        &mut self,
        r: &mut BinaryReader<'_>,
        order: Endian,
        arg: i64,
    ) -> Result<()> {
        match self {
            Self::U8(v) => *v = r.read_u8()?,
            Self::I8(v) => *v = r.read_i8()?,
            Self::U16(v) => *v = r.read_u16(order)?,
            Self::I16(v) => *v = r.read_i16(order)?,
            Self::U32(v) => *v = r.read_u32(order)?,
            Self::I32(v) => *v = r.read_i32(order)?,
            Self::U64(v) => *v = r.read_u64(order)?,
            Self::I64(v) => *v = r.read_i64(order)?,
            Self::F32(v) => *v = r.read_f32(order)?,
            Self::F16(v) => *v = r.read_u16(order)?,
            Self::ZString(data) => *data = r.read_zstring_bytes(ZSTRING_MAX)?.to_vec(),
            Self::SizedString(data) => {
                let len = r.read_u32(order)? as usize;
                if len > SIZED_STRING_MAX {
                    return Err(Error::LengthOutOfBounds {
                        kind: "sized string".into(),
                        len,
                        max: SIZED_STRING_MAX,
                    });
                }
                *data = r.read_bytes(len)?.to_vec();
            }
            Self::FixedString { len, data } => {
                let n = arg.max(0) as usize;
                *data = r.read_bytes(n)?.to_vec();
                *len = n;
            }
            Self::Blob(data) => {
                let rest = r.remaining_bytes();
                *data = rest.to_vec();
                r.advance(rest.len());
            }
        }
        Ok(())
    }

    /// Serialize the current state.
    pub(crate) fn write(&self, w: &mut BinaryWriter, order: Endian) {
        match self {
            Self::U8(v) => w.write_u8(*v),
            Self::I8(v) => w.write_i8(*v),
            Self::U16(v) => w.write_u16(*v, order),
            Self::I16(v) => w.write_i16(*v, order),
            Self::U32(v) => w.write_u32(*v, order),
            Self::I32(v) => w.write_i32(*v, order),
            Self::U64(v) => w.write_u64(*v, order),
            Self::I64(v) => w.write_i64(*v, order),
            Self::F32(v) => w.write_f32(*v, order),
            Self::F16(v) => w.write_u16(*v, order),
            Self::ZString(data) => w.write_zstring_bytes(data),
            Self::SizedString(data) => {
                w.write_u32(data.len() as u32, order);
                w.write_bytes(data);
            }
            Self::FixedString { len, data } => {
                w.write_bytes(data);
                for _ in data.len()..*len {
                    w.write_u8(0);
                }
            }
            Self::Blob(data) => w.write_bytes(data),
        }
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::U8(_) | Self::I8(_) => 1,
            Self::U16(_) | Self::I16(_) | Self::F16(_) => 2,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 4,
            Self::U64(_) | Self::I64(_) => 8,
            Self::ZString(data) => data.len() as u64 + 1,
            Self::SizedString(data) => data.len() as u64 + 4,
            Self::FixedString { len, .. } => *len as u64,
            Self::Blob(data) => data.len() as u64,
        }
    }

    /// Feed the value into a hasher. Floats hash by bit pattern.
    pub(crate) fn feed_hash(&self, state: &mut dyn Hasher) {
        match self {
            Self::U8(v) => state.write_u8(*v),
            Self::I8(v) => state.write_i8(*v),
            Self::U16(v) | Self::F16(v) => state.write_u16(*v),
            Self::I16(v) => state.write_i16(*v),
            Self::U32(v) => state.write_u32(*v),
            Self::I32(v) => state.write_i32(*v),
            Self::U64(v) => state.write_u64(*v),
            Self::I64(v) => state.write_i64(*v),
            Self::F32(v) => state.write_u32(v.to_bits()),
            Self::ZString(data) | Self::SizedString(data) | Self::Blob(data) => {
                state.write(data)
            }
            Self::FixedString { data, .. } => state.write(data),
        }
    }

    /// Integer coercion used by the expression evaluator. Floats
    /// truncate; strings and blobs are not integer-like.
    pub fn as_int(&self) -> Result<i64> {
        Ok(match self {
            Self::U8(v) => *v as i64,
            Self::I8(v) => *v as i64,
            Self::U16(v) => *v as i64,
            Self::I16(v) => *v as i64,
            Self::U32(v) => *v as i64,
            Self::I32(v) => *v as i64,
            Self::U64(v) => *v as i64,
            Self::I64(v) => *v,
            Self::F32(v) => *v as i64,
            Self::F16(v) => half::half_to_f32(*v) as i64,
            _ => {
                return Err(Error::KindMismatch {
                    expected: "integer-like",
                    found: self.kind_name(),
                })
            }
        })
    }

    /// Float accessor for `F32`/`F16`.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            Self::F16(v) => Some(half::half_to_f32(*v)),
            _ => None,
        }
    }

    /// String content, if this is a string kind. Fixed-length strings are
    /// trimmed at the first embedded zero byte.
    pub fn str_value(&self) -> Option<String> {
        let bytes: &[u8] = match self {
            Self::ZString(data) | Self::SizedString(data) => data,
            Self::FixedString { data, .. } => {
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                &data[..end]
            }
            _ => return None,
        };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Set an integer value, validating the declared range.
    pub fn set_int(&mut self, value: i64) -> Result<()> {
        if let Some(kind) = self.int_kind() {
            let (lo, hi) = kind.range();
            let wide = value as i128;
            if wide < lo || wide > hi {
                return Err(Error::ValueRange {
                    kind: kind.as_str().to_string(),
                    value: value.to_string(),
                });
            }
        }
        match self {
            Self::U8(v) => *v = value as u8,
            Self::I8(v) => *v = value as i8,
            Self::U16(v) => *v = value as u16,
            Self::I16(v) => *v = value as i16,
            Self::U32(v) => *v = value as u32,
            Self::I32(v) => *v = value as i32,
            Self::U64(v) => *v = value as u64,
            Self::I64(v) => *v = value,
            Self::F32(v) => *v = value as f32,
            Self::F16(v) => *v = half::f32_to_half(value as f32),
            _ => {
                return Err(Error::KindMismatch {
                    expected: "integer-like",
                    found: self.kind_name(),
                })
            }
        }
        Ok(())
    }

    /// Set a float value.
    ///
    /// A finite value beyond the f32 range degrades to quiet NaN instead
    /// of failing, so one out-of-range field never aborts a whole-file
    /// write. This is the single silent-degrade exception to the fail-loud
    /// policy; it is logged.
    pub fn set_f64(&mut self, value: f64) -> Result<()> {
        match self {
            Self::F32(v) => {
                if value.is_finite() && value.abs() > f32::MAX as f64 {
                    log::warn!("float32 overflow ({value}); storing NaN");
                    *v = f32::NAN;
                } else {
                    *v = value as f32;
                }
            }
            Self::F16(v) => *v = half::f32_to_half(value as f32),
            _ => {
                return Err(Error::KindMismatch {
                    expected: "float",
                    found: self.kind_name(),
                })
            }
        }
        Ok(())
    }

    /// Set string content with kind-specific validation.
    pub fn set_string(&mut self, s: &str) -> Result<()> {
        self.set_string_bytes(s.as_bytes())
    }

    /// Set string/blob content from raw bytes.
    pub fn set_string_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::ZString(data) => {
                if bytes.contains(&0) {
                    return Err(Error::ValueRange {
                        kind: "zstring".into(),
                        value: "embedded null byte".into(),
                    });
                }
                if bytes.len() > ZSTRING_MAX {
                    return Err(Error::LengthOutOfBounds {
                        kind: "zstring".into(),
                        len: bytes.len(),
                        max: ZSTRING_MAX,
                    });
                }
                *data = bytes.to_vec();
            }
            Self::SizedString(data) => {
                if bytes.len() > SIZED_STRING_MAX {
                    return Err(Error::LengthOutOfBounds {
                        kind: "sized string".into(),
                        len: bytes.len(),
                        max: SIZED_STRING_MAX,
                    });
                }
                *data = bytes.to_vec();
            }
            Self::FixedString { len, data } => {
                if bytes.len() > *len {
                    return Err(Error::LengthOutOfBounds {
                        kind: "fixed string".into(),
                        len: bytes.len(),
                        max: *len,
                    });
                }
                let mut padded = bytes.to_vec();
                padded.resize(*len, 0);
                *data = padded;
            }
            Self::Blob(data) => {
                if bytes.len() > BLOB_MAX {
                    return Err(Error::LengthOutOfBounds {
                        kind: "blob".into(),
                        len: bytes.len(),
                        max: BLOB_MAX,
                    });
                }
                *data = bytes.to_vec();
            }
            _ => {
                return Err(Error::KindMismatch {
                    expected: "string",
                    found: self.kind_name(),
                })
            }
        }
        Ok(())
    }

    /// Parse and set from display form: decimal or `0x…` for integers,
    /// plain floats for the float kinds, raw content for strings.
    pub fn set_from_str(&mut self, s: &str) -> Result<()> {
        match self {
            Self::F32(_) | Self::F16(_) => {
                let v: f64 = s.parse().map_err(|_| Error::ValueRange {
                    kind: "float".into(),
                    value: s.to_string(),
                })?;
                self.set_f64(v)
            }
            Self::ZString(_) | Self::SizedString(_) | Self::FixedString { .. } | Self::Blob(_) => {
                self.set_string(s)
            }
            _ => {
                let v = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    i64::from_str_radix(hex, 16)
                } else {
                    s.parse::<i64>()
                }
                .map_err(|_| Error::ValueRange {
                    kind: "integer".into(),
                    value: s.to_string(),
                })?;
                self.set_int(v)
            }
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::U8(_) | Self::I8(_) | Self::U16(_) | Self::I16(_) | Self::U32(_)
            | Self::I32(_) | Self::U64(_) | Self::I64(_) => "integer",
            Self::F32(_) => "float32",
            Self::F16(_) => "float16",
            Self::ZString(_) => "zstring",
            Self::SizedString(_) => "sized string",
            Self::FixedString { .. } => "fixed string",
            Self::Blob(_) => "blob",
        }
    }
}

impl std::fmt::Display for BasicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F16(v) => write!(f, "{}", half::half_to_f32(*v)),
            Self::Blob(data) => write!(f, "<{} bytes>", data.len()),
            _ => write!(f, "{}", self.str_value().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BasicKind;

    #[test]
    fn test_int_range_validation() {
        let mut v = BasicValue::new(BasicKind::Int(IntKind::U8), 0);
        assert!(v.set_int(255).is_ok());
        assert!(matches!(v.set_int(256), Err(Error::ValueRange { .. })));
        assert!(matches!(v.set_int(-1), Err(Error::ValueRange { .. })));
    }

    #[test]
    fn test_set_from_hex_string() {
        let mut v = BasicValue::new(BasicKind::Int(IntKind::U32), 0);
        v.set_from_str("0xDEAD").unwrap();
        assert_eq!(v.as_int().unwrap(), 0xDEAD);
        v.set_from_str("17").unwrap();
        assert_eq!(v.as_int().unwrap(), 17);
    }

    #[test]
    fn test_f32_overflow_degrades_to_nan() {
        let mut v = BasicValue::new(BasicKind::Float32, 0);
        v.set_f64(1e300).unwrap();
        match v {
            BasicValue::F32(x) => assert!(x.is_nan()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_zstring_io() {
        let mut v = BasicValue::new(BasicKind::ZString, 0);
        v.set_string("hello").unwrap();
        assert_eq!(v.size(), 6);

        let mut w = BinaryWriter::new();
        v.write(&mut w, Endian::Little);
        let bytes = w.into_bytes();
        assert_eq!(bytes, b"hello\0");

        let mut other = BasicValue::new(BasicKind::ZString, 0);
        let mut r = BinaryReader::new(&bytes);
        other.read(&mut r, Endian::Little, 0).unwrap();
        assert_eq!(other, v);
    }

    #[test]
    fn test_zstring_rejects_embedded_null() {
        let mut v = BasicValue::new(BasicKind::ZString, 0);
        assert!(v.set_string_bytes(b"a\0b").is_err());
    }

    #[test]
    fn test_sized_string_rejects_corrupt_length_early() {
        // length prefix far beyond the cap: rejected before reading data
        let mut w = BinaryWriter::new();
        w.write_u32(1_000_000, Endian::Little);
        let bytes = w.into_bytes();
        let mut v = BasicValue::new(BasicKind::SizedString, 0);
        let mut r = BinaryReader::new(&bytes);
        assert!(matches!(
            v.read(&mut r, Endian::Little, 0),
            Err(Error::LengthOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_fixed_string_pads_and_trims() {
        let mut v = BasicValue::new(BasicKind::FixedString, 8);
        v.set_string("abc").unwrap();
        assert_eq!(v.size(), 8);
        assert_eq!(v.str_value().unwrap(), "abc");

        let mut w = BinaryWriter::new();
        v.write(&mut w, Endian::Big);
        assert_eq!(w.bytes(), &b"abc\0\0\0\0\0"[..]);

        assert!(v.set_string("way too long!").is_err());
    }

    #[test]
    fn test_blob_consumes_rest() {
        let bytes = [1u8, 2, 3, 4, 5];
        let mut r = BinaryReader::new(&bytes);
        r.read_u8().unwrap();
        let mut v = BasicValue::new(BasicKind::Blob, 0);
        v.read(&mut r, Endian::Little, 0).unwrap();
        assert_eq!(v, BasicValue::Blob(vec![2, 3, 4, 5]));
        assert!(r.is_empty());
    }

    #[test]
    fn test_f16_round_trips_raw_bits() {
        let mut w = BinaryWriter::new();
        w.write_u16(0x3c01, Endian::Little);
        let bytes = w.into_bytes();
        let mut v = BasicValue::new(BasicKind::Float16, 0);
        let mut r = BinaryReader::new(&bytes);
        v.read(&mut r, Endian::Little, 0).unwrap();
        let mut out = BinaryWriter::new();
        v.write(&mut out, Endian::Little);
        assert_eq!(out.bytes(), bytes.as_slice());
    }
}
