//! HDC data-type tags and typed value marshaling.
//!
//! A `DType` is an 8-bit tag whose upper nibble encodes the kind and
//! whose lower nibble encodes the size in bytes; `0x_F` marks a
//! variable-size type. All numeric values travel little-endian on the
//! wire.

use crate::error::HdcError;

// ── DType ────────────────────────────────────────────────────────

/// The HDC data-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Float,
    Double,
    Utf8,
    Bool,
    Blob,
    Dtype,
}

impl DType {
    /// The wire code of this tag.
    pub const fn code(self) -> u8 {
        match self {
            Self::UInt8 => 0x01,
            Self::UInt16 => 0x02,
            Self::UInt32 => 0x04,
            Self::Int8 => 0x11,
            Self::Int16 => 0x12,
            Self::Int32 => 0x14,
            Self::Float => 0x24,
            Self::Double => 0x28,
            Self::Utf8 => 0xAF,
            Self::Bool => 0xB1,
            Self::Blob => 0xBF,
            Self::Dtype => 0xD1,
        }
    }

    /// Decode a wire code back into a tag.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::UInt8,
            0x02 => Self::UInt16,
            0x04 => Self::UInt32,
            0x11 => Self::Int8,
            0x12 => Self::Int16,
            0x14 => Self::Int32,
            0x24 => Self::Float,
            0x28 => Self::Double,
            0xAF => Self::Utf8,
            0xB1 => Self::Bool,
            0xBF => Self::Blob,
            0xD1 => Self::Dtype,
            _ => return None,
        })
    }

    /// The mnemonic name used in the IDL JSON document.
    pub const fn name(self) -> &'static str {
        match self {
            Self::UInt8 => "UINT8",
            Self::UInt16 => "UINT16",
            Self::UInt32 => "UINT32",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Utf8 => "UTF8",
            Self::Bool => "BOOL",
            Self::Blob => "BLOB",
            Self::Dtype => "DTYPE",
        }
    }

    /// Size in bytes on the wire, or `None` for variable-size types.
    ///
    /// `BOOL` occupies one byte even though it only uses one bit.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::UInt8 | Self::Int8 | Self::Bool | Self::Dtype => Some(1),
            Self::UInt16 | Self::Int16 => Some(2),
            Self::UInt32 | Self::Int32 | Self::Float => Some(4),
            Self::Double => Some(8),
            Self::Utf8 | Self::Blob => None,
        }
    }

    /// Whether this tag denotes a variable-size type (lower nibble `0xF`).
    pub const fn is_variable_size(self) -> bool {
        self.fixed_size().is_none()
    }
}

// ── Value ────────────────────────────────────────────────────────

/// A typed HDC value, as carried in property payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Float(f32),
    Double(f64),
    Utf8(String),
    Bool(bool),
    Blob(Vec<u8>),
    Dtype(DType),
}

impl Value {
    /// The tag of this value.
    pub fn dtype(&self) -> DType {
        match self {
            Self::UInt8(_) => DType::UInt8,
            Self::UInt16(_) => DType::UInt16,
            Self::UInt32(_) => DType::UInt32,
            Self::Int8(_) => DType::Int8,
            Self::Int16(_) => DType::Int16,
            Self::Int32(_) => DType::Int32,
            Self::Float(_) => DType::Float,
            Self::Double(_) => DType::Double,
            Self::Utf8(_) => DType::Utf8,
            Self::Bool(_) => DType::Bool,
            Self::Blob(_) => DType::Blob,
            Self::Dtype(_) => DType::Dtype,
        }
    }

    /// Serialize to the little-endian wire representation.
    ///
    /// `UTF8` carries no trailing NUL on the wire.
    pub fn wire_bytes(&self) -> Vec<u8> {
        match self {
            Self::UInt8(v) => vec![*v],
            Self::UInt16(v) => v.to_le_bytes().to_vec(),
            Self::UInt32(v) => v.to_le_bytes().to_vec(),
            Self::Int8(v) => vec![*v as u8],
            Self::Int16(v) => v.to_le_bytes().to_vec(),
            Self::Int32(v) => v.to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
            Self::Utf8(v) => v.as_bytes().to_vec(),
            Self::Bool(v) => vec![u8::from(*v)],
            Self::Blob(v) => v.clone(),
            Self::Dtype(v) => vec![v.code()],
        }
    }

    /// Decode a value of the given tag from its wire representation.
    ///
    /// Fixed-size tags require an exact length. `BOOL` accepts only
    /// `0x00`/`0x01` and `UTF8` must be valid UTF-8.
    pub fn from_wire(dtype: DType, bytes: &[u8]) -> Result<Self, HdcError> {
        if let Some(size) = dtype.fixed_size() {
            if bytes.len() != size {
                return Err(HdcError::Marshal("wrong byte count for fixed-size dtype"));
            }
        }
        Ok(match dtype {
            DType::UInt8 => Self::UInt8(bytes[0]),
            DType::UInt16 => Self::UInt16(u16::from_le_bytes([bytes[0], bytes[1]])),
            DType::UInt32 => {
                Self::UInt32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            DType::Int8 => Self::Int8(bytes[0] as i8),
            DType::Int16 => Self::Int16(i16::from_le_bytes([bytes[0], bytes[1]])),
            DType::Int32 => {
                Self::Int32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            DType::Float => {
                Self::Float(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            DType::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Self::Double(f64::from_le_bytes(raw))
            }
            DType::Utf8 => Self::Utf8(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| HdcError::Marshal("UTF8 value is not valid UTF-8"))?,
            ),
            DType::Bool => match bytes[0] {
                0x00 => Self::Bool(false),
                0x01 => Self::Bool(true),
                _ => return Err(HdcError::Marshal("BOOL value must be 0x00 or 0x01")),
            },
            DType::Blob => Self::Blob(bytes.to_vec()),
            DType::Dtype => Self::Dtype(
                DType::from_code(bytes[0])
                    .ok_or(HdcError::Marshal("unknown DTYPE code in value"))?,
            ),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_nibble_scheme() {
        // Lower nibble is the byte size for every fixed-size tag.
        for dtype in [
            DType::UInt8,
            DType::UInt16,
            DType::UInt32,
            DType::Int8,
            DType::Int16,
            DType::Int32,
            DType::Float,
            DType::Double,
            DType::Dtype,
        ] {
            assert_eq!(
                (dtype.code() & 0x0F) as usize,
                dtype.fixed_size().unwrap(),
                "{dtype:?}"
            );
        }
        // Variable-size tags carry the 0xF marker.
        assert_eq!(DType::Utf8.code() & 0x0F, 0x0F);
        assert_eq!(DType::Blob.code() & 0x0F, 0x0F);
        // BOOL is the one exception: one byte, lower nibble 1.
        assert_eq!(DType::Bool.code(), 0xB1);
        assert_eq!(DType::Bool.fixed_size(), Some(1));
    }

    #[test]
    fn code_roundtrip() {
        for code in 0..=u8::MAX {
            if let Some(dtype) = DType::from_code(code) {
                assert_eq!(dtype.code(), code);
            }
        }
    }

    #[test]
    fn numeric_values_are_little_endian() {
        assert_eq!(Value::UInt32(128).wire_bytes(), vec![0x80, 0x00, 0x00, 0x00]);
        assert_eq!(Value::UInt16(0x1234).wire_bytes(), vec![0x34, 0x12]);
        assert_eq!(Value::Int16(-2).wire_bytes(), vec![0xFE, 0xFF]);
    }

    #[test]
    fn utf8_has_no_trailing_nul() {
        assert_eq!(Value::Utf8("abc".into()).wire_bytes(), b"abc".to_vec());
    }

    #[test]
    fn from_wire_rejects_wrong_sizes() {
        assert!(Value::from_wire(DType::UInt32, &[1, 2, 3]).is_err());
        assert!(Value::from_wire(DType::UInt8, &[]).is_err());
        assert!(Value::from_wire(DType::Bool, &[2]).is_err());
    }

    #[test]
    fn from_wire_roundtrip() {
        let cases = [
            Value::UInt8(7),
            Value::UInt32(0xDEAD_BEEF),
            Value::Int32(-42),
            Value::Float(1.5),
            Value::Double(-0.25),
            Value::Bool(true),
            Value::Utf8("hello".into()),
            Value::Blob(vec![1, 2, 3]),
            Value::Dtype(DType::Float),
        ];
        for value in cases {
            let decoded = Value::from_wire(value.dtype(), &value.wire_bytes()).unwrap();
            assert_eq!(decoded, value);
        }
    }
}
