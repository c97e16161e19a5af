//! The SPACK self-describing binary value codec.
//!
//! A value is a single tag byte followed by a big-endian body:
//!
//! ```text
//! 0x00 Null
//! 0x01 Bool    | 1 byte
//! 0x02 Int     | i64 BE
//! 0x03 Float   | f64 BE
//! 0x04 Str     | u32 len | UTF-8 bytes
//! 0x05 Bytes   | u32 len | bytes
//! 0x06 Array   | u32 count | tagged values
//! 0x07 Map     | u32 count | (u32 keyLen | key | tagged value)*
//! ```

use std::collections::BTreeMap;

use crate::core::SpackError;
use crate::wire::{WireReader, WireWriter};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

/// Decoder nesting bound; keeps the codec total on adversarial input.
const MAX_DEPTH: usize = 64;

/// A SPACK object-graph value.
#[derive(Debug, Clone, PartialEq)]
pub enum SpackValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Array(Vec<SpackValue>),
    /// String-keyed map with deterministic key order.
    Map(BTreeMap<String, SpackValue>),
}

impl SpackValue {
    /// The value's wire tag.
    pub fn tag(&self) -> u8 {
        match self {
            SpackValue::Null => TAG_NULL,
            SpackValue::Bool(_) => TAG_BOOL,
            SpackValue::Int(_) => TAG_INT,
            SpackValue::Float(_) => TAG_FLOAT,
            SpackValue::Str(_) => TAG_STR,
            SpackValue::Bytes(_) => TAG_BYTES,
            SpackValue::Array(_) => TAG_ARRAY,
            SpackValue::Map(_) => TAG_MAP,
        }
    }

    /// Human-readable name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            SpackValue::Null => "null",
            SpackValue::Bool(_) => "bool",
            SpackValue::Int(_) => "int",
            SpackValue::Float(_) => "float",
            SpackValue::Str(_) => "str",
            SpackValue::Bytes(_) => "bytes",
            SpackValue::Array(_) => "array",
            SpackValue::Map(_) => "map",
        }
    }

    /// Borrow as a string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SpackValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as an integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SpackValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow as an array, if this is one.
    pub fn as_array(&self) -> Option<&[SpackValue]> {
        match self {
            SpackValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a map, if this is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, SpackValue>> {
        match self {
            SpackValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    fn write_to(&self, writer: &mut WireWriter) {
        writer.write_u8(self.tag());
        match self {
            SpackValue::Null => {}
            SpackValue::Bool(b) => writer.write_u8(u8::from(*b)),
            SpackValue::Int(i) => writer.write_i64(*i),
            SpackValue::Float(f) => writer.write_f64(*f),
            SpackValue::Str(s) => writer.write_block(s.as_bytes()),
            SpackValue::Bytes(b) => writer.write_block(b),
            SpackValue::Array(items) => {
                writer.write_u32(items.len() as u32);
                for item in items {
                    item.write_to(writer);
                }
            }
            SpackValue::Map(entries) => {
                writer.write_u32(entries.len() as u32);
                for (key, value) in entries {
                    writer.write_block(key.as_bytes());
                    value.write_to(writer);
                }
            }
        }
    }

    fn read_from(reader: &mut WireReader<'_>, depth: usize) -> Result<Self, SpackError> {
        if depth > MAX_DEPTH {
            return Err(SpackError::DepthExceeded);
        }
        let tag = reader.read_u8()?;
        match tag {
            TAG_NULL => Ok(SpackValue::Null),
            TAG_BOOL => Ok(SpackValue::Bool(reader.read_u8()? != 0)),
            TAG_INT => Ok(SpackValue::Int(reader.read_i64()?)),
            TAG_FLOAT => Ok(SpackValue::Float(reader.read_f64()?)),
            TAG_STR => {
                let bytes = reader.read_block()?;
                let s = std::str::from_utf8(bytes).map_err(|_| SpackError::InvalidUtf8)?;
                Ok(SpackValue::Str(s.to_owned()))
            }
            TAG_BYTES => Ok(SpackValue::Bytes(reader.read_block()?.to_vec())),
            TAG_ARRAY => {
                let count = reader.read_u32()? as usize;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(Self::read_from(reader, depth + 1)?);
                }
                Ok(SpackValue::Array(items))
            }
            TAG_MAP => {
                let count = reader.read_u32()? as usize;
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key_bytes = reader.read_block()?;
                    let key = std::str::from_utf8(key_bytes)
                        .map_err(|_| SpackError::InvalidUtf8)?
                        .to_owned();
                    let value = Self::read_from(reader, depth + 1)?;
                    entries.insert(key, value);
                }
                Ok(SpackValue::Map(entries))
            }
            other => Err(SpackError::UnknownTag(other)),
        }
    }
}

impl From<&str> for SpackValue {
    fn from(s: &str) -> Self {
        SpackValue::Str(s.to_owned())
    }
}

impl From<i64> for SpackValue {
    fn from(i: i64) -> Self {
        SpackValue::Int(i)
    }
}

impl From<f64> for SpackValue {
    fn from(f: f64) -> Self {
        SpackValue::Float(f)
    }
}

impl From<bool> for SpackValue {
    fn from(b: bool) -> Self {
        SpackValue::Bool(b)
    }
}

/// Encode a value to its contiguous byte form.
pub fn serialize_spack(value: &SpackValue) -> Vec<u8> {
    let mut writer = WireWriter::new();
    value.write_to(&mut writer);
    writer.finish()
}

/// Decode a value, requiring the input to be consumed exactly.
pub fn deserialize_spack(bytes: &[u8]) -> Result<SpackValue, SpackError> {
    let mut reader = WireReader::new(bytes);
    let value = SpackValue::read_from(&mut reader, 0)?;
    if !reader.is_empty() {
        return Err(SpackError::TrailingData {
            remaining: reader.remaining(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SpackValue {
        let mut inner = BTreeMap::new();
        inner.insert("usage".to_owned(), SpackValue::Float(0.42));
        inner.insert("ts".to_owned(), SpackValue::Int(1_700_000_000));
        SpackValue::Map(
            [
                ("name".to_owned(), SpackValue::from("cpu")),
                ("enabled".to_owned(), SpackValue::Bool(true)),
                ("raw".to_owned(), SpackValue::Bytes(vec![1, 2, 3])),
                (
                    "samples".to_owned(),
                    SpackValue::Array(vec![SpackValue::Int(1), SpackValue::Null]),
                ),
                ("last".to_owned(), SpackValue::Map(inner)),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn test_roundtrip_nested() {
        let value = sample();
        let bytes = serialize_spack(&value);
        assert_eq!(deserialize_spack(&bytes).unwrap(), value);
    }

    #[test]
    fn test_scalar_layouts() {
        assert_eq!(serialize_spack(&SpackValue::Null), vec![0x00]);
        assert_eq!(serialize_spack(&SpackValue::Bool(true)), vec![0x01, 0x01]);
        assert_eq!(
            serialize_spack(&SpackValue::Int(1)),
            vec![0x02, 0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(
            serialize_spack(&SpackValue::from("ab")),
            vec![0x04, 0, 0, 0, 2, b'a', b'b']
        );
    }

    #[test]
    fn test_map_order_is_deterministic() {
        let mut a = BTreeMap::new();
        a.insert("z".to_owned(), SpackValue::Int(1));
        a.insert("a".to_owned(), SpackValue::Int(2));
        let mut b = BTreeMap::new();
        b.insert("a".to_owned(), SpackValue::Int(2));
        b.insert("z".to_owned(), SpackValue::Int(1));
        assert_eq!(
            serialize_spack(&SpackValue::Map(a)),
            serialize_spack(&SpackValue::Map(b))
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            deserialize_spack(&[0x7F]),
            Err(SpackError::UnknownTag(0x7F))
        );
    }

    #[test]
    fn test_trailing_data() {
        let mut bytes = serialize_spack(&SpackValue::Null);
        bytes.push(0xFF);
        assert_eq!(
            deserialize_spack(&bytes),
            Err(SpackError::TrailingData { remaining: 1 })
        );
    }

    #[test]
    fn test_invalid_utf8() {
        // Str of length 1 holding a lone continuation byte.
        let bytes = [0x04, 0, 0, 0, 1, 0x80];
        assert_eq!(deserialize_spack(&bytes), Err(SpackError::InvalidUtf8));
    }

    #[test]
    fn test_truncated_everywhere() {
        let bytes = serialize_spack(&sample());
        for k in 0..bytes.len() {
            assert!(
                deserialize_spack(&bytes[..k]).is_err(),
                "prefix of {k} bytes should not decode"
            );
        }
    }

    #[test]
    fn test_depth_bound() {
        // 70 nested single-element arrays around a Null.
        let mut bytes = Vec::new();
        for _ in 0..70 {
            bytes.push(0x06);
            bytes.extend_from_slice(&1u32.to_be_bytes());
        }
        bytes.push(0x00);
        assert_eq!(deserialize_spack(&bytes), Err(SpackError::DepthExceeded));
    }
}
