//! Decoder for committed records.
//!
//! Turns the bytes of one record back into its format string and typed
//! values, and renders the `{}` placeholders for display. Used by drain
//! handlers that want text, and by tests to check what the encoder wrote.

use std::fmt;

use crate::error::DecodeError;
use crate::tag::{align4, ArgTag, LEN_SIZE, TAG_SIZE};

/// An argument read back from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Null,
    Bool(bool),
    Char16(u16),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Text(String),
}

impl DecodedValue {
    pub fn tag(&self) -> ArgTag {
        match self {
            DecodedValue::Null => ArgTag::Null,
            DecodedValue::Bool(_) => ArgTag::Bool,
            DecodedValue::Char16(_) => ArgTag::Char16,
            DecodedValue::Int8(_) => ArgTag::Int8,
            DecodedValue::UInt8(_) => ArgTag::UInt8,
            DecodedValue::Int16(_) => ArgTag::Int16,
            DecodedValue::UInt16(_) => ArgTag::UInt16,
            DecodedValue::Int32(_) => ArgTag::Int32,
            DecodedValue::UInt32(_) => ArgTag::UInt32,
            DecodedValue::Int64(_) => ArgTag::Int64,
            DecodedValue::UInt64(_) => ArgTag::UInt64,
            DecodedValue::Float32(_) => ArgTag::Float32,
            DecodedValue::Float64(_) => ArgTag::Float64,
            DecodedValue::Text(_) => ArgTag::Utf16String,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Null => f.write_str("null"),
            DecodedValue::Bool(v) => write!(f, "{}", v),
            DecodedValue::Char16(unit) => {
                let c = char::decode_utf16([*unit])
                    .next()
                    .and_then(Result::ok)
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                write!(f, "{}", c)
            }
            DecodedValue::Int8(v) => write!(f, "{}", v),
            DecodedValue::UInt8(v) => write!(f, "{}", v),
            DecodedValue::Int16(v) => write!(f, "{}", v),
            DecodedValue::UInt16(v) => write!(f, "{}", v),
            DecodedValue::Int32(v) => write!(f, "{}", v),
            DecodedValue::UInt32(v) => write!(f, "{}", v),
            DecodedValue::Int64(v) => write!(f, "{}", v),
            DecodedValue::UInt64(v) => write!(f, "{}", v),
            DecodedValue::Float32(v) => write!(f, "{}", v),
            DecodedValue::Float64(v) => write!(f, "{}", v),
            DecodedValue::Text(s) => f.write_str(s),
        }
    }
}

/// One record, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub format: String,
    pub values: Vec<DecodedValue>,
}

impl DecodedRecord {
    /// Decodes a whole record. Trailing bytes are an error.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = RecordReader::new(data);
        let format = reader.read_format()?;
        let mut values = Vec::new();
        while let Some(value) = reader.read_value()? {
            values.push(value);
        }
        Ok(Self { format, values })
    }

    pub fn tags(&self) -> Vec<ArgTag> {
        self.values.iter().map(DecodedValue::tag).collect()
    }

    /// Substitutes each `{}` in the format string with the next value.
    ///
    /// Placeholders without a value render as `{MISSING}`; values without a
    /// placeholder are dropped.
    pub fn render(&self) -> String {
        let mut result = String::with_capacity(self.format.len());
        let mut chars = self.format.chars().peekable();
        let mut values = self.values.iter();

        while let Some(c) = chars.next() {
            if c == '{' && chars.peek() == Some(&'}') {
                chars.next();
                match values.next() {
                    Some(value) => result.push_str(&value.to_string()),
                    None => result.push_str("{MISSING}"),
                }
            } else {
                result.push(c);
            }
        }
        result
    }
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Sequential reader over the bytes of one record.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len - available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads `byte_len` bytes of UTF-16 text, then skips padding so that the
    /// whole item, `header` bytes included, is 4-byte aligned.
    fn read_text(&mut self, header: u32, byte_len: u32) -> Result<String, DecodeError> {
        if byte_len % 2 != 0 {
            return Err(DecodeError::OddStringLength {
                len: byte_len,
                offset: self.pos - LEN_SIZE as usize,
            });
        }
        let bytes = self.take(byte_len as usize)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let padding = align4(header + byte_len) - (header + byte_len);
        self.take(padding as usize)?;
        Ok(String::from_utf16_lossy(&units))
    }

    /// Reads the format-string block that opens a record.
    pub fn read_format(&mut self) -> Result<String, DecodeError> {
        let byte_len = self.read_u32()?;
        self.read_text(LEN_SIZE, byte_len)
    }

    /// Reads the next argument, or `None` at the end of the record.
    pub fn read_value(&mut self) -> Result<Option<DecodedValue>, DecodeError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let offset = self.pos;
        let raw = self.data[offset];
        let tag = match ArgTag::from_u8(raw) {
            Some(ArgTag::Unsupported) | None => {
                return Err(DecodeError::UnknownTag { tag: raw, offset })
            }
            Some(tag) => tag,
        };

        let Some(size) = tag.fixed_size() else {
            self.take(TAG_SIZE as usize)?;
            let byte_len = self.read_u32()?;
            let text = self.read_text(TAG_SIZE + LEN_SIZE, byte_len)?;
            return Ok(Some(DecodedValue::Text(text)));
        };

        let item = self.take(size as usize)?;
        let p = &item[tag.payload_offset()..];
        let value = match tag {
            ArgTag::Null => DecodedValue::Null,
            ArgTag::Bool => DecodedValue::Bool(p[0] != 0),
            ArgTag::Char16 => DecodedValue::Char16(u16::from_le_bytes([p[0], p[1]])),
            ArgTag::Int8 => DecodedValue::Int8(p[0] as i8),
            ArgTag::UInt8 => DecodedValue::UInt8(p[0]),
            ArgTag::Int16 => DecodedValue::Int16(i16::from_le_bytes([p[0], p[1]])),
            ArgTag::UInt16 => DecodedValue::UInt16(u16::from_le_bytes([p[0], p[1]])),
            ArgTag::Int32 => DecodedValue::Int32(i32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            ArgTag::UInt32 => DecodedValue::UInt32(u32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            ArgTag::Float32 => DecodedValue::Float32(f32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            ArgTag::Int64 => DecodedValue::Int64(i64::from_le_bytes(eight(p))),
            ArgTag::UInt64 => DecodedValue::UInt64(u64::from_le_bytes(eight(p))),
            ArgTag::Float64 => DecodedValue::Float64(f64::from_le_bytes(eight(p))),
            ArgTag::Utf16String | ArgTag::Unsupported => {
                return Err(DecodeError::UnknownTag { tag: raw, offset })
            }
        };
        Ok(Some(value))
    }
}

fn eight(p: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&p[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let record = DecodedRecord {
            format: "a={} b={} c={}".to_string(),
            values: vec![DecodedValue::Int32(1), DecodedValue::Text("x".into())],
        };
        assert_eq!(record.render(), "a=1 b=x c={MISSING}");
    }

    #[test]
    fn test_char16_display() {
        assert_eq!(DecodedValue::Char16(0x4e16).to_string(), "世");
        assert_eq!(DecodedValue::Char16(0xD800).to_string(), "\u{FFFD}");
    }

    #[test]
    fn test_reserved_tags_are_rejected() {
        // empty format block, then a tag-2 word
        let mut data = 0u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            DecodedRecord::decode(&data),
            Err(DecodeError::UnknownTag { tag: 2, offset: 4 })
        );
    }

    #[test]
    fn test_truncated_value() {
        let mut data = 0u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[ArgTag::Int64 as u8, 0, 0, 0, 1, 2]);
        assert_eq!(
            DecodedRecord::decode(&data),
            Err(DecodeError::Truncated { offset: 4, needed: 6 })
        );
    }

    #[test]
    fn test_odd_string_length() {
        let data = 3u32.to_le_bytes();
        assert_eq!(
            DecodedRecord::decode(&data),
            Err(DecodeError::OddStringLength { len: 3, offset: 0 })
        );
    }
}
