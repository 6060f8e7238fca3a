//! Argument encoder.
//!
//! Writes values at a cursor inside a region that was sized in advance. Bytes
//! that would land past the end of the region are not written, but the cursor
//! still advances by the full storage size, so [`RecordWriter::position`]
//! always reports what the values needed. The staging session compares that
//! against the sized total.

use std::fmt::{self, Write as _};

use crate::arg::Value;
use crate::tag::{align4, ArgTag, LEN_SIZE, TAG_SIZE};

/// Cursor over a writable record region.
pub struct RecordWriter<'a> {
    buf: &'a mut [u8],
    cursor: usize,
}

impl<'a> RecordWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    /// Bytes written so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Writes the format-string block that opens every record:
    /// `u32` byte length, UTF-16 code units, zero padding to 4 bytes.
    pub fn put_format(&mut self, format: &str) {
        let start = self.cursor;
        let body = self.buf.get_mut(start + LEN_SIZE as usize..).unwrap_or_default();
        let units = write_units(body, format.encode_utf16());
        let byte_len = (units * 2) as u32;
        self.write_at(start, &byte_len.to_le_bytes());
        let written = start + LEN_SIZE as usize + byte_len as usize;
        self.cursor = self.pad_to(start, written, align4(LEN_SIZE + byte_len));
    }

    /// Writes one argument: tag field first, then its payload.
    pub fn put_value(&mut self, value: &Value<'_>) {
        match *value {
            Value::Null => self.put_fixed(ArgTag::Null, &[]),
            Value::Bool(v) => self.put_fixed(ArgTag::Bool, &[v as u8]),
            Value::Char16(v) => self.put_fixed(ArgTag::Char16, &v.to_le_bytes()),
            Value::Int8(v) => self.put_fixed(ArgTag::Int8, &v.to_le_bytes()),
            Value::UInt8(v) => self.put_fixed(ArgTag::UInt8, &[v]),
            Value::Int16(v) => self.put_fixed(ArgTag::Int16, &v.to_le_bytes()),
            Value::UInt16(v) => self.put_fixed(ArgTag::UInt16, &v.to_le_bytes()),
            Value::Int32(v) => self.put_fixed(ArgTag::Int32, &v.to_le_bytes()),
            Value::UInt32(v) => self.put_fixed(ArgTag::UInt32, &v.to_le_bytes()),
            Value::Float32(v) => self.put_fixed(ArgTag::Float32, &v.to_le_bytes()),
            Value::Int64(v) => self.put_fixed(ArgTag::Int64, &v.to_le_bytes()),
            Value::UInt64(v) => self.put_fixed(ArgTag::UInt64, &v.to_le_bytes()),
            Value::Float64(v) => self.put_fixed(ArgTag::Float64, &v.to_le_bytes()),
            Value::Str(s) => self.put_text(|out| write_units(out, s.encode_utf16())),
            Value::Utf16(units) => self.put_text(|out| write_units(out, units.iter().copied())),
            Value::Unsupported(shown) => self.put_text(|out| {
                let mut sink = Utf16Sink { out, units: 0 };
                // Mirrors the sizing pass, which also keeps a partial result.
                let _ = write!(sink, "{}", shown);
                sink.units
            }),
        }
    }

    fn put_fixed(&mut self, tag: ArgTag, payload: &[u8]) {
        let start = self.cursor;
        let size = tag.fixed_size().unwrap_or(TAG_SIZE) as usize;
        let offset = tag.payload_offset();
        if let Some(storage) = self.buf.get_mut(start..start + size) {
            storage.fill(0);
            storage[0] = tag as u8;
            storage[offset..offset + payload.len()].copy_from_slice(payload);
        }
        self.cursor = start + size;
    }

    fn put_text(&mut self, write: impl FnOnce(&mut [u8]) -> usize) {
        let start = self.cursor;
        let head = (TAG_SIZE + LEN_SIZE) as usize;
        self.write_at(start, &(ArgTag::Utf16String as u32).to_le_bytes());

        let units = write(self.buf.get_mut(start + head..).unwrap_or_default());
        let byte_len = (units * 2) as u32;
        self.write_at(start + 4, &byte_len.to_le_bytes());
        self.cursor = self.pad_to(start, start + head + byte_len as usize, align4(TAG_SIZE + LEN_SIZE + byte_len));
    }

    /// Zero-fills from the end of the written bytes up to the item's storage
    /// size and returns the new cursor.
    fn pad_to(&mut self, start: usize, written: usize, storage: u32) -> usize {
        let end = start + storage as usize;
        let len = self.buf.len();
        self.buf[written.min(len)..end.min(len)].fill(0);
        end
    }

    fn write_at(&mut self, at: usize, bytes: &[u8]) {
        if let Some(dst) = self.buf.get_mut(at..at + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
    }
}

/// Writes as many units as fit in `out` and returns how many there were.
fn write_units(out: &mut [u8], units: impl Iterator<Item = u16>) -> usize {
    let mut count = 0;
    for unit in units {
        if let Some(dst) = out.get_mut(count * 2..count * 2 + 2) {
            dst.copy_from_slice(&unit.to_le_bytes());
        }
        count += 1;
    }
    count
}

struct Utf16Sink<'b> {
    out: &'b mut [u8],
    units: usize,
}

impl fmt::Write for Utf16Sink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let rest = self.out.get_mut(self.units * 2..).unwrap_or_default();
        self.units += write_units(rest, s.encode_utf16());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: Value<'_>) -> Vec<u8> {
        let size = value.storage_size() as usize;
        let mut buf = vec![0xAAu8; size];
        let mut writer = RecordWriter::new(&mut buf);
        writer.put_value(&value);
        assert_eq!(writer.position(), size);
        buf
    }

    #[test]
    fn test_small_values_share_first_word() {
        assert_eq!(encode(Value::Null), vec![ArgTag::Null as u8, 0, 0, 0]);
        assert_eq!(encode(Value::Bool(true)), vec![ArgTag::Bool as u8, 0, 1, 0]);
        assert_eq!(encode(Value::Int16(-2)), vec![ArgTag::Int16 as u8, 0, 0xFE, 0xFF]);
        assert_eq!(encode(Value::Char16(0x41)), vec![ArgTag::Char16 as u8, 0, 0x41, 0]);
    }

    #[test]
    fn test_word_values_have_full_tag_field() {
        let bytes = encode(Value::Int32(3));
        assert_eq!(&bytes[..4], &(ArgTag::Int32 as u32).to_le_bytes());
        assert_eq!(&bytes[4..], &3i32.to_le_bytes());

        let bytes = encode(Value::Float64(2.5));
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..], &2.5f64.to_le_bytes());
    }

    #[test]
    fn test_string_is_length_prefixed_and_padded() {
        let bytes = encode(Value::Str("abc"));
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &(ArgTag::Utf16String as u32).to_le_bytes());
        assert_eq!(&bytes[4..8], &6u32.to_le_bytes());
        assert_eq!(&bytes[8..14], &[b'a', 0, b'b', 0, b'c', 0]);
        assert_eq!(&bytes[14..], &[0, 0]);

        let empty = encode(Value::Str(""));
        assert_eq!(empty, vec![ArgTag::Utf16String as u8, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_display_fallback_writes_text() {
        let shown = 12.5f32;
        let via_display = encode(Value::Unsupported(&shown));
        assert_eq!(via_display, encode(Value::Str("12.5")));
    }

    #[test]
    fn test_overrun_is_counted_not_written() {
        let mut buf = vec![0xAAu8; 8];
        let mut writer = RecordWriter::new(&mut buf);
        writer.put_value(&Value::Str("abcdef"));
        writer.put_value(&Value::Int64(1));
        assert_eq!(writer.position(), 20 + 12);
        assert_eq!(&buf[..4], &(ArgTag::Utf16String as u32).to_le_bytes());
        assert_eq!(&buf[4..8], &12u32.to_le_bytes());
    }

    #[test]
    fn test_format_block() {
        let mut buf = vec![0xAAu8; 12];
        let mut writer = RecordWriter::new(&mut buf);
        writer.put_format("x{}");
        assert_eq!(writer.position(), 12);
        assert_eq!(&buf[..4], &6u32.to_le_bytes());
        assert_eq!(&buf[4..10], &[b'x', 0, b'{', 0, b'}', 0]);
        assert_eq!(&buf[10..], &[0, 0]);
    }
}
