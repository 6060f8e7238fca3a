//! Wire tags and the storage-size contract shared by the sizing pass and the
//! encoder.
//!
//! Every argument occupies `storage_size` bytes in a record, tag field
//! included. The encoder writes exactly that many bytes, which is what lets
//! the staging session reserve a region up front and never resize it.

use std::fmt;

/// Wire tag of an encoded argument.
///
/// Numbering is shared with the engine's reader. Gaps (2, 4, 6, 17) belong to
/// types this crate never emits: pointer, 8-bit char, char32 and UTF-8 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgTag {
    /// Sentinel carried by idle pool slots. Never written to a record.
    Unsupported = 0,
    Null = 1,
    Bool = 3,
    Char16 = 5,
    Int8 = 7,
    UInt8 = 8,
    Int16 = 9,
    UInt16 = 10,
    Int32 = 11,
    UInt32 = 12,
    Int64 = 13,
    UInt64 = 14,
    Float32 = 15,
    Float64 = 16,
    Utf16String = 18,
}

impl ArgTag {
    pub fn from_u8(raw: u8) -> Option<ArgTag> {
        let tag = match raw {
            0 => ArgTag::Unsupported,
            1 => ArgTag::Null,
            3 => ArgTag::Bool,
            5 => ArgTag::Char16,
            7 => ArgTag::Int8,
            8 => ArgTag::UInt8,
            9 => ArgTag::Int16,
            10 => ArgTag::UInt16,
            11 => ArgTag::Int32,
            12 => ArgTag::UInt32,
            13 => ArgTag::Int64,
            14 => ArgTag::UInt64,
            15 => ArgTag::Float32,
            16 => ArgTag::Float64,
            18 => ArgTag::Utf16String,
            _ => return None,
        };
        Some(tag)
    }

    /// Storage size of a fixed-width tag, or `None` for strings and the
    /// sentinel.
    pub const fn fixed_size(self) -> Option<u32> {
        match self {
            ArgTag::Null
            | ArgTag::Bool
            | ArgTag::Char16
            | ArgTag::Int8
            | ArgTag::UInt8
            | ArgTag::Int16
            | ArgTag::UInt16 => Some(SMALL_SIZE),
            ArgTag::Int32 | ArgTag::UInt32 | ArgTag::Float32 => Some(WORD_SIZE),
            ArgTag::Int64 | ArgTag::UInt64 | ArgTag::Float64 => Some(DWORD_SIZE),
            ArgTag::Utf16String | ArgTag::Unsupported => None,
        }
    }

    /// Byte offset of the payload inside the argument's storage.
    ///
    /// Values of at most two bytes share the first word with a 2-byte tag.
    pub const fn payload_offset(self) -> usize {
        match self.fixed_size() {
            Some(SMALL_SIZE) => 2,
            _ => TAG_SIZE as usize,
        }
    }
}

impl fmt::Display for ArgTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Width of the tag field for word-sized and larger values.
pub const TAG_SIZE: u32 = 4;
/// Width of the byte-length prefix of string payloads.
pub const LEN_SIZE: u32 = 4;

const SMALL_SIZE: u32 = 4;
const WORD_SIZE: u32 = 8;
const DWORD_SIZE: u32 = 12;

/// Rounds `n` up to a multiple of 4.
#[inline]
pub const fn align4(n: u32) -> u32 {
    (n + 3) & !3
}

/// Storage of a UTF-16 string argument with `units` code units.
#[inline]
pub const fn utf16_storage_size(units: u32) -> u32 {
    align4(TAG_SIZE + LEN_SIZE + (units << 1))
}

/// Storage of the format-string block that opens every record.
#[inline]
pub const fn format_block_size(units: u32) -> u32 {
    align4(LEN_SIZE + (units << 1))
}

/// Counts UTF-16 code units of a `Display` value without allocating.
pub(crate) struct Utf16Counter {
    pub units: u32,
}

impl fmt::Write for Utf16Counter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.units += utf16_len(s);
        Ok(())
    }
}

/// UTF-16 length of a UTF-8 string.
#[inline]
pub fn utf16_len(s: &str) -> u32 {
    if s.is_ascii() {
        s.len() as u32
    } else {
        s.chars().map(|c| c.len_utf16() as u32).sum()
    }
}
