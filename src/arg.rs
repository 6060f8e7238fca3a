use std::fmt::{self, Write as _};

use crate::pool::SlotHandle;
use crate::tag::{utf16_len, utf16_storage_size, ArgTag, Utf16Counter};

/// A typed argument value in wire terms.
///
/// This is the closed set the encoder understands. Anything outside it is
/// carried as `Unsupported` and degrades to its `Display` text, encoded under
/// the UTF-16 string rule.
#[derive(Clone, Copy)]
pub enum Value<'a> {
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
    /// UTF-8 text, transcoded to UTF-16 while encoding.
    Str(&'a str),
    /// Text that is already UTF-16.
    Utf16(&'a [u16]),
    Unsupported(&'a dyn fmt::Display),
}

impl<'a> Value<'a> {
    /// Wire tag and exact storage size, tag field included.
    ///
    /// There is no failure path: every value has a size, in the worst case
    /// through its textual form.
    pub fn tag_and_size(&self) -> (ArgTag, u32) {
        match self {
            Value::Null => (ArgTag::Null, 4),
            Value::Bool(_) => (ArgTag::Bool, 4),
            Value::Char16(_) => (ArgTag::Char16, 4),
            Value::Int8(_) => (ArgTag::Int8, 4),
            Value::UInt8(_) => (ArgTag::UInt8, 4),
            Value::Int16(_) => (ArgTag::Int16, 4),
            Value::UInt16(_) => (ArgTag::UInt16, 4),
            Value::Int32(_) => (ArgTag::Int32, 8),
            Value::UInt32(_) => (ArgTag::UInt32, 8),
            Value::Float32(_) => (ArgTag::Float32, 8),
            Value::Int64(_) => (ArgTag::Int64, 12),
            Value::UInt64(_) => (ArgTag::UInt64, 12),
            Value::Float64(_) => (ArgTag::Float64, 12),
            Value::Str(s) => (ArgTag::Utf16String, utf16_storage_size(utf16_len(s))),
            Value::Utf16(units) => (ArgTag::Utf16String, utf16_storage_size(units.len() as u32)),
            Value::Unsupported(shown) => {
                let mut counter = Utf16Counter { units: 0 };
                // A failing Display impl keeps whatever it produced so far;
                // the encoder stops at the same point.
                let _ = write!(counter, "{}", shown);
                (ArgTag::Utf16String, utf16_storage_size(counter.units))
            }
        }
    }

    #[inline]
    pub fn storage_size(&self) -> u32 {
        self.tag_and_size().1
    }

    #[inline]
    pub fn tag(&self) -> ArgTag {
        self.tag_and_size().0
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Char16(v) => write!(f, "Char16({v:#06x})"),
            Value::Int8(v) => write!(f, "Int8({v})"),
            Value::UInt8(v) => write!(f, "UInt8({v})"),
            Value::Int16(v) => write!(f, "Int16({v})"),
            Value::UInt16(v) => write!(f, "UInt16({v})"),
            Value::Int32(v) => write!(f, "Int32({v})"),
            Value::UInt32(v) => write!(f, "UInt32({v})"),
            Value::Int64(v) => write!(f, "Int64({v})"),
            Value::UInt64(v) => write!(f, "UInt64({v})"),
            Value::Float32(v) => write!(f, "Float32({v})"),
            Value::Float64(v) => write!(f, "Float64({v})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Utf16(units) => write!(f, "Utf16({:?})", String::from_utf16_lossy(units)),
            Value::Unsupported(shown) => write!(f, "Unsupported({shown})"),
        }
    }
}

/// One argument as handed to a log call: either a borrowed value or a slot
/// from the calling thread's pool.
#[derive(Debug, Clone, Copy)]
pub enum LogArg<'a> {
    Value(Value<'a>),
    Slot(SlotHandle),
}

impl<'a> LogArg<'a> {
    /// Wraps any `Display` value as a text fallback.
    pub fn display(shown: &'a dyn fmt::Display) -> Self {
        LogArg::Value(Value::Unsupported(shown))
    }
}

impl<'a> From<Value<'a>> for LogArg<'a> {
    fn from(value: Value<'a>) -> Self {
        LogArg::Value(value)
    }
}

impl From<SlotHandle> for LogArg<'_> {
    fn from(handle: SlotHandle) -> Self {
        LogArg::Slot(handle)
    }
}

/// Types that can be passed to a log call.
///
/// Implemented for the primitive set, strings, `Option` (where `None` encodes
/// as null) and pool slots. Other types go through [`Shown`] or
/// [`LogArg::display`].
pub trait Loggable {
    fn to_arg(&self) -> LogArg<'_>;
}

macro_rules! impl_loggable_pod {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Loggable for $ty {
                #[inline]
                fn to_arg(&self) -> LogArg<'_> {
                    LogArg::Value(Value::$variant(*self))
                }
            }
        )*
    };
}

impl_loggable_pod! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

impl Loggable for isize {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Value(Value::Int64(*self as i64))
    }
}

impl Loggable for usize {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Value(Value::UInt64(*self as u64))
    }
}

impl Loggable for char {
    /// Characters inside the basic multilingual plane travel as `char16`;
    /// anything wider is sent as text.
    fn to_arg(&self) -> LogArg<'_> {
        match u16::try_from(*self as u32) {
            Ok(unit) => LogArg::Value(Value::Char16(unit)),
            Err(_) => LogArg::Value(Value::Unsupported(self)),
        }
    }
}

impl Loggable for str {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Value(Value::Str(self))
    }
}

impl Loggable for String {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Value(Value::Str(self.as_str()))
    }
}

impl<T: Loggable> Loggable for Option<T> {
    fn to_arg(&self) -> LogArg<'_> {
        match self {
            Some(inner) => inner.to_arg(),
            None => LogArg::Value(Value::Null),
        }
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        (**self).to_arg()
    }
}

impl Loggable for SlotHandle {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Slot(*self)
    }
}

/// Pre-encoded UTF-16 text.
#[derive(Debug, Clone, Copy)]
pub struct Utf16<'a>(pub &'a [u16]);

impl Loggable for Utf16<'_> {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Value(Value::Utf16(self.0))
    }
}

/// Logs any `Display` type by its text.
#[derive(Debug, Clone, Copy)]
pub struct Shown<T>(pub T);

impl<T: fmt::Display> Loggable for Shown<T> {
    #[inline]
    fn to_arg(&self) -> LogArg<'_> {
        LogArg::Value(Value::Unsupported(&self.0))
    }
}
