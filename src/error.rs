use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::tag::ArgTag;

/// Misuse of the boxing-avoidance pool.
///
/// These are defects in the calling code. `Logger::log` fails fast on them;
/// `Logger::try_log` hands them back without encoding the offending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("pool slot {index} was handed out again before it was released")]
    SlotNotReleased { index: u32 },
    #[error("pool slot {index} was used after it was released")]
    StaleSlot { index: u32 },
    #[error("pool slot {index} was acquired for a different log call")]
    ExpiredSlot { index: u32 },
    #[error("pool slot {index} appears more than once in the same log call")]
    DuplicateSlot { index: u32 },
    #[error("pool slot belongs to another thread's pool")]
    ForeignSlot,
    #[error("pool slot {index} was never filled with a value")]
    UnfilledSlot { index: u32 },
    #[error("a {tag} value cannot be stored in a pool slot")]
    NotPrimitive { tag: ArgTag },
}

/// Why an engine refused to hand out a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("not enough free space for {requested} bytes")]
    Full { requested: usize },
    #[error("record of {requested} bytes can never fit (limit {limit})")]
    Oversized { requested: usize, limit: usize },
    #[error("zero-sized records are not allowed")]
    Empty,
}

/// Failure to read a record back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record truncated at byte {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },
    #[error("unknown wire tag {tag} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("string length {len} at byte {offset} is not a whole number of UTF-16 units")]
    OddStringLength { len: u32, offset: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("capacity {0} is too small for a single record")]
    CapacityTooSmall(usize),
    #[error("a logger named '{0}' is already registered")]
    DuplicateLogger(String),
}
