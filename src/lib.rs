//! # Staged Logger
//!
//! The front end of a binary logging system. Every log call is staged in two
//! passes over its arguments:
//!
//! 1. **Size**: compute the exact number of bytes the record will occupy.
//! 2. **Encode**: reserve exactly that many bytes from the engine, write the
//!    format string and each argument in place, then commit.
//!
//! No intermediate buffer is built and no argument is boxed. The engine
//! behind the [`LogEngine`] trait owns the shared buffer and decides what
//! happens to committed records; [`RingBuffer`] is the in-memory engine that
//! ships with the crate.
//!
//! ## Main Components
//!
//! * [`Logger`]: level/category gate, argument staging and the level helpers
//! * [`ThreadContext`]: the calling thread's slot pool for boxing-free
//!   primitive arguments
//! * [`RingBuffer`]: multi-producer byte ring with reserve/commit/drain
//! * [`DecodedRecord`]: reads a committed record back and renders it
//! * [`LoggerConfig`]: TOML configuration for all of the above
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use staged_logger::{log_record, Category, DecodedRecord, Level, Logger, RecordMeta, RingBuffer, ThreadContext};
//!
//! let ring = Arc::new(RingBuffer::new(64 * 1024));
//! let logger = Logger::new("app", ring.clone());
//! let mut ctx = ThreadContext::new();
//!
//! log_record!(logger, &mut ctx, Level::Info, Category::DEFAULT, "Temperature: {} C", 25.5);
//! let count = ctx.no_boxing(42u32).unwrap();
//! log_record!(logger, &mut ctx, Level::Warning, Category::DEFAULT, "Status: {}, Count: {}", true, count);
//!
//! let mut lines = Vec::new();
//! ring.drain(&mut |_: &RecordMeta, payload: &[u8]| {
//!     lines.push(DecodedRecord::decode(payload).unwrap().render());
//! });
//! assert_eq!(lines, ["Temperature: 25.5 C", "Status: true, Count: 42"]);
//! ```

pub mod arg;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod level;
pub mod logger;
pub mod pool;
pub mod reader;
pub mod registry;
pub mod ring_buffer;
pub mod session;
pub mod tag;

pub use arg::{LogArg, Loggable, Shown, Utf16, Value};
pub use bridge::LogBridge;
pub use config::LoggerConfig;
pub use diagnostics::{init_diagnostics, DiagnosticsConfig, DiagnosticsOutput};
pub use engine::{LogEngine, Region, RegionHandle};
pub use error::{AllocError, ConfigError, DecodeError, UsageError};
pub use level::{Category, Level};
pub use logger::{Logger, ThreadContext};
pub use pool::{Char16, SlotHandle, SlotPool, SlotValue};
pub use reader::{DecodedRecord, DecodedValue, RecordReader};
pub use registry::{force_flush_all, logger_by_id, logger_by_name, logger_names, register_logger};
pub use ring_buffer::{DrainHandler, RecordMeta, RingBuffer};
pub use session::{Staged, StagingSession};
pub use tag::ArgTag;
