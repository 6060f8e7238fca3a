//! Staging session: the two-pass protocol behind every log call.
//!
//! ```text
//! Idle -> Sizing -> Allocated -> Encoding -> Committed
//!   \        \
//!    \        `-> Aborted   (engine refused the region, or a slot was misused)
//!     `-> Idle              (filtered out by the engine gate)
//! ```
//!
//! Sizing computes the exact byte count of the record, the engine reserves
//! exactly that many bytes, the encoder fills them, and the region is
//! committed. A record is therefore either fully visible to the engine's
//! consumer or not present at all.

use tracing::{debug, trace};

use crate::arg::LogArg;
use crate::encoder::RecordWriter;
use crate::engine::{LogEngine, Region};
use crate::error::{AllocError, UsageError};
use crate::level::{Category, Level};
use crate::pool::SlotPool;
use crate::tag::{format_block_size, utf16_len};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sizing,
    Allocated,
    Encoding,
    Committed,
    Aborted,
}

/// Outcome of a log call that did not misuse the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    /// The record was written and published; `bytes` is its size.
    Committed { bytes: usize },
    /// The engine gate rejected the level/category. Nothing was sized.
    Filtered,
    /// The engine could not provide a region. Nothing was written.
    Dropped(AllocError),
}

impl Staged {
    pub fn is_committed(&self) -> bool {
        matches!(self, Staged::Committed { .. })
    }
}

/// One log call in flight.
///
/// Ending the session (dropping it) closes the pool's call epoch, so handles
/// acquired for this call cannot leak into the next one.
pub struct StagingSession<'e, 'p> {
    engine: &'e dyn LogEngine,
    pool: &'p mut SlotPool,
    level: Level,
    category: Category,
    state: SessionState,
    total: usize,
}

impl<'e, 'p> StagingSession<'e, 'p> {
    pub fn new(
        engine: &'e dyn LogEngine,
        pool: &'p mut SlotPool,
        level: Level,
        category: Category,
    ) -> Self {
        Self {
            engine,
            pool,
            level,
            category,
            state: SessionState::Idle,
            total: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Exact record size computed by [`begin`](Self::begin).
    pub fn total_size(&self) -> usize {
        self.total
    }

    /// Checks the engine gate and, if the record is wanted, sizes it.
    ///
    /// Returns `Ok(false)` when filtered; the session then stays `Idle`.
    /// Slot handles are validated here, before any region exists, so a
    /// misused slot never reaches the encoder.
    pub fn begin(&mut self, format: &str, args: &[LogArg<'_>]) -> Result<bool, UsageError> {
        assert_eq!(self.state, SessionState::Idle, "begin called twice");
        if !self.engine.enabled(self.category, self.level) {
            return Ok(false);
        }

        self.state = SessionState::Sizing;
        match self.measure(format, args) {
            Ok(total) => {
                self.total = total;
                Ok(true)
            }
            Err(error) => {
                self.state = SessionState::Aborted;
                Err(error)
            }
        }
    }

    fn measure(&self, format: &str, args: &[LogArg<'_>]) -> Result<usize, UsageError> {
        let mut total = format_block_size(utf16_len(format)) as usize;
        for (i, arg) in args.iter().enumerate() {
            total += match arg {
                LogArg::Value(value) => value.storage_size() as usize,
                LogArg::Slot(handle) => {
                    let repeated = args[..i]
                        .iter()
                        .any(|earlier| matches!(earlier, LogArg::Slot(h) if h == handle));
                    if repeated {
                        return Err(UsageError::DuplicateSlot { index: handle.index() });
                    }
                    self.pool.resolve(*handle)?.storage_size() as usize
                }
            };
        }
        Ok(total)
    }

    /// Asks the engine for exactly [`total_size`](Self::total_size) bytes.
    pub fn request_region(&mut self, format: &str) -> Result<Region<'e>, AllocError> {
        assert_eq!(self.state, SessionState::Sizing, "region requested before sizing");
        let engine = self.engine;
        match engine.allocate(self.total, self.level, self.category, format) {
            Ok(region) => {
                debug_assert_eq!(region.len(), self.total);
                self.state = SessionState::Allocated;
                Ok(region)
            }
            Err(error) => {
                self.state = SessionState::Aborted;
                Err(error)
            }
        }
    }

    /// Writes the format block and every argument in call order.
    ///
    /// Each pool slot is released right after its value is encoded.
    ///
    /// # Panics
    ///
    /// If the bytes written differ from the sized total. That can only happen
    /// when a `Display` fallback renders differently between the two passes.
    pub fn encode_all(&mut self, region: &mut Region<'_>, format: &str, args: &[LogArg<'_>]) {
        assert_eq!(self.state, SessionState::Allocated, "encoding without a region");
        self.state = SessionState::Encoding;

        let mut writer = RecordWriter::new(region.bytes_mut());
        writer.put_format(format);
        for arg in args {
            match arg {
                LogArg::Value(value) => writer.put_value(value),
                LogArg::Slot(handle) => {
                    let value = match self.pool.resolve(*handle) {
                        Ok(value) => value,
                        Err(error) => panic!("slot checked while sizing became unusable: {error}"),
                    };
                    writer.put_value(&value);
                    if let Err(error) = self.pool.release(*handle) {
                        panic!("slot checked while sizing could not be released: {error}");
                    }
                }
            }
        }

        assert_eq!(
            writer.position(),
            self.total,
            "encoded size differs from the sized total"
        );
    }

    /// Publishes the encoded region.
    pub fn commit(&mut self, region: Region<'e>) {
        assert_eq!(self.state, SessionState::Encoding, "commit before encoding");
        self.engine.commit(region);
        self.state = SessionState::Committed;
    }

    /// Hands back every slot passed to this call without encoding it.
    pub fn release_slots(&mut self, args: &[LogArg<'_>]) {
        for arg in args {
            if let LogArg::Slot(handle) = arg {
                // Invalid handles are reclaimed when the session ends.
                let _ = self.pool.release(*handle);
            }
        }
        if self.state != SessionState::Idle {
            self.state = SessionState::Aborted;
        }
    }
}

impl Drop for StagingSession<'_, '_> {
    fn drop(&mut self) {
        let reclaimed = self.pool.end_call();
        if reclaimed > 0 {
            debug!(reclaimed, "reclaimed pool slots that were never passed to a log call");
        }
    }
}

/// Runs one complete log call through a fresh session.
pub fn stage(
    engine: &dyn LogEngine,
    pool: &mut SlotPool,
    level: Level,
    category: Category,
    format: &str,
    args: &[LogArg<'_>],
) -> Result<Staged, UsageError> {
    let mut session = StagingSession::new(engine, pool, level, category);

    if !session.begin(format, args)? {
        trace!(%level, category = category.0, "record filtered");
        session.release_slots(args);
        return Ok(Staged::Filtered);
    }

    let mut region = match session.request_region(format) {
        Ok(region) => region,
        Err(error) => {
            debug!(%level, requested = session.total_size(), %error, "record dropped");
            session.release_slots(args);
            return Ok(Staged::Dropped(error));
        }
    };

    session.encode_all(&mut region, format, args);
    let bytes = region.len();
    session.commit(region);
    Ok(Staged::Committed { bytes })
}
