use std::fmt;

use crate::error::AllocError;
use crate::level::{Category, Level};

/// The storage engine a logger stages records into.
///
/// The engine owns the shared buffer. The staging side only ever asks three
/// things of it: is this category/level wanted, give me exactly `size` bytes,
/// and publish the bytes I wrote.
///
/// Implementations must hand out non-overlapping regions to concurrent
/// callers and must not let a consumer observe a region before `commit`.
pub trait LogEngine: Send + Sync {
    /// Cheap gate checked before any sizing work.
    fn enabled(&self, category: Category, level: Level) -> bool;

    /// Reserves `size` bytes for one record.
    ///
    /// Level, category and format string are passed along so the engine can
    /// keep them as record metadata.
    fn allocate(
        &self,
        size: usize,
        level: Level,
        category: Category,
        format: &str,
    ) -> Result<Region<'_>, AllocError>;

    /// Publishes a fully written region. Ownership moves back to the engine.
    ///
    /// Implementations take the handle with [`Region::into_handle`]; a region
    /// that is merely dropped reports itself through [`abandon`](Self::abandon).
    fn commit(&self, region: Region<'_>);

    /// Called when a region is dropped without being committed, e.g. when the
    /// encode pass unwinds. The engine must reclaim the space without ever
    /// showing the bytes to its consumer.
    fn abandon(&self, handle: RegionHandle);

    /// Number of categories the engine gates on, when it has a fixed table.
    fn category_count(&self) -> Option<usize> {
        None
    }

    /// Pushes committed records to the engine's consumer, if it has one.
    fn flush(&self) {}
}

/// Engine-specific identifier of an allocated region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionHandle(pub u64);

/// Writable bytes reserved for exactly one record.
///
/// Exclusively owned by the staging session between `allocate` and
/// `commit`; nothing else may touch these bytes in that window. Dropping it
/// uncommitted hands it back to the engine through [`LogEngine::abandon`].
pub struct Region<'a> {
    bytes: &'a mut [u8],
    handle: RegionHandle,
    engine: &'a dyn LogEngine,
    settled: bool,
}

impl<'a> Region<'a> {
    pub fn new(bytes: &'a mut [u8], handle: RegionHandle, engine: &'a dyn LogEngine) -> Self {
        Self { bytes, handle, engine, settled: false }
    }

    /// Consumes the region for a commit; the abandon hook does not fire.
    pub fn into_handle(mut self) -> RegionHandle {
        self.settled = true;
        self.handle
    }

    #[inline]
    pub fn handle(&self) -> RegionHandle {
        self.handle
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.engine.abandon(self.handle);
        }
    }
}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("handle", &self.handle)
            .field("len", &self.bytes.len())
            .finish()
    }
}
