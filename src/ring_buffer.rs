//! Reference storage engine: a multi-producer, single-consumer byte ring.
//!
//! Producers reserve space under a short lock, then write their region with no
//! lock held. A record becomes visible to the consumer once it is committed
//! and every record reserved before it is committed too, so the consumer
//! always sees a contiguous prefix of the ring.
//!
//! When the ring is full the reservation is refused with [`AllocError::Full`]
//! and the record is dropped. Producers never block on the consumer.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::engine::{LogEngine, Region, RegionHandle};
use crate::error::AllocError;
use crate::level::{Category, Level};

/// Smallest ring that can hold a record with a short format string.
pub const MIN_CAPACITY: usize = 64;

/// Metadata kept next to every record in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// Reservation order across all producers.
    pub sequence: u64,
    pub level: Level,
    pub category: Category,
    /// Wall-clock milliseconds since the Unix epoch at reservation time.
    pub epoch_ms: u64,
}

/// Consumer of committed records.
///
/// `drain` calls `handle_record` once per record, oldest first. The payload
/// slice is only valid for the duration of the call; the space is handed back
/// to producers once the handler returns.
pub trait DrainHandler {
    fn handle_record(&mut self, meta: &RecordMeta, payload: &[u8]);
}

impl<F: FnMut(&RecordMeta, &[u8])> DrainHandler for F {
    fn handle_record(&mut self, meta: &RecordMeta, payload: &[u8]) {
        self(meta, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Writing,
    Committed,
    /// Dropped uncommitted; the space is reclaimed without reaching a handler.
    Abandoned,
}

#[derive(Debug)]
struct Frame {
    meta: RecordMeta,
    offset: usize,
    len: usize,
    /// Monotonic position one past the frame, wrap padding included.
    end: usize,
    state: FrameState,
}

#[derive(Debug, Default)]
struct Cursor {
    /// Monotonic write position.
    head: usize,
    /// Monotonic position up to which space has been handed back.
    tail: usize,
    frames: VecDeque<Frame>,
    next_sequence: u64,
}

/// In-memory ring buffer engine.
///
/// Shared between threads behind an `Arc`. Any number of threads may log into
/// it; `drain` serialises consumers.
pub struct RingBuffer {
    arena: Box<[UnsafeCell<u8>]>,
    cursor: Mutex<Cursor>,
    draining: Mutex<()>,
    sink: Mutex<Option<Box<dyn DrainHandler + Send>>>,
    level_mask: AtomicU32,
    categories: Box<[AtomicBool]>,
    committed: AtomicU64,
    refused: AtomicU64,
    abandoned: AtomicU64,
}

// Regions handed out by `allocate` never overlap each other or a frame the
// consumer is reading: a byte is only reused after `drain` has moved `tail`
// past it, and `drain` only reads committed frames.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Creates a ring of `capacity` bytes with one category and every level
    /// enabled.
    pub fn new(capacity: usize) -> Self {
        Self::with_categories(capacity, 1)
    }

    /// Creates a ring with `category_count` categories, all enabled.
    pub fn with_categories(capacity: usize, category_count: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let arena = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        let categories = (0..category_count.max(1)).map(|_| AtomicBool::new(true)).collect();
        let all_levels = Level::ALL.iter().fold(0, |mask, level| mask | level.bit());

        info!(capacity, category_count, "ring buffer engine created");

        Self {
            arena,
            cursor: Mutex::new(Cursor::default()),
            draining: Mutex::new(()),
            sink: Mutex::new(None),
            level_mask: AtomicU32::new(all_levels),
            categories,
            committed: AtomicU64::new(0),
            refused: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    /// Installs the handler `flush` drains into.
    pub fn with_sink(self, sink: impl DrainHandler + Send + 'static) -> Self {
        *self.sink.lock() = Some(Box::new(sink));
        self
    }

    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Replaces the level bitmap; bit `n` enables the level with value `n`.
    pub fn set_level_mask(&self, mask: u32) {
        self.level_mask.store(mask, Ordering::Relaxed);
    }

    pub fn level_mask(&self) -> u32 {
        self.level_mask.load(Ordering::Relaxed)
    }

    pub fn set_level_enabled(&self, level: Level, enabled: bool) {
        if enabled {
            self.level_mask.fetch_or(level.bit(), Ordering::Relaxed);
        } else {
            self.level_mask.fetch_and(!level.bit(), Ordering::Relaxed);
        }
    }

    /// Returns false when the category is out of range.
    pub fn set_category_enabled(&self, category: Category, enabled: bool) -> bool {
        match self.categories.get(category.index()) {
            Some(flag) => {
                flag.store(enabled, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Records committed since creation.
    pub fn committed_records(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Reservations refused since creation.
    pub fn refused_records(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    /// Regions dropped without a commit since creation.
    pub fn abandoned_records(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Records reserved but not yet drained, committed or not.
    pub fn pending_records(&self) -> usize {
        self.cursor.lock().frames.len()
    }

    /// Bytes currently reserved, wrap padding included.
    pub fn used_bytes(&self) -> usize {
        let cursor = self.cursor.lock();
        cursor.head - cursor.tail
    }

    /// Hands every committed record at the front of the ring to `handler`,
    /// oldest first, and returns how many were handed over.
    ///
    /// Stops at the first record that is still being written. Abandoned
    /// regions are stepped over and their space released.
    pub fn drain(&self, handler: &mut dyn DrainHandler) -> usize {
        let _consumer = self.draining.lock();

        let ready: Vec<Frame> = {
            let mut cursor = self.cursor.lock();
            let count = cursor
                .frames
                .iter()
                .take_while(|f| f.state != FrameState::Writing)
                .count();
            cursor.frames.drain(..count).collect()
        };
        let Some(last) = ready.last() else {
            return 0;
        };
        let release_to = last.end;

        let mut delivered = 0;
        for frame in ready.iter().filter(|f| f.state == FrameState::Committed) {
            // SAFETY: committed frames are never written again, and their
            // bytes stay reserved until `tail` moves below.
            let payload = unsafe { slice::from_raw_parts(self.base().add(frame.offset), frame.len) };
            handler.handle_record(&frame.meta, payload);
            delivered += 1;
        }

        self.cursor.lock().tail = release_to;
        delivered
    }

    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.arena.as_ptr())
    }

    /// Moves an in-flight frame to its final state. False if no such frame
    /// is still being written.
    fn settle(&self, sequence: u64, state: FrameState) -> bool {
        let mut cursor = self.cursor.lock();
        let Some(first) = cursor.frames.front().map(|f| f.meta.sequence) else {
            return false;
        };
        let frame = sequence
            .checked_sub(first)
            .and_then(|i| cursor.frames.get_mut(i as usize));
        match frame {
            Some(frame) if frame.state == FrameState::Writing => {
                debug_assert_eq!(frame.meta.sequence, sequence);
                frame.state = state;
                true
            }
            _ => false,
        }
    }

    fn refuse(&self, error: AllocError) -> AllocError {
        self.refused.fetch_add(1, Ordering::Relaxed);
        debug!(%error, "ring buffer refused reservation");
        error
    }
}

impl LogEngine for RingBuffer {
    fn enabled(&self, category: Category, level: Level) -> bool {
        self.level_mask.load(Ordering::Relaxed) & level.bit() != 0
            && self
                .categories
                .get(category.index())
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn allocate(
        &self,
        size: usize,
        level: Level,
        category: Category,
        _format: &str,
    ) -> Result<Region<'_>, AllocError> {
        let capacity = self.arena.len();
        if size == 0 {
            return Err(AllocError::Empty);
        }
        if size > capacity {
            return Err(self.refuse(AllocError::Oversized { requested: size, limit: capacity }));
        }
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let (offset, sequence) = {
            let mut cursor = self.cursor.lock();
            let at = cursor.head % capacity;
            // Records are contiguous; skip the tail end of the arena if needed.
            let skip = if at + size > capacity { capacity - at } else { 0 };
            if cursor.head - cursor.tail + skip + size > capacity {
                drop(cursor);
                return Err(self.refuse(AllocError::Full { requested: size }));
            }

            let start = cursor.head + skip;
            let offset = start % capacity;
            let sequence = cursor.next_sequence;
            cursor.next_sequence += 1;
            cursor.head = start + size;
            cursor.frames.push_back(Frame {
                meta: RecordMeta { sequence, level, category, epoch_ms },
                offset,
                len: size,
                end: start + size,
                state: FrameState::Writing,
            });
            (offset, sequence)
        };

        // SAFETY: [offset, offset + size) lies inside the arena and was just
        // reserved for this caller alone.
        let bytes = unsafe { slice::from_raw_parts_mut(self.base().add(offset), size) };
        Ok(Region::new(bytes, RegionHandle(sequence), self))
    }

    fn commit(&self, region: Region<'_>) {
        let sequence = region.into_handle().0;
        if self.settle(sequence, FrameState::Committed) {
            self.committed.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(sequence, "commit for a region the ring does not know");
        }
    }

    fn abandon(&self, handle: RegionHandle) {
        let sequence = handle.0;
        if self.settle(sequence, FrameState::Abandoned) {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
            warn!(sequence, "region dropped without commit, space reclaimed");
        } else {
            warn!(sequence, "abandon for a region the ring does not know");
        }
    }

    fn category_count(&self) -> Option<usize> {
        Some(self.categories.len())
    }

    fn flush(&self) {
        let mut sink = self.sink.lock();
        if let Some(handler) = sink.as_mut() {
            self.drain(handler.as_mut());
        }
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn reserve(ring: &RingBuffer, size: usize, fill: u8) -> Result<(), AllocError> {
        let mut region = ring.allocate(size, Level::Info, Category::DEFAULT, "")?;
        region.bytes_mut().fill(fill);
        ring.commit(region);
        Ok(())
    }

    fn drain_all(ring: &RingBuffer) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        ring.drain(&mut |_: &RecordMeta, payload: &[u8]| out.push(payload.to_vec()));
        out
    }

    #[test]
    fn test_commit_then_drain_in_order() {
        let ring = RingBuffer::new(256);
        reserve(&ring, 8, 1).unwrap();
        reserve(&ring, 12, 2).unwrap();

        let records = drain_all(&ring);
        assert_eq!(records, vec![vec![1u8; 8], vec![2u8; 12]]);
        assert_eq!(ring.used_bytes(), 0);
        assert_eq!(ring.committed_records(), 2);
    }

    #[test]
    fn test_uncommitted_record_blocks_later_ones() {
        let ring = RingBuffer::new(256);
        let first = ring.allocate(8, Level::Info, Category::DEFAULT, "").unwrap();
        reserve(&ring, 8, 7).unwrap();

        assert!(drain_all(&ring).is_empty());
        ring.commit(first);
        assert_eq!(drain_all(&ring).len(), 2);
    }

    #[test]
    fn test_dropped_region_is_skipped_and_reclaimed() {
        let ring = RingBuffer::new(64);
        let lost = ring.allocate(40, Level::Info, Category::DEFAULT, "").unwrap();
        reserve(&ring, 8, 5).unwrap();
        drop(lost);
        assert_eq!(ring.abandoned_records(), 1);

        assert_eq!(drain_all(&ring), vec![vec![5u8; 8]]);
        assert_eq!(ring.used_bytes(), 0);
        assert_eq!(ring.pending_records(), 0);
        reserve(&ring, 40, 6).unwrap();
        assert_eq!(drain_all(&ring), vec![vec![6u8; 40]]);
    }

    #[test]
    fn test_committed_region_does_not_count_as_abandoned() {
        let ring = RingBuffer::new(64);
        reserve(&ring, 8, 1).unwrap();
        assert_eq!(ring.abandoned_records(), 0);
        assert_eq!(ring.category_count(), Some(1));
    }

    #[test]
    fn test_full_ring_refuses_and_recovers() {
        let ring = RingBuffer::new(64);
        reserve(&ring, 40, 1).unwrap();
        assert_eq!(reserve(&ring, 40, 2), Err(AllocError::Full { requested: 40 }));
        assert_eq!(ring.refused_records(), 1);

        drain_all(&ring);
        // Wraps: the 24 trailing bytes are skipped.
        reserve(&ring, 40, 3).unwrap();
        assert_eq!(drain_all(&ring), vec![vec![3u8; 40]]);
    }

    #[test]
    fn test_oversized_and_empty_requests() {
        let ring = RingBuffer::new(64);
        assert_eq!(
            reserve(&ring, 65, 0),
            Err(AllocError::Oversized { requested: 65, limit: 64 })
        );
        assert_eq!(reserve(&ring, 0, 0), Err(AllocError::Empty));
    }

    #[test]
    fn test_level_and_category_gate() {
        let ring = RingBuffer::with_categories(128, 2);
        assert!(ring.enabled(Category(1), Level::Verbose));
        assert!(!ring.enabled(Category(2), Level::Info));

        ring.set_level_enabled(Level::Verbose, false);
        assert!(!ring.enabled(Category::DEFAULT, Level::Verbose));
        assert!(ring.enabled(Category::DEFAULT, Level::Debug));

        assert!(ring.set_category_enabled(Category(1), false));
        assert!(!ring.enabled(Category(1), Level::Fatal));
        assert!(!ring.set_category_enabled(Category(9), false));
    }

    #[test]
    fn test_flush_drains_into_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let ring = RingBuffer::new(128).with_sink(move |meta: &RecordMeta, payload: &[u8]| {
            sink_seen.lock().push((meta.sequence, payload.len()));
        });
        reserve(&ring, 4, 0).unwrap();
        reserve(&ring, 8, 0).unwrap();
        ring.flush();
        assert_eq!(*seen.lock(), vec![(0, 4), (1, 8)]);
    }
}
