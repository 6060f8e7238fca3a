//! Boxing-avoidance pool.
//!
//! A log call takes its arguments through a generic surface. Primitives that
//! have to outlive the expression that produced them (values computed in a
//! loop, values forwarded through another generic layer) can be parked in a
//! pool slot instead of being boxed. Slots are reused LIFO and live in an
//! arena owned by exactly one thread; the arena is reached through the
//! [`ThreadContext`](crate::ThreadContext) the caller passes in, never
//! through thread-local globals.
//!
//! A handle stays valid through the next log call made on the same context.
//! The call releases every slot it encodes and reclaims any slot acquired for
//! it but not passed in.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::arg::Value;
use crate::error::UsageError;
use crate::tag::ArgTag;

/// Width of a slot's payload cell.
pub const SLOT_PAYLOAD: usize = 8;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Copyable reference to a slot in a [`SlotPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    pool: u32,
    index: u32,
    generation: u32,
    epoch: u32,
}

impl SlotHandle {
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug, Clone)]
struct Slot {
    tag: ArgTag,
    payload: [u8; SLOT_PAYLOAD],
    total_size: u32,
    generation: u32,
    epoch: u32,
    in_use: bool,
}

impl Slot {
    fn new() -> Self {
        Self {
            tag: ArgTag::Unsupported,
            payload: [0; SLOT_PAYLOAD],
            total_size: 0,
            generation: 0,
            epoch: 0,
            in_use: false,
        }
    }
}

/// Per-thread arena of reusable wrapper slots.
#[derive(Debug)]
pub struct SlotPool {
    id: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    epoch: u32,
    outstanding: u32,
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotPool {
    /// Creates an empty pool. Nothing is allocated until the first acquire.
    pub fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            epoch: 0,
            outstanding: 0,
        }
    }

    /// Pops a slot off the free stack, or grows the arena when it is empty.
    ///
    /// The slot still carries the sentinel tag; fill it with [`fill`](Self::fill).
    pub fn acquire(&mut self) -> Result<SlotHandle, UsageError> {
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &self.slots[index as usize];
                if slot.tag != ArgTag::Unsupported || slot.in_use {
                    return Err(UsageError::SlotNotReleased { index });
                }
                index
            }
            None => {
                self.slots.push(Slot::new());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.in_use = true;
        slot.epoch = self.epoch;
        self.outstanding += 1;

        Ok(SlotHandle {
            pool: self.id,
            index,
            generation: slot.generation,
            epoch: self.epoch,
        })
    }

    /// Resets the slot to the sentinel and pushes it back for reuse.
    pub fn release(&mut self, handle: SlotHandle) -> Result<(), UsageError> {
        self.check_owner(&handle)?;
        let slot = &mut self.slots[handle.index as usize];
        if !slot.in_use || slot.generation != handle.generation {
            return Err(UsageError::StaleSlot { index: handle.index });
        }
        slot.tag = ArgTag::Unsupported;
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.outstanding -= 1;
        self.free.push(handle.index);
        Ok(())
    }

    /// Stores a fixed-width value in an acquired slot.
    pub fn fill(
        &mut self,
        handle: SlotHandle,
        tag: ArgTag,
        payload: [u8; SLOT_PAYLOAD],
    ) -> Result<(), UsageError> {
        let total_size = tag.fixed_size().ok_or(UsageError::NotPrimitive { tag })?;
        self.check_live(&handle)?;
        let slot = &mut self.slots[handle.index as usize];
        slot.tag = tag;
        slot.payload = payload;
        slot.total_size = total_size;
        Ok(())
    }

    /// Acquires a slot and stores `value` in it.
    pub fn no_boxing<T: SlotValue>(&mut self, value: T) -> Result<SlotHandle, UsageError> {
        let (tag, payload) = value.pack();
        let handle = self.acquire()?;
        self.fill(handle, tag, payload)?;
        Ok(handle)
    }

    /// Current tag of the slot behind `handle`.
    pub fn tag_of(&self, handle: SlotHandle) -> Result<ArgTag, UsageError> {
        self.check_live(&handle)?;
        Ok(self.slots[handle.index as usize].tag)
    }

    /// Reads a filled slot back as a wire value.
    pub fn resolve(&self, handle: SlotHandle) -> Result<Value<'static>, UsageError> {
        self.check_live(&handle)?;
        let slot = &self.slots[handle.index as usize];
        if slot.tag == ArgTag::Unsupported {
            return Err(UsageError::UnfilledSlot { index: handle.index });
        }
        debug_assert_eq!(slot.tag.fixed_size(), Some(slot.total_size));
        Ok(unpack(slot.tag, &slot.payload))
    }

    /// Number of slots handed out and not yet released.
    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    /// Total slots ever allocated by this pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Closes the current call epoch and reclaims every slot still out.
    ///
    /// Returns how many slots had to be reclaimed.
    pub(crate) fn end_call(&mut self) -> u32 {
        self.epoch = self.epoch.wrapping_add(1);
        if self.outstanding == 0 {
            return 0;
        }

        let mut reclaimed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.in_use {
                slot.tag = ArgTag::Unsupported;
                slot.in_use = false;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                reclaimed += 1;
            }
        }
        self.outstanding = 0;
        reclaimed
    }

    fn check_owner(&self, handle: &SlotHandle) -> Result<(), UsageError> {
        if handle.pool != self.id || handle.index as usize >= self.slots.len() {
            return Err(UsageError::ForeignSlot);
        }
        Ok(())
    }

    fn check_live(&self, handle: &SlotHandle) -> Result<(), UsageError> {
        self.check_owner(handle)?;
        let slot = &self.slots[handle.index as usize];
        if !slot.in_use || slot.generation != handle.generation {
            return Err(UsageError::StaleSlot { index: handle.index });
        }
        if handle.epoch != self.epoch {
            return Err(UsageError::ExpiredSlot { index: handle.index });
        }
        Ok(())
    }
}

fn unpack(tag: ArgTag, payload: &[u8; SLOT_PAYLOAD]) -> Value<'static> {
    let b = payload;
    match tag {
        ArgTag::Null => Value::Null,
        ArgTag::Bool => Value::Bool(b[0] != 0),
        ArgTag::Char16 => Value::Char16(u16::from_le_bytes([b[0], b[1]])),
        ArgTag::Int8 => Value::Int8(b[0] as i8),
        ArgTag::UInt8 => Value::UInt8(b[0]),
        ArgTag::Int16 => Value::Int16(i16::from_le_bytes([b[0], b[1]])),
        ArgTag::UInt16 => Value::UInt16(u16::from_le_bytes([b[0], b[1]])),
        ArgTag::Int32 => Value::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ArgTag::UInt32 => Value::UInt32(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ArgTag::Float32 => Value::Float32(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ArgTag::Int64 => Value::Int64(i64::from_le_bytes(*b)),
        ArgTag::UInt64 => Value::UInt64(u64::from_le_bytes(*b)),
        ArgTag::Float64 => Value::Float64(f64::from_le_bytes(*b)),
        // `fill` only accepts fixed-width tags.
        ArgTag::Utf16String | ArgTag::Unsupported => Value::Null,
    }
}

/// Primitive values that fit in a slot's 8-byte cell.
pub trait SlotValue: Copy {
    fn pack(self) -> (ArgTag, [u8; SLOT_PAYLOAD]);
}

fn cell<const N: usize>(bytes: [u8; N]) -> [u8; SLOT_PAYLOAD] {
    let mut out = [0u8; SLOT_PAYLOAD];
    out[..N].copy_from_slice(&bytes);
    out
}

macro_rules! impl_slot_value {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl SlotValue for $ty {
                #[inline]
                fn pack(self) -> (ArgTag, [u8; SLOT_PAYLOAD]) {
                    (ArgTag::$tag, cell(self.to_le_bytes()))
                }
            }
        )*
    };
}

impl_slot_value! {
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

impl SlotValue for bool {
    #[inline]
    fn pack(self) -> (ArgTag, [u8; SLOT_PAYLOAD]) {
        (ArgTag::Bool, cell([self as u8]))
    }
}

/// A single UTF-16 code unit, stored as `char16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Char16(pub u16);

impl SlotValue for Char16 {
    #[inline]
    fn pack(self) -> (ArgTag, [u8; SLOT_PAYLOAD]) {
        (ArgTag::Char16, cell(self.0.to_le_bytes()))
    }
}
