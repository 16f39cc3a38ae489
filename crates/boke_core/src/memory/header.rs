//! # Allocation Header
//!
//! Every arena allocation hides 8 bytes of bookkeeping right before the
//! pointer handed to the caller:
//!
//! ```text
//! raw ─┬─ slack ─┬─ shift:u16 ─┬─ node_index:u32 ─┬─ payload ...
//!      │         │  ptr - 6    │  ptr - 4         │ ptr (aligned)
//!      └─────────┴─────────────┴──────────────────┘
//!                 shift = ptr - raw
//! ```
//!
//! This module is the only place that reads or writes those bytes.

// SAFETY: This module requires unsafe to touch the bytes preceding a payload.
// Callers guarantee the header region lies inside a live arena allocation.
#![allow(unsafe_code)]

use std::ptr::NonNull;

use super::range::NodeIndex;

/// Bytes reserved in front of every payload. Also the minimum alignment.
pub const HEADER_SIZE: u32 = 8;

/// Exclusive upper bound of a stored shift. Alignments must stay below it.
pub const MAX_SHIFT: u32 = 1 << 16;

const NODE_INDEX_OFFSET: usize = 4;
const SHIFT_OFFSET: usize = 6;

/// Decoded contents of an allocation header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationHeader {
    /// Range allocator node owning the allocation.
    pub node_index: NodeIndex,
    /// Distance from the raw allocation start to the payload.
    pub shift: u32,
}

impl AllocationHeader {
    /// Writes the header for the payload at `aligned`.
    ///
    /// # Safety
    ///
    /// `aligned - HEADER_SIZE .. aligned` must be writable memory owned by
    /// the same allocation.
    pub unsafe fn write(self, aligned: NonNull<u8>) {
        let base = aligned.as_ptr();
        base.sub(NODE_INDEX_OFFSET)
            .cast::<u32>()
            .write_unaligned(self.node_index);
        base.sub(SHIFT_OFFSET)
            .cast::<u16>()
            .write_unaligned(encode_shift(self.shift));
    }

    /// Reads the header of the payload at `aligned`.
    ///
    /// # Safety
    ///
    /// `aligned` must have been returned by an arena allocation that is still
    /// live.
    #[must_use]
    pub unsafe fn read(aligned: NonNull<u8>) -> Self {
        let base = aligned.as_ptr();
        let node_index = base.sub(NODE_INDEX_OFFSET).cast::<u32>().read_unaligned();
        let shift = base.sub(SHIFT_OFFSET).cast::<u16>().read_unaligned();
        Self {
            node_index,
            shift: decode_shift(shift),
        }
    }
}

/// Packs a shift into 16 bits; `MAX_SHIFT` wraps to the reserved value 0.
#[inline]
#[must_use]
pub const fn encode_shift(shift: u32) -> u16 {
    debug_assert!(shift > 0 && shift <= MAX_SHIFT);
    (shift & (MAX_SHIFT - 1)) as u16
}

/// Inverse of [`encode_shift`]: 0 means `MAX_SHIFT`.
///
/// A real shift of 0 is impossible since it is always `>= HEADER_SIZE`.
#[inline]
#[must_use]
pub const fn decode_shift(stored: u16) -> u32 {
    if stored == 0 {
        MAX_SHIFT
    } else {
        stored as u32
    }
}

/// Smallest address `>= raw + HEADER_SIZE` that is a multiple of `alignment`.
///
/// `alignment` must be a power of two `>= HEADER_SIZE`.
#[inline]
#[must_use]
pub const fn get_aligned_addr(raw: usize, alignment: u32) -> usize {
    let alignment = alignment as usize;
    let mask = alignment - 1;
    let aligned = (raw + mask) & !mask;
    // The header must fit strictly before the payload.
    if aligned - raw < HEADER_SIZE as usize {
        aligned + alignment
    } else {
        aligned
    }
}

/// Raw allocation start of the payload at `aligned`.
#[inline]
#[must_use]
pub const fn get_raw_addr(aligned: usize, shift: u32) -> usize {
    aligned - shift as usize
}

/// Bytes to request from the range allocator so that an aligned payload of
/// `size` bytes with its header always fits.
#[inline]
#[must_use]
pub const fn padded_size(size: u32, alignment: u32) -> Option<u32> {
    size.checked_add(alignment + HEADER_SIZE - 1)
}
