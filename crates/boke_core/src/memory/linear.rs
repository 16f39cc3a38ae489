//! # Linear Allocator
//!
//! A bump allocator for scratch allocations that are freed all at once.

// SAFETY: This module hands out pointers into the borrowed buffer.
// Every returned range is checked against the buffer end first.
#![allow(unsafe_code)]

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::RawAllocator;
use crate::error::{MemoryError, MemoryResult};
use crate::math::align_up;

/// A bump-pointer allocator over a borrowed buffer.
///
/// Allocations are fast (just bump an offset). Memory is reclaimed all at
/// once when the allocator is reset or dropped; individual deallocation is
/// a no-op.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one per thread.
///
/// # Example
///
/// ```rust
/// use boke_core::LinearAllocator;
///
/// let mut buffer = [0u8; 1024];
/// let mut scratch = LinearAllocator::new(&mut buffer);
///
/// let a = scratch.allocate(100, 16).unwrap();
/// assert_eq!(a.as_ptr() as usize % 16, 0);
///
/// scratch.reset();
/// assert_eq!(scratch.offset(), 0);
/// ```
pub struct LinearAllocator<'buf> {
    /// First byte of the buffer.
    head: NonNull<u8>,
    /// Total capacity in bytes.
    capacity: u32,
    /// Current allocation offset.
    offset: Cell<u32>,
    /// The buffer is borrowed mutably for the allocator's lifetime.
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl<'buf> LinearAllocator<'buf> {
    /// Creates a linear allocator over `buffer`.
    ///
    /// Buffers larger than `u32::MAX` bytes are only used up to that size.
    #[must_use]
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        let capacity = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
        Self {
            head: NonNull::from(buffer).cast::<u8>(),
            capacity,
            offset: Cell::new(0),
            _buffer: PhantomData,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns the current used space in bytes.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset.get()
    }

    /// Returns the remaining free space in bytes (ignoring alignment padding).
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.capacity - self.offset()
    }

    /// Allocates `size` bytes aligned to `alignment` (a power of two).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfSpace`] if the buffer is exhausted. The
    /// offset is left unchanged in that case.
    pub fn allocate(&self, size: u32, alignment: u32) -> MemoryResult<NonNull<u8>> {
        let alignment = alignment.max(1);
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment {alignment} is not a power of two"
        );

        let head = self.head.as_ptr() as usize;
        let aligned_addr = align_up(head + self.offset() as usize, alignment as usize);
        let aligned_offset = aligned_addr - head;
        let new_offset = aligned_offset + size as usize;

        if new_offset > self.capacity as usize {
            return Err(MemoryError::OutOfSpace {
                requested: size,
                alignment,
            });
        }

        self.offset.set(new_offset as u32);

        // SAFETY: `aligned_offset + size <= capacity`, checked above.
        Ok(unsafe { NonNull::new_unchecked(self.head.as_ptr().add(aligned_offset)) })
    }

    /// Resets the allocator, invalidating all previous allocations.
    ///
    /// This is a **zero-cost** operation - no memory is touched.
    #[inline]
    pub fn reset(&mut self) {
        self.offset.set(0);
    }
}

impl RawAllocator for LinearAllocator<'_> {
    #[inline]
    fn allocate(&self, size: u32, alignment: u32) -> MemoryResult<NonNull<u8>> {
        LinearAllocator::allocate(self, size, alignment)
    }

    /// Individual frees are not supported; memory returns on `reset`.
    #[inline]
    unsafe fn deallocate(&self, _ptr: NonNull<u8>) {}
}
