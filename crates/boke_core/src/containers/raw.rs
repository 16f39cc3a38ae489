//! Allocator-backed storage shared by the containers.
//!
//! A [`RawBuffer`] is a `capacity`-element block of possibly uninitialized
//! `T` that does not know its allocator; the owning container passes the
//! allocator in to allocate and release it.

// SAFETY: This module builds slices over allocator memory.
// A buffer of capacity `n` always points at `n * size_of::<T>()` owned bytes.
#![allow(unsafe_code)]

use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;
use std::slice;

use bytemuck::Zeroable;

use crate::error::{MemoryError, MemoryResult};
use crate::memory::RawAllocator;

/// Uninitialized storage for `capacity` values of `T`.
///
/// `ptr` is `None` exactly when `capacity == 0`.
pub(crate) struct RawBuffer<T> {
    ptr: Option<NonNull<T>>,
    capacity: u32,
}

impl<T> RawBuffer<T> {
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: None,
            capacity: 0,
        }
    }

    /// Allocates room for `capacity` values. `capacity == 0` allocates nothing.
    pub(crate) fn allocate<A: RawAllocator + ?Sized>(
        allocator: &A,
        capacity: u32,
    ) -> MemoryResult<Self> {
        if capacity == 0 {
            return Ok(Self::empty());
        }

        let bytes = u64::from(capacity) * mem::size_of::<T>() as u64;
        let bytes =
            u32::try_from(bytes).map_err(|_| MemoryError::CapacityOverflow(u64::from(capacity)))?;
        let alignment = mem::align_of::<T>() as u32;

        let ptr = allocator.allocate(bytes, alignment)?;
        Ok(Self {
            ptr: Some(ptr.cast::<T>()),
            capacity,
        })
    }

    #[inline]
    pub(crate) const fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const T {
        self.ptr
            .map_or(NonNull::dangling().as_ptr(), NonNull::as_ptr)
            .cast_const()
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.map_or(NonNull::dangling().as_ptr(), NonNull::as_ptr)
    }

    /// The whole block, as possibly-uninitialized slots.
    #[inline]
    pub(crate) fn slots(&self) -> &[MaybeUninit<T>] {
        // SAFETY: `capacity` slots are allocated; MaybeUninit has no validity
        // requirement.
        unsafe { slice::from_raw_parts(self.as_ptr().cast::<MaybeUninit<T>>(), self.capacity as usize) }
    }

    /// Mutable view of [`RawBuffer::slots`].
    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [MaybeUninit<T>] {
        let len = self.capacity as usize;
        // SAFETY: as in `slots`, and `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr().cast::<MaybeUninit<T>>(), len) }
    }

    /// Hands the block back to `allocator` and leaves `self` empty.
    ///
    /// # Safety
    ///
    /// `allocator` must be the allocator this buffer was allocated from.
    pub(crate) unsafe fn release<A: RawAllocator + ?Sized>(&mut self, allocator: &A) {
        if let Some(ptr) = self.ptr.take() {
            allocator.deallocate(ptr.cast::<u8>());
        }
        self.capacity = 0;
    }
}

/// A [`RawBuffer`] whose every slot is initialized to all-zero bytes.
pub(crate) struct ZeroedBuffer<T: Zeroable + Copy>(RawBuffer<T>);

impl<T: Zeroable + Copy> ZeroedBuffer<T> {
    pub(crate) const fn empty() -> Self {
        Self(RawBuffer::empty())
    }

    pub(crate) fn allocate<A: RawAllocator + ?Sized>(
        allocator: &A,
        capacity: u32,
    ) -> MemoryResult<Self> {
        let mut raw = RawBuffer::allocate(allocator, capacity)?;
        for slot in raw.slots_mut() {
            slot.write(T::zeroed());
        }
        Ok(Self(raw))
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: every slot was written in `allocate` and only ever
        // overwritten with valid values through `as_mut_slice`.
        unsafe { slice::from_raw_parts(self.0.as_ptr(), self.0.capacity() as usize) }
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.0.capacity() as usize;
        // SAFETY: as in `as_slice`.
        unsafe { slice::from_raw_parts_mut(self.0.as_mut_ptr(), len) }
    }

    /// # Safety
    ///
    /// See [`RawBuffer::release`].
    pub(crate) unsafe fn release<A: RawAllocator + ?Sized>(&mut self, allocator: &A) {
        self.0.release(allocator);
    }
}
