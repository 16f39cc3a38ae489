//! # Resizable Array
//!
//! Contiguous, growable storage of `Copy` values carved from a
//! [`RawAllocator`].
//!
//! - Growth doubles the capacity (`size * 2`) when a push finds the array full
//! - Capacity never shrinks except through
//!   [`ResizableArray::release_allocated_buffer`]
//! - `clear` keeps the capacity and runs no destructors; the `Copy` bound
//!   guarantees there are none to run

// SAFETY: This module reads the initialized prefix `[0, len)` of a RawBuffer.
#![allow(unsafe_code)]

use std::fmt;
use std::ops::{Index, IndexMut};
use std::ptr;
use std::slice;

use super::raw::RawBuffer;
use crate::error::MemoryResult;
use crate::memory::RawAllocator;

/// An owning, growable array allocated from `A`.
///
/// # Example
///
/// ```rust
/// use boke_core::{Arena, ResizableArray};
///
/// let mut buffer = vec![0u8; 16 * 1024];
/// let arena = Arena::new(&mut buffer).unwrap();
///
/// let mut array = ResizableArray::new(&arena);
/// array.push_back(1u32).unwrap();
/// array.push_back(3).unwrap();
/// assert_eq!(array.as_slice(), &[1, 3]);
/// ```
pub struct ResizableArray<'a, T: Copy, A: RawAllocator + ?Sized> {
    /// Allocator every buffer of this array comes from.
    allocator: &'a A,
    /// Backing storage; `[0, len)` is initialized.
    data: RawBuffer<T>,
    /// Number of initialized elements.
    len: u32,
}

impl<'a, T: Copy, A: RawAllocator + ?Sized> ResizableArray<'a, T, A> {
    /// Creates an empty array. Allocates nothing.
    #[must_use]
    pub const fn new(allocator: &'a A) -> Self {
        Self {
            allocator,
            data: RawBuffer::empty(),
            len: 0,
        }
    }

    /// Creates an empty array with room for `capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if the storage cannot be allocated.
    pub fn with_capacity(allocator: &'a A, capacity: u32) -> MemoryResult<Self> {
        let mut array = Self::new(allocator);
        array.reserve(capacity)?;
        Ok(array)
    }

    /// Creates an array of `len` default values.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if the storage cannot be allocated.
    pub fn with_size(allocator: &'a A, len: u32) -> MemoryResult<Self>
    where
        T: Default,
    {
        let mut array = Self::with_capacity(allocator, len)?;
        for slot in &mut array.data.slots_mut()[..len as usize] {
            slot.write(T::default());
        }
        array.len = len;
        Ok(array)
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if the array holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current storage can hold.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.data.capacity()
    }

    /// The allocator backing this array.
    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &'a A {
        self.allocator
    }

    /// Grows the storage to at least `capacity` elements.
    ///
    /// No-op if the array is already large enough; capacity never shrinks.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error; the array is unchanged in that case.
    pub fn reserve(&mut self, capacity: u32) -> MemoryResult<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }

        let mut grown = RawBuffer::<T>::allocate(self.allocator, capacity)?;
        // SAFETY: both blocks hold at least `len` slots and never overlap.
        unsafe {
            ptr::copy_nonoverlapping(self.data.as_ptr(), grown.as_mut_ptr(), self.len as usize);
            self.data.release(self.allocator);
        }
        self.data = grown;
        Ok(())
    }

    /// Appends `value`, doubling the capacity if the array is full.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if growing fails; `value` is not added.
    pub fn push_back(&mut self, value: T) -> MemoryResult<()> {
        if self.len == self.capacity() {
            self.reserve(self.len.saturating_mul(2).max(1))?;
        }
        self.data.slots_mut()[self.len as usize].write(value);
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last element.
    pub fn pop_back(&mut self) -> Option<T> {
        let last = self.back().copied()?;
        self.len -= 1;
        Some(last)
    }

    /// Sets the length to zero. Keeps the storage.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Frees the storage and returns to the empty state.
    pub fn release_allocated_buffer(&mut self) {
        // SAFETY: `data` was allocated from `self.allocator`.
        unsafe { self.data.release(self.allocator) };
        self.len = 0;
    }

    /// Moves the contents out, leaving `self` empty (with no storage).
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            allocator: self.allocator,
            data: std::mem::replace(&mut self.data, RawBuffer::empty()),
            len: std::mem::replace(&mut self.len, 0),
        }
    }

    /// The elements as a slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `[0, len)` is initialized.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len as usize) }
    }

    /// The elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len as usize;
        // SAFETY: `[0, len)` is initialized.
        unsafe { slice::from_raw_parts_mut(self.data.as_mut_ptr(), len) }
    }

    /// Iterates over the elements.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// First element, if any.
    #[inline]
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.as_slice().first()
    }

    /// Last element, if any.
    #[inline]
    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.as_slice().last()
    }

    /// Element at `index` without a bounds check in release builds.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`ResizableArray::len`].
    #[inline]
    #[must_use]
    pub unsafe fn get_unchecked(&self, index: u32) -> &T {
        debug_assert!(index < self.len, "index {index} out of bounds (len {})", self.len);
        &*self.data.as_ptr().add(index as usize)
    }
}

impl<T: Copy, A: RawAllocator + ?Sized> Drop for ResizableArray<'_, T, A> {
    fn drop(&mut self) {
        self.release_allocated_buffer();
    }
}

impl<T: Copy, A: RawAllocator + ?Sized> Index<u32> for ResizableArray<'_, T, A> {
    type Output = T;

    #[inline]
    fn index(&self, index: u32) -> &T {
        &self.as_slice()[index as usize]
    }
}

impl<T: Copy, A: RawAllocator + ?Sized> IndexMut<u32> for ResizableArray<'_, T, A> {
    #[inline]
    fn index_mut(&mut self, index: u32) -> &mut T {
        &mut self.as_mut_slice()[index as usize]
    }
}

impl<'s, T: Copy, A: RawAllocator + ?Sized> IntoIterator for &'s ResizableArray<'_, T, A> {
    type Item = &'s T;
    type IntoIter = slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Copy + fmt::Debug, A: RawAllocator + ?Sized> fmt::Debug for ResizableArray<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
