//! # Arena Allocator
//!
//! General-purpose sub-allocator over a caller-supplied byte buffer.
//!
//! ## Buffer Layout
//!
//! ```text
//! buffer: [ node table | free-node stack | pad | payload ....................... ]
//!                                               ^ head_addr           head + size ^
//! ```
//!
//! The range allocator's bookkeeping lives in the first bytes of the buffer;
//! the rest is the offset space it manages. Every allocation requests
//! `size + alignment + HEADER_SIZE - 1` bytes so an aligned payload with its
//! hidden header (see [`super::header`]) always fits, and deallocation needs
//! nothing but the payload pointer.

// SAFETY: This module turns offsets into pointers inside the owned buffer.
// All pointer arithmetic stays within `head .. head + size`.
#![allow(unsafe_code)]

use std::cell::RefCell;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use super::header::{
    get_aligned_addr, get_raw_addr, padded_size, AllocationHeader, HEADER_SIZE, MAX_SHIFT,
};
use super::range::{Allocation, Node, NodeIndex, RangeAllocator, StorageReport};
use super::RawAllocator;
use crate::config::ArenaConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::math::align_up;

/// Smallest alignment handed out. Large enough to hold the header.
pub const MIN_ALIGNMENT: u32 = HEADER_SIZE;

/// Smallest payload region an arena accepts.
const MIN_PAYLOAD: usize = (HEADER_SIZE + MIN_ALIGNMENT) as usize;

/// A fixed-buffer arena with individual deallocation.
///
/// Allocation and deallocation go through `&self`, so any number of
/// containers can share one arena.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe (`!Send`, `!Sync`). Use one arena per thread.
///
/// # Example
///
/// ```rust
/// use boke_core::Arena;
///
/// let mut buffer = vec![0u8; 64 * 1024];
/// let arena = Arena::new(&mut buffer).unwrap();
///
/// let ptr = arena.allocate(512, 256).unwrap();
/// assert_eq!(ptr.as_ptr() as usize % 256, 0);
///
/// unsafe { arena.deallocate(ptr.as_ptr()) };
/// ```
pub struct Arena<'buf> {
    /// Offset-space allocator; its node table lives in the buffer head.
    range: RefCell<RangeAllocator<'buf>>,
    /// First payload byte.
    head: NonNull<u8>,
    /// Payload bytes after `head`.
    size: u32,
    /// The payload is borrowed mutably for the arena's lifetime.
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl<'buf> Arena<'buf> {
    /// Creates an arena over `buffer` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::BufferTooSmall`] if the bookkeeping overhead
    /// does not fit.
    pub fn new(buffer: &'buf mut [u8]) -> MemoryResult<Self> {
        Self::with_config(buffer, &ArenaConfig::default())
    }

    /// Creates an arena over `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] for an invalid `config` and
    /// [`MemoryError::BufferTooSmall`] if the bookkeeping overhead does not fit.
    pub fn with_config(buffer: &'buf mut [u8], config: &ArenaConfig) -> MemoryResult<Self> {
        config.validate()?;

        let buffer_len = buffer.len();
        let buffer_addr = buffer.as_ptr() as usize;
        let max_allocations = config.max_allocations_for(buffer_len);
        let base_alignment = config.base_alignment.max(MIN_ALIGNMENT) as usize;

        let node_start = align_up(buffer_addr, mem::align_of::<Node>()) - buffer_addr;
        let node_bytes = RangeAllocator::node_table_bytes(max_allocations);
        let free_list_bytes = RangeAllocator::free_list_bytes(max_allocations);
        let state_end = node_start + node_bytes + free_list_bytes;
        let head_offset = align_up(buffer_addr + state_end, base_alignment) - buffer_addr;

        let required = head_offset + MIN_PAYLOAD;
        if buffer_len < required {
            return Err(MemoryError::BufferTooSmall {
                size: buffer_len,
                required,
            });
        }

        let (state, payload) = buffer.split_at_mut(head_offset);
        let (node_region, free_list_region) =
            state[node_start..state_end].split_at_mut(node_bytes);

        let too_small = || MemoryError::BufferTooSmall {
            size: buffer_len,
            required,
        };
        let nodes: &'buf mut [Node] =
            bytemuck::try_cast_slice_mut(node_region).map_err(|_| too_small())?;
        let free_nodes: &'buf mut [NodeIndex] =
            bytemuck::try_cast_slice_mut(free_list_region).map_err(|_| too_small())?;

        let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        let head = NonNull::from(payload).cast::<u8>();

        tracing::debug!(
            "Arena created: {} payload bytes at {:#x}, {} nodes, {} bytes overhead",
            size,
            head.as_ptr() as usize,
            max_allocations,
            head_offset
        );

        Ok(Self {
            range: RefCell::new(RangeAllocator::new(size, nodes, free_nodes)),
            head,
            size,
            _buffer: PhantomData,
        })
    }

    /// Address of the first payload byte.
    #[inline]
    #[must_use]
    pub fn head_addr(&self) -> usize {
        self.head.as_ptr() as usize
    }

    /// Size of the payload region in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Maximum number of simultaneously tracked regions.
    #[inline]
    #[must_use]
    pub fn max_allocations(&self) -> u32 {
        self.range.borrow().max_allocations()
    }

    /// Returns `true` if `ptr` could be a payload pointer of this arena.
    ///
    /// `head + size` itself is accepted: a zero-byte payload carved from the
    /// last bytes of the arena is aligned to exactly that address.
    #[inline]
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let head = self.head_addr();
        addr >= head + HEADER_SIZE as usize && addr <= head + self.size as usize
    }

    /// Summarizes the free space.
    #[must_use]
    pub fn storage_report(&self) -> StorageReport {
        self.range.borrow().storage_report()
    }

    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// `alignment` is clamped up to [`MIN_ALIGNMENT`]. It must be a power of
    /// two below 65536; violating that is a contract fault (debug assertion).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfSpace`] when no free region is large
    /// enough. The arena is unchanged and the caller may retry smaller.
    pub fn allocate(&self, size: u32, alignment: u32) -> MemoryResult<NonNull<u8>> {
        let alignment = alignment.max(MIN_ALIGNMENT);
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment {alignment} is not a power of two"
        );
        debug_assert!(
            alignment < MAX_SHIFT,
            "alignment {alignment} must be below {MAX_SHIFT}"
        );

        let out_of_space = MemoryError::OutOfSpace {
            requested: size,
            alignment,
        };
        let total = padded_size(size, alignment).ok_or_else(|| out_of_space.clone())?;

        let allocation = self.range.borrow_mut().allocate(total);
        let Some(allocation) = allocation else {
            tracing::debug!(
                "Arena out of space: {} bytes at alignment {} ({:?})",
                size,
                alignment,
                self.storage_report()
            );
            return Err(out_of_space);
        };

        let head = self.head_addr();
        let raw = head + allocation.offset as usize;
        let aligned = get_aligned_addr(raw, alignment);
        let shift = (aligned - raw) as u32;
        debug_assert!(shift >= HEADER_SIZE && shift < MAX_SHIFT);
        debug_assert!(aligned + size as usize <= raw + total as usize);

        // SAFETY: `raw .. raw + total` is a region of the payload handed out
        // by the range allocator, and `aligned - raw < total`.
        let ptr = unsafe { NonNull::new_unchecked(self.head.as_ptr().add(aligned - head)) };

        // SAFETY: `aligned - HEADER_SIZE >= raw`, so the header is inside the region.
        unsafe {
            AllocationHeader {
                node_index: allocation.metadata,
                shift,
            }
            .write(ptr);
        }

        Ok(ptr)
    }

    /// Returns an allocation to the arena. No-op on null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by [`Arena::allocate`] on this
    /// arena that has not been deallocated yet. Debug builds assert this;
    /// release builds do not check.
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        debug_assert!(
            self.owns(ptr.as_ptr()),
            "pointer {:p} is not owned by this arena",
            ptr.as_ptr()
        );

        let header = AllocationHeader::read(ptr);
        let raw = get_raw_addr(ptr.as_ptr() as usize, header.shift);
        let offset = raw.wrapping_sub(self.head_addr());
        debug_assert!(
            offset < self.size as usize,
            "raw offset {offset} out of bounds (arena size {})",
            self.size
        );

        let mut range = self.range.borrow_mut();
        debug_assert!(
            header.node_index < range.max_allocations(),
            "node index {} out of range",
            header.node_index
        );

        let allocation = Allocation {
            offset: offset as u32,
            metadata: header.node_index,
        };
        debug_assert!(
            range.is_live(allocation),
            "pointer {:p} is not a live allocation",
            ptr.as_ptr()
        );
        range.free(allocation);
    }

    /// Frees every allocation at once.
    ///
    /// Requires exclusive access, so no container can still be borrowing
    /// the arena. Raw pointers obtained earlier become dangling.
    pub fn reset(&mut self) {
        self.range.get_mut().reset();
    }
}

impl RawAllocator for Arena<'_> {
    #[inline]
    fn allocate(&self, size: u32, alignment: u32) -> MemoryResult<NonNull<u8>> {
        Arena::allocate(self, size, alignment)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        Arena::deallocate(self, ptr.as_ptr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocation() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();

        let ptr = arena.allocate(100, 8).unwrap();
        assert!(arena.owns(ptr.as_ptr()));
        assert_eq!(ptr.as_ptr() as usize % 8, 0);

        // The payload is writable.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 100);
            assert_eq!(*ptr.as_ptr().add(99), 0xAB);
            arena.deallocate(ptr.as_ptr());
        }
    }

    #[test]
    fn test_arena_alignment_clamped() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();

        for requested in [0u32, 1, 2, 4] {
            let ptr = arena.allocate(3, requested).unwrap();
            assert_eq!(ptr.as_ptr() as usize % MIN_ALIGNMENT as usize, 0);
        }
    }

    #[test]
    fn test_arena_header_round_trip() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();

        for alignment in [8u32, 16, 64, 256, 1024] {
            let ptr = arena.allocate(40, alignment).unwrap();
            let header = unsafe { AllocationHeader::read(ptr) };
            let raw = get_raw_addr(ptr.as_ptr() as usize, header.shift);
            assert!(raw >= arena.head_addr());
            assert_eq!(ptr.as_ptr() as usize - raw, header.shift as usize);
            assert_eq!(get_aligned_addr(raw, alignment), ptr.as_ptr() as usize);
        }
    }

    #[test]
    fn test_arena_out_of_space_is_recoverable() {
        let mut buffer = vec![0u8; 4096];
        let arena = Arena::new(&mut buffer).unwrap();

        let big = arena.size();
        assert!(matches!(
            arena.allocate(big, 8),
            Err(MemoryError::OutOfSpace { requested, alignment: 8 }) if requested == big
        ));

        // Still usable afterwards.
        let ptr = arena.allocate(64, 8).unwrap();
        unsafe { arena.deallocate(ptr.as_ptr()) };
    }

    #[test]
    fn test_zero_size_allocation_at_tail() {
        let config = ArenaConfig {
            base_alignment: 8,
            max_allocations: Some(16),
        };

        // Size the buffer so the payload region is exactly 4096 bytes.
        let mut scratch = vec![0u64; 512];
        let overhead = {
            let arena = Arena::with_config(bytemuck::cast_slice_mut(&mut scratch), &config).unwrap();
            4096 - arena.size() as usize
        };
        let mut words = vec![0u64; (4096 + overhead) / 8];
        let arena = Arena::with_config(bytemuck::cast_slice_mut(&mut words), &config).unwrap();
        assert_eq!(arena.size(), 4096);
        let before = arena.storage_report();

        // Leaves exactly the 15 bytes a zero-byte request pads to.
        let body = arena.allocate(4096 - 30, 8).unwrap();
        let tail = arena.allocate(0, 8).unwrap();
        assert_eq!(tail.as_ptr() as usize, arena.head_addr() + 4096);
        assert!(arena.owns(tail.as_ptr()));
        assert!(!arena.owns((arena.head_addr() + 4097) as *const u8));

        unsafe {
            arena.deallocate(tail.as_ptr());
            arena.deallocate(body.as_ptr());
        }
        assert_eq!(arena.storage_report(), before);
    }

    #[test]
    fn test_arena_deallocate_null_is_noop() {
        let mut buffer = vec![0u8; 4096];
        let arena = Arena::new(&mut buffer).unwrap();
        let before = arena.storage_report();
        unsafe { arena.deallocate(std::ptr::null_mut()) };
        assert_eq!(arena.storage_report(), before);
    }

    #[test]
    fn test_arena_free_space_restored() {
        let mut buffer = vec![0u8; 32 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();
        let before = arena.storage_report();

        let ptrs: Vec<_> = (1..20).map(|i| arena.allocate(i * 17, 16).unwrap()).collect();
        assert!(arena.storage_report().total_free_space < before.total_free_space);

        for ptr in ptrs.into_iter().rev() {
            unsafe { arena.deallocate(ptr.as_ptr()) };
        }
        assert_eq!(arena.storage_report(), before);
    }

    #[test]
    fn test_arena_reset() {
        let mut buffer = vec![0u8; 8 * 1024];
        let mut arena = Arena::new(&mut buffer).unwrap();
        let before = arena.storage_report();

        let _ = arena.allocate(1000, 8).unwrap();
        arena.reset();
        assert_eq!(arena.storage_report(), before);
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buffer = vec![0u8; 64];
        assert!(matches!(
            Arena::new(&mut buffer),
            Err(MemoryError::BufferTooSmall { size: 64, .. })
        ));
    }

    #[test]
    fn test_base_alignment_applies_to_head() {
        let mut buffer = vec![0u8; 16 * 1024];
        let config = ArenaConfig {
            base_alignment: 256,
            max_allocations: Some(32),
        };
        let arena = Arena::with_config(&mut buffer, &config).unwrap();
        assert_eq!(arena.head_addr() % 256, 0);
        assert_eq!(arena.max_allocations(), 32);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not a power of two")]
    fn test_non_power_of_two_alignment_faults() {
        let mut buffer = vec![0u8; 4096];
        let arena = Arena::new(&mut buffer).unwrap();
        let _ = arena.allocate(16, 24);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "must be below")]
    fn test_oversized_alignment_faults() {
        let mut buffer = vec![0u8; 4096];
        let arena = Arena::new(&mut buffer).unwrap();
        let _ = arena.allocate(16, MAX_SHIFT);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not owned by this arena")]
    fn test_foreign_pointer_faults() {
        let mut buffer = vec![0u8; 4096];
        let arena = Arena::new(&mut buffer).unwrap();
        let mut other = [0u8; 64];
        unsafe { arena.deallocate(other.as_mut_ptr().add(32)) };
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not a live allocation")]
    fn test_double_free_faults() {
        let mut buffer = vec![0u8; 4096];
        let arena = Arena::new(&mut buffer).unwrap();
        let ptr = arena.allocate(16, 8).unwrap();
        unsafe {
            arena.deallocate(ptr.as_ptr());
            arena.deallocate(ptr.as_ptr());
        }
    }
}
