//! # Memory Management
//!
//! Fixed-buffer allocators for allocation-free object storage.
//!
//! ## Design Philosophy
//!
//! A backing buffer is requested once. After that:
//! - No heap allocations
//! - No growth beyond the buffer
//! - Exhaustion is an ordinary, recoverable result
//!
//! ```text
//! StrHashMap / ResizableArray
//!        │ RawAllocator
//!        ▼
//!      Arena ──► RangeAllocator (offsets) ──► node table in buffer head
//! ```

mod arena;
pub mod header;
mod linear;
pub mod range;

use std::ptr::NonNull;

use crate::error::MemoryResult;

pub use arena::{Arena, MIN_ALIGNMENT};
pub use header::{HEADER_SIZE, MAX_SHIFT};
pub use linear::LinearAllocator;
pub use range::{Allocation, NodeIndex, RangeAllocator, StorageReport};

/// Allocation interface the containers are written against.
///
/// Implemented by [`Arena`] (individual frees) and [`LinearAllocator`]
/// (frees are no-ops until reset).
pub trait RawAllocator {
    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MemoryError::OutOfSpace`] when exhausted.
    fn allocate(&self, size: u32, alignment: u32) -> MemoryResult<NonNull<u8>>;

    /// Returns memory obtained from [`RawAllocator::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this same allocator and must not
    /// have been deallocated already.
    #[allow(unsafe_code)]
    unsafe fn deallocate(&self, ptr: NonNull<u8>);
}
