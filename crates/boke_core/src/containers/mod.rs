//! # Containers
//!
//! Growable containers that allocate from a [`RawAllocator`](crate::memory::RawAllocator)
//! instead of the global heap.
//!
//! - [`ResizableArray`]: contiguous storage with doubling growth
//! - [`StrHashMap`]: open-addressing map keyed by [`StrHash`]
//!
//! Many containers can share one [`Arena`](crate::memory::Arena): allocation
//! only needs `&Arena`.

mod array;
mod hash_map;
mod raw;

pub use array::ResizableArray;
pub use hash_map::{must_shift_back, Iter, StrHash, StrHashMap};
