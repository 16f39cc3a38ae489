//! # BOKE Core
//!
//! Fixed-buffer memory management and the containers built on it:
//! - One caller-provided buffer, no global heap traffic afterwards
//! - Individually freeable allocations with arbitrary power-of-two alignment
//! - Exhaustion reported as an ordinary error, never a crash
//!
//! ## Architecture Rules
//!
//! 1. **Bookkeeping lives in the buffer** - The node table is carved from the
//!    buffer head
//! 2. **No side tables** - Each allocation finds its node through a hidden
//!    8-byte header
//! 3. **Containers are allocator-generic** - Anything implementing
//!    [`RawAllocator`] can back them
//!
//! ## Example
//!
//! ```rust
//! use boke_core::{Arena, ResizableArray, StrHash, StrHashMap};
//!
//! let mut buffer = vec![0u8; 64 * 1024];
//! let arena = Arena::new(&mut buffer).unwrap();
//!
//! let mut ids = ResizableArray::new(&arena);
//! let mut names = StrHashMap::new(&arena);
//! ids.push_back(7u32).unwrap();
//! names.insert(StrHash::new(0xfeed), 7u32).unwrap();
//!
//! assert_eq!(names.get(StrHash::new(0xfeed)), Some(&ids[0]));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod containers;
pub mod error;
pub mod math;
pub mod memory;

pub use config::ArenaConfig;
pub use containers::{must_shift_back, ResizableArray, StrHash, StrHashMap};
pub use error::{MemoryError, MemoryResult};
pub use memory::{
    Arena, LinearAllocator, RawAllocator, StorageReport, HEADER_SIZE, MAX_SHIFT, MIN_ALIGNMENT,
};

/// A [`ResizableArray`] backed by an [`Arena`].
pub type ArenaArray<'a, 'buf, T> = ResizableArray<'a, T, Arena<'buf>>;

/// A [`StrHashMap`] backed by an [`Arena`].
pub type ArenaStrHashMap<'a, 'buf, V> = StrHashMap<'a, V, Arena<'buf>>;
