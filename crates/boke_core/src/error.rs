//! # Memory Error Types
//!
//! Recoverable failures of the allocators and containers.
//!
//! Contract violations (bad alignment, foreign pointers, double frees) are
//! NOT represented here. They are debug assertions: a debug build aborts with
//! a diagnostic, a release build pays nothing for the check.

use thiserror::Error;

/// Errors that can occur while allocating from a fixed buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The range allocator has no free region (or no free node) large enough.
    #[error("out of space: requested {requested} bytes at alignment {alignment}")]
    OutOfSpace {
        /// Bytes the caller asked for (before header and alignment slack).
        requested: u32,
        /// Alignment the caller asked for (after clamping).
        alignment: u32,
    },

    /// The backing buffer cannot hold the fixed bookkeeping overhead.
    #[error("buffer too small: {size} bytes given, at least {required} required")]
    BufferTooSmall {
        /// Size of the buffer that was handed in.
        size: usize,
        /// Minimum size that would have worked.
        required: usize,
    },

    /// A size or capacity computation does not fit the 32-bit offset space.
    #[error("capacity overflow: {0} elements")]
    CapacityOverflow(u64),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
