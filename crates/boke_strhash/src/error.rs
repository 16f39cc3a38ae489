//! # String Hash Error Types

use boke_core::{MemoryError, StrHash};
use thiserror::Error;

/// Errors that can occur while interning strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrHashError {
    /// Two different strings produced the same hash.
    #[error("hash collision at {hash}: {existing:?} already interned, {incoming:?} rejected")]
    Collision {
        /// The shared hash.
        hash: StrHash,
        /// The string interned first.
        existing: String,
        /// The string that was rejected.
        incoming: String,
    },

    /// The backing allocator is exhausted.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Result type for string interning.
pub type StrHashResult<T> = Result<T, StrHashError>;
