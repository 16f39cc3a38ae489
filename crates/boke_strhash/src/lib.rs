//! # BOKE String Hashing
//!
//! Strings are identified by their 64-bit FNV-1a hash. Hashing is a
//! `const fn`, so identifiers can be computed at compile time:
//!
//! ```rust
//! use boke_strhash::hash_str;
//! use boke_core::StrHash;
//!
//! const PLAYER: StrHash = hash_str("player");
//! assert_eq!(PLAYER, hash_str("player"));
//! assert_ne!(PLAYER, hash_str("Player"));
//! ```
//!
//! A [`StrHashDatabase`] remembers the strings behind the hashes so they can
//! be recovered for logging and tooling.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod database;
pub mod error;

pub use boke_core::StrHash;
pub use database::StrHashDatabase;
pub use error::{StrHashError, StrHashResult};

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hashes `bytes` with 64-bit FNV-1a.
#[must_use]
pub const fn hash_bytes(bytes: &[u8]) -> StrHash {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    StrHash::new(hash)
}

/// Hashes a string with 64-bit FNV-1a.
#[inline]
#[must_use]
pub const fn hash_str(s: &str) -> StrHash {
    hash_bytes(s.as_bytes())
}
