//! # String Hash Database
//!
//! Reverse lookup from [`StrHash`] to the string it was computed from.
//!
//! Each distinct string is copied into the allocator once. The database owns
//! those copies and hands back borrowed `&str`s tied to its own lifetime.

// SAFETY: This module rebuilds `&str`s from bytes it copied out of `&str`s.
#![allow(unsafe_code)]

use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;
use std::str;

use boke_core::{MemoryError, RawAllocator, StrHash, StrHashMap};

use crate::error::{StrHashError, StrHashResult};
use crate::hash_str;

/// Location of one interned string inside the allocator.
#[derive(Clone, Copy)]
struct StrEntry {
    ptr: NonNull<u8>,
    len: u32,
}

impl StrEntry {
    /// # Safety
    ///
    /// The entry must still be owned by a live database.
    unsafe fn as_str<'s>(self) -> &'s str {
        // SAFETY: the bytes were copied from a `&str` and never modified.
        str::from_utf8_unchecked(slice::from_raw_parts(self.ptr.as_ptr(), self.len as usize))
    }
}

/// Interned strings keyed by their hash.
///
/// # Thread Safety
///
/// This database is NOT thread-safe. It borrows its allocator and is meant
/// to be owned by a single system.
///
/// # Example
///
/// ```rust
/// use boke_core::Arena;
/// use boke_strhash::{hash_str, StrHashDatabase};
///
/// let mut buffer = vec![0u8; 16 * 1024];
/// let arena = Arena::new(&mut buffer).unwrap();
/// let mut database = StrHashDatabase::new(&arena);
///
/// let hash = database.intern("hello world").unwrap();
/// assert_eq!(hash, hash_str("hello world"));
/// assert_eq!(database.lookup(hash), Some("hello world"));
/// assert_eq!(database.lookup_or_empty(hash_str("unknown")), "");
/// ```
pub struct StrHashDatabase<'a, A: RawAllocator + ?Sized> {
    allocator: &'a A,
    entries: StrHashMap<'a, StrEntry, A>,
}

impl<'a, A: RawAllocator + ?Sized> StrHashDatabase<'a, A> {
    /// Creates an empty database. Allocates nothing until the first intern.
    #[must_use]
    pub fn new(allocator: &'a A) -> Self {
        Self {
            allocator,
            entries: StrHashMap::new(allocator),
        }
    }

    /// Number of interned strings.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.entries.len()
    }

    /// Returns `true` if nothing has been interned.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a string is interned under `hash`.
    #[inline]
    #[must_use]
    pub fn contains(&self, hash: StrHash) -> bool {
        self.entries.contains(hash)
    }

    /// Hashes `s` and remembers it.
    ///
    /// Interning an already-interned string returns the same hash and
    /// allocates nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StrHashError::Collision`] if a different string already has
    /// this hash, or [`StrHashError::Memory`] if the allocator is exhausted.
    pub fn intern(&mut self, s: &str) -> StrHashResult<StrHash> {
        let hash = hash_str(s);
        self.insert(hash, s)?;
        Ok(hash)
    }

    /// Remembers `s` under a hash computed elsewhere (for example a table
    /// of identifiers hashed at build time).
    ///
    /// # Errors
    ///
    /// Same as [`StrHashDatabase::intern`].
    pub fn insert(&mut self, hash: StrHash, s: &str) -> StrHashResult<()> {
        if let Some(existing) = self.lookup(hash) {
            if existing == s {
                return Ok(());
            }
            tracing::warn!("String hash collision at {}: {:?} vs {:?}", hash, existing, s);
            return Err(StrHashError::Collision {
                hash,
                existing: existing.to_owned(),
                incoming: s.to_owned(),
            });
        }

        let len = u32::try_from(s.len()).map_err(|_| MemoryError::CapacityOverflow(s.len() as u64))?;
        let ptr = self.allocator.allocate(len, 1)?;
        // SAFETY: `ptr` is a fresh allocation of `len` bytes.
        unsafe { ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len()) };

        if let Err(err) = self.entries.insert(hash, StrEntry { ptr, len }) {
            // SAFETY: allocated from `self.allocator` above and not stored.
            unsafe { self.allocator.deallocate(ptr) };
            return Err(err.into());
        }

        tracing::trace!("Interned {:?} as {}", s, hash);
        Ok(())
    }

    /// The string interned under `hash`, if any.
    #[must_use]
    pub fn lookup(&self, hash: StrHash) -> Option<&str> {
        // SAFETY: entries live until `self` is dropped.
        self.entries.get(hash).map(|entry| unsafe { entry.as_str() })
    }

    /// The string interned under `hash`, or `""` if there is none.
    #[must_use]
    pub fn lookup_or_empty(&self, hash: StrHash) -> &str {
        self.lookup(hash).unwrap_or("")
    }

    /// Iterates over `(hash, string)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (StrHash, &str)> + '_ {
        // SAFETY: entries live until `self` is dropped.
        self.entries
            .iter()
            .map(|(hash, entry)| (hash, unsafe { entry.as_str() }))
    }
}

impl<A: RawAllocator + ?Sized> Drop for StrHashDatabase<'_, A> {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            // SAFETY: every entry was allocated from `self.allocator` and is
            // released exactly once here.
            unsafe { self.allocator.deallocate(entry.ptr) };
        }
    }
}

impl<A: RawAllocator + ?Sized> fmt::Debug for StrHashDatabase<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boke_core::{Arena, LinearAllocator};

    #[test]
    fn test_intern_and_lookup() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();
        let mut database = StrHashDatabase::new(&arena);

        let test_string = String::from("test string");
        let first = database.intern(&test_string).unwrap();
        let second = database.intern("test string").unwrap();
        let third = database.intern("test string 2").unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
        assert_eq!(database.len(), 2);
        assert_eq!(database.lookup(first), Some("test string"));
        assert_eq!(database.lookup(third), Some("test string 2"));
        assert_ne!(database.lookup(first).unwrap().as_ptr(), test_string.as_ptr());
    }

    #[test]
    fn test_reintern_allocates_nothing() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();
        let mut database = StrHashDatabase::new(&arena);

        database.intern("hello").unwrap();
        let report = arena.storage_report();
        database.intern("hello").unwrap();
        assert_eq!(arena.storage_report(), report);
    }

    #[test]
    fn test_collision_is_rejected() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();
        let mut database = StrHashDatabase::new(&arena);
        let hash = StrHash::new(7);

        database.insert(hash, "first").unwrap();
        database.insert(hash, "first").unwrap();
        let err = database.insert(hash, "second").unwrap_err();

        assert_eq!(
            err,
            StrHashError::Collision {
                hash,
                existing: "first".to_owned(),
                incoming: "second".to_owned(),
            }
        );
        assert_eq!(database.lookup(hash), Some("first"));
    }

    #[test]
    fn test_empty_string() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();
        let mut database = StrHashDatabase::new(&arena);

        let hash = database.intern("").unwrap();
        assert_eq!(database.lookup(hash), Some(""));
        assert_eq!(database.lookup_or_empty(StrHash::EMPTY), "");
        assert!(!database.contains(StrHash::EMPTY));
    }

    #[test]
    fn test_drop_returns_strings() {
        let mut buffer = vec![0u8; 16 * 1024];
        let arena = Arena::new(&mut buffer).unwrap();
        let before = arena.storage_report();
        {
            let mut database = StrHashDatabase::new(&arena);
            for word in ["alpha", "beta", "gamma", "delta", "epsilon"] {
                database.intern(word).unwrap();
            }
        }
        assert_eq!(arena.storage_report(), before);
    }

    #[test]
    fn test_out_of_space() {
        let mut buffer = vec![0u8; 32];
        let scratch = LinearAllocator::new(&mut buffer);
        let mut database = StrHashDatabase::new(&scratch);

        let long = "x".repeat(64);
        assert!(matches!(
            database.intern(&long),
            Err(StrHashError::Memory(MemoryError::OutOfSpace { .. }))
        ));
        assert!(database.is_empty());
    }
}
