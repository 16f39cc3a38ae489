//! # String-Hash Map
//!
//! Open-addressing hash map keyed by precomputed 64-bit string hashes.
//!
//! ## Layout
//!
//! ```text
//! slot:      0     1     2     3     4     5     6
//! occupied: [ ]   [x]   [x]   [x]   [x]   [ ]   [ ]
//! keys:      -     1     2     3     9     -     -
//! values:    -     a     b     c     d     -     -
//! ```
//!
//! - The home slot of a key is `key % capacity`; collisions probe forward
//!   linearly, wrapping at `capacity`
//! - `capacity` is always prime once a table exists; an unallocated map
//!   has capacity 0
//! - The table is rebuilt at the next prime `>= capacity + 2` once
//!   `len / capacity` reaches 0.65
//! - Erase repairs the probe chain with backward shifting; there are no
//!   tombstones

// SAFETY: This module reads `values` slots that are marked occupied.
// A slot's value is written before `occupied` is set and is never read after
// it is cleared.
#![allow(unsafe_code)]

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::raw::{RawBuffer, ZeroedBuffer};
use crate::error::{MemoryError, MemoryResult};
use crate::math::{exceeds_load_factor, next_prime};
use crate::memory::RawAllocator;

/// A precomputed 64-bit string hash, used as a map key.
///
/// The hash function itself lives with the string interning service; this
/// crate only stores and compares the values.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct StrHash(u64);

impl StrHash {
    /// The zero hash, used as a "no string" sentinel.
    pub const EMPTY: Self = Self(0);

    /// Wraps a raw hash value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw hash value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for StrHash {
    #[inline]
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StrHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Returns `true` if the entry at `scanned`, whose home slot is `home`, may
/// move back into the vacated slot `vacated`.
///
/// The entry must stay put when `home` lies in the cyclic interval
/// `(vacated, scanned]`, because moving it before its home would make it
/// unreachable by probing.
///
/// ```rust
/// use boke_core::must_shift_back;
///
/// // Entry displaced from slot 2 into slot 4; slot 2 was just vacated.
/// assert!(must_shift_back(2, 2, 4));
/// // Entry sitting in its own home slot.
/// assert!(!must_shift_back(3, 2, 3));
/// // Wrapped scan: vacated 5, scanned 1 in a table of 7.
/// assert!(!must_shift_back(0, 5, 1));
/// assert!(must_shift_back(4, 5, 1));
/// ```
#[inline]
#[must_use]
pub const fn must_shift_back(home: u32, vacated: u32, scanned: u32) -> bool {
    if vacated <= scanned {
        !(vacated < home && home <= scanned)
    } else {
        home <= vacated && home > scanned
    }
}

/// The three parallel slot arrays of one table generation.
struct Slots<V> {
    occupied: ZeroedBuffer<bool>,
    keys: ZeroedBuffer<StrHash>,
    values: RawBuffer<V>,
}

impl<V: Copy> Slots<V> {
    const fn empty() -> Self {
        Self {
            occupied: ZeroedBuffer::empty(),
            keys: ZeroedBuffer::empty(),
            values: RawBuffer::empty(),
        }
    }

    /// Allocates all three arrays, or none of them.
    fn allocate<A: RawAllocator + ?Sized>(allocator: &A, capacity: u32) -> MemoryResult<Self> {
        let mut occupied = ZeroedBuffer::allocate(allocator, capacity)?;
        let mut keys = match ZeroedBuffer::allocate(allocator, capacity) {
            Ok(keys) => keys,
            Err(err) => {
                // SAFETY: allocated from `allocator` just above.
                unsafe { occupied.release(allocator) };
                return Err(err);
            }
        };
        match RawBuffer::allocate(allocator, capacity) {
            Ok(values) => Ok(Self {
                occupied,
                keys,
                values,
            }),
            Err(err) => {
                // SAFETY: allocated from `allocator` just above.
                unsafe {
                    keys.release(allocator);
                    occupied.release(allocator);
                }
                Err(err)
            }
        }
    }

    /// # Safety
    ///
    /// `allocator` must be the allocator these slots came from.
    unsafe fn release<A: RawAllocator + ?Sized>(&mut self, allocator: &A) {
        self.values.release(allocator);
        self.keys.release(allocator);
        self.occupied.release(allocator);
    }

    #[inline]
    const fn capacity(&self) -> u32 {
        self.values.capacity()
    }

    #[inline]
    fn home(&self, key: StrHash) -> u32 {
        (key.raw() % u64::from(self.capacity())) as u32
    }

    #[inline]
    fn next(&self, slot: u32) -> u32 {
        if slot + 1 == self.capacity() {
            0
        } else {
            slot + 1
        }
    }

    #[inline]
    fn is_occupied(&self, slot: u32) -> bool {
        self.occupied.as_slice()[slot as usize]
    }

    #[inline]
    fn key(&self, slot: u32) -> StrHash {
        self.keys.as_slice()[slot as usize]
    }

    #[inline]
    fn value(&self, slot: u32) -> &V {
        debug_assert!(self.is_occupied(slot));
        // SAFETY: occupied slots hold an initialized value.
        unsafe { self.values.slots()[slot as usize].assume_init_ref() }
    }

    #[inline]
    fn value_mut(&mut self, slot: u32) -> &mut V {
        debug_assert!(self.is_occupied(slot));
        // SAFETY: occupied slots hold an initialized value.
        unsafe { self.values.slots_mut()[slot as usize].assume_init_mut() }
    }

    /// Slot holding `key`, probing from its home until an empty slot.
    fn find(&self, key: StrHash) -> Option<u32> {
        if self.capacity() == 0 {
            return None;
        }

        let mut slot = self.home(key);
        for _ in 0..self.capacity() {
            if !self.is_occupied(slot) {
                return None;
            }
            if self.key(slot) == key {
                return Some(slot);
            }
            slot = self.next(slot);
        }
        None
    }

    /// Places an absent key in the first empty slot of its probe chain.
    ///
    /// The table must have at least one empty slot.
    fn place(&mut self, key: StrHash, value: V) -> u32 {
        let mut slot = self.home(key);
        while self.is_occupied(slot) {
            slot = self.next(slot);
        }
        self.write(slot, key, value);
        slot
    }

    #[inline]
    fn write(&mut self, slot: u32, key: StrHash, value: V) {
        self.values.slots_mut()[slot as usize].write(value);
        self.keys.as_mut_slice()[slot as usize] = key;
        self.occupied.as_mut_slice()[slot as usize] = true;
    }

    /// Vacates `slot` and closes the gap it leaves in any probe chain.
    fn remove(&mut self, slot: u32) {
        let mut vacated = slot;
        let mut scanned = self.next(vacated);

        while self.is_occupied(scanned) {
            let home = self.home(self.key(scanned));
            if must_shift_back(home, vacated, scanned) {
                let (key, value) = (self.key(scanned), *self.value(scanned));
                self.write(vacated, key, value);
                vacated = scanned;
            }
            scanned = self.next(scanned);
        }

        self.occupied.as_mut_slice()[vacated as usize] = false;
    }
}

/// An open-addressing map from [`StrHash`] to `V`, allocated from `A`.
///
/// # Example
///
/// ```rust
/// use boke_core::{Arena, StrHash, StrHashMap};
///
/// let mut buffer = vec![0u8; 16 * 1024];
/// let arena = Arena::new(&mut buffer).unwrap();
///
/// let mut map = StrHashMap::with_capacity(&arena, 7).unwrap();
/// map.insert(StrHash::new(1), "one").unwrap();
/// map.insert(StrHash::new(8), "eight").unwrap();
///
/// assert_eq!(map.get(StrHash::new(8)), Some(&"eight"));
/// assert_eq!(map.erase(StrHash::new(1)), Some("one"));
/// assert!(!map.contains(StrHash::new(1)));
/// ```
pub struct StrHashMap<'a, V: Copy, A: RawAllocator + ?Sized> {
    /// Allocator every table generation comes from.
    allocator: &'a A,
    /// Current table.
    slots: Slots<V>,
    /// Number of occupied slots.
    len: u32,
}

impl<'a, V: Copy, A: RawAllocator + ?Sized> StrHashMap<'a, V, A> {
    /// Creates an empty map with capacity 0. The first insert allocates.
    #[must_use]
    pub const fn new(allocator: &'a A) -> Self {
        Self {
            allocator,
            slots: Slots::empty(),
            len: 0,
        }
    }

    /// Creates an empty map whose capacity is the first prime `>= capacity`.
    ///
    /// A `capacity` of 0 allocates nothing and leaves the capacity at 0.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if the table cannot be allocated.
    pub fn with_capacity(allocator: &'a A, capacity: u32) -> MemoryResult<Self> {
        let mut map = Self::new(allocator);
        map.reserve(capacity)?;
        Ok(map)
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if the map holds no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the current table.
    ///
    /// Always prime, with one exception: a map that has no table yet
    /// ([`StrHashMap::new`], `with_capacity(_, 0)`, or after
    /// [`StrHashMap::release_allocated_buffer`]) reports 0.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    /// The allocator backing this map.
    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &'a A {
        self.allocator
    }

    /// Rebuilds the table at the first prime `>= capacity`.
    ///
    /// No-op if the current capacity is already at least `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CapacityOverflow`] if no such prime fits in
    /// `u32`, or the allocator's error. The map is unchanged on error.
    pub fn reserve(&mut self, capacity: u32) -> MemoryResult<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        let prime = next_prime(capacity).ok_or(MemoryError::CapacityOverflow(u64::from(capacity)))?;
        self.rebuild(prime)
    }

    fn rebuild(&mut self, capacity: u32) -> MemoryResult<()> {
        debug_assert!(capacity > self.len);

        let mut fresh = Slots::allocate(self.allocator, capacity)?;
        for slot in 0..self.slots.capacity() {
            if self.slots.is_occupied(slot) {
                fresh.place(self.slots.key(slot), *self.slots.value(slot));
            }
        }

        tracing::debug!(
            from = self.capacity(),
            to = capacity,
            len = self.len,
            "Rebuilt string-hash map"
        );

        // SAFETY: the old slots came from `self.allocator`.
        unsafe { self.slots.release(self.allocator) };
        self.slots = fresh;
        Ok(())
    }

    /// Inserts `value` under `key`, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if a needed rebuild fails; the map is
    /// unchanged in that case.
    pub fn insert(&mut self, key: StrHash, value: V) -> MemoryResult<()> {
        self.insert_slot(key, value).map(|_| ())
    }

    fn insert_slot(&mut self, key: StrHash, value: V) -> MemoryResult<u32> {
        if let Some(slot) = self.slots.find(key) {
            *self.slots.value_mut(slot) = value;
            return Ok(slot);
        }

        let len = self.len + 1;
        if exceeds_load_factor(len, self.capacity()) {
            let grown = self
                .capacity()
                .checked_add(2)
                .and_then(next_prime)
                .ok_or(MemoryError::CapacityOverflow(u64::from(self.capacity()) + 2))?;
            self.rebuild(grown)?;
        }

        let slot = self.slots.place(key, value);
        self.len = len;
        Ok(slot)
    }

    /// Removes `key`, returning its value. No-op if absent.
    pub fn erase(&mut self, key: StrHash) -> Option<V> {
        let slot = self.slots.find(key)?;
        let value = *self.slots.value(slot);
        self.slots.remove(slot);
        self.len -= 1;
        Some(value)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: StrHash) -> bool {
        self.slots.find(key).is_some()
    }

    /// The value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: StrHash) -> Option<&V> {
        self.slots.find(key).map(|slot| self.slots.value(slot))
    }

    /// Mutable access to the value stored under `key`, if any.
    pub fn get_mut(&mut self, key: StrHash) -> Option<&mut V> {
        let slot = self.slots.find(key)?;
        Some(self.slots.value_mut(slot))
    }

    /// Mutable access to the value under `key`, inserting `V::default()`
    /// first if the key is absent.
    ///
    /// Use [`StrHashMap::get`] for a lookup that never inserts.
    ///
    /// # Errors
    ///
    /// Returns the allocator's error if inserting requires a rebuild that
    /// fails.
    pub fn get_or_insert_default(&mut self, key: StrHash) -> MemoryResult<&mut V>
    where
        V: Default,
    {
        let slot = match self.slots.find(key) {
            Some(slot) => slot,
            None => self.insert_slot(key, V::default())?,
        };
        Ok(self.slots.value_mut(slot))
    }

    /// Removes every entry. Keeps the table.
    pub fn clear(&mut self) {
        self.slots.occupied.as_mut_slice().fill(false);
        self.len = 0;
    }

    /// Frees the table and returns to the empty, zero-capacity state.
    pub fn release_allocated_buffer(&mut self) {
        // SAFETY: the slots came from `self.allocator`.
        unsafe { self.slots.release(self.allocator) };
        self.len = 0;
    }

    /// Moves the contents out, leaving `self` empty (with no table).
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            allocator: self.allocator,
            slots: std::mem::replace(&mut self.slots, Slots::empty()),
            len: std::mem::replace(&mut self.len, 0),
        }
    }

    /// Iterates over `(key, &value)` pairs in slot order.
    ///
    /// The order changes across rebuilds and erases.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            slots: &self.slots,
            next: 0,
            remaining: self.len,
        }
    }

    /// Iterates over the keys in slot order.
    pub fn keys(&self) -> impl Iterator<Item = StrHash> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Iterates over the values in slot order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Checks that every entry is reachable from its home slot through
    /// occupied slots only.
    #[doc(hidden)]
    #[must_use]
    pub fn probe_chains_intact(&self) -> bool {
        let slots = &self.slots;
        let mut counted = 0;
        for slot in 0..slots.capacity() {
            if !slots.is_occupied(slot) {
                continue;
            }
            counted += 1;
            let mut walk = slots.home(slots.key(slot));
            while walk != slot {
                if !slots.is_occupied(walk) {
                    return false;
                }
                walk = slots.next(walk);
            }
        }
        counted == self.len
    }
}

impl<V: Copy, A: RawAllocator + ?Sized> Drop for StrHashMap<'_, V, A> {
    fn drop(&mut self) {
        self.release_allocated_buffer();
    }
}

impl<'s, V: Copy, A: RawAllocator + ?Sized> IntoIterator for &'s StrHashMap<'_, V, A> {
    type Item = (StrHash, &'s V);
    type IntoIter = Iter<'s, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<V: Copy + fmt::Debug, A: RawAllocator + ?Sized> fmt::Debug for StrHashMap<'_, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over the occupied slots of a [`StrHashMap`].
pub struct Iter<'s, V> {
    slots: &'s Slots<V>,
    next: u32,
    remaining: u32,
}

impl<'s, V: Copy> Iterator for Iter<'s, V> {
    type Item = (StrHash, &'s V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.slots.capacity() {
            let slot = self.next;
            self.next += 1;
            if self.slots.is_occupied(slot) {
                self.remaining -= 1;
                return Some((self.slots.key(slot), self.slots.value(slot)));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl<V: Copy> ExactSizeIterator for Iter<'_, V> {}
