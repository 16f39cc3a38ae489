//! # Range Allocator
//!
//! A two-level segregated-fit allocator over the integer offset space
//! `[0, size)`. It never touches the memory it manages: it hands out
//! `(offset, metadata)` pairs and takes them back in `free`.
//!
//! ## Size Classes
//!
//! ```text
//! size ──► small float (5-bit exponent, 3-bit mantissa) ──► bin 0..256
//!          bin = top(0..32) << 3 | leaf(0..8)
//! ```
//!
//! - Allocation rounds the request UP to a bin, then takes the first
//!   non-empty bin at or above it (two bitmask scans).
//! - Free regions are filed with their size rounded DOWN, so every region
//!   in a bin is at least as large as the bin's value.
//! - Freed regions coalesce with free address-order neighbours.
//!
//! The node table is not owned: it is carved from the head of the arena's
//! backing buffer by the caller.

use bytemuck::{Pod, Zeroable};

/// Index of a node in the range allocator's node table.
pub type NodeIndex = u32;

/// Sentinel for "no node" / "no space".
pub const NO_SPACE: u32 = u32::MAX;

const UNUSED: NodeIndex = u32::MAX;

const NUM_TOP_BINS: usize = 32;
const BINS_PER_LEAF: usize = 8;
const TOP_BINS_INDEX_SHIFT: u32 = 3;
const LEAF_BINS_INDEX_MASK: u32 = 0x7;
const NUM_LEAF_BINS: usize = NUM_TOP_BINS * BINS_PER_LEAF;

mod small_float {
    pub const MANTISSA_BITS: u32 = 3;
    pub const MANTISSA_VALUE: u32 = 1 << MANTISSA_BITS;
    pub const MANTISSA_MASK: u32 = MANTISSA_VALUE - 1;

    /// Bin whose value is the smallest one `>= size`.
    pub fn uint_to_float_round_up(size: u32) -> u32 {
        let mut exp = 0;
        let mut mantissa;

        if size < MANTISSA_VALUE {
            mantissa = size;
        } else {
            let highest_set_bit = 31 - size.leading_zeros();
            let mantissa_start_bit = highest_set_bit - MANTISSA_BITS;
            exp = mantissa_start_bit + 1;
            mantissa = (size >> mantissa_start_bit) & MANTISSA_MASK;

            let low_bits_mask = (1u32 << mantissa_start_bit) - 1;
            if size & low_bits_mask != 0 {
                mantissa += 1;
            }
        }

        // `+` lets a mantissa overflow carry into the exponent.
        (exp << MANTISSA_BITS) + mantissa
    }

    /// Bin whose value is the largest one `<= size`.
    pub fn uint_to_float_round_down(size: u32) -> u32 {
        let mut exp = 0;
        let mantissa;

        if size < MANTISSA_VALUE {
            mantissa = size;
        } else {
            let highest_set_bit = 31 - size.leading_zeros();
            let mantissa_start_bit = highest_set_bit - MANTISSA_BITS;
            exp = mantissa_start_bit + 1;
            mantissa = (size >> mantissa_start_bit) & MANTISSA_MASK;
        }

        (exp << MANTISSA_BITS) | mantissa
    }

    /// Value of a bin.
    pub fn float_to_uint(float_value: u32) -> u32 {
        let exponent = float_value >> MANTISSA_BITS;
        let mantissa = float_value & MANTISSA_MASK;
        if exponent == 0 {
            mantissa
        } else {
            (mantissa | MANTISSA_VALUE) << (exponent - 1)
        }
    }
}

/// Index of the lowest set bit at or above `start_bit_index`, or [`NO_SPACE`].
fn find_lowest_set_bit_after(bit_mask: u32, start_bit_index: u32) -> u32 {
    let mask_before_start_index = 1u32
        .checked_shl(start_bit_index)
        .map_or(u32::MAX, |bit| bit - 1);
    let bits_after = bit_mask & !mask_before_start_index;
    if bits_after == 0 {
        NO_SPACE
    } else {
        bits_after.trailing_zeros()
    }
}

/// One region of the offset space, free or used.
///
/// `Pod` so the node table can live inside the arena's byte buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Node {
    data_offset: u32,
    data_size: u32,
    bin_list_prev: NodeIndex,
    bin_list_next: NodeIndex,
    neighbor_prev: NodeIndex,
    neighbor_next: NodeIndex,
    used: u32,
}

impl Node {
    const fn free(data_offset: u32, data_size: u32, bin_list_next: NodeIndex) -> Self {
        Self {
            data_offset,
            data_size,
            bin_list_prev: UNUSED,
            bin_list_next,
            neighbor_prev: UNUSED,
            neighbor_next: UNUSED,
            used: 0,
        }
    }

    #[inline]
    const fn is_used(&self) -> bool {
        self.used != 0
    }
}

/// An allocation handed out by [`RangeAllocator::allocate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Start of the region in the offset space.
    pub offset: u32,
    /// Node owning the region. Must be handed back to `free` unchanged.
    pub metadata: NodeIndex,
}

/// Free-space summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageReport {
    /// Sum of all free regions in bytes.
    pub total_free_space: u32,
    /// Largest request guaranteed to succeed right now.
    pub largest_free_region: u32,
}

/// Segregated-fit allocator over `[0, size)`.
///
/// # Thread Safety
///
/// NOT thread-safe. The arena owning it is single-threaded.
pub struct RangeAllocator<'buf> {
    size: u32,
    max_allocations: u32,
    free_storage: u32,

    used_bins_top: u32,
    used_bins: [u8; NUM_TOP_BINS],
    bin_indices: [NodeIndex; NUM_LEAF_BINS],

    nodes: &'buf mut [Node],
    free_nodes: &'buf mut [NodeIndex],
    free_offset: u32,
}

impl<'buf> RangeAllocator<'buf> {
    /// Bytes of node storage needed for `max_allocations` nodes.
    #[must_use]
    pub const fn node_table_bytes(max_allocations: u32) -> usize {
        max_allocations as usize * std::mem::size_of::<Node>()
    }

    /// Bytes of free-node stack needed for `max_allocations` nodes.
    #[must_use]
    pub const fn free_list_bytes(max_allocations: u32) -> usize {
        max_allocations as usize * std::mem::size_of::<NodeIndex>()
    }

    /// Creates an allocator managing `[0, size)`, with the whole range free.
    ///
    /// `nodes` and `free_nodes` must have the same length (at least 2); that
    /// length is the maximum number of simultaneously tracked regions.
    #[must_use]
    pub fn new(size: u32, nodes: &'buf mut [Node], free_nodes: &'buf mut [NodeIndex]) -> Self {
        debug_assert_eq!(nodes.len(), free_nodes.len(), "node table size mismatch");
        debug_assert!(nodes.len() >= 2, "range allocator needs at least two nodes");

        let mut allocator = Self {
            size,
            max_allocations: nodes.len() as u32,
            free_storage: 0,
            used_bins_top: 0,
            used_bins: [0; NUM_TOP_BINS],
            bin_indices: [UNUSED; NUM_LEAF_BINS],
            nodes,
            free_nodes,
            free_offset: 0,
        };
        allocator.reset();
        allocator
    }

    /// Forgets every allocation; the whole range becomes one free region.
    pub fn reset(&mut self) {
        self.free_storage = 0;
        self.used_bins_top = 0;
        self.free_offset = self.max_allocations - 1;
        self.used_bins = [0; NUM_TOP_BINS];
        self.bin_indices = [UNUSED; NUM_LEAF_BINS];

        // Freelist is a stack; nodes in inverse order so node 0 pops first.
        let max = self.max_allocations;
        for (i, slot) in self.free_nodes.iter_mut().enumerate() {
            *slot = max - i as u32 - 1;
        }

        if self.size > 0 {
            self.insert_node_into_bin(self.size, 0);
        }
    }

    /// Number of entries in the node table.
    #[inline]
    #[must_use]
    pub const fn max_allocations(&self) -> u32 {
        self.max_allocations
    }

    /// Allocates `size` units, or returns `None` when no region or node is free.
    pub fn allocate(&mut self, size: u32) -> Option<Allocation> {
        // Keep one node in reserve for the split remainder.
        if self.free_offset == 0 {
            return None;
        }

        let min_bin_index = small_float::uint_to_float_round_up(size);
        let min_top_bin_index = min_bin_index >> TOP_BINS_INDEX_SHIFT;
        let min_leaf_bin_index = min_bin_index & LEAF_BINS_INDEX_MASK;

        let mut top_bin_index = min_top_bin_index;
        let mut leaf_bin_index = NO_SPACE;

        if top_bin_index < NUM_TOP_BINS as u32 && self.used_bins_top & (1 << top_bin_index) != 0 {
            leaf_bin_index = find_lowest_set_bit_after(
                u32::from(self.used_bins[top_bin_index as usize]),
                min_leaf_bin_index,
            );
        }

        if leaf_bin_index == NO_SPACE {
            top_bin_index = find_lowest_set_bit_after(self.used_bins_top, min_top_bin_index + 1);
            if top_bin_index == NO_SPACE {
                return None;
            }
            // Any leaf of a larger top bin fits.
            leaf_bin_index = self.used_bins[top_bin_index as usize].trailing_zeros();
        }

        let bin_index = ((top_bin_index << TOP_BINS_INDEX_SHIFT) | leaf_bin_index) as usize;

        let node_index = self.bin_indices[bin_index];
        let node = &mut self.nodes[node_index as usize];
        let node_total_size = node.data_size;
        node.data_size = size;
        node.used = 1;
        let data_offset = node.data_offset;
        let bin_list_next = node.bin_list_next;

        self.bin_indices[bin_index] = bin_list_next;
        if bin_list_next != UNUSED {
            self.nodes[bin_list_next as usize].bin_list_prev = UNUSED;
        }
        self.free_storage -= node_total_size;

        if self.bin_indices[bin_index] == UNUSED {
            self.clear_bin_bits(top_bin_index, leaf_bin_index);
        }

        let remainder_size = node_total_size - size;
        if remainder_size > 0 {
            let new_node_index = self.insert_node_into_bin(remainder_size, data_offset + size);

            let neighbor_next = self.nodes[node_index as usize].neighbor_next;
            if neighbor_next != UNUSED {
                self.nodes[neighbor_next as usize].neighbor_prev = new_node_index;
            }
            self.nodes[new_node_index as usize].neighbor_prev = node_index;
            self.nodes[new_node_index as usize].neighbor_next = neighbor_next;
            self.nodes[node_index as usize].neighbor_next = new_node_index;
        }

        Some(Allocation {
            offset: data_offset,
            metadata: node_index,
        })
    }

    /// Returns an allocation to the free space, merging with free neighbours.
    pub fn free(&mut self, allocation: Allocation) {
        let node_index = allocation.metadata;
        debug_assert!(
            node_index < self.max_allocations,
            "node index {node_index} out of range (max {})",
            self.max_allocations
        );

        let node = self.nodes[node_index as usize];
        debug_assert!(node.is_used(), "double free of node {node_index}");
        debug_assert_eq!(
            node.data_offset, allocation.offset,
            "allocation offset does not match its node"
        );

        let mut offset = node.data_offset;
        let mut size = node.data_size;
        let mut neighbor_prev = node.neighbor_prev;
        let mut neighbor_next = node.neighbor_next;

        if neighbor_prev != UNUSED && !self.nodes[neighbor_prev as usize].is_used() {
            let prev_node = self.nodes[neighbor_prev as usize];
            offset = prev_node.data_offset;
            size += prev_node.data_size;

            self.remove_node_from_bin(neighbor_prev);
            debug_assert_eq!(prev_node.neighbor_next, node_index);
            neighbor_prev = prev_node.neighbor_prev;
        }

        if neighbor_next != UNUSED && !self.nodes[neighbor_next as usize].is_used() {
            let next_node = self.nodes[neighbor_next as usize];
            size += next_node.data_size;

            self.remove_node_from_bin(neighbor_next);
            debug_assert_eq!(next_node.neighbor_prev, node_index);
            neighbor_next = next_node.neighbor_next;
        }

        self.nodes[node_index as usize].used = 0;
        self.push_free_node(node_index);

        let combined_node_index = self.insert_node_into_bin(size, offset);

        if neighbor_next != UNUSED {
            self.nodes[combined_node_index as usize].neighbor_next = neighbor_next;
            self.nodes[neighbor_next as usize].neighbor_prev = combined_node_index;
        }
        if neighbor_prev != UNUSED {
            self.nodes[combined_node_index as usize].neighbor_prev = neighbor_prev;
            self.nodes[neighbor_prev as usize].neighbor_next = combined_node_index;
        }
    }

    /// Size recorded for a live allocation.
    #[must_use]
    pub fn allocation_size(&self, allocation: Allocation) -> u32 {
        self.nodes
            .get(allocation.metadata as usize)
            .filter(|node| node.is_used())
            .map_or(0, |node| node.data_size)
    }

    /// Returns `true` if `node_index` names a live allocation starting at `offset`.
    #[must_use]
    pub fn is_live(&self, allocation: Allocation) -> bool {
        self.nodes
            .get(allocation.metadata as usize)
            .is_some_and(|node| node.is_used() && node.data_offset == allocation.offset)
    }

    /// Summarizes the free space.
    #[must_use]
    pub fn storage_report(&self) -> StorageReport {
        if self.free_offset == 0 {
            return StorageReport::default();
        }

        let mut largest_free_region = 0;
        if self.used_bins_top != 0 {
            let top_bin_index = 31 - self.used_bins_top.leading_zeros();
            let leaf_bin_index = 7 - self.used_bins[top_bin_index as usize].leading_zeros();
            largest_free_region = small_float::float_to_uint(
                (top_bin_index << TOP_BINS_INDEX_SHIFT) | leaf_bin_index,
            );
        }

        StorageReport {
            total_free_space: self.free_storage,
            largest_free_region,
        }
    }

    fn insert_node_into_bin(&mut self, size: u32, data_offset: u32) -> NodeIndex {
        let bin_index = small_float::uint_to_float_round_down(size);
        let top_bin_index = bin_index >> TOP_BINS_INDEX_SHIFT;
        let leaf_bin_index = bin_index & LEAF_BINS_INDEX_MASK;

        if self.bin_indices[bin_index as usize] == UNUSED {
            self.used_bins[top_bin_index as usize] |= 1 << leaf_bin_index;
            self.used_bins_top |= 1 << top_bin_index;
        }

        let top_node_index = self.bin_indices[bin_index as usize];
        let node_index = self.pop_free_node();

        self.nodes[node_index as usize] = Node::free(data_offset, size, top_node_index);
        if top_node_index != UNUSED {
            self.nodes[top_node_index as usize].bin_list_prev = node_index;
        }
        self.bin_indices[bin_index as usize] = node_index;

        self.free_storage += size;
        node_index
    }

    fn remove_node_from_bin(&mut self, node_index: NodeIndex) {
        let node = self.nodes[node_index as usize];

        if node.bin_list_prev != UNUSED {
            // Middle of the list: unlink only.
            self.nodes[node.bin_list_prev as usize].bin_list_next = node.bin_list_next;
            if node.bin_list_next != UNUSED {
                self.nodes[node.bin_list_next as usize].bin_list_prev = node.bin_list_prev;
            }
        } else {
            // Head of the list: the bin itself points here.
            let bin_index = small_float::uint_to_float_round_down(node.data_size);
            let top_bin_index = bin_index >> TOP_BINS_INDEX_SHIFT;
            let leaf_bin_index = bin_index & LEAF_BINS_INDEX_MASK;

            self.bin_indices[bin_index as usize] = node.bin_list_next;
            if node.bin_list_next != UNUSED {
                self.nodes[node.bin_list_next as usize].bin_list_prev = UNUSED;
            }

            if self.bin_indices[bin_index as usize] == UNUSED {
                self.clear_bin_bits(top_bin_index, leaf_bin_index);
            }
        }

        self.push_free_node(node_index);
        self.free_storage -= node.data_size;
    }

    fn clear_bin_bits(&mut self, top_bin_index: u32, leaf_bin_index: u32) {
        self.used_bins[top_bin_index as usize] &= !(1 << leaf_bin_index);
        if self.used_bins[top_bin_index as usize] == 0 {
            self.used_bins_top &= !(1 << top_bin_index);
        }
    }

    #[inline]
    fn pop_free_node(&mut self) -> NodeIndex {
        let node_index = self.free_nodes[self.free_offset as usize];
        // May wrap past zero: the next push brings it back to slot 0.
        self.free_offset = self.free_offset.wrapping_sub(1);
        node_index
    }

    #[inline]
    fn push_free_node(&mut self, node_index: NodeIndex) {
        self.free_offset = self.free_offset.wrapping_add(1);
        self.free_nodes[self.free_offset as usize] = node_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(count: usize) -> (Vec<Node>, Vec<NodeIndex>) {
        (vec![Node::zeroed(); count], vec![0; count])
    }

    #[test]
    fn test_small_float_round_trip() {
        for value in 0..8 {
            assert_eq!(small_float::uint_to_float_round_up(value), value);
            assert_eq!(small_float::uint_to_float_round_down(value), value);
        }

        // Exactly representable values map to the same bin either way.
        for bin in 0..240 {
            let value = small_float::float_to_uint(bin);
            assert_eq!(small_float::uint_to_float_round_up(value), bin);
            assert_eq!(small_float::uint_to_float_round_down(value), bin);
        }

        for value in [9u32, 17, 100, 1000, 65_537, 1 << 20] {
            let up = small_float::float_to_uint(small_float::uint_to_float_round_up(value));
            let down = small_float::float_to_uint(small_float::uint_to_float_round_down(value));
            assert!(down <= value && value <= up, "{down} <= {value} <= {up}");
        }
    }

    #[test]
    fn test_find_lowest_set_bit_after() {
        assert_eq!(find_lowest_set_bit_after(0b1010, 0), 1);
        assert_eq!(find_lowest_set_bit_after(0b1010, 2), 3);
        assert_eq!(find_lowest_set_bit_after(0b1010, 4), NO_SPACE);
        assert_eq!(find_lowest_set_bit_after(u32::MAX, 32), NO_SPACE);
    }

    #[test]
    fn test_basic_allocate_free() {
        let (mut nodes, mut free_nodes) = tables(16);
        let mut allocator = RangeAllocator::new(1024 * 1024, &mut nodes, &mut free_nodes);

        let a = allocator.allocate(1337).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(allocator.allocation_size(a), 1337);
        allocator.free(a);

        let report = allocator.storage_report();
        assert_eq!(report.total_free_space, 1024 * 1024);
        assert_eq!(report.largest_free_region, 1024 * 1024);
    }

    #[test]
    fn test_sequential_offsets_and_merge() {
        let (mut nodes, mut free_nodes) = tables(16);
        let mut allocator = RangeAllocator::new(1024 * 1024, &mut nodes, &mut free_nodes);

        let a = allocator.allocate(0).unwrap();
        assert_eq!(a.offset, 0);
        let b = allocator.allocate(1).unwrap();
        assert_eq!(b.offset, 0);
        let c = allocator.allocate(123).unwrap();
        assert_eq!(c.offset, 1);
        let d = allocator.allocate(1234).unwrap();
        assert_eq!(d.offset, 124);

        allocator.free(a);
        allocator.free(b);
        allocator.free(c);
        allocator.free(d);

        // Everything merged back into one region.
        let whole = allocator.allocate(1024 * 1024).unwrap();
        assert_eq!(whole.offset, 0);
        allocator.free(whole);
    }

    #[test]
    fn test_reuse_freed_region() {
        let (mut nodes, mut free_nodes) = tables(16);
        let mut allocator = RangeAllocator::new(1024, &mut nodes, &mut free_nodes);

        let a = allocator.allocate(256).unwrap();
        let b = allocator.allocate(256).unwrap();
        assert_eq!(b.offset, 256);

        allocator.free(a);
        let c = allocator.allocate(256).unwrap();
        assert_eq!(c.offset, 0);

        allocator.free(b);
        allocator.free(c);
        assert_eq!(allocator.storage_report().total_free_space, 1024);
    }

    #[test]
    fn test_out_of_space() {
        let (mut nodes, mut free_nodes) = tables(16);
        let mut allocator = RangeAllocator::new(512, &mut nodes, &mut free_nodes);

        let a = allocator.allocate(512).unwrap();
        assert!(allocator.allocate(1).is_none());
        allocator.free(a);
        assert!(allocator.allocate(513).is_none());
        assert!(allocator.allocate(512).is_some());
    }

    #[test]
    fn test_out_of_nodes() {
        let (mut nodes, mut free_nodes) = tables(4);
        let mut allocator = RangeAllocator::new(1024, &mut nodes, &mut free_nodes);

        let mut live = Vec::new();
        while let Some(allocation) = allocator.allocate(8) {
            live.push(allocation);
        }
        // Node table exhausted long before the bytes are.
        assert_eq!(live.len(), 2);
        assert_eq!(allocator.storage_report(), StorageReport::default());

        for allocation in live {
            allocator.free(allocation);
        }
        assert!(allocator.allocate(1024).is_some());
    }

    #[test]
    fn test_is_live() {
        let (mut nodes, mut free_nodes) = tables(8);
        let mut allocator = RangeAllocator::new(256, &mut nodes, &mut free_nodes);

        let a = allocator.allocate(32).unwrap();
        assert!(allocator.is_live(a));
        allocator.free(a);
        assert!(!allocator.is_live(a));
    }
}
