// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! On-disk B-tree node format (C4).
//!
//! A node is either a LEAF or an INTERNAL node. Both are serialised
//! into the same fixed-size slot so that every node fits in one
//! allocator chunk regardless of its type — the entries region always
//! reserves `capacity` slots and the children region always reserves
//! `capacity + 1` addresses, even on a leaf, which simply never reads
//! or writes its children region.
//!
//! ## Layout
//! ```text
//! NodeHeader (7 B) := magic "BTN" (3) | version (1) | node_type (1) | num_entries u16 (2)
//! Entries region (capacity * entry_slot_size bytes):
//!   entry_slot := key_len u32 (4) | key bytes (max_key_size, zero-padded)
//!               | val_len u32 (4) | val bytes (max_value_size, zero-padded)
//! Children region (capacity + 1) * 8 bytes, present in the layout for
//! every node but only meaningful for INTERNAL nodes.
//! ```

use crate::codec;
use crate::config::TreeConfig;
use crate::error::TreeResult;
use crate::memory::{write_at, Memory};

const NODE_MAGIC: &[u8; 3] = b"BTN";
const NODE_VERSION: u8 = 1;
pub(crate) const NODE_HEADER_SIZE: u64 = 7;

/// Tagged node-type discriminant; the on-disk `node_type` byte is this
/// tag, not two unrelated record types (design notes §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

impl NodeType {
    fn tag(self) -> u8 {
        match self {
            NodeType::Leaf => 0,
            NodeType::Internal => 1,
        }
    }

    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => NodeType::Leaf,
            1 => NodeType::Internal,
            other => panic!("unknown node_type tag {}", other),
        }
    }
}

/// A `(key, value)` pair stored in a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

/// Result of searching a node for a key: either it is present at a
/// slot, or it is absent and the returned index is where it would be
/// inserted (for a leaf) or which child to descend into (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

/// One in-memory, fully-deserialised B-tree node.
///
/// Node values do not own their children by value — children are
/// referenced by 64-bit chunk address, with the allocator owning the
/// storage (design notes §9: "maps cleanly to an index/arena pattern").
#[derive(Debug, Clone)]
pub struct Node {
    addr: u64,
    node_type: NodeType,
    entries: Vec<Entry>,
    children: Vec<u64>,
}

/// Per-tree byte-layout constants derived from [`TreeConfig`].
///
/// Computed once and threaded through every node operation rather than
/// stored per-node, since it is identical for every node in a tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeLayout {
    pub capacity: usize,
    pub max_key_size: u32,
    pub max_value_size: u32,
    pub entry_slot_size: u64,
    pub allocation_size: u64,
}

impl NodeLayout {
    pub(crate) fn for_config(config: &TreeConfig) -> Self {
        Self::new(config.capacity() as usize, config.max_key_size(), config.max_value_size())
    }

    /// Reconstruct the layout from a persisted allocator `allocation_size`
    /// and the tree's max key/value sizes, without needing `B` to have
    /// been persisted anywhere (the on-disk `BTreeHeader` does not carry
    /// it — see DESIGN.md for why solving this algebraically is safe).
    pub(crate) fn from_allocation_size(
        allocation_size: u64,
        max_key_size: u32,
        max_value_size: u32,
    ) -> Self {
        let entry_slot_size = 8 + max_key_size as u64 + max_value_size as u64;
        // allocation_size = 7 + capacity*entry_slot_size + (capacity+1)*8
        let numerator = allocation_size - NODE_HEADER_SIZE - 8;
        let denominator = entry_slot_size + 8;
        assert_eq!(
            numerator % denominator,
            0,
            "allocation_size {} is not consistent with key/value maxima",
            allocation_size
        );
        let capacity = (numerator / denominator) as usize;
        Self::new(capacity, max_key_size, max_value_size)
    }

    fn new(capacity: usize, max_key_size: u32, max_value_size: u32) -> Self {
        let entry_slot_size = 8 + max_key_size as u64 + max_value_size as u64;
        let entries_region = capacity as u64 * entry_slot_size;
        let children_region = (capacity as u64 + 1) * 8;
        let allocation_size = NODE_HEADER_SIZE + entries_region + children_region;
        Self {
            capacity,
            max_key_size,
            max_value_size,
            entry_slot_size,
            allocation_size,
        }
    }

    fn entries_region_size(&self) -> u64 {
        self.capacity as u64 * self.entry_slot_size
    }

    fn children_offset(&self) -> u64 {
        NODE_HEADER_SIZE + self.entries_region_size()
    }
}

impl Node {
    pub fn new_leaf(addr: u64) -> Self {
        Self {
            addr,
            node_type: NodeType::Leaf,
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn new_internal(addr: u64, children: Vec<u64>) -> Self {
        Self {
            addr,
            node_type: NodeType::Internal,
            entries: Vec::new(),
            children,
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn is_leaf(&self) -> bool {
        self.node_type == NodeType::Leaf
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.entries
    }

    pub fn children(&self) -> &[u64] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<u64> {
        &mut self.children
    }

    pub fn is_full(&self, layout: &NodeLayout) -> bool {
        self.entries.len() >= layout.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binary search this node's entries for `key`.
    pub fn find_key_index(&self, key: &[u8]) -> SearchResult {
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match codec::compare(&self.entries[mid].key, key) {
                std::cmp::Ordering::Equal => return SearchResult::Found(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        SearchResult::NotFound(lo)
    }

    /// The maximum entry reachable from this node: itself if a leaf,
    /// otherwise the rightmost descendant leaf's last entry.
    pub fn get_max<M: Memory>(&self, memory: &M, layout: &NodeLayout) -> Entry {
        if self.is_leaf() {
            self.entries
                .last()
                .cloned()
                .expect("get_max on an empty leaf")
        } else {
            let last_child = *self.children.last().expect("internal node has no children");
            let child = Node::load(memory, last_child, layout);
            child.get_max(memory, layout)
        }
    }

    /// The minimum entry reachable from this node: itself if a leaf,
    /// otherwise the leftmost descendant leaf's first entry.
    pub fn get_min<M: Memory>(&self, memory: &M, layout: &NodeLayout) -> Entry {
        if self.is_leaf() {
            self.entries
                .first()
                .cloned()
                .expect("get_min on an empty leaf")
        } else {
            let first_child = *self.children.first().expect("internal node has no children");
            let child = Node::load(memory, first_child, layout);
            child.get_min(memory, layout)
        }
    }

    /// Serialise and write this node to its chunk.
    ///
    /// # Panics
    /// Panics (fatal, design §7) if entries are not strictly
    /// increasing, if a leaf carries children, if an internal node's
    /// child count is not `entries + 1`, or if the node is
    /// simultaneously entry-empty and child-empty.
    pub fn save<M: Memory>(&self, memory: &M, layout: &NodeLayout) -> TreeResult<()> {
        for pair in self.entries.windows(2) {
            assert_eq!(
                codec::compare(&pair[0].key, &pair[1].key),
                std::cmp::Ordering::Less,
                "node at {} has non-increasing keys",
                self.addr
            );
        }
        match self.node_type {
            NodeType::Leaf => assert!(
                self.children.is_empty(),
                "leaf node at {} carries children",
                self.addr
            ),
            NodeType::Internal => assert_eq!(
                self.children.len(),
                self.entries.len() + 1,
                "internal node at {} has {} entries but {} children",
                self.addr,
                self.entries.len(),
                self.children.len()
            ),
        }
        assert!(
            !(self.entries.is_empty() && self.children.is_empty()),
            "node at {} is simultaneously entry-empty and child-empty",
            self.addr
        );
        assert!(
            self.entries.len() <= layout.capacity,
            "node at {} holds {} entries, exceeding capacity {}",
            self.addr,
            self.entries.len(),
            layout.capacity
        );

        let mut bytes = vec![0u8; layout.allocation_size as usize];
        bytes[0..3].copy_from_slice(NODE_MAGIC);
        bytes[3] = NODE_VERSION;
        bytes[4] = self.node_type.tag();
        bytes[5..7].copy_from_slice(&codec::encode_u16(self.entries.len() as u16));

        for (i, entry) in self.entries.iter().enumerate() {
            let slot_start = (NODE_HEADER_SIZE + i as u64 * layout.entry_slot_size) as usize;
            write_entry_slot(&mut bytes, slot_start, entry, layout);
        }

        if self.node_type == NodeType::Internal {
            let children_start = layout.children_offset() as usize;
            for (i, child_addr) in self.children.iter().enumerate() {
                let off = children_start + i * 8;
                bytes[off..off + 8].copy_from_slice(&codec::encode_u64(*child_addr));
            }
        }

        write_at(memory, self.addr, &bytes)
    }

    /// Load a node from its chunk.
    ///
    /// # Panics
    /// Panics if the header's magic or version do not match.
    pub fn load<M: Memory>(memory: &M, addr: u64, layout: &NodeLayout) -> Self {
        let header = memory.read(addr, NODE_HEADER_SIZE as usize);
        assert_eq!(&header[0..3], NODE_MAGIC, "bad node magic at {}", addr);
        assert_eq!(header[3], NODE_VERSION, "unsupported node version at {}", addr);
        let node_type = NodeType::from_tag(header[4]);
        let num_entries = codec::decode_u16(&header[5..7]) as usize;

        let entries_bytes = memory.read(
            addr + NODE_HEADER_SIZE,
            layout.entries_region_size() as usize,
        );
        let mut entries = Vec::with_capacity(num_entries);
        for i in 0..num_entries {
            let slot_start = i * layout.entry_slot_size as usize;
            entries.push(read_entry_slot(&entries_bytes, slot_start, layout));
        }

        let children = if node_type == NodeType::Internal {
            let children_bytes = memory.read(addr + layout.children_offset(), (num_entries + 1) * 8);
            (0..num_entries + 1)
                .map(|i| codec::decode_u64(&children_bytes[i * 8..i * 8 + 8]))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            addr,
            node_type,
            entries,
            children,
        }
    }
}

/// Write one entry into its fixed-size slot starting at `slot_start`
/// within `bytes`, zero-padding key and value to their configured
/// maxima.
fn write_entry_slot(bytes: &mut [u8], slot_start: usize, entry: &Entry, layout: &NodeLayout) {
    let max_key_size = layout.max_key_size as usize;
    let max_value_size = layout.max_value_size as usize;

    let key_len_off = slot_start;
    bytes[key_len_off..key_len_off + 4].copy_from_slice(&codec::encode_u32(entry.key.len() as u32));

    let key_off = key_len_off + 4;
    bytes[key_off..key_off + entry.key.len()].copy_from_slice(&entry.key);

    let val_len_off = key_off + max_key_size;
    bytes[val_len_off..val_len_off + 4]
        .copy_from_slice(&codec::encode_u32(entry.value.len() as u32));

    let val_off = val_len_off + 4;
    bytes[val_off..val_off + entry.value.len()].copy_from_slice(&entry.value);
}

/// Read one entry back out of its fixed-size slot.
fn read_entry_slot(bytes: &[u8], slot_start: usize, layout: &NodeLayout) -> Entry {
    let max_key_size = layout.max_key_size as usize;

    let key_len = codec::decode_u32(&bytes[slot_start..slot_start + 4]) as usize;
    let key_off = slot_start + 4;
    let key = bytes[key_off..key_off + key_len].to_vec();

    let val_len_off = key_off + max_key_size;
    let val_len = codec::decode_u32(&bytes[val_len_off..val_len_off + 4]) as usize;
    let val_off = val_len_off + 4;
    let value = bytes[val_off..val_off + val_len].to_vec();

    Entry::new(key, value)
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
