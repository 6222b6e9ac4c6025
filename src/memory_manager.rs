// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Virtual-memory partitioner (C6): slices one physical [`Memory`] into
//! up to 255 independent, growable sub-stores by interleaving fixed-size
//! buckets, so several trees can share one backing store without each
//! reserving worst-case capacity up front.
//!
//! ## Layout
//! ```text
//! MemoryManagerHeader (2080 B) := magic "MGR" (3) | version (1)
//!                                | num_allocated_buckets u16 (2)
//!                                | bucket_size_in_pages u16 (2)
//!                                | reserved (32)
//!                                | memory_sizes_in_pages [u64; 255] (2040)
//! BucketOwners (32768 B) := [u8; MAX_NUM_BUCKETS], 255 means unowned.
//! ```
//! Buckets begin at page 1 of the physical store (the header and owner
//! table together fit in page 0); bucket `b` starts at byte
//! `WASM_PAGE_SIZE + b * bucket_size_in_pages * WASM_PAGE_SIZE`.

use crate::codec;
use crate::config::BucketConfig;
use crate::error::{TreeError, TreeResult};
use crate::memory::{write_at, Memory, WASM_PAGE_SIZE};
use std::cell::RefCell;

const MM_MAGIC: &[u8; 3] = b"MGR";
const MM_VERSION: u8 = 1;
const MM_HEADER_SIZE: u64 = 2080;
const MM_SIZES_OFFSET: usize = 40;

/// Maximum number of buckets the owner table can address.
pub const MAX_NUM_BUCKETS: usize = 32768;

/// Reserved [`MemoryId`] marking an owner-table slot as unallocated.
/// Callers must never pass this as an `id` to any virtual-memory
/// operation (design §7: fatal if they do).
pub const UNALLOCATED_BUCKET_MARKER: u8 = 255;

const BUCKET_OWNERS_OFFSET: u64 = MM_HEADER_SIZE;

struct MemoryManagerHeader {
    num_allocated_buckets: u16,
    bucket_size_in_pages: u16,
    memory_sizes_in_pages: Vec<u64>,
}

impl MemoryManagerHeader {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; MM_HEADER_SIZE as usize];
        bytes[0..3].copy_from_slice(MM_MAGIC);
        bytes[3] = MM_VERSION;
        bytes[4..6].copy_from_slice(&codec::encode_u16(self.num_allocated_buckets));
        bytes[6..8].copy_from_slice(&codec::encode_u16(self.bucket_size_in_pages));
        // bytes[8..40] is reserved, left zeroed.
        for (i, pages) in self.memory_sizes_in_pages.iter().enumerate() {
            let off = MM_SIZES_OFFSET + i * 8;
            bytes[off..off + 8].copy_from_slice(&codec::encode_u64(*pages));
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(&bytes[0..3], MM_MAGIC, "bad memory manager header magic");
        assert_eq!(bytes[3], MM_VERSION, "unsupported memory manager version");
        let num_allocated_buckets = codec::decode_u16(&bytes[4..6]);
        let bucket_size_in_pages = codec::decode_u16(&bytes[6..8]);
        let memory_sizes_in_pages = (0..255)
            .map(|i| {
                let off = MM_SIZES_OFFSET + i * 8;
                codec::decode_u64(&bytes[off..off + 8])
            })
            .collect();
        Self {
            num_allocated_buckets,
            bucket_size_in_pages,
            memory_sizes_in_pages,
        }
    }
}

fn bucket_byte_offset(bucket_id: u32, bucket_size_in_pages: u16) -> u64 {
    WASM_PAGE_SIZE + bucket_id as u64 * bucket_size_in_pages as u64 * WASM_PAGE_SIZE
}

/// An 8-bit identifier naming one of up to 255 virtual memories owned
/// by a [`MemoryManager`]. `255` ([`UNALLOCATED_BUCKET_MARKER`]) is
/// reserved and must not be used.
pub type MemoryId = u8;

/// Owns one physical [`Memory`] and virtualises it into up to 255
/// independent, growable sub-stores.
///
/// Only `bucket_size_in_pages` is cached; `num_allocated_buckets` and
/// each virtual memory's page count live in the header and are read
/// fresh on every call, in the same style as [`crate::allocator::Allocator`].
/// `bucket_lists` (which physical buckets belong to which id, in
/// allocation order) is reconstructed once at `init`/`load` time and
/// maintained incrementally, since rebuilding it requires a full scan
/// of the owner table.
pub struct MemoryManager<M: Memory> {
    physical: M,
    bucket_size_in_pages: u16,
    bucket_lists: RefCell<Vec<Vec<u32>>>,
}

impl<M: Memory> MemoryManager<M> {
    /// Initialise a fresh manager with the default bucket size
    /// ([`crate::config::DEFAULT_BUCKET_SIZE_IN_PAGES`]).
    pub fn init(memory: M) -> TreeResult<Self> {
        Self::init_with_buckets(memory, BucketConfig::default())
    }

    /// Initialise a fresh manager with an explicit bucket size.
    pub fn init_with_buckets(memory: M, bucket_config: BucketConfig) -> TreeResult<Self> {
        let header = MemoryManagerHeader {
            num_allocated_buckets: 0,
            bucket_size_in_pages: bucket_config.bucket_size_in_pages(),
            memory_sizes_in_pages: vec![0u64; 255],
        };
        write_at(&memory, 0, &header.to_bytes())?;
        let owners = vec![UNALLOCATED_BUCKET_MARKER; MAX_NUM_BUCKETS];
        write_at(&memory, BUCKET_OWNERS_OFFSET, &owners)?;
        Ok(Self {
            physical: memory,
            bucket_size_in_pages: bucket_config.bucket_size_in_pages(),
            bucket_lists: RefCell::new(vec![Vec::new(); 256]),
        })
    }

    /// Load a manager previously initialised on `memory`, trusting its
    /// persisted bucket size.
    pub fn load(memory: M) -> Self {
        Self::load_scanning(memory, None)
    }

    /// Load a manager, asserting its persisted bucket size matches
    /// `bucket_config` (design notes §9, "Configurable Memory Manager
    /// bucket size").
    ///
    /// # Panics
    /// Panics if the persisted `bucket_size_in_pages` differs.
    pub fn load_with_buckets(memory: M, bucket_config: BucketConfig) -> Self {
        Self::load_scanning(memory, Some(bucket_config))
    }

    fn load_scanning(memory: M, expected: Option<BucketConfig>) -> Self {
        let bytes = memory.read(0, MM_HEADER_SIZE as usize);
        let header = MemoryManagerHeader::from_bytes(&bytes);
        if let Some(expected) = expected {
            assert_eq!(
                header.bucket_size_in_pages,
                expected.bucket_size_in_pages(),
                "memory manager bucket size {} does not match the expected {}",
                header.bucket_size_in_pages,
                expected.bucket_size_in_pages()
            );
        }

        let owners = memory.read(BUCKET_OWNERS_OFFSET, MAX_NUM_BUCKETS);
        let mut bucket_lists = vec![Vec::new(); 256];
        for (bucket_id, &owner) in owners
            .iter()
            .enumerate()
            .take(header.num_allocated_buckets as usize)
        {
            bucket_lists[owner as usize].push(bucket_id as u32);
        }

        Self {
            physical: memory,
            bucket_size_in_pages: header.bucket_size_in_pages,
            bucket_lists: RefCell::new(bucket_lists),
        }
    }

    fn read_header(&self) -> MemoryManagerHeader {
        let bytes = self.physical.read(0, MM_HEADER_SIZE as usize);
        MemoryManagerHeader::from_bytes(&bytes)
    }

    fn write_header(&self, header: &MemoryManagerHeader) -> TreeResult<()> {
        write_at(&self.physical, 0, &header.to_bytes())
    }

    fn write_bucket_owner(&self, bucket_id: u32, owner: u8) -> TreeResult<()> {
        write_at(&self.physical, BUCKET_OWNERS_OFFSET + bucket_id as u64, &[owner])
    }

    /// Pages per bucket, fixed for the life of the manager.
    pub fn bucket_size_in_pages(&self) -> u16 {
        self.bucket_size_in_pages
    }

    /// Total buckets handed out across every virtual memory so far.
    pub fn num_allocated_buckets(&self) -> u16 {
        self.read_header().num_allocated_buckets
    }

    /// Current size, in pages, of virtual memory `id`.
    pub fn size(&self, id: MemoryId) -> u64 {
        self.read_header().memory_sizes_in_pages[id as usize]
    }

    /// Grow virtual memory `id` by `pages`, allocating new buckets and
    /// extending the physical store as needed.
    ///
    /// Returns the previous size in pages, or `Ok(-1)` if granting the
    /// request would exceed [`MAX_NUM_BUCKETS`] (design §4.6.2 step 3 —
    /// the failure sentinel, not a recoverable error: no bucket is
    /// handed out and no state changes). Fails with
    /// [`TreeError::MemoryGrowFailed`] only if the physical store itself
    /// refuses to grow.
    ///
    /// # Panics
    /// Panics if `id` is [`UNALLOCATED_BUCKET_MARKER`].
    pub fn grow(&self, id: MemoryId, pages: u64) -> TreeResult<i64> {
        assert_ne!(
            id, UNALLOCATED_BUCKET_MARKER,
            "{} is the reserved unallocated-bucket marker, not a usable MemoryId",
            UNALLOCATED_BUCKET_MARKER
        );

        let mut header = self.read_header();
        let old_pages = header.memory_sizes_in_pages[id as usize];
        let bucket_size = self.bucket_size_in_pages as u64;
        let required_buckets = (old_pages + pages + bucket_size - 1) / bucket_size;

        let mut bucket_lists = self.bucket_lists.borrow_mut();
        let currently_allocated = bucket_lists[id as usize].len() as u64;

        if required_buckets > currently_allocated {
            let to_allocate = required_buckets - currently_allocated;
            let projected_total = header.num_allocated_buckets as u64 + to_allocate;
            if projected_total > MAX_NUM_BUCKETS as u64 {
                return Ok(-1);
            }

            let mut next_bucket_id = header.num_allocated_buckets as u32;
            for _ in 0..to_allocate {
                self.write_bucket_owner(next_bucket_id, id)?;
                bucket_lists[id as usize].push(next_bucket_id);
                next_bucket_id += 1;
            }
            header.num_allocated_buckets = next_bucket_id as u16;

            let highest_bucket_id = *bucket_lists[id as usize]
                .last()
                .expect("just allocated at least one bucket");
            let end_byte = bucket_byte_offset(highest_bucket_id, self.bucket_size_in_pages)
                + bucket_size * WASM_PAGE_SIZE;
            let current_physical_pages = self.physical.size();
            let current_physical_bytes = current_physical_pages * WASM_PAGE_SIZE;
            if current_physical_bytes < end_byte {
                let missing = end_byte - current_physical_bytes;
                let needed_pages = (missing + WASM_PAGE_SIZE - 1) / WASM_PAGE_SIZE;
                if self.physical.grow(needed_pages) < 0 {
                    return Err(TreeError::MemoryGrowFailed {
                        current_pages: current_physical_pages,
                        requested_pages: needed_pages,
                    });
                }
            }
        }
        drop(bucket_lists);

        header.memory_sizes_in_pages[id as usize] = old_pages + pages;
        self.write_header(&header)?;
        Ok(old_pages as i64)
    }

    /// Translate a virtual `[offset, offset + len)` range of memory `id`
    /// into one or more physical segments, splitting at bucket
    /// boundaries (the "BucketIterator" of design §4.6.2).
    fn translate(&self, id: MemoryId, offset: u64, len: usize) -> Vec<(u64, usize)> {
        let size_bytes = self.size(id) * WASM_PAGE_SIZE;
        let end = offset + len as u64;
        assert!(
            end <= size_bytes,
            "virtual access [{}, {}) on memory {} exceeds its size of {} bytes",
            offset,
            end,
            id,
            size_bytes
        );

        let bucket_size_bytes = self.bucket_size_in_pages as u64 * WASM_PAGE_SIZE;
        let bucket_lists = self.bucket_lists.borrow();
        let owned = &bucket_lists[id as usize];

        let mut segments = Vec::new();
        let mut remaining = len;
        let mut cursor = offset;
        while remaining > 0 {
            let virtual_bucket = (cursor / bucket_size_bytes) as usize;
            let physical_bucket = owned[virtual_bucket];
            let offset_in_bucket = cursor % bucket_size_bytes;
            let room_in_bucket = (bucket_size_bytes - offset_in_bucket) as usize;
            let segment_len = remaining.min(room_in_bucket);
            let real_offset = bucket_byte_offset(physical_bucket, self.bucket_size_in_pages) + offset_in_bucket;
            segments.push((real_offset, segment_len));
            cursor += segment_len as u64;
            remaining -= segment_len;
        }
        segments
    }

    /// Read `len` bytes starting at virtual `offset` of memory `id`.
    pub fn read(&self, id: MemoryId, offset: u64, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let mut filled = 0usize;
        for (real_offset, segment_len) in self.translate(id, offset, len) {
            let chunk = self.physical.read(real_offset, segment_len);
            out[filled..filled + segment_len].copy_from_slice(&chunk);
            filled += segment_len;
        }
        out
    }

    /// Write `bytes` starting at virtual `offset` of memory `id`.
    pub fn write(&self, id: MemoryId, offset: u64, bytes: &[u8]) {
        let mut filled = 0usize;
        for (real_offset, segment_len) in self.translate(id, offset, bytes.len()) {
            self.physical.write(real_offset, &bytes[filled..filled + segment_len]);
            filled += segment_len;
        }
    }

    /// A [`Memory`]-shaped view over virtual memory `id`.
    pub fn view(&self, id: MemoryId) -> VirtualMemory<'_, M> {
        VirtualMemory::new(self, id)
    }
}

/// A [`Memory`] implementation over one virtual memory of a
/// [`MemoryManager`]. A [`crate::btree::BTree`] can be built directly
/// on top of one of these exactly as it would on a [`crate::memory::VecMemory`]
/// or [`crate::memory::FileMemory`].
pub struct VirtualMemory<'a, M: Memory> {
    manager: &'a MemoryManager<M>,
    id: MemoryId,
}

impl<'a, M: Memory> VirtualMemory<'a, M> {
    /// # Panics
    /// Panics if `id` is [`UNALLOCATED_BUCKET_MARKER`].
    pub fn new(manager: &'a MemoryManager<M>, id: MemoryId) -> Self {
        assert_ne!(
            id, UNALLOCATED_BUCKET_MARKER,
            "{} is the reserved unallocated-bucket marker, not a usable MemoryId",
            UNALLOCATED_BUCKET_MARKER
        );
        Self { manager, id }
    }
}

impl<'a, M: Memory> Memory for VirtualMemory<'a, M> {
    fn size(&self) -> u64 {
        self.manager.size(self.id)
    }

    fn grow(&self, pages: u64) -> i64 {
        match self.manager.grow(self.id, pages) {
            Ok(previous) => previous,
            Err(_) => -1,
        }
    }

    fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        self.manager.read(self.id, offset, len)
    }

    fn write(&self, offset: u64, bytes: &[u8]) {
        self.manager.write(self.id, offset, bytes)
    }
}

#[cfg(test)]
#[path = "memory_manager_test.rs"]
mod memory_manager_test;
