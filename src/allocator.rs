// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size-chunk free-list allocator (C3).
//!
//! Hands out equal-sized chunks from a region of a [`Memory`]. Every
//! chunk is either ALLOCATED or FREE; free chunks form a singly linked
//! list threaded through their own headers. There is no coalescing and
//! no size classes — the B-tree engine is the only client and every
//! node it ever allocates is exactly `allocation_size` bytes.
//!
//! ## Layout
//! ```text
//! [ AllocatorHeader (48 B) | Chunk_0 | Chunk_1 | … ]
//! ChunkHeader := magic "CHK" (3) | version (1) | allocated (1)
//!              | align (3) | next (8)
//! ```

use crate::codec;
use crate::error::TreeResult;
use crate::memory::{write_at, Memory};

const ALLOCATOR_MAGIC: &[u8; 3] = b"BTA";
const ALLOCATOR_VERSION: u8 = 1;
pub(crate) const ALLOCATOR_HEADER_SIZE: u64 = 48;

const CHUNK_MAGIC: &[u8; 3] = b"CHK";
const CHUNK_VERSION: u8 = 1;
pub(crate) const CHUNK_HEADER_SIZE: u64 = 16;

/// The `0` address never points at a real chunk — the tree header and
/// allocator header both precede the first chunk at any `base_addr`.
pub const NULL: u64 = 0;

struct AllocatorHeader {
    allocation_size: u64,
    num_allocated_chunks: u64,
    free_list_head: u64,
}

impl AllocatorHeader {
    fn to_bytes(&self) -> [u8; ALLOCATOR_HEADER_SIZE as usize] {
        let mut bytes = [0u8; ALLOCATOR_HEADER_SIZE as usize];
        bytes[0..3].copy_from_slice(ALLOCATOR_MAGIC);
        bytes[3] = ALLOCATOR_VERSION;
        // bytes[4..8] is the reserved `align` field, left zeroed.
        bytes[8..16].copy_from_slice(&codec::encode_u64(self.allocation_size));
        bytes[16..24].copy_from_slice(&codec::encode_u64(self.num_allocated_chunks));
        bytes[24..32].copy_from_slice(&codec::encode_u64(self.free_list_head));
        // bytes[32..48] is reserved, left zeroed.
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(&bytes[0..3], ALLOCATOR_MAGIC, "bad allocator header magic");
        assert_eq!(bytes[3], ALLOCATOR_VERSION, "unsupported allocator version");
        Self {
            allocation_size: codec::decode_u64(&bytes[8..16]),
            num_allocated_chunks: codec::decode_u64(&bytes[16..24]),
            free_list_head: codec::decode_u64(&bytes[24..32]),
        }
    }
}

struct ChunkHeader {
    allocated: bool,
    next: u64,
}

impl ChunkHeader {
    fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE as usize] {
        let mut bytes = [0u8; CHUNK_HEADER_SIZE as usize];
        bytes[0..3].copy_from_slice(CHUNK_MAGIC);
        bytes[3] = CHUNK_VERSION;
        bytes[4] = codec::encode_bool(self.allocated);
        // bytes[5..8] is the reserved `align` field, left zeroed.
        bytes[8..16].copy_from_slice(&codec::encode_u64(self.next));
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(&bytes[0..3], CHUNK_MAGIC, "bad chunk header magic");
        assert_eq!(bytes[3], CHUNK_VERSION, "unsupported chunk version");
        Self {
            allocated: codec::decode_bool(bytes[4]),
            next: codec::decode_u64(&bytes[8..16]),
        }
    }
}

/// A free-list allocator serving fixed-size chunks starting at
/// `base_addr` of a [`Memory`].
///
/// Carries no reference to the memory it allocates from — every method
/// takes the `Memory` explicitly, matching the rest of this crate's
/// index/arena style (design notes: "a node does not own its children
/// by value; in a systems language this maps to an index/arena
/// pattern").
#[derive(Debug, Clone, Copy)]
pub struct Allocator {
    base_addr: u64,
    chunk_size: u64,
}

impl Allocator {
    /// Initialise a fresh allocator at `base_addr`, serving chunks of
    /// `allocation_size` payload bytes each (`chunk_size =
    /// allocation_size + CHUNK_HEADER_SIZE`).
    pub fn init<M: Memory>(memory: &M, base_addr: u64, allocation_size: u64) -> TreeResult<Self> {
        let chunk_size = allocation_size + CHUNK_HEADER_SIZE;
        let header = AllocatorHeader {
            allocation_size,
            num_allocated_chunks: 0,
            free_list_head: base_addr + ALLOCATOR_HEADER_SIZE,
        };
        write_at(memory, base_addr, &header.to_bytes())?;

        let first_chunk = ChunkHeader {
            allocated: false,
            next: NULL,
        };
        write_at(
            memory,
            base_addr + ALLOCATOR_HEADER_SIZE,
            &first_chunk.to_bytes(),
        )?;

        Ok(Self {
            base_addr,
            chunk_size,
        })
    }

    /// Load an allocator previously initialised at `base_addr`.
    ///
    /// # Panics
    /// Panics if the header's magic or version do not match — a
    /// corrupted or foreign store is a fatal condition (design §7).
    pub fn load<M: Memory>(memory: &M, base_addr: u64) -> Self {
        let bytes = memory.read(base_addr, ALLOCATOR_HEADER_SIZE as usize);
        let header = AllocatorHeader::from_bytes(&bytes);
        Self {
            base_addr,
            chunk_size: header.allocation_size + CHUNK_HEADER_SIZE,
        }
    }

    /// Payload bytes per chunk (excludes the chunk header).
    pub fn allocation_size<M: Memory>(&self, memory: &M) -> u64 {
        self.read_header(memory).allocation_size
    }

    /// Number of currently allocated (live) chunks.
    pub fn num_allocated_chunks<M: Memory>(&self, memory: &M) -> u64 {
        self.read_header(memory).num_allocated_chunks
    }

    fn read_header<M: Memory>(&self, memory: &M) -> AllocatorHeader {
        let bytes = memory.read(self.base_addr, ALLOCATOR_HEADER_SIZE as usize);
        AllocatorHeader::from_bytes(&bytes)
    }

    fn write_header<M: Memory>(&self, memory: &M, header: &AllocatorHeader) -> TreeResult<()> {
        write_at(memory, self.base_addr, &header.to_bytes())
    }

    fn read_chunk<M: Memory>(&self, memory: &M, chunk_addr: u64) -> ChunkHeader {
        let bytes = memory.read(chunk_addr, CHUNK_HEADER_SIZE as usize);
        ChunkHeader::from_bytes(&bytes)
    }

    fn write_chunk<M: Memory>(
        &self,
        memory: &M,
        chunk_addr: u64,
        chunk: &ChunkHeader,
    ) -> TreeResult<()> {
        write_at(memory, chunk_addr, &chunk.to_bytes())
    }

    /// Pop a chunk from the free list, mark it allocated, and return
    /// its payload address (`chunk_addr + CHUNK_HEADER_SIZE`).
    ///
    /// Fails with [`crate::error::TreeError::MemoryGrowFailed`] only if
    /// the backing store must grow to host a brand new chunk and
    /// refuses to.
    pub fn allocate<M: Memory>(&self, memory: &M) -> TreeResult<u64> {
        let mut header = self.read_header(memory);
        let chunk_addr = header.free_list_head;
        let mut chunk = self.read_chunk(memory, chunk_addr);
        assert!(
            !chunk.allocated,
            "free-list head at {} is already marked allocated",
            chunk_addr
        );

        chunk.allocated = true;
        self.write_chunk(memory, chunk_addr, &chunk)?;

        let next_free_head = if chunk.next != NULL {
            chunk.next
        } else {
            let fresh_addr = chunk_addr + self.chunk_size;
            let fresh = ChunkHeader {
                allocated: false,
                next: NULL,
            };
            self.write_chunk(memory, fresh_addr, &fresh)?;
            fresh_addr
        };

        header.num_allocated_chunks += 1;
        header.free_list_head = next_free_head;
        self.write_header(memory, &header)?;

        Ok(chunk_addr + CHUNK_HEADER_SIZE)
    }

    /// Return the chunk backing `payload_addr` to the free list.
    ///
    /// # Panics
    /// Panics if the chunk at `payload_addr` is not currently
    /// allocated — a double free is a corruption, not a recoverable
    /// error (design §7).
    pub fn deallocate<M: Memory>(&self, memory: &M, payload_addr: u64) -> TreeResult<()> {
        let chunk_addr = payload_addr - CHUNK_HEADER_SIZE;
        let mut chunk = self.read_chunk(memory, chunk_addr);
        assert!(
            chunk.allocated,
            "double free: chunk at {} is already free",
            chunk_addr
        );

        let mut header = self.read_header(memory);
        chunk.allocated = false;
        chunk.next = header.free_list_head;
        self.write_chunk(memory, chunk_addr, &chunk)?;

        header.free_list_head = chunk_addr;
        header.num_allocated_chunks -= 1;
        self.write_header(memory, &header)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "allocator_test.rs"]
mod allocator_test;
