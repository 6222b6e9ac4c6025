// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Backing Store contract (C1) and its two concrete implementations.
//!
//! A `Memory` is a byte-addressable, page-growable address space.
//! Pages are fixed at [`WASM_PAGE_SIZE`] bytes. Every other subsystem
//! in this crate — the allocator, the node codec, the memory manager —
//! reads and writes through this trait and never assumes anything about
//! what backs it.
//!
//! Two implementations are provided:
//! - [`VecMemory`]: volatile, in-process, backed by a `Vec<u8>`. Used in
//!   tests and for ephemeral trees.
//! - [`FileMemory`]: persistent, backed by a memory-mapped file via
//!   `memmap2`.

use crate::error::{TreeError, TreeResult};
use memmap2::MmapMut;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Bytes per page, matching a WebAssembly linear-memory page.
pub const WASM_PAGE_SIZE: u64 = 65536;

/// Byte-addressable, page-growable backing store.
///
/// All methods take `&self`; implementations use interior mutability
/// (`RefCell`) since the engine is single-threaded (see design §5) and
/// many collaborators need concurrent logical access to the same
/// store without fighting the borrow checker over `&mut`.
pub trait Memory {
    /// Current size of the store, in pages.
    fn size(&self) -> u64;

    /// Grow the store by `pages` pages of zeroed bytes.
    ///
    /// Returns the previous size in pages on success, or `-1` if the
    /// store refuses to grow further.
    fn grow(&self, pages: u64) -> i64;

    /// Read `len` bytes starting at `offset`.
    ///
    /// # Panics
    /// Panics if `offset + len` exceeds the current byte size — an
    /// out-of-range access is a fatal usage error, not a recoverable
    /// one (design §7).
    fn read(&self, offset: u64, len: usize) -> Vec<u8>;

    /// Write `bytes` starting at `offset`.
    ///
    /// # Panics
    /// Panics if `offset + bytes.len()` exceeds the current byte size.
    fn write(&self, offset: u64, bytes: &[u8]);
}

/// Write `bytes` at `offset`, growing the store first if it is too
/// small. This is the "safe-write helper" design §4.1 requires of the
/// Allocator and the Engine.
pub(crate) fn write_at<M: Memory>(memory: &M, offset: u64, bytes: &[u8]) -> TreeResult<()> {
    let last_byte = offset
        .checked_add(bytes.len() as u64)
        .expect("address space overflow");
    let current_pages = memory.size();
    let current_bytes = current_pages
        .checked_mul(WASM_PAGE_SIZE)
        .expect("address space overflow");

    if current_bytes < last_byte {
        let missing = last_byte - current_bytes;
        let needed_pages = (missing + WASM_PAGE_SIZE - 1) / WASM_PAGE_SIZE;
        if memory.grow(needed_pages) < 0 {
            return Err(TreeError::MemoryGrowFailed {
                current_pages,
                requested_pages: needed_pages,
            });
        }
    }
    memory.write(offset, bytes);
    Ok(())
}

/// Volatile, in-process backing store over a growable `Vec<u8>`.
///
/// Intended for tests and for trees that need not outlive the process.
pub struct VecMemory {
    buffer: RefCell<Vec<u8>>,
}

impl VecMemory {
    /// Create an empty store (zero pages).
    pub fn new() -> Self {
        Self {
            buffer: RefCell::new(Vec::new()),
        }
    }
}

impl Default for VecMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for VecMemory {
    fn size(&self) -> u64 {
        self.buffer.borrow().len() as u64 / WASM_PAGE_SIZE
    }

    fn grow(&self, pages: u64) -> i64 {
        let mut buf = self.buffer.borrow_mut();
        let previous_pages = buf.len() as u64 / WASM_PAGE_SIZE;
        let additional = (pages * WASM_PAGE_SIZE) as usize;
        buf.resize(buf.len() + additional, 0u8);
        previous_pages as i64
    }

    fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let buf = self.buffer.borrow();
        let start = offset as usize;
        let end = start + len;
        assert!(
            end <= buf.len(),
            "read [{}, {}) exceeds store size {} bytes",
            start,
            end,
            buf.len()
        );
        buf[start..end].to_vec()
    }

    fn write(&self, offset: u64, bytes: &[u8]) {
        let mut buf = self.buffer.borrow_mut();
        let start = offset as usize;
        let end = start + bytes.len();
        assert!(
            end <= buf.len(),
            "write [{}, {}) exceeds store size {} bytes",
            start,
            end,
            buf.len()
        );
        buf[start..end].copy_from_slice(bytes);
    }
}

/// Persistent backing store over a memory-mapped file.
///
/// Growth extends the file length and remaps it, generalised to
/// arbitrary page counts instead of a single fixed page size.
pub struct FileMemory {
    file: File,
    // `None` until the store has grown past zero pages — memmap2 cannot
    // map a zero-length file, and a fresh store is legitimately empty.
    mmap: RefCell<Option<MmapMut>>,
}

impl FileMemory {
    /// Open or create the file at `path` as a backing store.
    ///
    /// An existing file's length is taken as its page count; a freshly
    /// created file starts at zero pages.
    pub fn open<P: AsRef<Path>>(path: P) -> TreeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .expect("failed to open backing file");

        let len = file.metadata().expect("failed to stat backing file").len();
        let mmap = if len == 0 {
            None
        } else {
            Some(unsafe { MmapMut::map_mut(&file).expect("failed to map backing file") })
        };
        Ok(Self {
            file,
            mmap: RefCell::new(mmap),
        })
    }

    fn logical_len(&self) -> u64 {
        self.file
            .metadata()
            .expect("failed to stat backing file")
            .len()
    }
}

impl Memory for FileMemory {
    fn size(&self) -> u64 {
        self.logical_len() / WASM_PAGE_SIZE
    }

    fn grow(&self, pages: u64) -> i64 {
        let previous_pages = self.size();
        let new_len = self.logical_len() + pages * WASM_PAGE_SIZE;
        self.file
            .set_len(new_len)
            .expect("failed to extend backing file");
        let mmap = unsafe { MmapMut::map_mut(&self.file).expect("failed to remap backing file") };
        *self.mmap.borrow_mut() = Some(mmap);
        previous_pages as i64
    }

    fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let mmap = self.mmap.borrow();
        let mmap = mmap.as_ref().expect("read from a zero-page store");
        let start = offset as usize;
        let end = start + len;
        assert!(
            end <= mmap.len(),
            "read [{}, {}) exceeds store size {} bytes",
            start,
            end,
            mmap.len()
        );
        mmap[start..end].to_vec()
    }

    fn write(&self, offset: u64, bytes: &[u8]) {
        let mut mmap = self.mmap.borrow_mut();
        let mmap = mmap.as_mut().expect("write to a zero-page store");
        let start = offset as usize;
        let end = start + bytes.len();
        assert!(
            end <= mmap.len(),
            "write [{}, {}) exceeds store size {} bytes",
            start,
            end,
            mmap.len()
        );
        mmap[start..end].copy_from_slice(bytes);
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
