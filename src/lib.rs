// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! pagetree - a persistent B-tree map over a byte-addressable,
//! page-growable backing store.
//!
//! A small, dependency-light engine for embedding an ordered `key ->
//! value` map directly in a memory-mapped file or any other
//! [`memory::Memory`] implementation, with no transactions, no
//! concurrency, and no background work — every operation is
//! synchronous and single-threaded.
//!
//! ## Quick start
//!
//! ```rust
//! use pagetree::btree::BTree;
//! use pagetree::config::TreeConfig;
//! use pagetree::memory::VecMemory;
//!
//! let config = TreeConfig::new(6, 64, 256).unwrap();
//! let mut tree = BTree::create(VecMemory::new(), config).unwrap();
//!
//! tree.insert(b"hello", b"world").unwrap();
//! assert_eq!(tree.get(b"hello"), Some(b"world".to_vec()));
//!
//! for (key, value) in tree.range(b"hel", None) {
//!     println!("{:?} = {:?}", key, value);
//! }
//! ```
//!
//! ## Architecture
//!
//! - **memory**: the Backing Store contract (`Memory`) and its two
//!   implementations, `VecMemory` (volatile) and `FileMemory`
//!   (memory-mapped, persistent).
//! - **codec**: big-endian fixed-width integer encoding and
//!   lexicographic byte-string comparison.
//! - **allocator**: a fixed-size-chunk free-list allocator.
//! - **node**: the on-disk node format shared by leaf and internal
//!   nodes.
//! - **btree**: the engine itself — insertion, deletion, lookup, and
//!   ordered/prefix iteration.
//! - **memory_manager**: an optional virtual-memory partitioner letting
//!   several trees share one physical backing store.
//! - **config**: validated, construct-time-checked configuration types.
//! - **error**: the two-tier error model (recoverable `TreeError` vs.
//!   fatal `panic!` on structural corruption).

pub mod allocator;
pub mod btree;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod memory_manager;
pub mod node;

pub use btree::{BTree, RangeIter};
pub use config::{BucketConfig, TreeConfig};
pub use error::{TreeError, TreeResult};
pub use memory::{FileMemory, Memory, VecMemory};
pub use memory_manager::{MemoryId, MemoryManager, VirtualMemory};
