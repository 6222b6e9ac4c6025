// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Validated configuration types: construct-time validation, plain
//! accessor methods, no builder macro.

use crate::error::{TreeError, TreeResult};

/// Default number of pages per Memory Manager bucket.
pub const DEFAULT_BUCKET_SIZE_IN_PAGES: u16 = 1024;

/// Tree-wide configuration fixed at creation time: the minimum degree
/// `B` and the maximum key/value sizes.
///
/// ## Constraints
/// - `b >= 2` (a B-tree of minimum degree 1 has no useful capacity)
/// - `max_key_size > 0` and `max_value_size > 0`
///
/// ## Example
/// ```rust
/// use pagetree::config::TreeConfig;
///
/// let config = TreeConfig::new(6, 64, 256).unwrap();
/// assert_eq!(config.capacity(), 11); // 2*6 - 1
/// assert_eq!(config.min_degree(), 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    b: u32,
    max_key_size: u32,
    max_value_size: u32,
}

impl TreeConfig {
    /// Create a new configuration, validating `b` and the size maxima.
    pub fn new(b: u32, max_key_size: u32, max_value_size: u32) -> TreeResult<Self> {
        if b < 2 {
            return Err(TreeError::InvalidConfig {
                reason: format!("minimum degree b must be >= 2, got {}", b),
            });
        }
        if max_key_size == 0 || max_value_size == 0 {
            return Err(TreeError::InvalidConfig {
                reason: "max_key_size and max_value_size must be > 0".to_string(),
            });
        }
        Ok(Self {
            b,
            max_key_size,
            max_value_size,
        })
    }

    /// Minimum degree `B`: every non-root node holds between `B - 1`
    /// and `2B - 1` entries.
    pub fn min_degree(&self) -> u32 {
        self.b
    }

    /// Maximum entries per node: `2B - 1`.
    pub fn capacity(&self) -> u32 {
        2 * self.b - 1
    }

    /// Maximum key length in bytes.
    pub fn max_key_size(&self) -> u32 {
        self.max_key_size
    }

    /// Maximum value length in bytes.
    pub fn max_value_size(&self) -> u32 {
        self.max_value_size
    }
}

/// Memory Manager bucket-size configuration.
///
/// The persisted `bucket_size_in_pages` MUST match this value when a
/// manager is reloaded with [`crate::memory_manager::MemoryManager::load_with_buckets`]
/// — a mismatch indicates the manager is being opened with different
/// assumptions than it was created under, which is fatal (design notes
/// §9, "Configurable Memory Manager bucket size").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    bucket_size_in_pages: u16,
}

impl BucketConfig {
    /// Create a bucket configuration with an explicit bucket size.
    pub fn new(bucket_size_in_pages: u16) -> TreeResult<Self> {
        if bucket_size_in_pages == 0 {
            return Err(TreeError::InvalidConfig {
                reason: "bucket_size_in_pages must be > 0".to_string(),
            });
        }
        Ok(Self {
            bucket_size_in_pages,
        })
    }

    /// Bucket size in pages.
    pub fn bucket_size_in_pages(&self) -> u16 {
        self.bucket_size_in_pages
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            bucket_size_in_pages: DEFAULT_BUCKET_SIZE_IN_PAGES,
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
