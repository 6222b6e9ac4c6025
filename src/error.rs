// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for pagetree operations.
//!
//! Only input-validation failures and backing-store growth refusals are
//! recoverable and therefore representable here. Structural corruption
//! (bad magic, wrong version, double-free, broken invariants) is fatal
//! and surfaces as a `panic!` with a diagnostic instead of a `Result`,
//! since silent continuation on a corrupted store would risk data loss.

use std::fmt;

/// Standard `Result` type for all pagetree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Recoverable error conditions surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A key supplied to `insert` exceeds the tree's configured maximum.
    KeyTooLarge { given: usize, max: u32 },

    /// A value supplied to `insert` exceeds the tree's configured maximum.
    ValueTooLarge { given: usize, max: u32 },

    /// The backing store refused to grow far enough to satisfy a write.
    MemoryGrowFailed {
        current_pages: u64,
        requested_pages: u64,
    },

    /// A configuration value failed validation at construction time.
    InvalidConfig { reason: String },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyTooLarge { given, max } => {
                write!(f, "key of {} bytes exceeds maximum of {} bytes", given, max)
            }
            Self::ValueTooLarge { given, max } => {
                write!(
                    f,
                    "value of {} bytes exceeds maximum of {} bytes",
                    given, max
                )
            }
            Self::MemoryGrowFailed {
                current_pages,
                requested_pages,
            } => {
                write!(
                    f,
                    "failed to grow backing store from {} pages by {} pages",
                    current_pages, requested_pages
                )
            }
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for TreeError {}

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;
