// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the B-tree engine: insertion, deletion rebalancing, and
//! ordered/prefix iteration.

use super::*;
use crate::memory::VecMemory;

fn small_tree() -> BTree<VecMemory> {
    // B = 6 -> capacity 11, matching the worked examples in design notes §8.
    let config = TreeConfig::new(6, 32, 32).unwrap();
    BTree::create(VecMemory::new(), config).unwrap()
}

#[test]
fn empty_tree_has_no_entries() {
    let tree = small_tree();
    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.get(b"a"), None);
}

#[test]
fn insert_then_get_round_trips() {
    let mut tree = small_tree();
    assert_eq!(tree.insert(b"a", b"1").unwrap(), None);
    assert_eq!(tree.insert(b"b", b"2").unwrap(), None);
    assert_eq!(tree.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(tree.get(b"b"), Some(b"2".to_vec()));
    assert_eq!(tree.len(), 2);
}

#[test]
fn insert_overwrite_returns_previous_value_without_growing_length() {
    let mut tree = small_tree();
    tree.insert(b"a", b"1").unwrap();
    let previous = tree.insert(b"a", b"2").unwrap();
    assert_eq!(previous, Some(b"1".to_vec()));
    assert_eq!(tree.get(b"a"), Some(b"2".to_vec()));
    assert_eq!(tree.len(), 1);
}

#[test]
fn insert_rejects_oversized_key_and_value() {
    let mut tree = small_tree();
    let big_key = vec![0u8; 33];
    let err = tree.insert(&big_key, b"v").unwrap_err();
    assert!(matches!(err, TreeError::KeyTooLarge { given: 33, max: 32 }));

    let big_value = vec![0u8; 33];
    let err = tree.insert(b"k", &big_value).unwrap_err();
    assert!(matches!(err, TreeError::ValueTooLarge { given: 33, max: 32 }));
}

/// Scenario: inserting an 12th key into a single leaf root at capacity 11
/// forces a root split (design notes §8.2, "leaf overfill split").
#[test]
fn root_leaf_overfill_splits_into_internal_root() {
    let mut tree = small_tree();
    for i in 0..11u8 {
        tree.insert(&[b'a' + i], b"v").unwrap();
    }
    assert_eq!(tree.allocated_node_count(), 1, "still a single leaf root");

    tree.insert(&[b'a' + 11], b"v").unwrap();
    assert_eq!(
        tree.allocated_node_count(),
        3,
        "split produced a new root plus a sibling leaf"
    );
    assert_eq!(tree.len(), 12);

    for i in 0..12u8 {
        assert_eq!(tree.get(&[b'a' + i]), Some(b"v".to_vec()));
    }
}

#[test]
fn many_insertions_preserve_order_and_membership() {
    let mut tree = small_tree();
    let mut keys: Vec<u32> = (0..500).collect();
    // Insert out of order to exercise splits on both ends.
    keys.sort_by_key(|k| (k % 7, *k));
    for k in &keys {
        tree.insert(&k.to_be_bytes(), &k.to_be_bytes()).unwrap();
    }
    assert_eq!(tree.len(), 500);

    let collected: Vec<u32> = tree
        .iter()
        .map(|(k, _)| u32::from_be_bytes(k.try_into().unwrap()))
        .collect();
    let mut expected: Vec<u32> = (0..500).collect();
    expected.sort();
    assert_eq!(collected, expected, "iteration must be strictly ordered");
}

/// Scenario: deleting a key held directly in a leaf with spare capacity
/// (case 1, no rebalancing needed).
#[test]
fn remove_from_leaf_with_spare_capacity() {
    let mut tree = small_tree();
    tree.insert(b"a", b"1").unwrap();
    tree.insert(b"b", b"2").unwrap();
    tree.insert(b"c", b"3").unwrap();

    assert_eq!(tree.remove(b"b"), Some(b"2".to_vec()));
    assert_eq!(tree.get(b"b"), None);
    assert_eq!(tree.len(), 2);
}

/// Scenario: deleting a key that has been promoted to an internal
/// separator exercises the predecessor/successor-swap path (cases 2a
/// and 2b) rather than the plain leaf-removal path (case 1).
#[test]
fn remove_internal_key_borrows_predecessor_case_2a() {
    let mut tree = small_tree();
    for i in 0..40u8 {
        tree.insert(&[i], &[i]).unwrap();
    }
    // After 40 ascending insertions at B=6, key 20 sits near the middle
    // of the key space and is very likely an internal separator.
    let victim = 20u8;
    assert_eq!(tree.remove(&[victim]), Some(vec![victim]));
    assert_eq!(tree.get(&[victim]), None);
    for i in 0..40u8 {
        if i != victim {
            assert_eq!(tree.get(&[i]), Some(vec![i]));
        }
    }
    assert_eq!(tree.len(), 39);
}

/// Scenario: repeatedly deleting keys until two minimum-sized children
/// merge and collapse the root (design notes §8.2, "merge-collapse
/// root").
#[test]
fn remove_collapses_root_after_merges() {
    let mut tree = small_tree();
    let n = 23u32; // enough to force at least one split beyond a single leaf
    for i in 0..n {
        tree.insert(&i.to_be_bytes(), &i.to_be_bytes()).unwrap();
    }
    assert!(tree.allocated_node_count() > 1);

    for i in 0..n {
        assert_eq!(
            tree.remove(&i.to_be_bytes()),
            Some(i.to_be_bytes().to_vec())
        );
    }

    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.get(&0u32.to_be_bytes()), None);
}

#[test]
fn remove_absent_key_is_a_no_op() {
    let mut tree = small_tree();
    tree.insert(b"a", b"1").unwrap();
    assert_eq!(tree.remove(b"z"), None);
    assert_eq!(tree.len(), 1);
}

#[test]
fn range_with_prefix_spanning_nodes() {
    let mut tree = small_tree();
    for word in ["apple", "application", "apply", "apt", "banana", "band"] {
        tree.insert(word.as_bytes(), word.as_bytes()).unwrap();
    }
    // Force the tree to grow past a single leaf so the prefix range
    // spans more than one node.
    for i in 0..50u32 {
        tree.insert(format!("zz{:04}", i).as_bytes(), b"v").unwrap();
    }

    let matches: Vec<String> = tree
        .range(b"app", None)
        .map(|(k, _)| String::from_utf8(k).unwrap())
        .collect();
    assert_eq!(matches, vec!["apple", "application", "apply"]);
}

#[test]
fn range_with_offset_starts_partway_through_prefix() {
    let mut tree = small_tree();
    for word in ["aa", "ab", "ac", "ad", "ae"] {
        tree.insert(word.as_bytes(), word.as_bytes()).unwrap();
    }
    let matches: Vec<String> = tree
        .range(b"a", Some(b"c"))
        .map(|(k, _)| String::from_utf8(k).unwrap())
        .collect();
    assert_eq!(matches, vec!["ac", "ad", "ae"]);
}

#[test]
fn iter_over_empty_tree_yields_nothing() {
    let tree = small_tree();
    assert_eq!(tree.iter().count(), 0);
}

#[test]
fn reload_after_persisting_preserves_tree() {
    use crate::memory::FileMemory;

    let file = tempfile::NamedTempFile::new().unwrap();
    let config = TreeConfig::new(6, 32, 32).unwrap();
    {
        let memory = FileMemory::open(file.path()).unwrap();
        let mut tree = BTree::create(memory, config).unwrap();
        for i in 0..30u32 {
            tree.insert(&i.to_be_bytes(), &i.to_be_bytes()).unwrap();
        }
    }

    let memory = FileMemory::open(file.path()).unwrap();
    let reloaded = BTree::load(memory);
    assert_eq!(reloaded.len(), 30);
    for i in 0..30u32 {
        assert_eq!(reloaded.get(&i.to_be_bytes()), Some(i.to_be_bytes().to_vec()));
    }
}
