/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/
//! Byte-prefixes that specify where each kind of state record is stored in the storage engine's
//! flat key-value space.
//!
//! # Storage of state records
//!
//! Every record is stored as a **Borsh-serialized value** (or, for trie nodes, as the opaque bytes
//! given to the write batch) under a **key** formed by concatenating a one-byte prefix constant with
//! fixed-width components:
//!
//! | Record       | Key                                                   |
//! |--------------|-------------------------------------------------------|
//! | Account      | [`ACCOUNTS`] ‖ account path                           |
//! | Storage slot | [`STORAGE`] ‖ account path ‖ slot path                |
//! | State node   | [`STATE_NODES`] ‖ path length ‖ path                  |
//! | Storage node | [`STORAGE_NODES`] ‖ account path ‖ path length ‖ path |
//!
//! Because every component is fixed-width, all records belonging to one account share the prefix
//! `STORAGE ‖ account path`, which is what [`storage_iterator`] ranges over.
//!
//! ## Account and slot paths
//!
//! Normally, account and slot paths are the SHA256 hashes of the [`Address`] or [`StorageSlot`].
//! Stores running in **preimage mode** instead key records by the raw value (left-padded with zeros
//! to 32 bytes), so that iteration yields the original addresses and slots.
//!
//! [`storage_iterator`]: crate::persistence::PersistenceReader::storage_iterator

use sha2::{Digest, Sha256};

use crate::types::{Address, CryptoHash, StorageSlot, TreePath};

pub const ACCOUNTS: [u8; 1] = [0];
pub const STORAGE: [u8; 1] = [1];
pub const STATE_NODES: [u8; 1] = [2];
pub const STORAGE_NODES: [u8; 1] = [3];

/// Takes references to two byteslices and returns a vector containing the bytes of the first one, and
/// then the bytes of the second one.
pub fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}

/// Get the path under which `address`'s account and storage are keyed.
pub fn account_path(address: &Address, preimage_mode: bool) -> CryptoHash {
    if preimage_mode {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(&address.bytes());
        CryptoHash::new(bytes)
    } else {
        sha256(&address.bytes())
    }
}

/// Get the path under which `slot` is keyed within an account's storage.
pub fn slot_path(slot: &StorageSlot, preimage_mode: bool) -> CryptoHash {
    if preimage_mode {
        CryptoHash::new(slot.bytes())
    } else {
        sha256(&slot.bytes())
    }
}

pub fn account_key(account_path: &CryptoHash) -> Vec<u8> {
    combine(&ACCOUNTS, &account_path.bytes())
}

pub fn storage_key(account_path: &CryptoHash, slot_path: &CryptoHash) -> Vec<u8> {
    combine(&storage_prefix(account_path), &slot_path.bytes())
}

/// The prefix shared by every storage slot of the account at `account_path`.
pub fn storage_prefix(account_path: &CryptoHash) -> Vec<u8> {
    combine(&STORAGE, &account_path.bytes())
}

pub fn state_node_key(path: &TreePath) -> Vec<u8> {
    combine(&STATE_NODES, &tree_path_bytes(path))
}

pub fn storage_node_key(account_path: &CryptoHash, path: &TreePath) -> Vec<u8> {
    combine(
        &combine(&STORAGE_NODES, &account_path.bytes()),
        &tree_path_bytes(path),
    )
}

/// Recover the fixed-width component that follows `prefix` in `key`.
///
/// Returns `None` if `key` does not start with `prefix` or is not exactly 32 bytes longer than it.
pub fn suffix_hash(key: &[u8], prefix: &[u8]) -> Option<CryptoHash> {
    let suffix = key.strip_prefix(prefix)?;
    let bytes: [u8; 32] = suffix.try_into().ok()?;
    Some(CryptoHash::new(bytes))
}

fn tree_path_bytes(path: &TreePath) -> Vec<u8> {
    combine(&[path.length], &path.path.bytes())
}

fn sha256(bytes: &[u8]) -> CryptoHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    CryptoHash::new(hasher.finalize().into())
}
