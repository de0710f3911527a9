/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
};

use borsh::{BorshDeserialize, BorshSerialize};

/// 32-byte cryptographic hash.
///
/// Within this crate, `CryptoHash`-es are encountered in three contexts:
/// 1. State roots, which identify a [`StateId`].
/// 2. Account and slot paths, which are SHA256 hashes of an [`Address`] or [`StorageSlot`] (see
///    [`paths`](crate::paths)).
/// 3. Storage roots and code hashes stored inside an [`Account`]. These can be any 32-byte hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 20-byte address of an account.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Create a new `Address` wrapping `bytes`.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 20]` value of this `Address`.
    pub const fn bytes(&self) -> [u8; 20] {
        self.0
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Number of a block in the canonical chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct BlockNumber(u64);

impl BlockNumber {
    /// Create a new `BlockNumber` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BlockNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for BlockNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Names a specific version of the state: the state after executing the block with `block_number`,
/// whose root is `state_root`.
///
/// Every [`PersistenceReader`](crate::persistence::PersistenceReader) is bound to exactly one
/// `StateId`, and every write batch transitions the store from one `StateId` to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct StateId {
    pub block_number: BlockNumber,
    pub state_root: CryptoHash,
}

impl StateId {
    pub const fn new(block_number: BlockNumber, state_root: CryptoHash) -> Self {
        Self {
            block_number,
            state_root,
        }
    }
}

/// An account as stored in the flat state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, BorshDeserialize, BorshSerialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: u128,
    pub storage_root: CryptoHash,
    pub code_hash: CryptoHash,
}

/// Index of a 32-byte word in an account's storage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct StorageSlot([u8; 32]);

impl StorageSlot {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a `StorageSlot` from a small integer index, encoded big-endian in the last 8 bytes.
    pub fn from_index(index: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&index.to_be_bytes());
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for StorageSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 32-byte word stored at a [`StorageSlot`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct SlotValue([u8; 32]);

impl SlotValue {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a `SlotValue` holding `int`, encoded big-endian in the last 16 bytes.
    pub fn from_u128(int: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&int.to_be_bytes());
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for SlotValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Path from the root of a Merkle-Patricia trie to one of its nodes.
///
/// `path` holds up to 64 nibbles packed two per byte, of which only the first `length` are
/// meaningful. Nibbles past `length` are expected to be zero, so that two equal paths always
/// produce equal keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct TreePath {
    pub path: CryptoHash,
    pub length: u8,
}

impl TreePath {
    /// Maximum number of nibbles in a `TreePath`.
    pub const MAX_LENGTH: u8 = 64;

    /// The empty path, pointing at the root node.
    pub const fn root() -> Self {
        Self {
            path: CryptoHash::new([0u8; 32]),
            length: 0,
        }
    }

    /// Create a `TreePath` out of `nibbles`, each of which must be less than 16.
    ///
    /// Returns `None` if there are more than [`MAX_LENGTH`](Self::MAX_LENGTH) nibbles or if any
    /// nibble is out of range.
    pub fn from_nibbles(nibbles: &[u8]) -> Option<Self> {
        if nibbles.len() > Self::MAX_LENGTH as usize || nibbles.iter().any(|nibble| *nibble > 0x0f) {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, nibble) in nibbles.iter().enumerate() {
            if i % 2 == 0 {
                bytes[i / 2] |= nibble << 4;
            } else {
                bytes[i / 2] |= nibble;
            }
        }
        Some(Self {
            path: CryptoHash::new(bytes),
            length: nibbles.len() as u8,
        })
    }
}

/// Opaque hints passed through to the storage engine when opening a write batch.
///
/// The reader cache never interprets these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct WriteFlags(u8);

impl WriteFlags {
    pub const NONE: WriteFlags = WriteFlags(0);
    /// Skip the write-ahead log. The batch is durable only after the next flush.
    pub const DISABLE_WAL: WriteFlags = WriteFlags(1);
    /// Hint that the batch is part of a long import and may be applied lazily.
    pub const BULK_IMPORT: WriteFlags = WriteFlags(1 << 1);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: WriteFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: WriteFlags) -> WriteFlags {
        WriteFlags(self.0 | other.0)
    }
}

/// Process-unique identifier of a [`LeasedReader`](crate::leased_reader::LeasedReader), assigned in
/// creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
