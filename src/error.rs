/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/
//! Errors raised by storage engines through the [`persistence`](crate::persistence) traits.
//!
//! The [reader cache](crate::reader_cache) never produces these errors itself; it only passes them
//! through, unchanged, from the storage engine to the caller.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::types::{CryptoHash, StateId, TreePath};

/// Error when trying to open, read from, or write to the storage engine.
///
/// The error may arise in the following circumstances:
/// 1. The storage engine failed to perform I/O,
/// 2. A value could not be serialized before being written, or deserialized after being read,
/// 3. A write batch was opened from a state that is not the store's current state,
/// 4. Any other failure specific to the storage engine.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize the value of {key}: {source}")]
    SerializeValue {
        key: Key,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to deserialize the value of {key}: {source}")]
    DeserializeValue {
        key: Key,
        #[source]
        source: std::io::Error,
    },

    #[error("write batch expects to start from state {expected:?}, but the store is at {found:?}")]
    StateMismatch { expected: StateId, found: StateId },

    #[error("storage engine error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The logical record that a [`PersistenceError`] relates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Account { account_path: CryptoHash },
    StorageSlot { account_path: CryptoHash, slot_path: CryptoHash },
    StateNode { path: TreePath },
    StorageNode { account_path: CryptoHash, path: TreePath },
    Raw { key: Vec<u8> },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Account { account_path } => write!(f, "Account at path {}", account_path),
            Key::StorageSlot {
                account_path,
                slot_path,
            } => write!(
                f,
                "Storage slot {} of account at path {}",
                slot_path, account_path
            ),
            Key::StateNode { path } => write!(f, "State trie node at {:?}", path),
            Key::StorageNode { account_path, path } => write!(
                f,
                "Storage trie node at {:?} of account at path {}",
                path, account_path
            ),
            Key::Raw { key } => write!(f, "Raw key {:?}", key),
        }
    }
}
