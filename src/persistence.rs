/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/
//! Defines the [Persistence] trait, which specifies the required interface for the storage engine
//! provided by the user, together with the reader and write batch handles it hands out.
//!
//! Given methods to get and set the value for a given key in bytes, this module also provides methods
//! to get and set the state records described in [crate::paths]. Storage engines that can serve a
//! record more efficiently than by a raw key lookup are free to override the provided methods.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::{Key, PersistenceError};
use crate::paths;
use crate::types::{Account, Address, CryptoHash, SlotValue, StateId, StorageSlot, TreePath, WriteFlags};

/// A raw key-value pair yielded by [`PersistenceReader::iter_prefix`].
pub type FlatEntry = (Vec<u8>, Vec<u8>);

/// Factory for point-in-time readers and write batches over a versioned state store.
pub trait Persistence: Send + Sync + 'static {
    type Reader: PersistenceReader;
    type WriteBatch: PersistenceWriteBatch;

    /// Open a reader bound to the store's current state. May block on I/O.
    fn open_reader(&self) -> Result<Self::Reader, PersistenceError>;

    /// Begin a transition of the store from state `from` to state `to`. The transition is applied
    /// when the returned batch is [committed](PersistenceWriteBatch::commit).
    fn open_write_batch(
        &self,
        from: StateId,
        to: StateId,
        flags: WriteFlags,
    ) -> Result<Self::WriteBatch, PersistenceError>;
}

/// A handle into one specific version of the state.
///
/// Readers hold on to resources in the storage engine (e.g., a snapshot that pins old data and
/// prevents compaction from reclaiming it) until they are dropped.
pub trait PersistenceReader: Send + Sync + 'static {
    /// Iterator over the raw entries under a prefix. It owns whatever it needs from the reader, so it
    /// may be driven after the call that created it returns.
    type FlatIterator: Iterator<Item = Result<FlatEntry, PersistenceError>> + Send;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Iterate through every entry whose key starts with `prefix`, in ascending key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Self::FlatIterator, PersistenceError>;

    /// The state version this reader is bound to.
    fn current_state(&self) -> StateId;

    /// Whether the store keys accounts and slots by their raw value instead of by their hash. See
    /// [crate::paths].
    fn is_preimage_mode(&self) -> bool;

    /* ↓↓↓ Accounts ↓↓↓ */

    fn get_account(&self, address: &Address) -> Result<Option<Account>, PersistenceError> {
        let account_path = paths::account_path(address, self.is_preimage_mode());
        if let Some(bytes) = self.get_account_raw(&account_path)? {
            Ok(Some(Account::try_from_slice(&bytes).map_err(|err| {
                PersistenceError::DeserializeValue {
                    key: Key::Account { account_path },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn get_account_raw(&self, account_path: &CryptoHash) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.get(&paths::account_key(account_path))
    }

    /* ↓↓↓ Storage ↓↓↓ */

    fn try_get_slot(
        &self,
        address: &Address,
        slot: &StorageSlot,
    ) -> Result<Option<SlotValue>, PersistenceError> {
        let preimage_mode = self.is_preimage_mode();
        let account_path = paths::account_path(address, preimage_mode);
        let slot_path = paths::slot_path(slot, preimage_mode);
        if let Some(bytes) = self.get_storage_raw(&account_path, &slot_path)? {
            Ok(Some(SlotValue::try_from_slice(&bytes).map_err(|err| {
                PersistenceError::DeserializeValue {
                    key: Key::StorageSlot {
                        account_path,
                        slot_path,
                    },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    fn get_storage_raw(
        &self,
        account_path: &CryptoHash,
        slot_path: &CryptoHash,
    ) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.get(&paths::storage_key(account_path, slot_path))
    }

    /* ↓↓↓ Trie nodes ↓↓↓ */

    fn load_state_node(&self, path: &TreePath) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.get(&paths::state_node_key(path))
    }

    fn load_storage_node(
        &self,
        account_path: &CryptoHash,
        path: &TreePath,
    ) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.get(&paths::storage_node_key(account_path, path))
    }

    /* ↓↓↓ Iteration ↓↓↓ */

    /// Iterate through every account, in ascending order of account path.
    fn account_iterator(&self) -> Result<AccountIterator<Self::FlatIterator>, PersistenceError> {
        Ok(AccountIterator {
            entries: self.iter_prefix(&paths::ACCOUNTS)?,
        })
    }

    /// Iterate through every non-empty slot of the account at `account_path`, in ascending order of
    /// slot path.
    fn storage_iterator(
        &self,
        account_path: &CryptoHash,
    ) -> Result<StorageIterator<Self::FlatIterator>, PersistenceError> {
        let prefix = paths::storage_prefix(account_path);
        Ok(StorageIterator {
            entries: self.iter_prefix(&prefix)?,
            account_path: *account_path,
            prefix,
        })
    }
}

/// Yields `(account path, account)` pairs. See [`PersistenceReader::account_iterator`].
pub struct AccountIterator<I> {
    entries: I,
}

impl<I: Iterator<Item = Result<FlatEntry, PersistenceError>>> Iterator for AccountIterator<I> {
    type Item = Result<(CryptoHash, Account), PersistenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.entries.next()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        let Some(account_path) = paths::suffix_hash(&key, &paths::ACCOUNTS) else {
            return Some(Err(PersistenceError::DeserializeValue {
                key: Key::Raw { key },
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "account key has an unexpected length",
                ),
            }));
        };
        Some(
            Account::try_from_slice(&value)
                .map(|account| (account_path, account))
                .map_err(|err| PersistenceError::DeserializeValue {
                    key: Key::Account { account_path },
                    source: err,
                }),
        )
    }
}

/// Yields `(slot path, value)` pairs of one account. See [`PersistenceReader::storage_iterator`].
pub struct StorageIterator<I> {
    entries: I,
    account_path: CryptoHash,
    prefix: Vec<u8>,
}

impl<I: Iterator<Item = Result<FlatEntry, PersistenceError>>> Iterator for StorageIterator<I> {
    type Item = Result<(CryptoHash, SlotValue), PersistenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match self.entries.next()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        let Some(slot_path) = paths::suffix_hash(&key, &self.prefix) else {
            return Some(Err(PersistenceError::DeserializeValue {
                key: Key::Raw { key },
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "storage key has an unexpected length",
                ),
            }));
        };
        Some(
            SlotValue::try_from_slice(&value)
                .map(|slot_value| (slot_path, slot_value))
                .map_err(|err| PersistenceError::DeserializeValue {
                    key: Key::StorageSlot {
                        account_path: self.account_path,
                        slot_path,
                    },
                    source: err,
                }),
        )
    }
}

/// A set of changes that moves the store from one state to another.
///
/// Nothing is visible to readers until [`commit`](Self::commit) returns. Dropping a batch without
/// committing it discards its changes.
pub trait PersistenceWriteBatch: Send {
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);

    /// See [`PersistenceReader::is_preimage_mode`].
    fn is_preimage_mode(&self) -> bool;

    /// Durably apply the batch to the store.
    fn commit(self) -> Result<(), PersistenceError>
    where
        Self: Sized;

    /* ↓↓↓ Accounts ↓↓↓ */

    /// Set `address`'s account, or delete it if `account` is `None`.
    fn set_account(&mut self, address: &Address, account: Option<&Account>) -> Result<(), PersistenceError> {
        let account_path = paths::account_path(address, self.is_preimage_mode());
        match account {
            Some(account) => {
                let bytes = account
                    .try_to_vec()
                    .map_err(|err| PersistenceError::SerializeValue {
                        key: Key::Account { account_path },
                        source: err,
                    })?;
                self.set_account_raw(&account_path, Some(&bytes));
            }
            None => self.set_account_raw(&account_path, None),
        }
        Ok(())
    }

    fn set_account_raw(&mut self, account_path: &CryptoHash, value: Option<&[u8]>) {
        let key = paths::account_key(account_path);
        match value {
            Some(value) => self.set(&key, value),
            None => self.delete(&key),
        }
    }

    /* ↓↓↓ Storage ↓↓↓ */

    /// Set a slot of `address`'s storage, or clear it if `value` is `None`.
    fn set_storage(
        &mut self,
        address: &Address,
        slot: &StorageSlot,
        value: Option<&SlotValue>,
    ) -> Result<(), PersistenceError> {
        let preimage_mode = self.is_preimage_mode();
        let account_path = paths::account_path(address, preimage_mode);
        let slot_path = paths::slot_path(slot, preimage_mode);
        match value {
            Some(value) => {
                let bytes = value
                    .try_to_vec()
                    .map_err(|err| PersistenceError::SerializeValue {
                        key: Key::StorageSlot {
                            account_path,
                            slot_path,
                        },
                        source: err,
                    })?;
                self.set_storage_raw(&account_path, &slot_path, Some(&bytes));
            }
            None => self.set_storage_raw(&account_path, &slot_path, None),
        }
        Ok(())
    }

    fn set_storage_raw(&mut self, account_path: &CryptoHash, slot_path: &CryptoHash, value: Option<&[u8]>) {
        let key = paths::storage_key(account_path, slot_path);
        match value {
            Some(value) => self.set(&key, value),
            None => self.delete(&key),
        }
    }

    /* ↓↓↓ Trie nodes ↓↓↓ */

    fn set_state_node(&mut self, path: &TreePath, node: Option<&[u8]>) {
        let key = paths::state_node_key(path);
        match node {
            Some(node) => self.set(&key, node),
            None => self.delete(&key),
        }
    }

    fn set_storage_node(&mut self, account_path: &CryptoHash, path: &TreePath, node: Option<&[u8]>) {
        let key = paths::storage_node_key(account_path, path);
        match node {
            Some(node) => self.set(&key, node),
            None => self.delete(&key),
        }
    }
}
