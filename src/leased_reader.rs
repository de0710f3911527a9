/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reference-counted sharing of a single [`PersistenceReader`].
//!
//! A [`LeasedReader`] owns one reader opened from the storage engine and counts the *leases* held on
//! it. The wrapped reader is dropped (and so released to the storage engine) exactly once: by whoever
//! releases the last lease.
//!
//! ## Lease count
//!
//! The lease count is a small state machine stored in one atomic integer:
//!
//! ```text
//!   n ≥ 1  ──release──▶  n - 1
//!   n ≥ 0  ──try_acquire──▶  n + 1
//!   0      ──compare_exchange──▶  DISPOSED   (the winner drops the wrapped reader)
//!   DISPOSED  (terminal: try_acquire fails)
//! ```
//!
//! A new `LeasedReader` starts at 1. That first lease represents the hold of whoever created it
//! (in practice, the [reader cache](crate::reader_cache)), and is given up with [`release`].
//!
//! Acquiring from 0 is allowed. The releaser that brought the count down to 0 then loses its
//! `0 → DISPOSED` exchange, and disposal is left to whoever brings the count back down to 0. Because
//! `DISPOSED` is negative and terminal, at most one exchange ever succeeds.
//!
//! [`release`]: LeasedReader::release

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, PoisonError, RwLock, Weak,
};
use std::time::Instant;

use crate::error::PersistenceError;
use crate::persistence::{AccountIterator, PersistenceReader, StorageIterator};
use crate::types::{Account, Address, CryptoHash, InstanceId, SlotValue, StateId, StorageSlot, TreePath};

/// Lease count of a reader whose wrapped reader is being, or has been, dropped.
pub(crate) const DISPOSED: i64 = i64::MIN;

/// Get the number of leases a lease counter records, or `None` if the counter is [`DISPOSED`].
pub(crate) fn outstanding_leases(lease_count: &AtomicI64) -> Option<u64> {
    let count = lease_count.load(Ordering::Acquire);
    if count < 0 {
        None
    } else {
        Some(count as u64)
    }
}

pub struct LeasedReader<R: PersistenceReader> {
    instance: InstanceId,
    created_at: Instant,
    lease_count: Arc<AtomicI64>,
    inner: RwLock<Option<R>>,
}

impl<R: PersistenceReader> LeasedReader<R> {
    /// Wrap `reader`, starting with one lease held by the caller.
    pub fn new(instance: InstanceId, reader: R) -> Self {
        Self {
            instance,
            created_at: Instant::now(),
            lease_count: Arc::new(AtomicI64::new(1)),
            inner: RwLock::new(Some(reader)),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the number of outstanding leases, or `None` if the wrapped reader has been dropped.
    pub fn leases(&self) -> Option<u64> {
        outstanding_leases(&self.lease_count)
    }

    pub fn is_disposed(&self) -> bool {
        self.leases().is_none()
    }

    /// Get a non-owning handle to the lease counter, for observers that must not keep it alive.
    pub(crate) fn lease_counter(&self) -> Weak<AtomicI64> {
        Arc::downgrade(&self.lease_count)
    }

    /// Try to take one more lease. Returns `false` if the wrapped reader is already being dropped, in
    /// which case the caller should find or create another reader.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.lease_count.load(Ordering::Acquire);
        loop {
            if count < 0 {
                return false;
            }
            match self.lease_count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
    }

    /// Give up one lease. If it was the last one, drop the wrapped reader.
    ///
    /// Every successful [`try_acquire`](Self::try_acquire), plus the initial lease, must be matched by
    /// exactly one call to this method.
    pub fn release(&self) {
        let mut count = self.lease_count.load(Ordering::Acquire);
        loop {
            if count <= 0 {
                log::error!(
                    "LeasedReader {} released more times than it was leased (lease count {})",
                    self.instance,
                    count
                );
                return;
            }
            match self.lease_count.compare_exchange_weak(
                count,
                count - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => count = actual,
            }
        }

        if count == 1
            && self
                .lease_count
                .compare_exchange(0, DISPOSED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.dispose();
        }
    }

    fn dispose(&self) {
        let reader = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(reader);
    }

    /// Take a lease and wrap it in a [`ReaderLease`] that gives it up when dropped.
    pub fn lease(this: &Arc<Self>) -> Option<ReaderLease<R>> {
        if this.try_acquire() {
            Some(ReaderLease {
                reader: Arc::clone(this),
            })
        } else {
            None
        }
    }

    fn with_reader<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.as_ref() {
            Some(reader) => f(reader),
            // Unreachable: `ReaderLease` is the only caller, and a live lease keeps the count above zero.
            None => panic!(
                "LeasedReader {} was read from after it was disposed",
                self.instance
            ),
        }
    }
}

/// A lease on a [`LeasedReader`]. Forwards every read to the wrapped reader, and gives up the lease
/// when dropped.
///
/// Leases are meant to be short-lived: one per unit of work. A reader that is leased for too long
/// keeps an old version of the state pinned in the storage engine.
pub struct ReaderLease<R: PersistenceReader> {
    reader: Arc<LeasedReader<R>>,
}

impl<R: PersistenceReader> ReaderLease<R> {
    /// Get the id of the [`LeasedReader`] this lease is on. Two leases with the same instance id read
    /// from the same reader.
    pub fn instance(&self) -> InstanceId {
        self.reader.instance()
    }
}

impl<R: PersistenceReader> Drop for ReaderLease<R> {
    fn drop(&mut self) {
        self.reader.release()
    }
}

impl<R: PersistenceReader> PersistenceReader for ReaderLease<R> {
    type FlatIterator = R::FlatIterator;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.reader.with_reader(|reader| reader.get(key))
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Self::FlatIterator, PersistenceError> {
        self.reader.with_reader(|reader| reader.iter_prefix(prefix))
    }

    fn current_state(&self) -> StateId {
        self.reader.with_reader(|reader| reader.current_state())
    }

    fn is_preimage_mode(&self) -> bool {
        self.reader.with_reader(|reader| reader.is_preimage_mode())
    }

    fn get_account(&self, address: &Address) -> Result<Option<Account>, PersistenceError> {
        self.reader.with_reader(|reader| reader.get_account(address))
    }

    fn get_account_raw(&self, account_path: &CryptoHash) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.reader
            .with_reader(|reader| reader.get_account_raw(account_path))
    }

    fn try_get_slot(
        &self,
        address: &Address,
        slot: &StorageSlot,
    ) -> Result<Option<SlotValue>, PersistenceError> {
        self.reader
            .with_reader(|reader| reader.try_get_slot(address, slot))
    }

    fn get_storage_raw(
        &self,
        account_path: &CryptoHash,
        slot_path: &CryptoHash,
    ) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.reader
            .with_reader(|reader| reader.get_storage_raw(account_path, slot_path))
    }

    fn load_state_node(&self, path: &TreePath) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.reader.with_reader(|reader| reader.load_state_node(path))
    }

    fn load_storage_node(
        &self,
        account_path: &CryptoHash,
        path: &TreePath,
    ) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.reader
            .with_reader(|reader| reader.load_storage_node(account_path, path))
    }

    fn account_iterator(&self) -> Result<AccountIterator<Self::FlatIterator>, PersistenceError> {
        self.reader.with_reader(|reader| reader.account_iterator())
    }

    fn storage_iterator(
        &self,
        account_path: &CryptoHash,
    ) -> Result<StorageIterator<Self::FlatIterator>, PersistenceError> {
        self.reader
            .with_reader(|reader| reader.storage_iterator(account_path))
    }
}
