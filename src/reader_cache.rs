/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A cache that shares one point-in-time reader between many short units of work.
//!
//! Opening a reader against the storage engine is expensive, but a reader that lives for too long
//! pins an old version of the state and keeps the engine from compacting it away. The
//! [`ReaderCache`] sits between the two:
//! - [`create_reader`](ReaderCache::create_reader) hands out [leases](ReaderLease) on the cache's
//!   *current* reader, opening a new one only when there is none.
//! - A background thread *sweeps* the cache every
//!   [`sweep_interval`](crate::config::ReaderCacheConfig::sweep_interval), retiring the current
//!   reader so that the next lease request opens a fresh one.
//! - [`create_write_batch`](ReaderCache::create_write_batch) suspends sweeping while a write batch is
//!   open, and retires the current reader as soon as the batch ends, so that leases taken after a
//!   write always see it.
//!
//! ## Retirement
//!
//! Retiring a reader removes it from the cache, and gives up the lease the cache itself held on it.
//! Leases that callers took earlier stay valid: the reader is dropped when the last of them is.
//!
//! ## Locking
//!
//! The current reader lives in an atomic slot. Taking a lease on it does not lock anything. The
//! cache's lock is only taken to open a new reader, to sweep, and to begin or end a write batch. The
//! write-in-progress flag is only read or written under that lock.
//!
//! ## Shutting down
//!
//! Dropping a `ReaderCache` stops its background threads and retires its current reader. Leases
//! still held by callers stay usable until they are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;

use crate::config::ReaderCacheConfig;
use crate::error::PersistenceError;
use crate::events::*;
use crate::leased_reader::{LeasedReader, ReaderLease};
use crate::logging::Logger;
use crate::persistence::{Persistence, PersistenceReader, PersistenceWriteBatch};
use crate::stats::{CacheStats, StatsCounters};
use crate::types::{
    Account, Address, CryptoHash, InstanceId, SlotValue, StateId, StorageSlot, TreePath, WriteFlags,
};
use crate::watchdog::LeakWatchdog;

/// Shortest sweep interval the sweeper thread will wait for.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

pub struct ReaderCache<P: Persistence> {
    shared: Arc<Shared<P>>,
    sweeper: Option<JoinHandle<()>>,
    sweeper_shutdown: Sender<()>,
    watchdog: Option<JoinHandle<()>>,
}

/// State shared between the cache's handle and its sweeper thread.
struct Shared<P: Persistence> {
    persistence: P,
    current: ArcSwapOption<LeasedReader<P::Reader>>,
    write_state: Mutex<WriteState>,
    next_instance: AtomicU64,
    watchdog: LeakWatchdog,
    stats: Arc<StatsCounters>,
    log_events: bool,
}

struct WriteState {
    write_in_progress: bool,
}

impl<P: Persistence> ReaderCache<P> {
    /// Create a cache over `persistence` and start its sweeper and leak watchdog threads.
    pub fn new(persistence: P, config: ReaderCacheConfig) -> Self {
        let stats = Arc::new(StatsCounters::default());
        let (watchdog, watchdog_thread) =
            LeakWatchdog::start(config.leak_warning_after, Arc::clone(&stats));

        let shared = Arc::new(Shared {
            persistence,
            current: ArcSwapOption::empty(),
            write_state: Mutex::new(WriteState {
                write_in_progress: false,
            }),
            next_instance: AtomicU64::new(0),
            watchdog,
            stats,
            log_events: config.log_events,
        });

        if config.sweep_interval < MIN_SWEEP_INTERVAL {
            log::warn!(
                "Sweep interval {:?} is too short, using {:?} instead",
                config.sweep_interval,
                MIN_SWEEP_INTERVAL
            );
        }
        let (sweeper_shutdown, sweeper_shutdown_receiver) = mpsc::channel();
        let sweeper = start_sweeper(
            Arc::clone(&shared),
            config.sweep_interval.max(MIN_SWEEP_INTERVAL),
            sweeper_shutdown_receiver,
        );

        ReaderCache {
            shared,
            sweeper: Some(sweeper),
            sweeper_shutdown,
            watchdog: Some(watchdog_thread),
        }
    }

    /// Get the storage engine this cache reads from.
    pub fn persistence(&self) -> &P {
        &self.shared.persistence
    }

    /// Get a lease on a reader bound to the store's latest committed state.
    ///
    /// Reuses the current reader if there is one, and otherwise opens a new one from the storage
    /// engine, which may block. Errors from the storage engine are returned unchanged.
    pub fn create_reader(&self) -> Result<ReaderLease<P::Reader>, PersistenceError> {
        if let Some(lease) = self.shared.try_lease_current() {
            return Ok(lease);
        }
        let write_state = self.shared.lock_write_state();
        self.shared.lease_locked(&write_state)
    }

    /// Open a write batch that moves the store from state `from` to state `to`.
    ///
    /// Sweeping is suspended until the returned batch is committed or dropped. Before the batch is
    /// opened, the cache is primed: if it has no current reader, one is opened, so that leases taken
    /// while the batch is being filled see the state as it was before the write. When the batch ends,
    /// the current reader is retired.
    ///
    /// Write batches are expected to be opened one at a time.
    pub fn create_write_batch(
        &self,
        from: StateId,
        to: StateId,
        flags: WriteFlags,
    ) -> Result<CachedWriteBatch<'_, P>, PersistenceError> {
        {
            let mut write_state = self.shared.lock_write_state();
            if write_state.write_in_progress {
                log::warn!("A write batch was opened while another write batch is still open");
            }
            write_state.write_in_progress = true;
            if self.shared.log_events {
                BeginWriteEvent {
                    timestamp: SystemTime::now(),
                    from,
                    to,
                }
                .log();
            }

            // Prime the cache. The lease itself is not needed.
            if let Err(err) = self.shared.lease_locked(&write_state) {
                write_state.write_in_progress = false;
                return Err(err);
            }
        }

        let window = WriteWindow {
            cache: &self.shared,
            to,
            committed: false,
        };
        let batch = self.shared.persistence.open_write_batch(from, to, flags)?;
        Ok(CachedWriteBatch { batch, window })
    }

    /// Run one sweep synchronously: retire the current reader, unless a write batch is open.
    pub fn sweep(&self) {
        self.shared.sweep()
    }

    /// Get the id of the current reader, if there is one.
    pub fn current_instance(&self) -> Option<InstanceId> {
        self.shared
            .current
            .load_full()
            .map(|current| current.instance())
    }

    pub fn stats(&self) -> CacheStats {
        self.shared.stats.snapshot()
    }
}

impl<P: Persistence> Drop for ReaderCache<P> {
    fn drop(&mut self) {
        // The sweeper is stopped first so that it cannot retire a reader concurrently with the final
        // retirement below.
        let _ = self.sweeper_shutdown.send(());
        if let Some(sweeper) = self.sweeper.take() {
            if sweeper.join().is_err() {
                log::error!("Reader cache sweeper thread panicked");
            }
        }

        self.shared.watchdog.shutdown();
        if let Some(watchdog) = self.watchdog.take() {
            if watchdog.join().is_err() {
                log::error!("Reader cache watchdog thread panicked");
            }
        }

        let write_state = self.shared.lock_write_state();
        self.shared.retire_locked(&write_state, RetireCause::Shutdown);
        if self.shared.log_events {
            ShutdownCacheEvent {
                timestamp: SystemTime::now(),
            }
            .log();
        }
    }
}

impl<P: Persistence> Shared<P> {
    fn lock_write_state(&self) -> MutexGuard<'_, WriteState> {
        self.write_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease the current reader without taking the lock. Returns `None` if there is no current reader
    /// or if it is being disposed.
    fn try_lease_current(&self) -> Option<ReaderLease<P::Reader>> {
        let current = self.current.load_full()?;
        let lease = LeasedReader::lease(&current)?;
        StatsCounters::increment(&self.stats.lease_hits);
        Some(lease)
    }

    /// Lease the current reader, opening a new one if there is none. Must be called with the write
    /// state locked, which serializes the opening of new readers.
    fn lease_locked(&self, _write_state: &WriteState) -> Result<ReaderLease<P::Reader>, PersistenceError> {
        loop {
            let candidate = match self.current.load_full() {
                Some(current) => current,
                None => {
                    let created = self.open_leased_reader()?;
                    self.current.store(Some(Arc::clone(&created)));
                    created
                }
            };

            if let Some(lease) = LeasedReader::lease(&candidate) {
                return Ok(lease);
            }

            // `candidate` was disposed between being loaded and being leased. Clear it out, unless
            // someone already replaced it with a newer reader.
            let stale = Some(candidate);
            let _ = self
                .current
                .compare_and_swap(&stale, None::<Arc<LeasedReader<P::Reader>>>);
        }
    }

    fn open_leased_reader(&self) -> Result<Arc<LeasedReader<P::Reader>>, PersistenceError> {
        let reader = self.persistence.open_reader()?;
        let instance = InstanceId::new(self.next_instance.fetch_add(1, Ordering::Relaxed));
        let state = reader.current_state();

        let created = Arc::new(LeasedReader::new(instance, reader));
        self.watchdog.watch(&created);
        StatsCounters::increment(&self.stats.readers_created);
        if self.log_events {
            CreateReaderEvent {
                timestamp: SystemTime::now(),
                instance,
                state,
            }
            .log();
        }
        Ok(created)
    }

    fn sweep(&self) {
        let write_state = self.lock_write_state();
        if write_state.write_in_progress {
            StatsCounters::increment(&self.stats.skipped_sweeps);
            if self.log_events {
                SkipSweepEvent {
                    timestamp: SystemTime::now(),
                }
                .log();
            }
            return;
        }
        self.retire_locked(&write_state, RetireCause::Sweep);
    }

    /// Remove the current reader from the cache and give up the cache's lease on it.
    fn retire_locked(&self, _write_state: &WriteState, cause: RetireCause) {
        if let Some(retired) = self.current.swap(None) {
            StatsCounters::increment(&self.stats.retirements);
            if self.log_events {
                RetireReaderEvent {
                    timestamp: SystemTime::now(),
                    instance: retired.instance(),
                    age: retired.created_at().elapsed(),
                    cause,
                }
                .log();
            }
            retired.release();
        }
    }

    /// Close the write window and retire the current reader, in one critical section so that no
    /// other write batch can begin in between.
    fn end_write(&self, to: StateId, committed: bool) {
        let mut write_state = self.lock_write_state();
        write_state.write_in_progress = false;
        if self.log_events {
            EndWriteEvent {
                timestamp: SystemTime::now(),
                to,
                committed,
            }
            .log();
        }
        self.retire_locked(&write_state, RetireCause::WriteBatch);
    }
}

fn start_sweeper<P: Persistence>(
    shared: Arc<Shared<P>>,
    interval: Duration,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => shared.sweep(),
        }
    })
}

/// Ends the write window of a [`CachedWriteBatch`] when dropped.
struct WriteWindow<'a, P: Persistence> {
    cache: &'a Shared<P>,
    to: StateId,
    committed: bool,
}

impl<P: Persistence> Drop for WriteWindow<'_, P> {
    fn drop(&mut self) {
        self.cache.end_write(self.to, self.committed)
    }
}

/// A write batch opened through a [`ReaderCache`]. Forwards every change to the storage engine's
/// batch.
///
/// The batch ends when it is [committed](PersistenceWriteBatch::commit) or dropped. Either way, the
/// underlying batch is finished first, and only then is sweeping resumed and the cache's current
/// reader retired.
pub struct CachedWriteBatch<'a, P: Persistence> {
    // Declared before `window` so that, when dropped uncommitted, the underlying batch is discarded
    // before the write window closes.
    batch: P::WriteBatch,
    window: WriteWindow<'a, P>,
}

impl<P: Persistence> PersistenceWriteBatch for CachedWriteBatch<'_, P> {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.batch.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) {
        self.batch.delete(key)
    }

    fn is_preimage_mode(&self) -> bool {
        self.batch.is_preimage_mode()
    }

    fn commit(self) -> Result<(), PersistenceError> {
        let CachedWriteBatch { batch, mut window } = self;
        let result = batch.commit();
        window.committed = result.is_ok();
        drop(window);
        result
    }

    fn set_account(&mut self, address: &Address, account: Option<&Account>) -> Result<(), PersistenceError> {
        self.batch.set_account(address, account)
    }

    fn set_account_raw(&mut self, account_path: &CryptoHash, value: Option<&[u8]>) {
        self.batch.set_account_raw(account_path, value)
    }

    fn set_storage(
        &mut self,
        address: &Address,
        slot: &StorageSlot,
        value: Option<&SlotValue>,
    ) -> Result<(), PersistenceError> {
        self.batch.set_storage(address, slot, value)
    }

    fn set_storage_raw(&mut self, account_path: &CryptoHash, slot_path: &CryptoHash, value: Option<&[u8]>) {
        self.batch.set_storage_raw(account_path, slot_path, value)
    }

    fn set_state_node(&mut self, path: &TreePath, node: Option<&[u8]>) {
        self.batch.set_state_node(path, node)
    }

    fn set_storage_node(&mut self, account_path: &CryptoHash, path: &TreePath, node: Option<&[u8]>) {
        self.batch.set_storage_node(account_path, path, node)
    }
}
