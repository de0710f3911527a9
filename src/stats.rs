/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Monotonic counters describing what a reader cache has done since it was created.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time copy of a cache's counters. Returned by
/// [`ReaderCache::stats`](crate::reader_cache::ReaderCache::stats).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Readers opened from the storage engine.
    pub readers_created: u64,
    /// Leases served from the current reader without taking the cache's lock.
    pub lease_hits: u64,
    /// Times the cache dropped its hold on its current reader.
    pub retirements: u64,
    /// Sweep ticks that did nothing because a write batch was open.
    pub skipped_sweeps: u64,
    /// Readers that were still alive when their leak watchdog fired.
    pub suspected_leaks: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    pub(crate) readers_created: AtomicU64,
    pub(crate) lease_hits: AtomicU64,
    pub(crate) retirements: AtomicU64,
    pub(crate) skipped_sweeps: AtomicU64,
    pub(crate) suspected_leaks: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            readers_created: self.readers_created.load(Ordering::Relaxed),
            lease_hits: self.lease_hits.load(Ordering::Relaxed),
            retirements: self.retirements.load(Ordering::Relaxed),
            skipped_sweeps: self.skipped_sweeps.load(Ordering::Relaxed),
            suspected_leaks: self.suspected_leaks.load(Ordering::Relaxed),
        }
    }
}
