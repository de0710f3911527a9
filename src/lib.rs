/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A cache of point-in-time readers over a versioned blockchain state store.
//!
//! Block processing opens a state reader for every unit of work. Opening readers is expensive, and a
//! reader that is kept for too long stops the storage engine from reclaiming the space taken up by old
//! versions of the state. This crate shares one reader between many units of work, replaces it at a
//! fixed cadence, and makes sure that readers never see a half-applied write:
//! - [`leased_reader`] counts the leases on a shared reader and releases it exactly once.
//! - [`reader_cache`] hands out leases, sweeps the shared reader periodically, and coordinates with
//!   write batches.
//! - [`persistence`] defines the interface the storage engine has to implement.
//!
//! ## Example
//!
//! ```ignore
//! let cache = ReaderCache::new(persistence, ReaderCacheConfig::default());
//!
//! // Reading.
//! let reader = cache.create_reader()?;
//! let account = reader.get_account(&address)?;
//! drop(reader);
//!
//! // Writing.
//! let mut batch = cache.create_write_batch(from, to, WriteFlags::NONE)?;
//! batch.set_account(&address, Some(&account))?;
//! batch.commit()?;
//! ```

pub mod config;

pub mod error;

pub mod events;

pub mod leased_reader;

pub mod logging;

pub mod paths;

pub mod persistence;

pub mod reader_cache;

pub mod stats;

pub mod types;

pub(crate) mod watchdog;

pub use config::ReaderCacheConfig;
pub use error::PersistenceError;
pub use leased_reader::{LeasedReader, ReaderLease};
pub use persistence::{Persistence, PersistenceReader, PersistenceWriteBatch};
pub use reader_cache::{CachedWriteBatch, ReaderCache};
pub use stats::CacheStats;
