/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! User-defined parameters of a [`ReaderCache`](crate::reader_cache::ReaderCache).
//!
//! The configuration can be defined using the builder pattern, for example:
//!
//! ```
//! # use std::time::Duration;
//! # use state_reader_cache::config::ReaderCacheConfig;
//! let config = ReaderCacheConfig::builder()
//!     .sweep_interval(Duration::from_secs(5))
//!     .leak_warning_after(Duration::from_secs(60))
//!     .log_events(true)
//!     .build();
//! ```

use std::time::Duration;

use typed_builder::TypedBuilder;

/// Stores the user-defined parameters of a reader cache, that is:
/// 1. The sweep interval, which defines how often the cache retires its current reader so that the
///    storage engine can reclaim the space the reader pins.
/// 2. The leak warning delay, which defines how long a reader may stay alive before a warning is
///    logged about it.
/// 3. The "Log Events" flag, if set to "true" then lifecycle events are logged.
///
/// ## Sweep interval
///
/// A reader that stays cached for a long time pins an old version of the state, which blocks the
/// storage engine from compacting it away. A short interval bounds how much old state is pinned; a
/// long interval lets more units of work share one reader. The interval must be non-zero.
///
/// ## Leak warning delay
///
/// Should be several times the sweep interval: a reader is expected to be retired by a sweep and then
/// released by its last lease holder within a handful of processing cycles. The warning is advisory
/// only and never forces a reader to be released.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReaderCacheConfig]. On the builder call the following methods to construct a valid [ReaderCacheConfig].

    Optional:
    - `.sweep_interval(...)`
    - `.leak_warning_after(...)`
    - `.log_events(...)`
"))]
pub struct ReaderCacheConfig {
    #[builder(
        default = Duration::from_secs(5),
        setter(doc = "Set how often the current reader is retired. Optional, defaults to 5 seconds.")
    )]
    pub sweep_interval: Duration,
    #[builder(
        default = Duration::from_secs(60),
        setter(doc = "Set how long a reader may live before a leak warning is logged. Optional, defaults to 60 seconds.")
    )]
    pub leak_warning_after: Duration,
    #[builder(
        default = true,
        setter(doc = "Enable logging of lifecycle events? Optional, defaults to true.")
    )]
    pub log_events: bool,
}

impl Default for ReaderCacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
