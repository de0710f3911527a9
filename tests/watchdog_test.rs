use std::{thread, time::Duration};

use log::LevelFilter;
use state_reader_cache::{PersistenceReader, ReaderCache, ReaderCacheConfig};

mod common;

use crate::common::{logging::setup_logger, mem_persistence::MemPersistence, state};

fn short_leak_warning_config() -> ReaderCacheConfig {
    ReaderCacheConfig::builder()
        .sweep_interval(Duration::from_secs(3600))
        .leak_warning_after(Duration::from_millis(20))
        .build()
}

#[test]
fn long_lived_reader_is_reported() {
    setup_logger(LevelFilter::Trace);

    let persistence = MemPersistence::new(state(0));
    let cache = ReaderCache::new(persistence.clone(), short_leak_warning_config());

    // Hold a lease well past the warning delay.
    let lease = cache.create_reader().unwrap();
    let mut waited = Duration::ZERO;
    while cache.stats().suspected_leaks == 0 {
        assert!(
            waited < Duration::from_secs(10),
            "watchdog did not fire within 10 seconds"
        );
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    // The warning is advisory: the reader stays usable.
    assert_eq!(cache.stats().suspected_leaks, 1);
    assert_eq!(lease.current_state(), state(0));
    assert_eq!(persistence.readers_released(), 0);
}

#[test]
fn released_reader_is_not_reported() {
    setup_logger(LevelFilter::Trace);

    let persistence = MemPersistence::new(state(0));
    let cache = ReaderCache::new(persistence.clone(), short_leak_warning_config());

    drop(cache.create_reader().unwrap());
    cache.sweep();
    assert_eq!(persistence.readers_released(), 1);

    thread::sleep(Duration::from_millis(200));
    assert_eq!(cache.stats().suspected_leaks, 0);
}
