use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use log::LevelFilter;
use rand::Rng;
use state_reader_cache::{
    error::Key,
    paths,
    types::{Address, InstanceId, WriteFlags},
    LeasedReader, Persistence, PersistenceError, PersistenceReader, PersistenceWriteBatch,
};

mod common;

use crate::common::{
    account, address, logging::setup_logger, mem_persistence::MemPersistence, state,
};

#[test]
fn new_reader_starts_with_one_lease_and_is_disposed_exactly_once() {
    setup_logger(LevelFilter::Trace);

    let persistence = MemPersistence::new(state(0));
    let reader = Arc::new(LeasedReader::new(
        InstanceId::new(0),
        persistence.open_reader().unwrap(),
    ));
    assert_eq!(reader.leases(), Some(1));

    // 1. Take and give up an extra lease. The creator's lease keeps the reader alive.
    let lease = LeasedReader::lease(&reader).unwrap();
    assert_eq!(reader.leases(), Some(2));
    drop(lease);
    assert_eq!(reader.leases(), Some(1));
    assert_eq!(persistence.readers_released(), 0);

    // 2. Give up the creator's lease. This disposes the reader.
    reader.release();
    assert!(reader.is_disposed());
    assert_eq!(persistence.readers_released(), 1);

    // 3. A disposed reader can no longer be leased, and releasing it again does nothing.
    assert!(!reader.try_acquire());
    assert!(LeasedReader::lease(&reader).is_none());
    reader.release();
    assert!(reader.is_disposed());
    assert_eq!(persistence.readers_released(), 1);
}

#[test]
fn last_lease_holder_disposes_the_reader() {
    setup_logger(LevelFilter::Trace);

    let persistence = MemPersistence::new(state(0));
    let reader = Arc::new(LeasedReader::new(
        InstanceId::new(7),
        persistence.open_reader().unwrap(),
    ));

    let lease = LeasedReader::lease(&reader).unwrap();
    assert_eq!(lease.instance(), InstanceId::new(7));

    // The creator goes away first. The lease holder is now the one keeping the reader alive.
    reader.release();
    assert!(!reader.is_disposed());
    assert_eq!(lease.current_state(), state(0));
    assert_eq!(persistence.readers_released(), 0);

    drop(lease);
    assert!(reader.is_disposed());
    assert_eq!(persistence.readers_released(), 1);
}

#[test]
fn concurrent_leasing_disposes_exactly_once() {
    setup_logger(LevelFilter::Info);

    const THREADS: usize = 8;

    let persistence = MemPersistence::new(state(0));
    let reader = Arc::new(LeasedReader::new(
        InstanceId::new(0),
        persistence.open_reader().unwrap(),
    ));
    let successful_leases = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut rng = rand::thread_rng();
                for _ in 0..rng.gen_range(200, 1000) {
                    if let Some(lease) = LeasedReader::lease(&reader) {
                        successful_leases.fetch_add(1, Ordering::Relaxed);
                        // A live lease must always be able to read.
                        assert_eq!(lease.current_state(), state(0));
                    }
                }
            });
        }

        // Give up the creator's lease while the other threads are still leasing.
        thread::sleep(Duration::from_millis(1));
        reader.release();
    });

    assert!(reader.is_disposed());
    assert_eq!(persistence.readers_opened(), 1);
    assert_eq!(persistence.readers_released(), 1);
    log::info!(
        "{} leases were taken before the reader was disposed",
        successful_leases.load(Ordering::Relaxed)
    );
}

#[test]
fn lease_forwards_reads_to_the_wrapped_reader() {
    setup_logger(LevelFilter::Trace);

    // 1. Commit an account to the store.
    let persistence = MemPersistence::new(state(0));
    let mut batch = persistence
        .open_write_batch(state(0), state(1), WriteFlags::NONE)
        .unwrap();
    batch
        .set_account(&address(1), Some(&account(3, 1000)))
        .unwrap();
    batch.commit().unwrap();

    // 2. Read it back through a lease.
    let reader = Arc::new(LeasedReader::new(
        InstanceId::new(0),
        persistence.open_reader().unwrap(),
    ));
    let lease = LeasedReader::lease(&reader).unwrap();
    assert_eq!(lease.current_state(), state(1));
    assert!(!lease.is_preimage_mode());
    assert_eq!(
        lease.get_account(&address(1)).unwrap(),
        Some(account(3, 1000))
    );
    assert_eq!(lease.get_account(&address(2)).unwrap(), None);
    assert_eq!(lease.account_iterator().unwrap().count(), 1);

    drop(lease);
    reader.release();
}

#[test]
fn lease_returns_decode_errors_unchanged() {
    setup_logger(LevelFilter::Trace);

    let persistence = MemPersistence::new(state(0));
    let broken: Address = address(9);
    let account_path = paths::account_path(&broken, false);
    persistence.put_raw(&paths::account_key(&account_path), &[1, 2, 3]);

    let reader = Arc::new(LeasedReader::new(
        InstanceId::new(0),
        persistence.open_reader().unwrap(),
    ));
    let lease = LeasedReader::lease(&reader).unwrap();
    match lease.get_account(&broken) {
        Err(PersistenceError::DeserializeValue { key, .. }) => {
            assert_eq!(key, Key::Account { account_path })
        }
        other => panic!("expected a deserialization error, got {:?}", other),
    }

    drop(lease);
    reader.release();
}
