//! A simple, volatile, in-memory implementation of [`Persistence`].
//!
//! Committed state is kept in a copy-on-write map: every reader holds an `Arc` to the map as it was
//! when the reader was opened, and every commit swaps in a new map. Readers therefore never observe
//! writes committed after they were opened.

use std::{
    collections::BTreeMap,
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use state_reader_cache::{
    persistence::FlatEntry,
    types::{StateId, WriteFlags},
    Persistence, PersistenceError, PersistenceReader, PersistenceWriteBatch,
};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory implementation of [`Persistence`].
#[derive(Clone)]
pub(crate) struct MemPersistence(Arc<Inner>);

struct Inner {
    committed: RwLock<(StateId, Arc<Table>)>,
    preimage_mode: bool,
    readers_opened: AtomicUsize,
    readers_released: AtomicUsize,
    fail_next_open: AtomicBool,
}

impl MemPersistence {
    /// Create a new, empty `MemPersistence` at state `genesis`.
    pub(crate) fn new(genesis: StateId) -> MemPersistence {
        Self::with_preimage_mode(genesis, false)
    }

    pub(crate) fn with_preimage_mode(genesis: StateId, preimage_mode: bool) -> MemPersistence {
        MemPersistence(Arc::new(Inner {
            committed: RwLock::new((genesis, Arc::new(Table::new()))),
            preimage_mode,
            readers_opened: AtomicUsize::new(0),
            readers_released: AtomicUsize::new(0),
            fail_next_open: AtomicBool::new(false),
        }))
    }

    /// The latest committed state.
    pub(crate) fn state(&self) -> StateId {
        self.0.committed.read().unwrap().0
    }

    pub(crate) fn readers_opened(&self) -> usize {
        self.0.readers_opened.load(Ordering::SeqCst)
    }

    pub(crate) fn readers_released(&self) -> usize {
        self.0.readers_released.load(Ordering::SeqCst)
    }

    /// Make the next call to `open_reader` fail with an I/O error.
    pub(crate) fn fail_next_open_reader(&self) {
        self.0.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Write `value` at `key` directly, bypassing write batches and state transitions.
    pub(crate) fn put_raw(&self, key: &[u8], value: &[u8]) {
        let mut committed = self.0.committed.write().unwrap();
        let mut table = Table::clone(&committed.1);
        table.insert(key.to_vec(), value.to_vec());
        committed.1 = Arc::new(table);
    }
}

impl Persistence for MemPersistence {
    type Reader = MemReader;
    type WriteBatch = MemWriteBatch;

    fn open_reader(&self) -> Result<MemReader, PersistenceError> {
        if self.0.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected open_reader failure",
            )));
        }
        let (state, table) = {
            let committed = self.0.committed.read().unwrap();
            (committed.0, Arc::clone(&committed.1))
        };
        self.0.readers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemReader {
            store: Arc::clone(&self.0),
            state,
            table,
        })
    }

    fn open_write_batch(
        &self,
        from: StateId,
        to: StateId,
        _flags: WriteFlags,
    ) -> Result<MemWriteBatch, PersistenceError> {
        let current = self.state();
        if current != from {
            return Err(PersistenceError::StateMismatch {
                expected: from,
                found: current,
            });
        }
        Ok(MemWriteBatch {
            store: Arc::clone(&self.0),
            from,
            to,
            changes: BTreeMap::new(),
        })
    }
}

/// A reader over one committed version of a [`MemPersistence`].
pub(crate) struct MemReader {
    store: Arc<Inner>,
    state: StateId,
    table: Arc<Table>,
}

impl Drop for MemReader {
    fn drop(&mut self) {
        self.store.readers_released.fetch_add(1, Ordering::SeqCst);
    }
}

impl PersistenceReader for MemReader {
    type FlatIterator = std::vec::IntoIter<Result<FlatEntry, PersistenceError>>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.table.get(key).cloned())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Self::FlatIterator, PersistenceError> {
        let entries: Vec<Result<FlatEntry, PersistenceError>> = self
            .table
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| Ok((key.clone(), value.clone())))
            .collect();
        Ok(entries.into_iter())
    }

    fn current_state(&self) -> StateId {
        self.state
    }

    fn is_preimage_mode(&self) -> bool {
        self.store.preimage_mode
    }
}

/// A simple implementation of [`PersistenceWriteBatch`]. A `None` change is a deletion.
pub(crate) struct MemWriteBatch {
    store: Arc<Inner>,
    from: StateId,
    to: StateId,
    changes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl PersistenceWriteBatch for MemWriteBatch {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.changes.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.changes.insert(key.to_vec(), None);
    }

    fn is_preimage_mode(&self) -> bool {
        self.store.preimage_mode
    }

    fn commit(self) -> Result<(), PersistenceError> {
        let mut committed = self.store.committed.write().unwrap();
        if committed.0 != self.from {
            return Err(PersistenceError::StateMismatch {
                expected: self.from,
                found: committed.0,
            });
        }
        let mut table = Table::clone(&committed.1);
        for (key, change) in self.changes {
            match change {
                Some(value) => table.insert(key, value),
                None => table.remove(&key),
            };
        }
        *committed = (self.to, Arc::new(table));
        Ok(())
    }
}
