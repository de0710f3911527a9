pub(crate) mod logging;

pub(crate) mod mem_persistence;

use std::time::Duration;

use state_reader_cache::{
    types::{Account, Address, BlockNumber, CryptoHash, StateId},
    ReaderCacheConfig,
};

/// A state at `block_number` whose root is `block_number` repeated.
pub(crate) fn state(block_number: u64) -> StateId {
    StateId::new(
        BlockNumber::new(block_number),
        CryptoHash::new([block_number as u8; 32]),
    )
}

pub(crate) fn address(n: u8) -> Address {
    Address::new([n; 20])
}

pub(crate) fn account(nonce: u64, balance: u128) -> Account {
    Account {
        nonce,
        balance,
        storage_root: CryptoHash::new([0; 32]),
        code_hash: CryptoHash::new([0; 32]),
    }
}

/// A config whose sweeper never fires during a test. Sweeps are then triggered by hand with
/// `ReaderCache::sweep`.
pub(crate) fn manual_sweep_config() -> ReaderCacheConfig {
    ReaderCacheConfig::builder()
        .sweep_interval(Duration::from_secs(3600))
        .leak_warning_after(Duration::from_secs(3600))
        .build()
}

pub(crate) fn sweep_every(interval: Duration) -> ReaderCacheConfig {
    ReaderCacheConfig::builder()
        .sweep_interval(interval)
        .leak_warning_after(Duration::from_secs(3600))
        .build()
}
