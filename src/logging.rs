/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! Lifecycle events are printed if the user enabled them via the cache's
//! [config](crate::config::ReaderCacheConfig::log_events). Suspected reader leaks are always printed.
//!
//! The reader cache logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [CreateReader](crate::events::CreateReaderEvent) is printed:
//!
//! ```text
//! CreateReader, 1701329264, 12, 1048576, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the instance id of the new reader.
//! - The fourth value is the block number of the state the reader is bound to.
//! - The fifth value is the first seven characters of the Base64 encoding of that state's root.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const CREATE_READER: &str = "CreateReader";
pub const RETIRE_READER: &str = "RetireReader";
pub const SKIP_SWEEP: &str = "SkipSweep";
pub const BEGIN_WRITE: &str = "BeginWrite";
pub const END_WRITE: &str = "EndWrite";
pub const SUSPECTED_READER_LEAK: &str = "SuspectedReaderLeak";
pub const SHUTDOWN_CACHE: &str = "ShutdownCache";

/// Implemented by event types. Prints the event with the default logging handler for its type.
pub(crate) trait Logger {
    fn log(&self);
}

impl Logger for CreateReaderEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}, {}",
            CREATE_READER,
            secs_since_unix_epoch(self.timestamp),
            self.instance,
            self.state.block_number,
            first_seven_base64_chars(&self.state.state_root.bytes())
        )
    }
}

impl Logger for RetireReaderEvent {
    fn log(&self) {
        log::debug!(
            "{}, {}, {}, {}, {:?}",
            RETIRE_READER,
            secs_since_unix_epoch(self.timestamp),
            self.instance,
            self.age.as_millis(),
            self.cause
        )
    }
}

impl Logger for SkipSweepEvent {
    fn log(&self) {
        log::debug!("{}, {}", SKIP_SWEEP, secs_since_unix_epoch(self.timestamp))
    }
}

impl Logger for BeginWriteEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}, {}, {}",
            BEGIN_WRITE,
            secs_since_unix_epoch(self.timestamp),
            self.from.block_number,
            first_seven_base64_chars(&self.from.state_root.bytes()),
            self.to.block_number,
            first_seven_base64_chars(&self.to.state_root.bytes())
        )
    }
}

impl Logger for EndWriteEvent {
    fn log(&self) {
        log::info!(
            "{}, {}, {}, {}, {}",
            END_WRITE,
            secs_since_unix_epoch(self.timestamp),
            self.to.block_number,
            first_seven_base64_chars(&self.to.state_root.bytes()),
            self.committed
        )
    }
}

impl Logger for SuspectedReaderLeakEvent {
    fn log(&self) {
        log::warn!(
            "{}, {}, {}, {}, {}",
            SUSPECTED_READER_LEAK,
            secs_since_unix_epoch(self.timestamp),
            self.instance,
            self.age.as_secs(),
            self.leases
        )
    }
}

impl Logger for ShutdownCacheEvent {
    fn log(&self) {
        log::info!("{}, {}", SHUTDOWN_CACHE, secs_since_unix_epoch(self.timestamp))
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

pub(crate) fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
