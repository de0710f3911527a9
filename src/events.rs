/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of reader cache events for logging.
//!
//! Note: an event for a given action indicates that the action has been completed.

use std::time::{Duration, SystemTime};

use crate::types::{InstanceId, StateId};

/// A new [`LeasedReader`](crate::leased_reader::LeasedReader) was opened and installed as the cache's
/// current reader.
pub struct CreateReaderEvent {
    pub timestamp: SystemTime,
    pub instance: InstanceId,
    pub state: StateId,
}

/// The cache dropped its hold on its current reader. Leases already acquired on the reader remain
/// usable.
pub struct RetireReaderEvent {
    pub timestamp: SystemTime,
    pub instance: InstanceId,
    pub age: Duration,
    pub cause: RetireCause,
}

/// Why a reader was retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetireCause {
    /// A periodic sweep tick.
    Sweep,
    /// A write batch completed.
    WriteBatch,
    /// The cache was shut down.
    Shutdown,
}

/// A sweep tick was skipped because a write batch was open.
pub struct SkipSweepEvent {
    pub timestamp: SystemTime,
}

/// A write batch was opened; sweeping is suspended until it ends.
pub struct BeginWriteEvent {
    pub timestamp: SystemTime,
    pub from: StateId,
    pub to: StateId,
}

/// A write batch ended, either committed or abandoned.
pub struct EndWriteEvent {
    pub timestamp: SystemTime,
    pub to: StateId,
    pub committed: bool,
}

/// A reader was still alive (not disposed) when its leak watchdog fired.
pub struct SuspectedReaderLeakEvent {
    pub timestamp: SystemTime,
    pub instance: InstanceId,
    pub age: Duration,
    pub leases: u64,
}

/// The cache stopped its background threads and released its current reader.
pub struct ShutdownCacheEvent {
    pub timestamp: SystemTime,
}
