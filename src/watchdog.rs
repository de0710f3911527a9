/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Background thread that warns about readers that stay alive for too long.
//!
//! Every reader created by the cache is registered here once, at creation. When the configured delay
//! has passed, the watchdog looks at the reader's lease counter and logs a
//! [`SuspectedReaderLeak`](crate::logging::SUSPECTED_READER_LEAK) if the reader has not been disposed
//! yet. The watchdog only holds a [`Weak`] reference to the counter, so it never keeps a reader alive
//! and never takes part in lease counting.

use std::collections::VecDeque;
use std::sync::atomic::AtomicI64;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::events::SuspectedReaderLeakEvent;
use crate::leased_reader::{outstanding_leases, LeasedReader};
use crate::logging::Logger;
use crate::persistence::PersistenceReader;
use crate::stats::StatsCounters;
use crate::types::InstanceId;

pub(crate) enum WatchdogCommand {
    Watch(Watch),
    Shutdown,
}

pub(crate) struct Watch {
    instance: InstanceId,
    created_at: Instant,
    deadline: Instant,
    lease_count: Weak<AtomicI64>,
}

/// Handle used to register readers with the watchdog thread.
pub(crate) struct LeakWatchdog {
    commands: Sender<WatchdogCommand>,
    delay: Duration,
}

impl LeakWatchdog {
    pub(crate) fn start(delay: Duration, stats: Arc<StatsCounters>) -> (LeakWatchdog, JoinHandle<()>) {
        let (commands, command_receiver) = mpsc::channel();
        let handle = thread::spawn(move || run(command_receiver, stats));
        (LeakWatchdog { commands, delay }, handle)
    }

    /// Schedule a one-shot check of `reader`.
    pub(crate) fn watch<R: PersistenceReader>(&self, reader: &LeasedReader<R>) {
        let watch = Watch {
            instance: reader.instance(),
            created_at: reader.created_at(),
            deadline: reader.created_at() + self.delay,
            lease_count: reader.lease_counter(),
        };
        // The thread only goes away during shutdown, after which no more readers are created.
        let _ = self.commands.send(WatchdogCommand::Watch(watch));
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.commands.send(WatchdogCommand::Shutdown);
    }
}

fn run(commands: Receiver<WatchdogCommand>, stats: Arc<StatsCounters>) {
    // Every watch has the same delay, so deadlines arrive in registration order.
    let mut pending: VecDeque<Watch> = VecDeque::new();
    loop {
        let command = match pending.front() {
            Some(watch) => {
                let now = Instant::now();
                if watch.deadline <= now {
                    if let Some(watch) = pending.pop_front() {
                        check(&watch, &stats);
                    }
                    continue;
                }
                commands.recv_timeout(watch.deadline - now)
            }
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(WatchdogCommand::Watch(watch)) => pending.push_back(watch),
            Ok(WatchdogCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => (),
        }
    }
}

fn check(watch: &Watch, stats: &StatsCounters) {
    // A counter that is gone belonged to a reader that has been dropped entirely.
    let Some(lease_count) = watch.lease_count.upgrade() else {
        return;
    };
    if let Some(leases) = outstanding_leases(&lease_count) {
        StatsCounters::increment(&stats.suspected_leaks);
        SuspectedReaderLeakEvent {
            timestamp: SystemTime::now(),
            instance: watch.instance,
            age: watch.created_at.elapsed(),
            leases,
        }
        .log();
    }
}
