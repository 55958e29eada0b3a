/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Background threads of a [rollup observer](crate::rollup_observer).
//!
//! Each thread shares the [`ChainObserver`] through its `RwLock`, and exits when it receives a message
//! on its shutdown channel:
//! 1. The **cleanup** thread periodically prunes the nodes scheduled for pruning, under the write
//!    lock, then reports the leaves that could be pruned on chain.
//! 2. The **confirm** thread periodically reports, under the read lock, the nodes that could be
//!    confirmed on chain.
//! 3. The **opinion** thread, started only by opinionated observers, evaluates assertions below the
//!    calculated valid node whenever an assertion is seen, and at least once per cleanup interval.

use std::{
    sync::{
        mpsc::{Receiver, RecvTimeoutError, TryRecvError},
        Arc, RwLock,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{chain_observer::ChainObserver, types::machine::Machine};

pub(crate) fn start_cleanup<M: Machine>(
    chain_observer: Arc<RwLock<ChainObserver<M>>>,
    interval: Duration,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.recv_timeout(interval) {
            Ok(()) => return,
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                panic!("Cleanup thread disconnected from main thread")
            }
        }

        // Safety: threads holding the lock do not panic unless the event stream is inconsistent,
        // after which the observer cannot be used anyway.
        let mut observer = chain_observer.write().unwrap();
        let pruned = observer.prune_sweep();
        if !pruned.is_empty() {
            log::debug!("Pruned {} nodes", pruned.len());
        }
        let leaves = observer.prunable_leaves();
        if !leaves.is_empty() {
            for listener in &observer.listeners {
                listener.prunable_leaves(&leaves);
            }
        }
    })
}

pub(crate) fn start_confirm<M: Machine>(
    chain_observer: Arc<RwLock<ChainObserver<M>>>,
    interval: Duration,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.recv_timeout(interval) {
            Ok(()) => return,
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                panic!("Confirm thread disconnected from main thread")
            }
        }

        // Safety: see start_cleanup.
        let observer = chain_observer.read().unwrap();
        let confirmable = observer.confirmable_nodes();
        if !confirmable.is_empty() {
            for listener in &observer.listeners {
                listener.confirmable_nodes(&confirmable);
            }
        }
    })
}

pub(crate) fn start_opinion<M: Machine>(
    chain_observer: Arc<RwLock<ChainObserver<M>>>,
    interval: Duration,
    assertion_made: Receiver<()>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Opinion thread disconnected from main thread")
            }
        }

        match assertion_made.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
        // Every pending signal is served by one pass.
        while assertion_made.try_recv().is_ok() {}

        form_opinions(&chain_observer);
    })
}

/// Evaluate assertions below the calculated valid node until there is none left, or the observer's
/// state moved on while an assertion was being executed.
fn form_opinions<M: Machine>(chain_observer: &RwLock<ChainObserver<M>>) {
    loop {
        // Safety: see start_cleanup.
        let job = match chain_observer.read().unwrap().next_opinion_job() {
            Some(job) => job,
            None => return,
        };
        let opinion = job.execute();
        if chain_observer.write().unwrap().apply_opinion(opinion).is_none() {
            return;
        }
    }
}
