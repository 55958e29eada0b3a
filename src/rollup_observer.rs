/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and interact with a rollup observer.
//!
//! ## Starting an observer
//!
//! A rollup observer is started from a [`RollupObserverSpec`], which bundles the observer's
//! [`Configuration`], its [checkpointer](crate::checkpoint::RollupCheckpointer), and the listeners to
//! notify of changes to the rollup's state:
//!
//! ```ignore
//! let observer = RollupObserverSpec::builder()
//!     .configuration(configuration)
//!     .checkpointer(checkpointer)
//!     .start_block(start_block)
//!     .listeners(vec![Arc::new(my_listener)])
//!     .build()
//!     .restore()?;
//! ```
//!
//! [`start`](RollupObserverSpec::start) begins from the rollup's creation. [`restore`](RollupObserverSpec::restore)
//! resumes from the checkpointer's latest checkpoint, or begins from the rollup's creation if there is
//! none.
//!
//! ## Feeding an observer
//!
//! The observer does not watch the chain itself. Its user calls [`RollupObserver::handle_event`] with
//! every event the rollup contract emits, in chain order, and [`RollupObserver::notify_new_block`] with
//! every new block. Every new block triggers a checkpoint.
//!
//! ## Threads
//!
//! Starting an observer starts its background threads. When the [`RollupObserver`] is dropped, all of
//! them are shut down.
//!
//! ## Log Events
//!
//! The observer logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a [logging
//! implementation](https://docs.rs/log/latest/log/#available-logging-implementations).

use std::{
    marker::PhantomData,
    sync::{
        mpsc::{self, Sender, SyncSender},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    thread::JoinHandle,
    time::Duration,
};

use borsh::BorshDeserialize;
use typed_builder::TypedBuilder;

use crate::{
    chain_observer::{ChainObserver, ObserverError},
    checkpoint::{
        codec::ChainObserverBuf, CheckpointContext, CheckpointError, RollupCheckpointer,
        SaveCallback,
    },
    events::ChainEvent,
    listener::ChainListener,
    logging::LoggingListener,
    maintenance::{start_cleanup, start_confirm, start_opinion},
    types::{
        assertion::{ChainParams, ExecutionAssertion, InboxValue, Message},
        data_types::{Address, BlockId, BlockNumber},
        machine::Machine,
    },
};

/// Number of assertion signals that may wait for the opinion thread before
/// [`RollupObserver::handle_event`] blocks.
pub const ASSERTION_SIGNAL_CAPACITY: usize = 20;

/// Stores the user-defined parameters required to start a rollup observer.
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.rollup_address(...)`
    - `.chain_params(...)`
    - `.is_opinionated(...)`
    - `.create_invalid_nodes(...)`
    - `.cleanup_interval(...)`
    - `.confirm_interval(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the address of the rollup contract to observe. Required."))]
    pub rollup_address: Address,
    #[builder(setter(doc = "Set the rollup's parameters, as configured in the rollup contract. Required."))]
    pub chain_params: ChainParams,
    #[builder(setter(doc = "Set whether the observer executes assertions to form its own opinion of which nodes are valid. Required."))]
    pub is_opinionated: bool,
    #[builder(setter(doc = "Set whether the observer tracks the invalid outcome of every assertion, in addition to the valid one. Required."))]
    pub create_invalid_nodes: bool,
    #[builder(setter(doc = "Set how often scheduled nodes are pruned and prunable leaves are reported. Also bounds how long an opinionated observer waits before re-checking for assertions. Required."))]
    pub cleanup_interval: Duration,
    #[builder(setter(doc = "Set how often confirmable nodes are reported. Required."))]
    pub confirm_interval: Duration,
    #[builder(setter(doc = "Enable logging of chain events? Required."))]
    pub log_events: bool,
}

/// Stores everything required to start a [`RollupObserver`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [RollupObserverSpec]. On the builder call the following methods to construct a valid [RollupObserverSpec].

    Required:
    - `.configuration(...)`
    - `.checkpointer(...)`
    - `.start_block(...)`

    Optional:
    - `.listeners(...)`
"))]
pub struct RollupObserverSpec<M: Machine, C: RollupCheckpointer<M>> {
    // Required parameters
    #[builder(setter(doc = "Set the [configuration](Configuration) of the observer. Required."))]
    configuration: Configuration,
    #[builder(setter(doc = "Set the checkpointer that stores the observer's state. The argument must implement the [RollupCheckpointer](crate::checkpoint::RollupCheckpointer) trait. Required."))]
    checkpointer: C,
    #[builder(setter(doc = "Set the block at which the rollup was created. Used when there is no checkpoint to resume from. Required."))]
    start_block: BlockId,
    // Optional parameters
    #[builder(default, setter(doc = "Register listeners to be notified of changes to the rollup's state, in order. Optional."))]
    listeners: Vec<Arc<dyn ChainListener>>,
    #[builder(default, setter(skip))]
    phantom: PhantomData<M>,
}

impl<M: Machine, C: RollupCheckpointer<M>> RollupObserverSpec<M, C> {
    /// Start an observer for a rollup that has just been created, ignoring any checkpoint.
    pub fn start(self) -> Result<RollupObserver<M, C>, CheckpointError> {
        let initial_machine = self.checkpointer.initial_machine()?;
        let chain_observer = ChainObserver::new(
            self.configuration.rollup_address,
            initial_machine,
            self.configuration.chain_params,
            self.configuration.create_invalid_nodes,
            self.configuration.is_opinionated,
            self.start_block,
        );
        Ok(self.run(chain_observer))
    }

    /// Resume an observer from the checkpointer's latest checkpoint, or start one for a rollup that
    /// has just been created if there is no checkpoint.
    pub fn restore(self) -> Result<RollupObserver<M, C>, CheckpointError> {
        let Some((block, bytes)) = self.checkpointer.latest_checkpoint()? else {
            log::info!("No checkpoint found, starting from block {}", self.start_block.number);
            return self.start();
        };

        let buf = ChainObserverBuf::try_from_slice(&bytes).map_err(CheckpointError::Deserialize)?;
        if buf.contract_address != self.configuration.rollup_address {
            return Err(CheckpointError::WrongRollup {
                expected: self.configuration.rollup_address,
                found: buf.contract_address,
            });
        }
        let mut chain_observer = buf.unmarshal_from_checkpoint(&self.checkpointer.restore_context())?;
        chain_observer.is_opinionated = self.configuration.is_opinionated;
        log::info!("Restored checkpoint at block {}", block.number);
        Ok(self.run(chain_observer))
    }

    fn run(self, mut chain_observer: ChainObserver<M>) -> RollupObserver<M, C> {
        if self.configuration.log_events {
            chain_observer.add_listener(Arc::new(LoggingListener::new()));
        }
        for listener in self.listeners {
            chain_observer.add_listener(listener);
        }
        let is_opinionated = chain_observer.is_opinionated();
        let chain_observer = Arc::new(RwLock::new(chain_observer));

        let (cleanup_shutdown, cleanup_shutdown_receiver) = mpsc::channel();
        let cleanup = start_cleanup(
            Arc::clone(&chain_observer),
            self.configuration.cleanup_interval,
            cleanup_shutdown_receiver,
        );

        let (confirm_shutdown, confirm_shutdown_receiver) = mpsc::channel();
        let confirm = start_confirm(
            Arc::clone(&chain_observer),
            self.configuration.confirm_interval,
            confirm_shutdown_receiver,
        );

        let (assertion_made, opinion_shutdown, opinion) = if is_opinionated {
            let (assertion_made, assertion_made_receiver) =
                mpsc::sync_channel(ASSERTION_SIGNAL_CAPACITY);
            let (opinion_shutdown, opinion_shutdown_receiver) = mpsc::channel();
            let opinion = start_opinion(
                Arc::clone(&chain_observer),
                self.configuration.cleanup_interval,
                assertion_made_receiver,
                opinion_shutdown_receiver,
            );
            (Some(assertion_made), Some(opinion_shutdown), Some(opinion))
        } else {
            (None, None, None)
        };

        RollupObserver {
            chain_observer,
            checkpointer: Arc::new(self.checkpointer),
            assertion_made,
            cleanup: Some(cleanup),
            cleanup_shutdown,
            confirm: Some(confirm),
            confirm_shutdown,
            opinion,
            opinion_shutdown,
        }
    }
}

/// A handle to a running rollup observer. When this value is dropped, all background threads are
/// gracefully shut down.
pub struct RollupObserver<M: Machine, C: RollupCheckpointer<M>> {
    chain_observer: Arc<RwLock<ChainObserver<M>>>,
    checkpointer: Arc<C>,
    assertion_made: Option<SyncSender<()>>,
    cleanup: Option<JoinHandle<()>>,
    cleanup_shutdown: Sender<()>,
    confirm: Option<JoinHandle<()>>,
    confirm_shutdown: Sender<()>,
    opinion: Option<JoinHandle<()>>,
    opinion_shutdown: Option<Sender<()>>,
}

impl<M: Machine, C: RollupCheckpointer<M>> RollupObserver<M, C> {
    /// Apply a chain event. See [`ChainObserver::handle_event`].
    ///
    /// If the observer is opinionated and `event` is an assertion, the opinion thread is signalled
    /// after the observer is released. This blocks while
    /// [`ASSERTION_SIGNAL_CAPACITY`] signals are already waiting.
    pub fn handle_event(&self, event: ChainEvent) -> Result<(), ObserverError> {
        let is_assertion = matches!(event, ChainEvent::Asserted(_));
        self.write().handle_event(event)?;
        if is_assertion {
            if let Some(assertion_made) = &self.assertion_made {
                if assertion_made.send(()).is_err() {
                    log::warn!("Opinion thread has stopped, dropping assertion signal");
                }
            }
        }
        Ok(())
    }

    /// Advance the observer to `block` and save a checkpoint of its state at that block.
    /// `callback`, if any, receives the outcome of the save.
    pub fn notify_new_block(
        &self,
        block: BlockId,
        callback: Option<SaveCallback>,
    ) -> Result<(), ObserverError> {
        let mut ctx = CheckpointContext::new();
        let buf = {
            let mut observer = self.write();
            observer.notify_new_block(block);
            observer.marshal_to_bytes(&mut ctx)?
        };
        self.checkpointer
            .async_save_checkpoint(block, buf, ctx, callback);
        Ok(())
    }

    pub fn current_time(&self) -> BlockNumber {
        self.read().latest_block().number
    }

    pub fn contract_address(&self) -> Address {
        self.read().rollup_address()
    }

    /// Execute `messages` as a read-only call against the machine of the known valid node, taking
    /// at most `max_steps` steps. The observer is not changed.
    pub fn execute_call(
        &self,
        messages: Vec<Message>,
        max_steps: u64,
    ) -> Result<(ExecutionAssertion, u64), ObserverError> {
        let (mut machine, time_bounds) = {
            let observer = self.read();
            (observer.known_valid_machine()?, observer.current_time_bounds())
        };
        let inbox = InboxValue::new(messages);
        Ok(machine.execute_assertion(max_steps, &time_bounds, &inbox))
    }

    /// Register `listener` to be notified after the listeners already registered.
    pub fn add_listener(&self, listener: Arc<dyn ChainListener>) {
        self.write().add_listener(listener)
    }

    /// Get read access to the observer's state. Events cannot be applied while the returned guard
    /// is held.
    pub fn chain_observer(&self) -> RwLockReadGuard<'_, ChainObserver<M>> {
        self.read()
    }

    pub fn checkpointer(&self) -> &C {
        &self.checkpointer
    }

    fn read(&self) -> RwLockReadGuard<'_, ChainObserver<M>> {
        // Safety: see maintenance::start_cleanup.
        self.chain_observer.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainObserver<M>> {
        // Safety: see maintenance::start_cleanup.
        self.chain_observer.write().unwrap()
    }
}

impl<M: Machine, C: RollupCheckpointer<M>> Drop for RollupObserver<M, C> {
    fn drop(&mut self) {
        if let Some(opinion_shutdown) = self.opinion_shutdown.take() {
            let _ = opinion_shutdown.send(());
        }
        self.assertion_made.take();
        if let Some(opinion) = self.opinion.take() {
            join(opinion, "Opinion");
        }

        let _ = self.confirm_shutdown.send(());
        if let Some(confirm) = self.confirm.take() {
            join(confirm, "Confirm");
        }

        let _ = self.cleanup_shutdown.send(());
        if let Some(cleanup) = self.cleanup.take() {
            join(cleanup, "Cleanup");
        }
    }
}

fn join(thread: JoinHandle<()>, name: &str) {
    if thread.join().is_err() {
        log::error!("{} thread panicked", name);
    }
}
