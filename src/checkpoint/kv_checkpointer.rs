/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A [`RollupCheckpointer`] that stores checkpoints in a user-provided [`KVStore`].
//!
//! ## Writing
//!
//! [`async_save_checkpoint`](KVCheckpointer::async_save_checkpoint) only queues the checkpoint. A
//! writer thread takes the newest queued checkpoint, skipping (and reporting as
//! [`Superseded`](SaveOutcome::Superseded)) any older ones queued behind it, and writes it in a
//! single [`WriteBatch`](super::pluggables::WriteBatch):
//! 1. Checkpoints at blocks higher than the one being written are deleted, since they belong to a
//!    branch of the chain that was abandoned.
//! 2. The oldest checkpoints are deleted until at most `max_retained_checkpoints` remain.
//! 3. Machine states are stored once, however many checkpoints refer to them. A machine state is
//!    written when the first retained checkpoint refers to it, and deleted when the last one that
//!    refers to it is deleted.
//!
//! ## Reading
//!
//! The latest checkpoint is the one at the highest retained block.

use std::{
    collections::BTreeMap,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::types::{
    data_types::{BlockId, BlockNumber, CryptoHash},
    machine::Machine,
};

use super::{
    checkpointer::{CheckpointRecord, RollupCheckpointer, SaveCallback, SaveOutcome},
    context::{CheckpointContext, RestoreContext},
    pluggables::{CheckpointWriteBatch, KVGetError, KVStore, Key},
    CheckpointError,
};

#[derive(Clone, Copy, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [CheckpointerConfiguration]. On the builder call the following methods to construct a valid [CheckpointerConfiguration].

    Required:
    - `.max_retained_checkpoints(...)`
    - `.poll_interval(...)`
"))]
pub struct CheckpointerConfiguration {
    #[builder(setter(doc = "Set the number of checkpoints kept in the store. Values below 1 are treated as 1. Required."))]
    pub max_retained_checkpoints: usize,
    #[builder(setter(doc = "Set how long the writer thread waits for a checkpoint before checking whether it should shut down. Required."))]
    pub poll_interval: Duration,
}

struct SaveJob<M: Machine> {
    block: BlockId,
    buf: Vec<u8>,
    ctx: CheckpointContext<M>,
    callback: Option<SaveCallback>,
}

pub struct KVCheckpointer<K: KVStore, M: Machine> {
    kv_store: K,
    initial_machine: M,
    jobs: Mutex<Sender<SaveJob<M>>>,
    writer: Option<JoinHandle<()>>,
    writer_shutdown: Mutex<Sender<()>>,
}

impl<K: KVStore, M: Machine> KVCheckpointer<K, M> {
    /// Create a checkpointer over `kv_store` and start its writer thread. `initial_machine` is what
    /// an observer starting from genesis is given.
    pub fn new(
        kv_store: K,
        initial_machine: M,
        config: CheckpointerConfiguration,
    ) -> KVCheckpointer<K, M> {
        let (jobs, job_receiver) = mpsc::channel();
        let (writer_shutdown, writer_shutdown_receiver) = mpsc::channel();
        let writer = start_writer(
            kv_store.clone(),
            config,
            job_receiver,
            writer_shutdown_receiver,
        );
        KVCheckpointer {
            kv_store,
            initial_machine,
            jobs: Mutex::new(jobs),
            writer: Some(writer),
            writer_shutdown: Mutex::new(writer_shutdown),
        }
    }

    /// Block numbers of the retained checkpoints, in ascending order.
    pub fn retained_checkpoints(&self) -> Result<Vec<BlockNumber>, CheckpointError> {
        Ok(self
            .kv_store
            .retained_checkpoints()?
            .into_iter()
            .map(BlockNumber::new)
            .collect())
    }

    pub fn checkpoint_at_block(
        &self,
        block_number: BlockNumber,
    ) -> Result<Option<CheckpointRecord>, CheckpointError> {
        Ok(self.kv_store.checkpoint_at_block(block_number)?)
    }
}

impl<K: KVStore, M: Machine> RollupCheckpointer<M> for KVCheckpointer<K, M> {
    type Restore = KVRestoreContext<K>;

    fn initial_machine(&self) -> Result<M, CheckpointError> {
        Ok(self.initial_machine.clone())
    }

    fn async_save_checkpoint(
        &self,
        block: BlockId,
        buf: Vec<u8>,
        ctx: CheckpointContext<M>,
        callback: Option<SaveCallback>,
    ) {
        let job = SaveJob {
            block,
            buf,
            ctx,
            callback,
        };
        // Safety: nothing panics while holding this lock.
        let sent = self.jobs.lock().unwrap().send(job);
        if let Err(mpsc::SendError(job)) = sent {
            log::error!("Checkpoint writer is gone, dropping checkpoint at block {}", job.block.number);
            if let Some(callback) = job.callback {
                callback(SaveOutcome::Failed)
            }
        }
    }

    fn latest_checkpoint(&self) -> Result<Option<(BlockId, Vec<u8>)>, CheckpointError> {
        let Some(latest) = self.kv_store.retained_checkpoints()?.last().copied() else {
            return Ok(None);
        };
        let block = BlockNumber::new(latest);
        let record = self.kv_store.checkpoint_at_block(block)?.ok_or(
            KVGetError::ValueExpectedButNotFound {
                key: Key::CheckpointAtBlock { block },
            },
        )?;
        Ok(Some((record.block_id, record.observer)))
    }

    fn restore_context(&self) -> KVRestoreContext<K> {
        KVRestoreContext {
            kv_store: self.kv_store.clone(),
        }
    }
}

impl<K: KVStore, M: Machine> Drop for KVCheckpointer<K, M> {
    fn drop(&mut self) {
        if let Ok(shutdown) = self.writer_shutdown.lock() {
            let _ = shutdown.send(());
        }
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                log::error!("Checkpoint writer panicked");
            }
        }
    }
}

/// Resolves machines from the machine states a [`KVCheckpointer`] stored.
pub struct KVRestoreContext<K: KVStore> {
    kv_store: K,
}

impl<K: KVStore, M: Machine> RestoreContext<M> for KVRestoreContext<K> {
    fn machine(&self, hash: &CryptoHash) -> Result<Option<M>, CheckpointError> {
        Ok(self.kv_store.machine_state(hash)?)
    }
}

fn start_writer<K: KVStore, M: Machine>(
    mut kv_store: K,
    config: CheckpointerConfiguration,
    jobs: Receiver<SaveJob<M>>,
    shutdown: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Checkpoint writer thread disconnected from main thread")
            }
        }

        let mut job = match jobs.recv_timeout(config.poll_interval) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };
        while let Ok(newer) = jobs.try_recv() {
            if let Some(callback) = job.callback.take() {
                callback(SaveOutcome::Superseded)
            }
            job = newer;
        }

        let outcome = match write_checkpoint(
            &mut kv_store,
            config.max_retained_checkpoints,
            job.block,
            job.buf,
            &job.ctx,
        ) {
            Ok(()) => {
                log::debug!("Saved checkpoint at block {}", job.block.number);
                SaveOutcome::Saved
            }
            Err(err) => {
                log::error!("Failed to save checkpoint at block {}: {}", job.block.number, err);
                SaveOutcome::Failed
            }
        };
        if let Some(callback) = job.callback {
            callback(outcome)
        }
    })
}

fn write_checkpoint<K: KVStore, M: Machine>(
    kv_store: &mut K,
    max_retained_checkpoints: usize,
    block: BlockId,
    buf: Vec<u8>,
    ctx: &CheckpointContext<M>,
) -> Result<(), CheckpointError> {
    let mut wb = CheckpointWriteBatch::<K::WriteBatch>::new();
    let mut ref_deltas: BTreeMap<CryptoHash, i64> = BTreeMap::new();

    let record = CheckpointRecord {
        block_id: block,
        observer: buf,
        machine_hashes: ctx.machine_hashes(),
    };
    for machine_hash in &record.machine_hashes {
        *ref_deltas.entry(*machine_hash).or_default() += 1;
    }

    // Drop the checkpoint being replaced and every checkpoint above it.
    let mut retained = kv_store.retained_checkpoints()?;
    let split = retained.partition_point(|number| *number < block.number.int());
    let mut evicted = retained.split_off(split);
    retained.push(block.number.int());

    let max_retained_checkpoints = max_retained_checkpoints.max(1);
    if retained.len() > max_retained_checkpoints {
        let excess = retained.len() - max_retained_checkpoints;
        evicted.extend(retained.drain(..excess));
    }

    for number in evicted {
        let number = BlockNumber::new(number);
        if let Some(old) = kv_store.checkpoint_at_block(number)? {
            for machine_hash in old.machine_hashes {
                *ref_deltas.entry(machine_hash).or_default() -= 1;
            }
        }
        if number != block.number {
            wb.delete_checkpoint_at_block(number);
        }
    }

    for (machine_hash, delta) in ref_deltas {
        if delta == 0 {
            continue;
        }
        let old_count = kv_store.machine_state_ref_count(&machine_hash)?;
        let new_count = (old_count as i64 + delta).max(0) as u64;
        if new_count == 0 {
            wb.delete_machine_state(&machine_hash);
            continue;
        }
        if old_count == 0 {
            // Only machines of the new record gain references, so the machine is in the context.
            let machine = ctx
                .machine(&machine_hash)
                .ok_or(CheckpointError::MissingMachine { machine_hash })?;
            wb.set_machine_state(&machine_hash, machine.as_ref())?;
        }
        wb.set_machine_state_ref_count(&machine_hash, new_count)?;
    }

    wb.set_checkpoint_at_block(block.number, &record)?;
    wb.set_retained_checkpoints(&retained)?;
    kv_store.write(wb.into_inner());
    Ok(())
}
