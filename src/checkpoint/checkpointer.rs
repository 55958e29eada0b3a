/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`RollupCheckpointer`] trait, through which the observer saves and loads checkpoints.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    data_types::{BlockId, CryptoHash},
    machine::Machine,
};

use super::{
    context::{CheckpointContext, RestoreContext},
    CheckpointError,
};

/// What a checkpointer stores for one block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CheckpointRecord {
    pub block_id: BlockId,
    /// Bytes of a [`ChainObserverBuf`](super::codec::ChainObserverBuf).
    pub observer: Vec<u8>,
    /// Machines the buffer refers to, in ascending order.
    pub machine_hashes: Vec<CryptoHash>,
}

/// How an asynchronous save ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// A newer checkpoint was queued before this one was written, so this one was skipped.
    Superseded,
    Failed,
}

pub type SaveCallback = Box<dyn FnOnce(SaveOutcome) + Send>;

pub trait RollupCheckpointer<M: Machine>: Send + Sync + 'static {
    type Restore: RestoreContext<M>;

    /// The machine state of the rollup at creation.
    fn initial_machine(&self) -> Result<M, CheckpointError>;

    /// Queue a checkpoint for `block` to be written in the background. `callback`, if any, is called
    /// once the checkpoint is written, superseded, or failed to be written. Checkpoints still queued
    /// when the checkpointer is dropped are abandoned without calling their callbacks.
    fn async_save_checkpoint(
        &self,
        block: BlockId,
        buf: Vec<u8>,
        ctx: CheckpointContext<M>,
        callback: Option<SaveCallback>,
    );

    /// Get the block and buffer of the newest checkpoint written, if any.
    fn latest_checkpoint(&self) -> Result<Option<(BlockId, Vec<u8>)>, CheckpointError>;

    /// Get a context that resolves the machines referred to by written checkpoints.
    fn restore_context(&self) -> Self::Restore;
}
