/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistence of the observer's state, so that an observer can resume from where it stopped instead
//! of replaying the rollup's whole history.
//!
//! A checkpoint has two parts:
//! 1. A buffer: the [Borsh](borsh) serialization of the observer's graph, inbox and bookkeeping,
//!    produced by [`ChainObserver::marshal_to_bytes`](crate::chain_observer::ChainObserver) (see
//!    [`codec`]).
//! 2. The machine states the buffer refers to by hash, collected in a [`CheckpointContext`] (see
//!    [`context`]).
//!
//! Both parts are handed to a [`RollupCheckpointer`], which stores them. This crate provides one
//! implementation, [`KVCheckpointer`], over a user-provided [key-value store](pluggables).

pub mod checkpointer;

pub mod codec;

pub mod context;

pub mod kv_checkpointer;

pub mod pluggables;

pub mod variables;

use std::fmt::{self, Display, Formatter};

pub use checkpointer::{CheckpointRecord, RollupCheckpointer, SaveCallback, SaveOutcome};
pub use codec::{
    make_initial_chain_observer_buf, unmarshal_chain_observer_from_bytes, ChainObserverBuf,
    NodeBuf, StakedNodeGraphBuf,
};
pub use context::{CheckpointContext, RestoreContext};
pub use kv_checkpointer::{CheckpointerConfiguration, KVCheckpointer, KVRestoreContext};

use crate::types::data_types::{Address, CryptoHash};

use self::pluggables::{KVGetError, KVSetError};

/// Error when saving or restoring a checkpoint.
///
/// Errors from restoring a buffer (`NodeHashMismatch` through `WrongRollup`) mean that the buffer is
/// corrupt or belongs to another observer. No observer is built from such a buffer.
#[derive(Debug)]
pub enum CheckpointError {
    KVGet(KVGetError),
    KVSet(KVSetError),
    Deserialize(std::io::Error),
    Serialize(std::io::Error),
    NodeHashMismatch {
        stored: CryptoHash,
        computed: CryptoHash,
    },
    MachineHashMismatch {
        stored: CryptoHash,
        computed: CryptoHash,
    },
    MalformedNode {
        node: CryptoHash,
    },
    MissingNode {
        node: CryptoHash,
    },
    DuplicateNode {
        node: CryptoHash,
    },
    MissingStaker {
        staker: Address,
    },
    MissingMachine {
        machine_hash: CryptoHash,
    },
    WrongRollup {
        expected: Address,
        found: Address,
    },
}

impl From<KVGetError> for CheckpointError {
    fn from(value: KVGetError) -> Self {
        CheckpointError::KVGet(value)
    }
}

impl From<KVSetError> for CheckpointError {
    fn from(value: KVSetError) -> Self {
        CheckpointError::KVSet(value)
    }
}

impl Display for CheckpointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::KVGet(KVGetError::DeserializeValueError { key, source }) => {
                write!(f, "Failed to deserialize {}: {}", key, source)
            }
            CheckpointError::KVGet(KVGetError::ValueExpectedButNotFound { key }) => {
                write!(f, "Expected {} in the store, but found nothing", key)
            }
            CheckpointError::KVSet(KVSetError::SerializeValueError { key, source }) => {
                write!(f, "Failed to serialize {}: {}", key, source)
            }
            CheckpointError::Deserialize(err) => {
                write!(f, "Failed to deserialize checkpoint buffer: {}", err)
            }
            CheckpointError::Serialize(err) => {
                write!(f, "Failed to serialize checkpoint buffer: {}", err)
            }
            CheckpointError::NodeHashMismatch { stored, computed } => write!(
                f,
                "Node stored as {} hashes to {}",
                stored, computed
            ),
            CheckpointError::MachineHashMismatch { stored, computed } => write!(
                f,
                "Machine stored as {} hashes to {}",
                stored, computed
            ),
            CheckpointError::MalformedNode { node } => {
                write!(f, "Node {} is malformed or misplaced", node)
            }
            CheckpointError::MissingNode { node } => {
                write!(f, "Node {} is referenced but not in the checkpoint", node)
            }
            CheckpointError::DuplicateNode { node } => {
                write!(f, "Node {} appears twice in the checkpoint", node)
            }
            CheckpointError::MissingStaker { staker } => {
                write!(f, "Staker {} is in a challenge but not registered", staker)
            }
            CheckpointError::MissingMachine { machine_hash } => {
                write!(f, "Machine {} is not in the restore context", machine_hash)
            }
            CheckpointError::WrongRollup { expected, found } => write!(
                f,
                "Checkpoint belongs to rollup {}, expected {}",
                found, expected
            ),
        }
    }
}
