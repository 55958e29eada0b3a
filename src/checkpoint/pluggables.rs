/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable checkpoint persistence.
//!
//! The [`KVCheckpointer`](super::kv_checkpointer::KVCheckpointer) stores checkpoints in a key-value
//! store provided by the user. The store only needs to support point reads ([`KVGet::get`]) and
//! atomic application of a batch of writes ([`KVStore::write`]). Given `get`, the provided methods of
//! [`KVGet`] read the typed [checkpoint variables](super::variables) out of the store.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    data_types::{BlockNumber, CryptoHash},
    machine::Machine,
};

use super::{
    checkpointer::CheckpointRecord,
    variables::{self, concat},
};

pub trait KVStore: KVGet + Clone + Send + Sync + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Checkpoint at Block ↓↓↓ */

    fn checkpoint_at_block(
        &self,
        block_number: BlockNumber,
    ) -> Result<Option<CheckpointRecord>, KVGetError> {
        let key = concat(&variables::CHECKPOINT_AT_BLOCK, &block_number.to_le_bytes());
        if let Some(bytes) = self.get(&key) {
            Ok(Some(
                CheckpointRecord::deserialize(&mut bytes.as_slice()).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::CheckpointAtBlock {
                            block: block_number,
                        },
                        source: err,
                    }
                })?,
            ))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Retained Checkpoints ↓↓↓ */

    fn retained_checkpoints(&self) -> Result<Vec<u64>, KVGetError> {
        if let Some(bytes) = self.get(&variables::RETAINED_CHECKPOINTS) {
            Vec::<u64>::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::RetainedCheckpoints,
                    source: err,
                }
            })
        } else {
            Ok(Vec::new())
        }
    }

    /* ↓↓↓ Machine State ↓↓↓ */

    fn machine_state<M: Machine>(&self, machine: &CryptoHash) -> Result<Option<M>, KVGetError> {
        if let Some(bytes) = self.get(&concat(&variables::MACHINE_STATE, &machine.bytes())) {
            Ok(Some(M::deserialize(&mut bytes.as_slice()).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::MachineState { machine: *machine },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    fn machine_state_ref_count(&self, machine: &CryptoHash) -> Result<u64, KVGetError> {
        if let Some(bytes) = self.get(&concat(
            &variables::MACHINE_STATE_REF_COUNT,
            &machine.bytes(),
        )) {
            u64::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::MachineStateRefCount { machine: *machine },
                    source: err,
                }
            })
        } else {
            Ok(0)
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Wrapper around a user-provided [`WriteBatch`] that forms the keys of the checkpoint variables.
pub struct CheckpointWriteBatch<W: WriteBatch>(pub(super) W);

impl<W: WriteBatch> CheckpointWriteBatch<W> {
    pub(crate) fn new() -> CheckpointWriteBatch<W> {
        CheckpointWriteBatch(W::new())
    }

    pub(crate) fn into_inner(self) -> W {
        self.0
    }

    pub fn set_checkpoint_at_block(
        &mut self,
        block_number: BlockNumber,
        record: &CheckpointRecord,
    ) -> Result<(), KVSetError> {
        self.0.set(
            &concat(&variables::CHECKPOINT_AT_BLOCK, &block_number.to_le_bytes()),
            &record
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::CheckpointAtBlock {
                        block: block_number,
                    },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn delete_checkpoint_at_block(&mut self, block_number: BlockNumber) {
        self.0.delete(&concat(
            &variables::CHECKPOINT_AT_BLOCK,
            &block_number.to_le_bytes(),
        ))
    }

    pub fn set_retained_checkpoints(&mut self, retained: &Vec<u64>) -> Result<(), KVSetError> {
        self.0.set(
            &variables::RETAINED_CHECKPOINTS,
            &retained
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::RetainedCheckpoints,
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn set_machine_state<M: Machine>(
        &mut self,
        machine_hash: &CryptoHash,
        machine: &M,
    ) -> Result<(), KVSetError> {
        self.0.set(
            &concat(&variables::MACHINE_STATE, &machine_hash.bytes()),
            &machine
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::MachineState {
                        machine: *machine_hash,
                    },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn set_machine_state_ref_count(
        &mut self,
        machine_hash: &CryptoHash,
        count: u64,
    ) -> Result<(), KVSetError> {
        self.0.set(
            &concat(&variables::MACHINE_STATE_REF_COUNT, &machine_hash.bytes()),
            &count
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::MachineStateRefCount {
                        machine: *machine_hash,
                    },
                    source: err,
                })?,
        );
        Ok(())
    }

    /// Delete a machine state together with its reference count.
    pub fn delete_machine_state(&mut self, machine_hash: &CryptoHash) {
        self.0
            .delete(&concat(&variables::MACHINE_STATE, &machine_hash.bytes()));
        self.0.delete(&concat(
            &variables::MACHINE_STATE_REF_COUNT,
            &machine_hash.bytes(),
        ));
    }
}

/// Error when trying to read a checkpoint variable from the key-value store.
///
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
}

/// Error when trying to serialize a checkpoint variable into a write batch.
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}

#[derive(Debug)]
pub enum Key {
    CheckpointAtBlock { block: BlockNumber },
    RetainedCheckpoints,
    MachineState { machine: CryptoHash },
    MachineStateRefCount { machine: CryptoHash },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::CheckpointAtBlock { block } => write!(f, "Checkpoint at block {}", block),
            Key::RetainedCheckpoints => write!(f, "Retained Checkpoints"),
            Key::MachineState { machine } => write!(f, "Machine State {}", machine),
            Key::MachineStateRefCount { machine } => {
                write!(f, "Machine State Reference Count for {}", machine)
            }
        }
    }
}
