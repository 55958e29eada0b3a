/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Side channels through which machine states travel out of and back into a checkpoint.
//!
//! Machine states are large and shared between many nodes, so a checkpoint buffer only refers to them
//! by hash. While marshalling, every machine a node holds is added to a [`CheckpointContext`], which
//! the checkpointer then persists alongside the buffer. While unmarshalling, machines are looked up
//! by hash through a [`RestoreContext`].

use std::{collections::HashMap, sync::Arc};

use crate::types::{data_types::CryptoHash, machine::Machine};

use super::CheckpointError;

pub struct CheckpointContext<M: Machine> {
    machines: HashMap<CryptoHash, Arc<M>>,
}

impl<M: Machine> CheckpointContext<M> {
    pub fn new() -> CheckpointContext<M> {
        CheckpointContext {
            machines: HashMap::new(),
        }
    }

    /// Add `machine` to the context, returning the hash it is stored under.
    pub fn add_machine(&mut self, machine: &Arc<M>) -> CryptoHash {
        let hash = machine.hash();
        self.machines
            .entry(hash)
            .or_insert_with(|| Arc::clone(machine));
        hash
    }

    pub fn machine(&self, hash: &CryptoHash) -> Option<&Arc<M>> {
        self.machines.get(hash)
    }

    pub fn machines(&self) -> impl Iterator<Item = (&CryptoHash, &Arc<M>)> {
        self.machines.iter()
    }

    /// Hashes of all machines in the context, in ascending order.
    pub fn machine_hashes(&self) -> Vec<CryptoHash> {
        let mut hashes: Vec<CryptoHash> = self.machines.keys().copied().collect();
        hashes.sort();
        hashes
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

impl<M: Machine> Default for CheckpointContext<M> {
    fn default() -> Self {
        Self::new()
    }
}

pub trait RestoreContext<M: Machine> {
    /// Get the machine stored under `hash`, or `None` if there is no such machine.
    fn machine(&self, hash: &CryptoHash) -> Result<Option<M>, CheckpointError>;
}

impl<M: Machine> RestoreContext<M> for CheckpointContext<M> {
    fn machine(&self, hash: &CryptoHash) -> Result<Option<M>, CheckpointError> {
        Ok(self.machines.get(hash).map(|machine| M::clone(machine)))
    }
}
