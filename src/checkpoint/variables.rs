/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each checkpoint variable is stored in the user-provided key-value
//! store.
//!
//! # List of Checkpoint Variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Checkpoint at Block|[`BlockNumber`](crate::types::data_types::BlockNumber) -> [`CheckpointRecord`](super::checkpointer::CheckpointRecord)|Mapping between a block number and the checkpoint taken at that block. Only the checkpoints listed in "Retained Checkpoints" are present.|
//! |Retained Checkpoints|[`Vec<u64>`]|Block numbers of the checkpoints currently retained, in ascending order.|
//! |Machine State|[`CryptoHash`](crate::types::data_types::CryptoHash) -> `M`|Borsh serialization of every machine state referenced by at least one retained checkpoint, keyed by the machine's hash.|
//! |Machine State Reference Count|[`CryptoHash`](crate::types::data_types::CryptoHash) -> [`u64`]|Number of retained checkpoints that reference a machine state. A machine state is deleted when its count drops to zero.|
//!
//! # Persistence of checkpoint variables
//!
//! Each variable is stored as **Borsh-serialized values**. "Retained Checkpoints" is a single value
//! stored at its constant prefix. The mappings are stored at keys formed by concatenating the
//! variable's prefix with the key of the mapping:
//! - Checkpoint at Block: `CHECKPOINT_AT_BLOCK ++ block_number.to_le_bytes()`.
//! - Machine State: `MACHINE_STATE ++ machine_hash.bytes()`.
//! - Machine State Reference Count: `MACHINE_STATE_REF_COUNT ++ machine_hash.bytes()`.

// State variables
pub const CHECKPOINT_AT_BLOCK: [u8; 1] = [0];
pub const RETAINED_CHECKPOINTS: [u8; 1] = [1];
pub const MACHINE_STATE: [u8; 1] = [2];
pub const MACHINE_STATE_REF_COUNT: [u8; 1] = [3];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
