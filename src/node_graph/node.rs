/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [`Node`] type and its associated methods.

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use crate::types::{
    assertion::{ChainParams, ChildType, DisputableNode, VmProtoData},
    crypto_primitives::hash_parts,
    data_types::{BlockNumber, CryptoHash, NodeDepth},
    machine::Machine,
};

/// A vertex of the staked node graph.
///
/// Everything but `num_stakers`, `successor_hashes` and `machine` is fixed at creation and committed
/// to by `hash`.
#[derive(Clone)]
pub struct Node<M: Machine> {
    pub(crate) hash: CryptoHash,
    pub(crate) depth: NodeDepth,
    pub(crate) prev: Option<CryptoHash>,
    pub(crate) link_type: ChildType,
    pub(crate) successor_hashes: [Option<CryptoHash>; ChildType::COUNT],
    pub(crate) vm_proto_data: VmProtoData,
    pub(crate) disputable: Option<DisputableNode>,
    pub(crate) deadline: BlockNumber,
    pub(crate) assertion_tx_hash: CryptoHash,
    pub(crate) num_stakers: u64,
    pub(crate) machine: Option<Arc<M>>,
}

impl<M: Machine> Node<M> {
    /// Create the root of a fresh graph. Its machine hash is the hash of the initial machine, and its
    /// inbox cursor is at the empty inbox.
    pub fn genesis(machine_hash: CryptoHash, machine: Option<Arc<M>>) -> Node<M> {
        let vm_proto_data = VmProtoData::new(machine_hash, CryptoHash::zero(), 0);
        Node {
            hash: Self::genesis_hash(&vm_proto_data),
            depth: NodeDepth::new(0),
            prev: None,
            link_type: ChildType::Valid,
            successor_hashes: [None; ChildType::COUNT],
            vm_proto_data,
            disputable: None,
            deadline: BlockNumber::new(0),
            assertion_tx_hash: CryptoHash::zero(),
            num_stakers: 0,
            machine,
        }
    }

    /// Create the child of `prev` that stands for the outcome `link_type` of `disputable`.
    ///
    /// The valid child commits to the machine state and inbox cursor the assertion claims. The
    /// invalid child inherits `prev`'s, since a rejected assertion leaves the machine untouched.
    pub fn child(
        prev: &Node<M>,
        link_type: ChildType,
        disputable: DisputableNode,
        params: &ChainParams,
        current_time: BlockNumber,
        assertion_tx_hash: CryptoHash,
    ) -> Node<M> {
        let vm_proto_data = match link_type {
            ChildType::Valid => VmProtoData::new(
                disputable.claim.assertion_stub.after_hash,
                disputable.claim.after_pending_top,
                prev.vm_proto_data.pending_count + disputable.params.imported_message_count,
            ),
            ChildType::Invalid => prev.vm_proto_data,
        };
        let deadline = Self::compute_deadline(prev, &disputable, params, current_time);
        Node {
            hash: Self::child_hash(
                &prev.hash,
                link_type,
                &disputable,
                &vm_proto_data,
                deadline,
            ),
            depth: prev.depth + 1,
            prev: Some(prev.hash),
            link_type,
            successor_hashes: [None; ChildType::COUNT],
            vm_proto_data,
            disputable: Some(disputable),
            deadline,
            assertion_tx_hash,
            num_stakers: 0,
            machine: None,
        }
    }

    pub(crate) fn genesis_hash(vm_proto_data: &VmProtoData) -> CryptoHash {
        vm_proto_data.hash()
    }

    pub(crate) fn child_hash(
        prev: &CryptoHash,
        link_type: ChildType,
        disputable: &DisputableNode,
        vm_proto_data: &VmProtoData,
        deadline: BlockNumber,
    ) -> CryptoHash {
        let inner_hash = hash_parts(&[
            &disputable.hash().bytes(),
            &vm_proto_data.hash().bytes(),
            &deadline.to_le_bytes(),
        ]);
        hash_parts(&[&prev.bytes(), &[link_type.byte()], &inner_hash.bytes()])
    }

    /// A node may be confirmed once its grace period has elapsed, plus however many blocks executing
    /// the claimed gas takes at the chain's speed limit. Deadlines never decrease along a branch.
    fn compute_deadline(
        prev: &Node<M>,
        disputable: &DisputableNode,
        params: &ChainParams,
        current_time: BlockNumber,
    ) -> BlockNumber {
        let checking_time = disputable
            .claim
            .assertion_stub
            .num_gas
            .div_ceil(params.arb_gas_speed_limit_per_block.max(1));
        current_time.max(prev.deadline) + params.grace_period + checking_time
    }

    pub fn hash(&self) -> CryptoHash {
        self.hash
    }

    pub fn depth(&self) -> NodeDepth {
        self.depth
    }

    pub fn prev(&self) -> Option<CryptoHash> {
        self.prev
    }

    pub fn link_type(&self) -> ChildType {
        self.link_type
    }

    pub fn successor(&self, child_type: ChildType) -> Option<CryptoHash> {
        self.successor_hashes[child_type.index()]
    }

    /// Iterate over the hashes of this node's children that are still in the graph.
    pub fn live_successors(&self) -> impl Iterator<Item = CryptoHash> + '_ {
        self.successor_hashes.iter().filter_map(|s| *s)
    }

    pub fn num_live_successors(&self) -> usize {
        self.live_successors().count()
    }

    pub fn vm_proto_data(&self) -> &VmProtoData {
        &self.vm_proto_data
    }

    pub fn disputable(&self) -> Option<&DisputableNode> {
        self.disputable.as_ref()
    }

    pub fn deadline(&self) -> BlockNumber {
        self.deadline
    }

    pub fn assertion_tx_hash(&self) -> CryptoHash {
        self.assertion_tx_hash
    }

    pub fn num_stakers(&self) -> u64 {
        self.num_stakers
    }

    pub fn machine(&self) -> Option<&Arc<M>> {
        self.machine.as_ref()
    }

    pub(crate) fn set_machine(&mut self, machine: Arc<M>) {
        self.machine = Some(machine)
    }

    /// Recompute this node's hash from its committed fields.
    pub(crate) fn computed_hash(&self) -> Option<CryptoHash> {
        match (&self.prev, &self.disputable) {
            (None, None) => Some(Self::genesis_hash(&self.vm_proto_data)),
            (Some(prev), Some(disputable)) => Some(Self::child_hash(
                prev,
                self.link_type,
                disputable,
                &self.vm_proto_data,
                self.deadline,
            )),
            _ => None,
        }
    }
}

impl<M: Machine> PartialEq for Node<M> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.depth == other.depth
            && self.prev == other.prev
            && self.link_type == other.link_type
            && self.successor_hashes == other.successor_hashes
            && self.vm_proto_data == other.vm_proto_data
            && self.disputable == other.disputable
            && self.deadline == other.deadline
            && self.assertion_tx_hash == other.assertion_tx_hash
            && self.num_stakers == other.num_stakers
            && self.machine.as_ref().map(|m| m.hash()) == other.machine.as_ref().map(|m| m.hash())
    }
}

impl<M: Machine> Eq for Node<M> {}

impl<M: Machine> Debug for Node<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("hash", &self.hash)
            .field("depth", &self.depth)
            .field("prev", &self.prev)
            .field("link_type", &self.link_type)
            .field("successor_hashes", &self.successor_hashes)
            .field("num_stakers", &self.num_stakers)
            .field("deadline", &self.deadline)
            .field("has_machine", &self.machine.is_some())
            .finish()
    }
}
