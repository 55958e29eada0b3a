/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Marshalling of a [`ChainObserver`] into a checkpoint buffer, and back.
//!
//! ## Buffer format
//!
//! A checkpoint buffer is the Borsh serialization of a [`ChainObserverBuf`]. Nodes are stored without
//! their successor slots and without their staker counts; both are rebuilt on restore from the
//! nodes' `prev`/`link_type` fields and from the staker registry respectively. Machines are stored
//! by hash only (see [`context`](super::context)).
//!
//! ## Restoring
//!
//! Restoring validates the buffer completely before handing out an observer:
//! 1. Every node's hash is recomputed from its committed fields.
//! 2. Every node but the oldest must have its predecessor in the buffer, at one depth less, and no
//!    two nodes may occupy the same successor slot.
//! 3. Every hash the buffer refers to (oldest and latest confirmed nodes, leaves, prune candidates,
//!    staker locations, known and calculated valid nodes) must be the hash of a node in the buffer,
//!    and the parties of every challenge must be registered stakers.
//! 4. Every machine hash must resolve through the restore context.
//!
//! If any of these checks fails, a [`CheckpointError`] is returned and nothing is built.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    chain_observer::ChainObserver,
    inbox::PendingInbox,
    node_graph::{Challenge, Node, StakedNodeGraph, Staker},
    types::{
        assertion::{ChainParams, ChildType, DisputableNode, Message, VmProtoData},
        data_types::{Address, BlockId, BlockNumber, CryptoHash, NodeDepth},
        machine::Machine,
    },
};

use super::{
    context::{CheckpointContext, RestoreContext},
    CheckpointError,
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NodeBuf {
    pub hash: CryptoHash,
    pub depth: NodeDepth,
    pub prev: Option<CryptoHash>,
    pub link_type: ChildType,
    pub vm_proto_data: VmProtoData,
    pub disputable: Option<DisputableNode>,
    pub deadline: BlockNumber,
    pub assertion_tx_hash: CryptoHash,
    pub machine_hash: Option<CryptoHash>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StakedNodeGraphBuf {
    /// Sorted by depth, then by hash.
    pub nodes: Vec<NodeBuf>,
    pub oldest_node: CryptoHash,
    pub latest_confirmed: CryptoHash,
    pub leaves: Vec<CryptoHash>,
    pub prune_candidates: Vec<CryptoHash>,
    pub stakers: Vec<Staker>,
    pub challenges: Vec<Challenge>,
    pub params: ChainParams,
    pub create_invalid_nodes: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChainObserverBuf {
    pub staked_node_graph: StakedNodeGraphBuf,
    pub contract_address: Address,
    pub pending_inbox: Vec<Message>,
    pub known_valid_node: CryptoHash,
    pub calculated_valid_node: CryptoHash,
    pub is_opinionated: bool,
    pub latest_block: BlockId,
}

/// Get the buffer of an observer for a rollup that has just been created, without building the
/// observer itself.
pub fn make_initial_chain_observer_buf(
    contract_address: Address,
    machine_hash: CryptoHash,
    params: ChainParams,
    create_invalid_nodes: bool,
    is_opinionated: bool,
    start_block: BlockId,
) -> ChainObserverBuf {
    let vm_proto_data = VmProtoData::new(machine_hash, CryptoHash::zero(), 0);
    let genesis = NodeBuf {
        hash: vm_proto_data.hash(),
        depth: NodeDepth::new(0),
        prev: None,
        link_type: ChildType::Valid,
        vm_proto_data,
        disputable: None,
        deadline: BlockNumber::new(0),
        assertion_tx_hash: CryptoHash::zero(),
        machine_hash: Some(machine_hash),
    };
    let genesis_hash = genesis.hash;
    ChainObserverBuf {
        staked_node_graph: StakedNodeGraphBuf {
            nodes: vec![genesis],
            oldest_node: genesis_hash,
            latest_confirmed: genesis_hash,
            leaves: vec![genesis_hash],
            prune_candidates: Vec::new(),
            stakers: Vec::new(),
            challenges: Vec::new(),
            params,
            create_invalid_nodes,
        },
        contract_address,
        pending_inbox: Vec::new(),
        known_valid_node: genesis_hash,
        calculated_valid_node: genesis_hash,
        is_opinionated,
        latest_block: start_block,
    }
}

/* ↓↓↓ Marshalling ↓↓↓ */

impl<M: Machine> Node<M> {
    fn marshal_for_checkpoint(&self, ctx: &mut CheckpointContext<M>) -> NodeBuf {
        NodeBuf {
            hash: self.hash,
            depth: self.depth,
            prev: self.prev,
            link_type: self.link_type,
            vm_proto_data: self.vm_proto_data,
            disputable: self.disputable,
            deadline: self.deadline,
            assertion_tx_hash: self.assertion_tx_hash,
            machine_hash: self.machine.as_ref().map(|machine| ctx.add_machine(machine)),
        }
    }
}

impl<M: Machine> StakedNodeGraph<M> {
    pub fn marshal_for_checkpoint(&self, ctx: &mut CheckpointContext<M>) -> StakedNodeGraphBuf {
        let mut nodes: Vec<NodeBuf> = self
            .nodes
            .values()
            .map(|node| node.marshal_for_checkpoint(ctx))
            .collect();
        nodes.sort_by_key(|node| (node.depth, node.hash));
        StakedNodeGraphBuf {
            nodes,
            oldest_node: self.oldest_node,
            latest_confirmed: self.latest_confirmed,
            leaves: self.leaves.iter().copied().collect(),
            prune_candidates: self.prune_candidates.iter().copied().collect(),
            stakers: self.stakers.values().cloned().collect(),
            challenges: self.challenges.values().cloned().collect(),
            params: self.params,
            create_invalid_nodes: self.create_invalid_nodes,
        }
    }
}

impl<M: Machine> ChainObserver<M> {
    pub fn marshal_for_checkpoint(&self, ctx: &mut CheckpointContext<M>) -> ChainObserverBuf {
        ChainObserverBuf {
            staked_node_graph: self.node_graph.marshal_for_checkpoint(ctx),
            contract_address: self.rollup_address,
            pending_inbox: self.pending_inbox.messages().to_vec(),
            known_valid_node: self.known_valid_node,
            calculated_valid_node: self.calculated_valid_node,
            is_opinionated: self.is_opinionated,
            latest_block: self.latest_block,
        }
    }

    pub fn marshal_to_bytes(&self, ctx: &mut CheckpointContext<M>) -> Result<Vec<u8>, CheckpointError> {
        self.marshal_for_checkpoint(ctx)
            .try_to_vec()
            .map_err(CheckpointError::Serialize)
    }
}

/* ↓↓↓ Unmarshalling ↓↓↓ */

impl StakedNodeGraphBuf {
    pub fn unmarshal_from_checkpoint<M: Machine, R: RestoreContext<M>>(
        &self,
        restore_ctx: &R,
    ) -> Result<StakedNodeGraph<M>, CheckpointError> {
        let mut machines: HashMap<CryptoHash, Arc<M>> = HashMap::new();
        let mut nodes: HashMap<CryptoHash, Node<M>> = HashMap::with_capacity(self.nodes.len());

        for node_buf in &self.nodes {
            let machine = match node_buf.machine_hash {
                Some(machine_hash) => Some(restore_machine(restore_ctx, &mut machines, machine_hash)?),
                None => None,
            };
            let node = Node {
                hash: node_buf.hash,
                depth: node_buf.depth,
                prev: node_buf.prev,
                link_type: node_buf.link_type,
                successor_hashes: [None; ChildType::COUNT],
                vm_proto_data: node_buf.vm_proto_data,
                disputable: node_buf.disputable,
                deadline: node_buf.deadline,
                assertion_tx_hash: node_buf.assertion_tx_hash,
                num_stakers: 0,
                machine,
            };
            match node.computed_hash() {
                Some(computed) if computed == node.hash => (),
                Some(computed) => {
                    return Err(CheckpointError::NodeHashMismatch {
                        stored: node.hash,
                        computed,
                    })
                }
                None => return Err(CheckpointError::MalformedNode { node: node.hash }),
            }
            if nodes.insert(node.hash, node).is_some() {
                return Err(CheckpointError::DuplicateNode {
                    node: node_buf.hash,
                });
            }
        }

        // Re-link successors.
        let mut links = Vec::new();
        for node in nodes.values() {
            let Some(prev_hash) = node.prev else {
                continue;
            };
            match nodes.get(&prev_hash) {
                Some(prev) if prev.depth + 1 == node.depth => {
                    links.push((prev_hash, node.link_type, node.hash))
                }
                Some(_) => return Err(CheckpointError::MalformedNode { node: node.hash }),
                None if node.hash == self.oldest_node => (),
                None => return Err(CheckpointError::MissingNode { node: prev_hash }),
            }
        }
        for (prev_hash, link_type, hash) in links {
            // Safety: every link was formed from a prev found in nodes above.
            let prev = nodes.get_mut(&prev_hash).unwrap();
            if prev.successor_hashes[link_type.index()].is_some() {
                return Err(CheckpointError::DuplicateNode { node: hash });
            }
            prev.successor_hashes[link_type.index()] = Some(hash);
        }

        let require = |hash: &CryptoHash| {
            if nodes.contains_key(hash) {
                Ok(*hash)
            } else {
                Err(CheckpointError::MissingNode { node: *hash })
            }
        };
        let oldest_node = require(&self.oldest_node)?;
        let latest_confirmed = require(&self.latest_confirmed)?;
        let leaves = self
            .leaves
            .iter()
            .map(require)
            .collect::<Result<BTreeSet<CryptoHash>, CheckpointError>>()?;
        let prune_candidates = self
            .prune_candidates
            .iter()
            .map(require)
            .collect::<Result<BTreeSet<CryptoHash>, CheckpointError>>()?;

        let mut stakers = BTreeMap::new();
        for staker in &self.stakers {
            require(&staker.location)?;
            stakers.insert(staker.address, staker.clone());
        }
        let mut challenges = BTreeMap::new();
        for challenge in &self.challenges {
            for party in [challenge.asserter, challenge.challenger] {
                if !stakers.contains_key(&party) {
                    return Err(CheckpointError::MissingStaker { staker: party });
                }
            }
            challenges.insert(challenge.contract, challenge.clone());
        }

        for staker in stakers.values() {
            // Safety: every staker location was required above.
            nodes.get_mut(&staker.location).unwrap().num_stakers += 1;
        }

        Ok(StakedNodeGraph {
            nodes,
            leaves,
            oldest_node,
            latest_confirmed,
            stakers,
            challenges,
            prune_candidates,
            params: self.params,
            create_invalid_nodes: self.create_invalid_nodes,
        })
    }
}

impl ChainObserverBuf {
    /// Rebuild the observer this buffer was marshalled from. The observer has no listeners.
    pub fn unmarshal_from_checkpoint<M: Machine, R: RestoreContext<M>>(
        &self,
        restore_ctx: &R,
    ) -> Result<ChainObserver<M>, CheckpointError> {
        let node_graph = self.staked_node_graph.unmarshal_from_checkpoint(restore_ctx)?;
        for hash in [&self.known_valid_node, &self.calculated_valid_node] {
            if !node_graph.contains(hash) {
                return Err(CheckpointError::MissingNode { node: *hash });
            }
        }
        Ok(ChainObserver {
            node_graph,
            rollup_address: self.contract_address,
            pending_inbox: PendingInbox::from_messages(self.pending_inbox.clone()),
            known_valid_node: self.known_valid_node,
            calculated_valid_node: self.calculated_valid_node,
            latest_block: self.latest_block,
            is_opinionated: self.is_opinionated,
            listeners: Vec::new(),
        })
    }
}

pub fn unmarshal_chain_observer_from_bytes<M: Machine, R: RestoreContext<M>>(
    bytes: &[u8],
    restore_ctx: &R,
) -> Result<ChainObserver<M>, CheckpointError> {
    ChainObserverBuf::try_from_slice(bytes)
        .map_err(CheckpointError::Deserialize)?
        .unmarshal_from_checkpoint(restore_ctx)
}

fn restore_machine<M: Machine, R: RestoreContext<M>>(
    restore_ctx: &R,
    machines: &mut HashMap<CryptoHash, Arc<M>>,
    machine_hash: CryptoHash,
) -> Result<Arc<M>, CheckpointError> {
    if let Some(machine) = machines.get(&machine_hash) {
        return Ok(Arc::clone(machine));
    }
    let machine = restore_ctx
        .machine(&machine_hash)?
        .ok_or(CheckpointError::MissingMachine { machine_hash })?;
    if machine.hash() != machine_hash {
        return Err(CheckpointError::MachineHashMismatch {
            stored: machine_hash,
            computed: machine.hash(),
        });
    }
    let machine = Arc::new(machine);
    machines.insert(machine_hash, Arc::clone(&machine));
    Ok(machine)
}
