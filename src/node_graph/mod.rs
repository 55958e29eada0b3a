/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The staked node graph: the tree of assertions made on the rollup, the stakers backing them, and
//! the challenges between those stakers.
//!
//! ## Nodes and outcomes
//!
//! Every assertion made on top of a leaf creates children of that leaf, one per configured
//! [outcome](crate::types::assertion::ChildType): a **valid** child that commits to the state the
//! assertion claims, and, if the graph is configured with `create_invalid_nodes`, an **invalid** child
//! that commits to the state the machine would be in if the assertion were rejected. A node is a
//! **leaf** as long as some configured outcome slot is still empty.
//!
//! All references between nodes (`prev`, successor slots, staker locations) are hashes into the
//! graph's node arena. Pruning a node is therefore just removing its arena entry and clearing the
//! one slot in its predecessor that pointed to it.
//!
//! ## Errors
//!
//! The methods of [`StakedNodeGraph`] that mutate it return a [`NodeGraphError`] when the mutation
//! would violate one of the graph's invariants. Since events come from the underlying chain, these
//! errors indicate either a bug or an inconsistent event feed.

use std::fmt::{self, Display, Formatter};

use crate::types::{
    assertion::ChildType,
    data_types::{Address, CryptoHash},
};

pub mod conflict;

pub mod node;

pub mod staked_node_graph;

pub mod stakers;

pub use conflict::{ConflictError, ConflictPair};
pub use node::Node;
pub use staked_node_graph::{AssertionNodes, StakedNodeGraph};
pub use stakers::{Challenge, Staker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeGraphError {
    NodeNotFound {
        node: CryptoHash,
    },
    NotALeaf {
        node: CryptoHash,
    },
    SuccessorSlotOccupied {
        node: CryptoHash,
        child_type: ChildType,
    },
    StakerExists {
        staker: Address,
    },
    StakerNotFound {
        staker: Address,
    },
    NotADescendant {
        from: CryptoHash,
        to: CryptoHash,
    },
    StakerInChallenge {
        staker: Address,
        challenge: Address,
    },
    ChallengeExists {
        contract: Address,
    },
    ChallengeNotFound {
        contract: Address,
    },
    ChallengeParticipantsMismatch {
        contract: Address,
        winner: Address,
        loser: Address,
    },
    PruneProtectedNode {
        node: CryptoHash,
    },
    PruneStakedNode {
        node: CryptoHash,
        num_stakers: u64,
    },
    Conflict(ConflictError),
}

impl From<ConflictError> for NodeGraphError {
    fn from(value: ConflictError) -> Self {
        NodeGraphError::Conflict(value)
    }
}

impl Display for NodeGraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeGraphError::NodeNotFound { node } => write!(f, "Node {} not found", node),
            NodeGraphError::NotALeaf { node } => write!(f, "Node {} is not a leaf", node),
            NodeGraphError::SuccessorSlotOccupied { node, child_type } => write!(
                f,
                "Node {} already has a {:?} successor",
                node, child_type
            ),
            NodeGraphError::StakerExists { staker } => {
                write!(f, "Staker {} already exists", staker)
            }
            NodeGraphError::StakerNotFound { staker } => write!(f, "Staker {} not found", staker),
            NodeGraphError::NotADescendant { from, to } => write!(
                f,
                "Cannot move stake from {} to {}: not a strict descendant",
                from, to
            ),
            NodeGraphError::StakerInChallenge { staker, challenge } => write!(
                f,
                "Staker {} is in challenge {}",
                staker, challenge
            ),
            NodeGraphError::ChallengeExists { contract } => {
                write!(f, "Challenge {} already exists", contract)
            }
            NodeGraphError::ChallengeNotFound { contract } => {
                write!(f, "Challenge {} not found", contract)
            }
            NodeGraphError::ChallengeParticipantsMismatch {
                contract,
                winner,
                loser,
            } => write!(
                f,
                "Challenge {} is not between winner {} and loser {}",
                contract, winner, loser
            ),
            NodeGraphError::PruneProtectedNode { node } => write!(
                f,
                "Node {} is the oldest or latest confirmed node and cannot be pruned",
                node
            ),
            NodeGraphError::PruneStakedNode { node, num_stakers } => write!(
                f,
                "Node {} still has {} stakers and cannot be pruned",
                node, num_stakers
            ),
            NodeGraphError::Conflict(err) => Display::fmt(err, f),
        }
    }
}
