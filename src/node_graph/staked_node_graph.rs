/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`StakedNodeGraph`] type, which owns the node arena together with the leaf set and the
//! staker and challenge registries.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use crate::types::{
    assertion::{ChainParams, ChallengeType, ChildType, DisputableNode},
    data_types::{Address, BlockNumber, CryptoHash},
    machine::Machine,
};

use super::{
    conflict::{find_conflict, ConflictError, ConflictPair},
    node::Node,
    stakers::{Challenge, Staker},
    NodeGraphError,
};

/// Hashes of the nodes created by a single assertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssertionNodes {
    pub valid: CryptoHash,
    pub invalid: Option<CryptoHash>,
}

#[derive(Clone)]
pub struct StakedNodeGraph<M: Machine> {
    pub(crate) nodes: HashMap<CryptoHash, Node<M>>,
    pub(crate) leaves: BTreeSet<CryptoHash>,
    pub(crate) oldest_node: CryptoHash,
    pub(crate) latest_confirmed: CryptoHash,
    pub(crate) stakers: BTreeMap<Address, Staker>,
    pub(crate) challenges: BTreeMap<Address, Challenge>,
    pub(crate) prune_candidates: BTreeSet<CryptoHash>,
    pub(crate) params: ChainParams,
    pub(crate) create_invalid_nodes: bool,
}

impl<M: Machine> StakedNodeGraph<M> {
    /// Create a graph containing only a genesis node holding `machine`. The genesis node is at once
    /// the oldest node, the latest confirmed node, and the only leaf.
    pub fn new(machine: M, params: ChainParams, create_invalid_nodes: bool) -> StakedNodeGraph<M> {
        let genesis = Node::genesis(machine.hash(), Some(Arc::new(machine)));
        Self::with_genesis(genesis, params, create_invalid_nodes)
    }

    pub(crate) fn with_genesis(
        genesis: Node<M>,
        params: ChainParams,
        create_invalid_nodes: bool,
    ) -> StakedNodeGraph<M> {
        let genesis_hash = genesis.hash();
        StakedNodeGraph {
            nodes: HashMap::from([(genesis_hash, genesis)]),
            leaves: BTreeSet::from([genesis_hash]),
            oldest_node: genesis_hash,
            latest_confirmed: genesis_hash,
            stakers: BTreeMap::new(),
            challenges: BTreeMap::new(),
            prune_candidates: BTreeSet::new(),
            params,
            create_invalid_nodes,
        }
    }

    /* ↓↓↓ Accessors ↓↓↓ */

    pub fn node(&self, hash: &CryptoHash) -> Option<&Node<M>> {
        self.nodes.get(hash)
    }

    pub(crate) fn node_mut(&mut self, hash: &CryptoHash) -> Option<&mut Node<M>> {
        self.nodes.get_mut(hash)
    }

    pub fn contains(&self, hash: &CryptoHash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<M>> {
        self.nodes.values()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_leaf(&self, hash: &CryptoHash) -> bool {
        self.leaves.contains(hash)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &CryptoHash> {
        self.leaves.iter()
    }

    pub fn oldest_node(&self) -> CryptoHash {
        self.oldest_node
    }

    pub fn latest_confirmed(&self) -> CryptoHash {
        self.latest_confirmed
    }

    pub fn staker(&self, address: &Address) -> Option<&Staker> {
        self.stakers.get(address)
    }

    pub fn stakers(&self) -> impl Iterator<Item = &Staker> {
        self.stakers.values()
    }

    pub fn challenge(&self, contract: &Address) -> Option<&Challenge> {
        self.challenges.get(contract)
    }

    pub fn challenges(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn create_invalid_nodes(&self) -> bool {
        self.create_invalid_nodes
    }

    pub fn prune_candidates(&self) -> impl Iterator<Item = &CryptoHash> {
        self.prune_candidates.iter()
    }

    /// The outcome slots that assertions fill, in the order their nodes are created.
    pub fn child_types(&self) -> &'static [ChildType] {
        if self.create_invalid_nodes {
            &[ChildType::Valid, ChildType::Invalid]
        } else {
            &[ChildType::Valid]
        }
    }

    /* ↓↓↓ Assertions ↓↓↓ */

    /// Create a child of `prev_leaf` for every configured outcome of `disputable`.
    ///
    /// Nothing is changed if any of the outcome slots to fill is already occupied.
    pub fn create_nodes_on_assert(
        &mut self,
        prev_leaf: &CryptoHash,
        disputable: DisputableNode,
        current_time: BlockNumber,
        assertion_tx_hash: CryptoHash,
    ) -> Result<AssertionNodes, NodeGraphError> {
        if !self.is_leaf(prev_leaf) {
            return Err(NodeGraphError::NotALeaf { node: *prev_leaf });
        }
        let prev = self
            .nodes
            .get(prev_leaf)
            .ok_or(NodeGraphError::NodeNotFound { node: *prev_leaf })?;
        if let Some(child_type) = self
            .child_types()
            .iter()
            .find(|child_type| prev.successor(**child_type).is_some())
        {
            return Err(NodeGraphError::SuccessorSlotOccupied {
                node: *prev_leaf,
                child_type: *child_type,
            });
        }

        let children: Vec<Node<M>> = self
            .child_types()
            .iter()
            .map(|child_type| {
                Node::child(
                    prev,
                    *child_type,
                    disputable,
                    &self.params,
                    current_time,
                    assertion_tx_hash,
                )
            })
            .collect();

        let mut created = AssertionNodes {
            valid: CryptoHash::zero(),
            invalid: None,
        };
        for child in children {
            let (hash, link_type) = (child.hash(), child.link_type());
            match link_type {
                ChildType::Valid => created.valid = hash,
                ChildType::Invalid => created.invalid = Some(hash),
            }
            // Safety: prev_leaf was found above and nothing has been removed since.
            self.nodes.get_mut(prev_leaf).unwrap().successor_hashes[link_type.index()] = Some(hash);
            self.leaves.insert(hash);
            self.nodes.insert(hash, child);
        }
        self.update_leaf_status(prev_leaf);

        Ok(created)
    }

    /// Remove `hash` from the leaf set once every configured outcome slot is filled.
    fn update_leaf_status(&mut self, hash: &CryptoHash) {
        if let Some(node) = self.nodes.get(hash) {
            if self
                .child_types()
                .iter()
                .all(|child_type| node.successor(*child_type).is_some())
            {
                self.leaves.remove(hash);
            }
        }
    }

    /* ↓↓↓ Stakes ↓↓↓ */

    pub fn create_stake(
        &mut self,
        staker: Address,
        location: CryptoHash,
        current_time: BlockNumber,
    ) -> Result<(), NodeGraphError> {
        if self.stakers.contains_key(&staker) {
            return Err(NodeGraphError::StakerExists { staker });
        }
        let node = self
            .nodes
            .get_mut(&location)
            .ok_or(NodeGraphError::NodeNotFound { node: location })?;
        node.num_stakers += 1;
        self.stakers
            .insert(staker, Staker::new(staker, location, current_time));
        Ok(())
    }

    /// Move `staker` forward to `new_location`, which must be a strict descendant of its current
    /// location.
    pub fn move_stake(
        &mut self,
        staker: Address,
        new_location: CryptoHash,
    ) -> Result<(), NodeGraphError> {
        let old_location = self
            .stakers
            .get(&staker)
            .ok_or(NodeGraphError::StakerNotFound { staker })?
            .location;
        if !self.contains(&new_location) {
            return Err(NodeGraphError::NodeNotFound { node: new_location });
        }
        if old_location == new_location || !self.is_descendant(&old_location, &new_location) {
            return Err(NodeGraphError::NotADescendant {
                from: old_location,
                to: new_location,
            });
        }

        self.decrement_stakers(&old_location);
        // Safety: both the staker and new_location were checked above.
        self.nodes.get_mut(&new_location).unwrap().num_stakers += 1;
        self.stakers.get_mut(&staker).unwrap().location = new_location;
        self.consider_pruning_node(&old_location);
        Ok(())
    }

    /// Remove the stake of `staker`, which must not be in a challenge.
    pub fn remove_stake(&mut self, staker: Address) -> Result<Staker, NodeGraphError> {
        let current = self
            .stakers
            .get(&staker)
            .ok_or(NodeGraphError::StakerNotFound { staker })?;
        if let Some(challenge) = current.challenge {
            return Err(NodeGraphError::StakerInChallenge { staker, challenge });
        }
        // Safety: checked above.
        let removed = self.stakers.remove(&staker).unwrap();
        self.decrement_stakers(&removed.location);
        self.consider_pruning_node(&removed.location);
        Ok(removed)
    }

    fn decrement_stakers(&mut self, location: &CryptoHash) {
        if let Some(node) = self.nodes.get_mut(location) {
            node.num_stakers = node.num_stakers.saturating_sub(1);
        }
    }

    /* ↓↓↓ Challenges ↓↓↓ */

    /// Record a challenge between `asserter` and `challenger`, returning where their nodes diverge.
    /// The returned pair's first branch leads to the asserter.
    pub fn new_challenge(
        &mut self,
        contract: Address,
        asserter: Address,
        challenger: Address,
        challenge_type: ChallengeType,
    ) -> Result<ConflictPair, NodeGraphError> {
        if self.challenges.contains_key(&contract) {
            return Err(NodeGraphError::ChallengeExists { contract });
        }
        let mut locations = Vec::with_capacity(2);
        for staker in [asserter, challenger] {
            let staker = self
                .stakers
                .get(&staker)
                .ok_or(NodeGraphError::StakerNotFound { staker })?;
            if let Some(challenge) = staker.challenge {
                return Err(NodeGraphError::StakerInChallenge {
                    staker: staker.address,
                    challenge,
                });
            }
            locations.push(staker.location);
        }
        let conflict = self.conflict_ancestor(&locations[0], &locations[1])?;

        self.challenges.insert(
            contract,
            Challenge {
                contract,
                asserter,
                challenger,
                challenge_type,
                conflict,
            },
        );
        for staker in [asserter, challenger] {
            // Safety: both stakers were checked above.
            self.stakers.get_mut(&staker).unwrap().challenge = Some(contract);
        }
        Ok(conflict)
    }

    /// End the challenge at `contract`, removing the stake of `loser`. `winner` and `loser` must be
    /// the two parties the challenge was recorded between.
    pub fn challenge_resolved(
        &mut self,
        contract: Address,
        winner: Address,
        loser: Address,
    ) -> Result<Challenge, NodeGraphError> {
        let challenge = self
            .challenges
            .get(&contract)
            .ok_or(NodeGraphError::ChallengeNotFound { contract })?;
        if !challenge.is_between(&winner, &loser) {
            return Err(NodeGraphError::ChallengeParticipantsMismatch {
                contract,
                winner,
                loser,
            });
        }
        if !self.stakers.contains_key(&loser) {
            return Err(NodeGraphError::StakerNotFound { staker: loser });
        }

        // Safety: checked above.
        let challenge = self.challenges.remove(&contract).unwrap();
        for party in [winner, loser] {
            if let Some(party) = self.stakers.get_mut(&party) {
                party.challenge = None;
            }
        }
        self.remove_stake(loser)?;
        Ok(challenge)
    }

    /* ↓↓↓ Pruning ↓↓↓ */

    /// Remove the node `hash` from the graph and clear the successor slot of its predecessor that
    /// pointed to it.
    pub fn prune_node(&mut self, hash: &CryptoHash) -> Result<Node<M>, NodeGraphError> {
        let node = self
            .nodes
            .remove(hash)
            .ok_or(NodeGraphError::NodeNotFound { node: *hash })?;
        self.leaves.remove(hash);
        self.prune_candidates.remove(hash);
        if let Some(prev) = node.prev().and_then(|prev| self.nodes.get_mut(&prev)) {
            if prev.successor_hashes[node.link_type().index()] == Some(*hash) {
                prev.successor_hashes[node.link_type().index()] = None;
            }
        }
        Ok(node)
    }

    /// Prune the node `hash`, which must be neither the oldest nor the latest confirmed node and must
    /// have no stakers, then consider whether its predecessor has become prunable too.
    pub fn prune_node_by_hash(&mut self, hash: &CryptoHash) -> Result<Node<M>, NodeGraphError> {
        if *hash == self.latest_confirmed || *hash == self.oldest_node {
            return Err(NodeGraphError::PruneProtectedNode { node: *hash });
        }
        if let Some(node) = self.nodes.get(hash) {
            if node.num_stakers() > 0 {
                return Err(NodeGraphError::PruneStakedNode {
                    node: *hash,
                    num_stakers: node.num_stakers(),
                });
            }
        }
        let node = self.prune_node(hash)?;
        if let Some(prev) = node.prev() {
            self.consider_pruning_node(&prev);
        }
        Ok(node)
    }

    /// Whether `hash` could be removed without losing information anyone can still need: it has no
    /// stakers, no children left, is not a leaf, and is neither the latest confirmed nor the oldest
    /// node.
    pub fn is_prunable(&self, hash: &CryptoHash) -> bool {
        match self.nodes.get(hash) {
            Some(node) => {
                node.num_stakers() == 0
                    && node.num_live_successors() == 0
                    && !self.is_leaf(hash)
                    && *hash != self.latest_confirmed
                    && *hash != self.oldest_node
            }
            None => false,
        }
    }

    /// Schedule `hash` for the next cleanup sweep if it is prunable. Returns whether it was scheduled.
    pub fn consider_pruning_node(&mut self, hash: &CryptoHash) -> bool {
        if self.is_prunable(hash) {
            self.prune_candidates.insert(*hash);
            true
        } else {
            false
        }
    }

    pub(crate) fn take_prune_candidates(&mut self) -> Vec<CryptoHash> {
        std::mem::take(&mut self.prune_candidates).into_iter().collect()
    }

    /// Leaves that can no longer become confirmed, because they do not descend from the latest
    /// confirmed node.
    pub fn prunable_leaves(&self) -> Vec<CryptoHash> {
        self.leaves
            .iter()
            .filter(|leaf| !self.is_descendant(&self.latest_confirmed, leaf))
            .copied()
            .collect()
    }

    /* ↓↓↓ Confirmation ↓↓↓ */

    /// Walk forward from the latest confirmed node, collecting the chain of nodes that could be
    /// confirmed at `current_block`.
    ///
    /// A successor qualifies if its deadline has passed and every staker is staked on it or on one of
    /// its descendants. The walk stops when no successor, or more than one, qualifies.
    pub fn confirmable_nodes(&self, current_block: BlockNumber) -> Vec<CryptoHash> {
        let mut confirmable = Vec::new();
        let mut cursor = self.latest_confirmed;
        loop {
            let Some(node) = self.nodes.get(&cursor) else {
                break;
            };
            let mut qualifying = node.live_successors().filter(|successor| {
                self.nodes
                    .get(successor)
                    .map_or(false, |s| current_block > s.deadline())
                    && self
                        .stakers
                        .values()
                        .all(|staker| self.is_descendant(successor, &staker.location))
            });
            match (qualifying.next(), qualifying.next()) {
                (Some(next), None) => {
                    confirmable.push(next);
                    cursor = next;
                }
                _ => break,
            }
        }
        confirmable
    }

    /* ↓↓↓ Ancestry ↓↓↓ */

    /// Whether `node` is `ancestor` or one of its descendants.
    pub fn is_descendant(&self, ancestor: &CryptoHash, node: &CryptoHash) -> bool {
        let Some(ancestor_depth) = self.nodes.get(ancestor).map(|n| n.depth()) else {
            return false;
        };
        let mut cursor = self.nodes.get(node);
        while let Some(current) = cursor {
            if current.hash() == *ancestor {
                return true;
            }
            if current.depth() <= ancestor_depth {
                return false;
            }
            cursor = current.prev().and_then(|prev| self.nodes.get(&prev));
        }
        false
    }

    /// Find the deepest common ancestor of `first` and `second`, and the child of it on each of
    /// their paths.
    pub fn conflict_ancestor(
        &self,
        first: &CryptoHash,
        second: &CryptoHash,
    ) -> Result<ConflictPair, ConflictError> {
        find_conflict(*first, *second, |hash| {
            self.nodes.get(hash).map(|node| (node.depth(), node.prev()))
        })
    }
}

impl<M: Machine> PartialEq for StakedNodeGraph<M> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.leaves == other.leaves
            && self.oldest_node == other.oldest_node
            && self.latest_confirmed == other.latest_confirmed
            && self.stakers == other.stakers
            && self.challenges == other.challenges
            && self.params == other.params
            && self.create_invalid_nodes == other.create_invalid_nodes
    }
}
