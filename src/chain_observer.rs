/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ChainObserver`] state machine, which folds chain events into a [staked node
//! graph](crate::node_graph) and a [pending inbox](crate::inbox).
//!
//! A `ChainObserver` is a plain value with no threads or locks of its own. The
//! [rollup observer](crate::rollup_observer) wraps it in a single `RwLock` and drives it from the
//! event source and from its background threads.
//!
//! ## Error handling
//!
//! Events that would violate one of the node graph's invariants (asserting on a node that is not a
//! leaf, pruning a node that does not exist, starting a challenge between stakers whose nodes do not
//! conflict, ...) cannot be reconciled with the observer's state, and handling them panics. Events
//! that merely arrived before the message they refer to return [`ObserverError::UnknownInboxTop`]
//! and leave the observer unchanged, so that the event source may retry them later.
//!
//! ## Valid node pointers
//!
//! Besides the oldest and latest confirmed nodes tracked by the graph, the observer tracks:
//! - The **known valid node**: the deepest node the observer treats as valid. Read-only calls are
//!   executed against its machine.
//! - The **calculated valid node**: the node up to which an opinionated observer has executed
//!   assertions itself. It, and the chain of nodes leading to it, is never pruned, since the opinion
//!   former needs its machine to evaluate the next assertion.

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use crate::{
    checkpoint::CheckpointError,
    events::*,
    inbox::{InboxError, PendingInbox},
    listener::ChainListener,
    node_graph::{NodeGraphError, StakedNodeGraph},
    types::{
        assertion::{ChainParams, DisputableNode, Precondition, TimeBounds},
        data_types::{Address, BlockId, CryptoHash},
        machine::Machine,
    },
};

/// Width, in blocks, of the time bounds used for read-only calls.
pub const CALL_TIME_BOUNDS_WIDTH: u64 = 10;

pub struct ChainObserver<M: Machine> {
    pub(crate) node_graph: StakedNodeGraph<M>,
    pub(crate) rollup_address: Address,
    pub(crate) pending_inbox: PendingInbox,
    pub(crate) known_valid_node: CryptoHash,
    pub(crate) calculated_valid_node: CryptoHash,
    pub(crate) latest_block: BlockId,
    pub(crate) is_opinionated: bool,
    pub(crate) listeners: Vec<Arc<dyn ChainListener>>,
}

impl<M: Machine> ChainObserver<M> {
    /// Create an observer for a rollup that has just been created, i.e., whose graph contains only the
    /// genesis node holding `initial_machine`.
    pub fn new(
        rollup_address: Address,
        initial_machine: M,
        params: ChainParams,
        create_invalid_nodes: bool,
        is_opinionated: bool,
        start_block: BlockId,
    ) -> ChainObserver<M> {
        let node_graph = StakedNodeGraph::new(initial_machine, params, create_invalid_nodes);
        let genesis = node_graph.latest_confirmed();
        ChainObserver {
            node_graph,
            rollup_address,
            pending_inbox: PendingInbox::new(),
            known_valid_node: genesis,
            calculated_valid_node: genesis,
            latest_block: start_block,
            is_opinionated,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ChainListener>) {
        self.listeners.push(listener)
    }

    /* ↓↓↓ Accessors ↓↓↓ */

    pub fn node_graph(&self) -> &StakedNodeGraph<M> {
        &self.node_graph
    }

    pub fn pending_inbox(&self) -> &PendingInbox {
        &self.pending_inbox
    }

    pub fn rollup_address(&self) -> Address {
        self.rollup_address
    }

    pub fn known_valid_node(&self) -> CryptoHash {
        self.known_valid_node
    }

    pub fn calculated_valid_node(&self) -> CryptoHash {
        self.calculated_valid_node
    }

    pub fn latest_block(&self) -> BlockId {
        self.latest_block
    }

    pub fn is_opinionated(&self) -> bool {
        self.is_opinionated
    }

    /* ↓↓↓ Event dispatch ↓↓↓ */

    /// Apply `event` to the observer's state and notify listeners.
    ///
    /// # Panics
    ///
    /// If `event` is inconsistent with the observer's node graph. See the
    /// [module-level docs](self#error-handling).
    pub fn handle_event(&mut self, event: ChainEvent) -> Result<(), ObserverError> {
        match event {
            ChainEvent::MessageDelivered(event) => {
                self.message_delivered(event);
                Ok(())
            }
            ChainEvent::Asserted(event) => self.notify_assert(event),
            ChainEvent::Pruned(event) => {
                self.prune_leaf(event);
                Ok(())
            }
            ChainEvent::StakeCreated(event) => {
                self.create_stake(event);
                Ok(())
            }
            ChainEvent::StakeRefunded(event) => {
                self.remove_stake(event);
                Ok(())
            }
            ChainEvent::StakeMoved(event) => {
                self.move_stake(event);
                Ok(())
            }
            ChainEvent::ChallengeStarted(event) => {
                self.new_challenge(event);
                Ok(())
            }
            ChainEvent::ChallengeCompleted(event) => {
                self.challenge_resolved(event);
                Ok(())
            }
            ChainEvent::Confirmed(event) => {
                self.confirm_node(event);
                Ok(())
            }
        }
    }

    /// Advance the observer's notion of time. Confirmation deadlines and read-only call time bounds
    /// are measured against `block`.
    pub fn notify_new_block(&mut self, block: BlockId) {
        self.latest_block = block;
    }

    fn message_delivered(&mut self, event: MessageDeliveredEvent) {
        self.pending_inbox.deliver_message(event.message);
    }

    fn notify_assert(&mut self, event: AssertedEvent) -> Result<(), ObserverError> {
        let max_pending_count = self
            .pending_inbox
            .get_height(&event.max_pending_top)
            .ok_or(ObserverError::UnknownInboxTop {
                top: event.max_pending_top,
            })?;
        let disputable = DisputableNode::new(
            event.params,
            event.claim,
            event.max_pending_top,
            max_pending_count,
        );
        let nodes = self
            .node_graph
            .create_nodes_on_assert(
                &event.prev_leaf_hash,
                disputable,
                event.block_number,
                event.tx_hash,
            )
            .unwrap_or_else(|err| invariant_violation("Asserted", err));
        for listener in &self.listeners {
            listener.saw_assertion(&event, &nodes);
        }
        Ok(())
    }

    fn prune_leaf(&mut self, event: PrunedEvent) {
        if !self.node_graph.is_leaf(&event.leaf) {
            invariant_violation(
                "Pruned",
                NodeGraphError::NotALeaf { node: event.leaf },
            )
        }
        self.node_graph
            .prune_node_by_hash(&event.leaf)
            .unwrap_or_else(|err| invariant_violation("Pruned", err));

        let latest_confirmed = self.node_graph.latest_confirmed();
        if self.known_valid_node == event.leaf {
            self.known_valid_node = latest_confirmed;
        }
        if self.calculated_valid_node == event.leaf {
            self.calculated_valid_node = latest_confirmed;
        }
        self.update_oldest();

        for listener in &self.listeners {
            listener.pruned_leaf(&event);
        }
    }

    fn create_stake(&mut self, event: StakeCreatedEvent) {
        self.node_graph
            .create_stake(event.staker, event.node_hash, event.block_number)
            .unwrap_or_else(|err| invariant_violation("StakeCreated", err));
        for listener in &self.listeners {
            listener.stake_created(&event);
        }
    }

    fn remove_stake(&mut self, event: StakeRefundedEvent) {
        self.node_graph
            .remove_stake(event.staker)
            .unwrap_or_else(|err| invariant_violation("StakeRefunded", err));
        for listener in &self.listeners {
            listener.stake_removed(&event);
        }
    }

    fn move_stake(&mut self, event: StakeMovedEvent) {
        self.node_graph
            .move_stake(event.staker, event.location)
            .unwrap_or_else(|err| invariant_violation("StakeMoved", err));
        for listener in &self.listeners {
            listener.stake_moved(&event);
        }
    }

    fn new_challenge(&mut self, event: ChallengeStartedEvent) {
        let conflict = self
            .node_graph
            .new_challenge(
                event.challenge_contract,
                event.asserter,
                event.challenger,
                event.challenge_type,
            )
            .unwrap_or_else(|err| invariant_violation("ChallengeStarted", err));
        for listener in &self.listeners {
            listener.started_challenge(&event, &conflict);
        }
    }

    fn challenge_resolved(&mut self, event: ChallengeCompletedEvent) {
        self.node_graph
            .challenge_resolved(event.challenge_contract, event.winner, event.loser)
            .unwrap_or_else(|err| invariant_violation("ChallengeCompleted", err));
        for listener in &self.listeners {
            listener.completed_challenge(&event);
        }
    }

    fn confirm_node(&mut self, event: ConfirmedEvent) {
        let confirmed = match self.node_graph.node(&event.node_hash) {
            Some(node) => node,
            None => invariant_violation(
                "Confirmed",
                NodeGraphError::NodeNotFound {
                    node: event.node_hash,
                },
            ),
        };
        let (depth, prev, has_machine) =
            (confirmed.depth(), confirmed.prev(), confirmed.machine().is_some());

        let known_valid_is_shallower = self
            .node_graph
            .node(&self.known_valid_node)
            .map_or(true, |known| depth > known.depth());
        if known_valid_is_shallower {
            self.known_valid_node = event.node_hash;
        }

        // A confirmed node is valid. Catch the calculated valid node up to it unless the opinion former
        // still needs the nodes in between to compute its machine.
        let calculated_is_behind = !self
            .node_graph
            .is_descendant(&event.node_hash, &self.calculated_valid_node);
        if calculated_is_behind && (!self.is_opinionated || has_machine) {
            self.calculated_valid_node = event.node_hash;
        }

        self.node_graph.latest_confirmed = event.node_hash;
        if let Some(prev) = prev {
            self.node_graph.consider_pruning_node(&prev);
        }
        self.update_oldest();

        for listener in &self.listeners {
            listener.confirmed_node(&event);
        }
    }

    /* ↓↓↓ Maintenance ↓↓↓ */

    /// Advance the oldest node towards the latest confirmed node, pruning each oldest node that no
    /// one can need anymore. Runs until it reaches a fixed point.
    pub(crate) fn update_oldest(&mut self) {
        loop {
            let oldest = self.node_graph.oldest_node();
            if oldest == self.node_graph.latest_confirmed()
                || oldest == self.calculated_valid_node
                || oldest == self.known_valid_node
            {
                return;
            }
            let Some(node) = self.node_graph.node(&oldest) else {
                return;
            };
            if node.num_stakers() > 0 {
                return;
            }
            let successors: Vec<CryptoHash> = node.live_successors().collect();
            let successor = match successors.as_slice() {
                [successor] => *successor,
                _ => return,
            };
            self.node_graph
                .prune_node(&oldest)
                .unwrap_or_else(|err| invariant_violation("UpdateOldest", err));
            self.node_graph.oldest_node = successor;
        }
    }

    /// Prune every node scheduled for pruning that is still prunable, cascading to predecessors that
    /// become prunable in turn. Returns the hashes of the pruned nodes.
    pub fn prune_sweep(&mut self) -> Vec<CryptoHash> {
        let mut pruned = Vec::new();
        let mut queue = self.node_graph.take_prune_candidates();
        while let Some(hash) = queue.pop() {
            if hash == self.calculated_valid_node || hash == self.known_valid_node {
                self.node_graph.prune_candidates.insert(hash);
                continue;
            }
            if !self.node_graph.is_prunable(&hash) {
                continue;
            }
            let Ok(node) = self.node_graph.prune_node(&hash) else {
                continue;
            };
            pruned.push(hash);
            if let Some(prev) = node.prev() {
                if self.node_graph.is_prunable(&prev) {
                    queue.push(prev);
                }
            }
        }
        self.update_oldest();
        pruned
    }

    pub fn prunable_leaves(&self) -> Vec<CryptoHash> {
        self.node_graph.prunable_leaves()
    }

    pub fn confirmable_nodes(&self) -> Vec<CryptoHash> {
        self.node_graph.confirmable_nodes(self.latest_block.number)
    }

    /* ↓↓↓ Execution ↓↓↓ */

    /// Get everything needed to re-execute the assertion that created `node`.
    pub fn execution_precondition(&self, node: &CryptoHash) -> Result<Precondition, ObserverError> {
        let node = self
            .node_graph
            .node(node)
            .ok_or(ObserverError::NodeNotFound { node: *node })?;
        let disputable = node
            .disputable()
            .ok_or(ObserverError::NoAssertion { node: node.hash() })?;
        let prev_hash = node
            .prev()
            .ok_or(ObserverError::NoAssertion { node: node.hash() })?;
        let prev = self
            .node_graph
            .node(&prev_hash)
            .ok_or(ObserverError::NodeNotFound { node: prev_hash })?;
        let before_inbox = self.pending_inbox.value_for_subseq_by_hash(
            &prev.vm_proto_data().pending_top,
            &disputable.claim.after_pending_top,
        )?;
        Ok(Precondition {
            before_hash: prev.vm_proto_data().machine_hash,
            time_bounds: disputable.params.time_bounds,
            before_inbox,
        })
    }

    /// Time bounds for read-only calls: from the latest block to
    /// [`CALL_TIME_BOUNDS_WIDTH`] blocks after it.
    pub fn current_time_bounds(&self) -> TimeBounds {
        TimeBounds::new(
            self.latest_block.number,
            self.latest_block.number + CALL_TIME_BOUNDS_WIDTH,
        )
    }

    /// Get a copy of the machine of the known valid node, if the observer has it.
    pub(crate) fn known_valid_machine(&self) -> Result<M, ObserverError> {
        self.node_graph
            .node(&self.known_valid_node)
            .and_then(|node| node.machine())
            .map(|machine| M::clone(machine))
            .ok_or(ObserverError::MachineUnavailable {
                node: self.known_valid_node,
            })
    }
}

/// Observers are equal if their node graphs, rollup addresses, and pending inboxes are.
impl<M: Machine> PartialEq for ChainObserver<M> {
    fn eq(&self, other: &Self) -> bool {
        self.node_graph == other.node_graph
            && self.rollup_address == other.rollup_address
            && self.pending_inbox == other.pending_inbox
    }
}

fn invariant_violation(event: &str, err: NodeGraphError) -> ! {
    panic!("Inconsistent {} event: {}", event, err)
}

#[derive(Debug)]
pub enum ObserverError {
    /// An assertion referred to an inbox top that has not been delivered (yet).
    UnknownInboxTop { top: CryptoHash },
    NodeNotFound { node: CryptoHash },
    /// The node is the genesis node, which was not created by an assertion.
    NoAssertion { node: CryptoHash },
    MachineUnavailable { node: CryptoHash },
    Inbox(InboxError),
    Checkpoint(CheckpointError),
}

impl From<InboxError> for ObserverError {
    fn from(value: InboxError) -> Self {
        ObserverError::Inbox(value)
    }
}

impl From<CheckpointError> for ObserverError {
    fn from(value: CheckpointError) -> Self {
        ObserverError::Checkpoint(value)
    }
}

impl Display for ObserverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ObserverError::UnknownInboxTop { top } => {
                write!(f, "Couldn't find top message {} in inbox", top)
            }
            ObserverError::NodeNotFound { node } => write!(f, "Node {} not found", node),
            ObserverError::NoAssertion { node } => {
                write!(f, "Node {} was not created by an assertion", node)
            }
            ObserverError::MachineUnavailable { node } => {
                write!(f, "No machine available at node {}", node)
            }
            ObserverError::Inbox(err) => Display::fmt(err, f),
            ObserverError::Checkpoint(err) => Display::fmt(err, f),
        }
    }
}
