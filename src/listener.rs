/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ChainListener`] trait, through which users of the observer learn about changes to the rollup's
//! state.
//!
//! Listeners are registered either when [building](crate::rollup_observer::RollupObserverSpec) the
//! observer or later with [`add_listener`](crate::rollup_observer::RollupObserver::add_listener).
//! Registration is append-only, and every registered listener is called, in registration order, for
//! every callback.
//!
//! All methods have empty default implementations, so listeners only need to implement the callbacks
//! they care about. Callbacks that follow an event are called while the observer's write lock is
//! held, so they must not call back into the observer.

use crate::{
    events::*,
    node_graph::{AssertionNodes, ConflictPair},
    types::{assertion::ChildType, data_types::CryptoHash},
};

pub trait ChainListener: Send + Sync {
    fn saw_assertion(&self, _event: &AssertedEvent, _nodes: &AssertionNodes) {}

    fn pruned_leaf(&self, _event: &PrunedEvent) {}

    fn stake_created(&self, _event: &StakeCreatedEvent) {}

    fn stake_removed(&self, _event: &StakeRefundedEvent) {}

    fn stake_moved(&self, _event: &StakeMovedEvent) {}

    /// `conflict.first_branch` leads to the asserter's node, `conflict.second_branch` to the
    /// challenger's.
    fn started_challenge(&self, _event: &ChallengeStartedEvent, _conflict: &ConflictPair) {}

    fn completed_challenge(&self, _event: &ChallengeCompletedEvent) {}

    fn confirmed_node(&self, _event: &ConfirmedEvent) {}

    /// Called periodically with the leaves that no longer descend from the latest confirmed node and
    /// could therefore be pruned on chain.
    fn prunable_leaves(&self, _leaves: &[CryptoHash]) {}

    /// Called periodically with the chain of nodes that could be confirmed on chain, starting from the
    /// child of the latest confirmed node.
    fn confirmable_nodes(&self, _nodes: &[CryptoHash]) {}

    /// Called when an opinionated observer has executed the assertion below its calculated valid node
    /// and moved it to the child whose outcome matches `verdict`.
    fn advanced_calculated_valid_node(&self, _node: &CryptoHash, _verdict: ChildType) {}
}
