/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A chain observer for optimistic rollups.
//!
//! An optimistic rollup executes a machine off chain and posts assertions about the results of that
//! execution to a rollup contract. Stakers back assertions, and conflicting stakers settle their
//! disagreements in challenges. This crate folds the events the rollup contract emits into a local
//! model of the contract's state:
//! - The [staked node graph](node_graph): the tree of assertions, the stakers on it, and their
//!   challenges.
//! - The [pending inbox](inbox): the messages sent to the rollup that assertions consume.
//!
//! The model is kept by a [`ChainObserver`](chain_observer::ChainObserver), which a
//! [`RollupObserver`](rollup_observer::RollupObserver) runs together with background threads that
//! prune the graph, report confirmable nodes, and (optionally) re-execute assertions to decide which
//! of them are valid. The observer's state is [checkpointed](checkpoint) on every new block.

pub mod chain_observer;

pub mod checkpoint;

pub mod events;

pub mod inbox;

pub mod listener;

pub mod logging;

pub(crate) mod maintenance;

pub mod node_graph;

pub mod opinion;

pub mod rollup_observer;

pub mod types;
