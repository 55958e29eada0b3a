/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events emitted by the rollup's contracts on the underlying chain.
//!
//! The event source (a chain watcher outside of this crate) delivers these to the
//! [rollup observer](crate::rollup_observer::RollupObserver::handle_event) in the order the chain
//! finalized them. The observer does not reorder events.

use crate::types::{
    assertion::{AssertionClaim, AssertionParams, ChallengeType, Message},
    data_types::{Address, BlockNumber, CryptoHash},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    MessageDelivered(MessageDeliveredEvent),
    Asserted(AssertedEvent),
    Pruned(PrunedEvent),
    StakeCreated(StakeCreatedEvent),
    StakeRefunded(StakeRefundedEvent),
    StakeMoved(StakeMovedEvent),
    ChallengeStarted(ChallengeStartedEvent),
    ChallengeCompleted(ChallengeCompletedEvent),
    Confirmed(ConfirmedEvent),
}

/// A message was sent to the rollup through the global inbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDeliveredEvent {
    pub message: Message,
}

/// A staker asserted the result of executing the machine on top of the leaf `prev_leaf_hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertedEvent {
    pub prev_leaf_hash: CryptoHash,
    pub params: AssertionParams,
    pub claim: AssertionClaim,
    /// Inbox top at the time of the assertion. Must already have been delivered.
    pub max_pending_top: CryptoHash,
    pub tx_hash: CryptoHash,
    pub block_number: BlockNumber,
}

/// A leaf that can no longer be confirmed was removed from the rollup contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrunedEvent {
    pub leaf: CryptoHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeCreatedEvent {
    pub staker: Address,
    pub node_hash: CryptoHash,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeRefundedEvent {
    pub staker: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeMovedEvent {
    pub staker: Address,
    pub location: CryptoHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeStartedEvent {
    pub asserter: Address,
    pub challenger: Address,
    pub challenge_type: ChallengeType,
    pub challenge_contract: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeCompletedEvent {
    pub winner: Address,
    pub loser: Address,
    pub challenge_contract: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedEvent {
    pub node_hash: CryptoHash,
}
