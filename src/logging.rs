/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out chain events.
//!
//! The logs defined in this module are printed if the user enabled them via the observer's
//! [config](crate::rollup_observer::Configuration), which registers a [`LoggingListener`] as the
//! observer's first listener.
//!
//! The rollup observer logs using the [log](https://docs.rs/log/latest/log/) crate. To get these
//! messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was processed (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how an [Asserted](crate::events::AssertedEvent) event is printed:
//!
//! ```text
//! Asserted, 1701329264, Id5u7f6, fNGCJyk, 42
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the leaf the assertion
//!   was made on.
//! - The fourth value is the first seven characters of the Base64 encoding of the machine hash the
//!   assertion claims.
//! - The fifth value is the block number the assertion was made in.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;

use crate::{
    events::*,
    listener::ChainListener,
    node_graph::{AssertionNodes, ConflictPair},
    types::{assertion::ChildType, data_types::CryptoHash},
};

// Names of each event in PascalCase for printing:
pub const ASSERTED: &str = "Asserted";
pub const PRUNED: &str = "Pruned";
pub const STAKE_CREATED: &str = "StakeCreated";
pub const STAKE_REFUNDED: &str = "StakeRefunded";
pub const STAKE_MOVED: &str = "StakeMoved";
pub const CHALLENGE_STARTED: &str = "ChallengeStarted";
pub const CHALLENGE_COMPLETED: &str = "ChallengeCompleted";
pub const CONFIRMED: &str = "Confirmed";

pub const PRUNABLE_LEAVES: &str = "PrunableLeaves";
pub const CONFIRMABLE_NODES: &str = "ConfirmableNodes";
pub const ADVANCE_CALCULATED_VALID: &str = "AdvanceCalculatedValid";

type LogFn<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> LogFn<Self>;
}

impl Logger for AssertedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |asserted_event: &AssertedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ASSERTED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&asserted_event.prev_leaf_hash.bytes()),
                first_seven_base64_chars(&asserted_event.claim.assertion_stub.after_hash.bytes()),
                asserted_event.block_number
            )
        };
        Box::new(logger)
    }
}

impl Logger for PrunedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |pruned_event: &PrunedEvent| {
            log::info!(
                "{}, {}, {}",
                PRUNED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&pruned_event.leaf.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for StakeCreatedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |stake_created_event: &StakeCreatedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                STAKE_CREATED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&stake_created_event.staker.bytes()),
                first_seven_base64_chars(&stake_created_event.node_hash.bytes()),
                stake_created_event.block_number
            )
        };
        Box::new(logger)
    }
}

impl Logger for StakeRefundedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |stake_refunded_event: &StakeRefundedEvent| {
            log::info!(
                "{}, {}, {}",
                STAKE_REFUNDED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&stake_refunded_event.staker.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for StakeMovedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |stake_moved_event: &StakeMovedEvent| {
            log::info!(
                "{}, {}, {}, {}",
                STAKE_MOVED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&stake_moved_event.staker.bytes()),
                first_seven_base64_chars(&stake_moved_event.location.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChallengeStartedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |challenge_started_event: &ChallengeStartedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}",
                CHALLENGE_STARTED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&challenge_started_event.challenge_contract.bytes()),
                first_seven_base64_chars(&challenge_started_event.asserter.bytes()),
                first_seven_base64_chars(&challenge_started_event.challenger.bytes()),
                challenge_started_event.challenge_type
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChallengeCompletedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |challenge_completed_event: &ChallengeCompletedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                CHALLENGE_COMPLETED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&challenge_completed_event.challenge_contract.bytes()),
                first_seven_base64_chars(&challenge_completed_event.winner.bytes()),
                first_seven_base64_chars(&challenge_completed_event.loser.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ConfirmedEvent {
    fn get_logger() -> LogFn<Self> {
        let logger = |confirmed_event: &ConfirmedEvent| {
            log::info!(
                "{}, {}, {}",
                CONFIRMED,
                secs_since_unix_epoch(SystemTime::now()),
                first_seven_base64_chars(&confirmed_event.node_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

/// A [`ChainListener`] that logs every callback it receives in the format described in the
/// [module-level docs](self).
pub struct LoggingListener {
    asserted: LogFn<AssertedEvent>,
    pruned: LogFn<PrunedEvent>,
    stake_created: LogFn<StakeCreatedEvent>,
    stake_refunded: LogFn<StakeRefundedEvent>,
    stake_moved: LogFn<StakeMovedEvent>,
    challenge_started: LogFn<ChallengeStartedEvent>,
    challenge_completed: LogFn<ChallengeCompletedEvent>,
    confirmed: LogFn<ConfirmedEvent>,
}

impl LoggingListener {
    pub fn new() -> LoggingListener {
        LoggingListener {
            asserted: AssertedEvent::get_logger(),
            pruned: PrunedEvent::get_logger(),
            stake_created: StakeCreatedEvent::get_logger(),
            stake_refunded: StakeRefundedEvent::get_logger(),
            stake_moved: StakeMovedEvent::get_logger(),
            challenge_started: ChallengeStartedEvent::get_logger(),
            challenge_completed: ChallengeCompletedEvent::get_logger(),
            confirmed: ConfirmedEvent::get_logger(),
        }
    }
}

impl Default for LoggingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainListener for LoggingListener {
    fn saw_assertion(&self, event: &AssertedEvent, nodes: &AssertionNodes) {
        (self.asserted)(event);
        log::debug!(
            "Assertion created valid node {} and invalid node {:?}",
            first_seven_base64_chars(&nodes.valid.bytes()),
            nodes.invalid.map(|hash| first_seven_base64_chars(&hash.bytes()))
        );
    }

    fn pruned_leaf(&self, event: &PrunedEvent) {
        (self.pruned)(event)
    }

    fn stake_created(&self, event: &StakeCreatedEvent) {
        (self.stake_created)(event)
    }

    fn stake_removed(&self, event: &StakeRefundedEvent) {
        (self.stake_refunded)(event)
    }

    fn stake_moved(&self, event: &StakeMovedEvent) {
        (self.stake_moved)(event)
    }

    fn started_challenge(&self, event: &ChallengeStartedEvent, conflict: &ConflictPair) {
        (self.challenge_started)(event);
        log::debug!(
            "Challenge {} diverges at {}",
            first_seven_base64_chars(&event.challenge_contract.bytes()),
            first_seven_base64_chars(&conflict.ancestor.bytes())
        );
    }

    fn completed_challenge(&self, event: &ChallengeCompletedEvent) {
        (self.challenge_completed)(event)
    }

    fn confirmed_node(&self, event: &ConfirmedEvent) {
        (self.confirmed)(event)
    }

    fn prunable_leaves(&self, leaves: &[CryptoHash]) {
        if !leaves.is_empty() {
            log::info!(
                "{}, {}, {}",
                PRUNABLE_LEAVES,
                secs_since_unix_epoch(SystemTime::now()),
                hash_list(leaves)
            )
        }
    }

    fn confirmable_nodes(&self, nodes: &[CryptoHash]) {
        if !nodes.is_empty() {
            log::info!(
                "{}, {}, {}",
                CONFIRMABLE_NODES,
                secs_since_unix_epoch(SystemTime::now()),
                hash_list(nodes)
            )
        }
    }

    fn advanced_calculated_valid_node(&self, node: &CryptoHash, verdict: ChildType) {
        log::info!(
            "{}, {}, {}, {:?}",
            ADVANCE_CALCULATED_VALID,
            secs_since_unix_epoch(SystemTime::now()),
            first_seven_base64_chars(&node.bytes()),
            verdict
        )
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}

fn hash_list(hashes: &[CryptoHash]) -> String {
    hashes
        .iter()
        .map(|hash| first_seven_base64_chars(&hash.bytes()))
        .collect::<Vec<_>>()
        .join(" ")
}
