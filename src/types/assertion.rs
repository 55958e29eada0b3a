/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for assertions and the data that describes them.
//!
//! An assertion is a claim, made by a staker on the underlying chain, that executing the rollup's
//! machine for `num_steps` steps from the state committed by some node, against a range of messages
//! from the [pending inbox](crate::inbox), produces a given after-state. Every assertion creates
//! new nodes in the [staked node graph](crate::node_graph): one for the outcome where the assertion
//! is valid, and optionally one for the outcome where it is not.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{chain_hash, hash_borsh, hash_parts},
    data_types::{Address, BlockNumber, CryptoHash},
};

/// The outcome slot a node occupies in its predecessor's successor array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum ChildType {
    Invalid = 0,
    Valid = 1,
}

impl ChildType {
    /// Number of distinct outcome slots, i.e., the length of a node's successor array.
    pub const COUNT: usize = 2;

    pub const ALL: [ChildType; Self::COUNT] = [ChildType::Invalid, ChildType::Valid];

    pub const fn index(&self) -> usize {
        *self as usize
    }

    pub(crate) const fn byte(&self) -> u8 {
        *self as u8
    }
}

/// The kind of dispute a challenge contract adjudicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum ChallengeType {
    InvalidInboxTop,
    InvalidMessages,
    InvalidExecution,
}

/// An inclusive range of block numbers within which an assertion must be executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimeBounds {
    pub start: BlockNumber,
    pub end: BlockNumber,
}

impl TimeBounds {
    pub const fn new(start: BlockNumber, end: BlockNumber) -> Self {
        Self { start, end }
    }
}

/// A message delivered into the rollup's inbox on the underlying chain.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Message {
    pub sender: Address,
    pub block_number: BlockNumber,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(sender: Address, block_number: BlockNumber, payload: Vec<u8>) -> Self {
        Self {
            sender,
            block_number,
            payload,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        hash_borsh(self)
    }
}

/// An ordered run of messages taken from the pending inbox, together with the hash chain over them.
///
/// The hash chain starts from [`CryptoHash::zero`], so the hash of an empty `InboxValue` is the zero
/// hash, and the hash of a run that starts at the beginning of the inbox equals the inbox top after
/// the run's last message.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InboxValue {
    pub messages: Vec<Message>,
    pub hash: CryptoHash,
}

impl InboxValue {
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            hash: CryptoHash::zero(),
        }
    }

    pub fn new(messages: Vec<Message>) -> Self {
        let hash = messages
            .iter()
            .fold(CryptoHash::zero(), |top, msg| chain_hash(&top, &msg.hash()));
        Self { messages, hash }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Parameters of the rollup chain that the staked node graph needs to compute node deadlines and
/// bound execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChainParams {
    pub stake_requirement: u128,
    /// Number of blocks that stakers have to challenge a node before it may be confirmed.
    pub grace_period: u64,
    pub max_execution_steps: u64,
    /// How much gas the rollup can execute per block. Must be nonzero.
    pub arb_gas_speed_limit_per_block: u64,
}

/// The machine-state commitment held by every node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VmProtoData {
    pub machine_hash: CryptoHash,
    pub pending_top: CryptoHash,
    pub pending_count: u64,
}

impl VmProtoData {
    pub const fn new(machine_hash: CryptoHash, pending_top: CryptoHash, pending_count: u64) -> Self {
        Self {
            machine_hash,
            pending_top,
            pending_count,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        hash_borsh(self)
    }
}

/// What an assertion asks the machine to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AssertionParams {
    pub num_steps: u64,
    pub time_bounds: TimeBounds,
    pub imported_message_count: u64,
}

/// The full result of executing a machine.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ExecutionAssertion {
    pub after_hash: CryptoHash,
    pub did_inbox_insn: bool,
    pub num_gas: u64,
    pub out_messages: Vec<Vec<u8>>,
    pub logs: Vec<Vec<u8>>,
}

impl ExecutionAssertion {
    /// Get the constant-size summary of this assertion that is posted on chain.
    pub fn stub(&self) -> ExecutionAssertionStub {
        let chain = |items: &Vec<Vec<u8>>| {
            items
                .iter()
                .fold(CryptoHash::zero(), |top, item| chain_hash(&top, &hash_parts(&[item])))
        };
        ExecutionAssertionStub {
            after_hash: self.after_hash,
            did_inbox_insn: self.did_inbox_insn,
            num_gas: self.num_gas,
            last_message_hash: chain(&self.out_messages),
            last_log_hash: chain(&self.logs),
        }
    }
}

/// Constant-size summary of an [`ExecutionAssertion`]. Output messages and logs are committed to as
/// hash chains starting from the zero hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ExecutionAssertionStub {
    pub after_hash: CryptoHash,
    pub did_inbox_insn: bool,
    pub num_gas: u64,
    pub last_message_hash: CryptoHash,
    pub last_log_hash: CryptoHash,
}

/// What an assertion claims the result of executing its [`AssertionParams`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AssertionClaim {
    /// Inbox top after the imported messages have been consumed.
    pub after_pending_top: CryptoHash,
    pub imported_messages_hash: CryptoHash,
    pub assertion_stub: ExecutionAssertionStub,
}

/// An assertion that is still open to challenge, as held by a non-genesis node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DisputableNode {
    pub params: AssertionParams,
    pub claim: AssertionClaim,
    /// Inbox top at the time the assertion was made.
    pub max_pending_top: CryptoHash,
    /// Inbox height of `max_pending_top`.
    pub max_pending_count: u64,
}

impl DisputableNode {
    pub const fn new(
        params: AssertionParams,
        claim: AssertionClaim,
        max_pending_top: CryptoHash,
        max_pending_count: u64,
    ) -> Self {
        Self {
            params,
            claim,
            max_pending_top,
            max_pending_count,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        hash_borsh(self)
    }
}

/// Everything a machine needs to re-execute the assertion of a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Precondition {
    pub before_hash: CryptoHash,
    pub time_bounds: TimeBounds,
    pub before_inbox: InboxValue,
}
