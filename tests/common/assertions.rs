//! Builders for the chain events that integration tests feed into observers.

use rollup_observer::{
    chain_observer::ChainObserver,
    events::*,
    types::{
        assertion::{AssertionClaim, AssertionParams, ChainParams, ChallengeType, TimeBounds},
        crypto_primitives::hash_parts,
        data_types::{Address, BlockId, BlockNumber, CryptoHash},
        machine::Machine,
    },
};

use crate::common::number_machine::{increment_message, NumberMachine};

pub(crate) const GRACE_PERIOD: u64 = 5;

pub(crate) fn chain_params() -> ChainParams {
    ChainParams {
        stake_requirement: 10,
        grace_period: GRACE_PERIOD,
        max_execution_steps: 1_000,
        arb_gas_speed_limit_per_block: 100,
    }
}

pub(crate) fn address(n: u8) -> Address {
    Address::new([n; 20])
}

pub(crate) fn rollup_address() -> Address {
    address(0xee)
}

pub(crate) fn block(number: u64) -> BlockId {
    BlockId::new(
        BlockNumber::new(number),
        hash_parts(&[b"block", &number.to_le_bytes()]),
    )
}

pub(crate) fn tx_hash(n: u64) -> CryptoHash {
    hash_parts(&[b"tx", &n.to_le_bytes()])
}

pub(crate) fn deliver(amount: u64, block_number: u64) -> ChainEvent {
    ChainEvent::MessageDelivered(MessageDeliveredEvent {
        message: increment_message(address(1), BlockNumber::new(block_number), amount),
    })
}

/// Build an assertion on top of `prev` that correctly executes the next `imported` messages of the
/// observer's inbox on `machine`, which must be the machine `prev` commits to. Returns the event and
/// the machine after execution.
pub(crate) fn correct_assertion(
    observer: &ChainObserver<NumberMachine>,
    prev: &CryptoHash,
    machine: &NumberMachine,
    imported: u64,
    block_number: u64,
) -> (AssertedEvent, NumberMachine) {
    let inbox = observer.pending_inbox();
    let start = observer
        .node_graph()
        .node(prev)
        .unwrap()
        .vm_proto_data()
        .pending_count;
    let end = start + imported;
    let inbox_value = inbox.value_for_subseq(start, end).unwrap();
    let time_bounds = TimeBounds::new(
        BlockNumber::new(block_number),
        BlockNumber::new(block_number) + 10,
    );

    let mut after = machine.clone();
    let (assertion, steps) = after.execute_assertion(imported, &time_bounds, &inbox_value);
    let event = AssertedEvent {
        prev_leaf_hash: *prev,
        params: AssertionParams {
            num_steps: steps,
            time_bounds,
            imported_message_count: imported,
        },
        claim: AssertionClaim {
            after_pending_top: inbox.top_at(end).unwrap(),
            imported_messages_hash: inbox_value.hash,
            assertion_stub: assertion.stub(),
        },
        max_pending_top: inbox.top_hash(),
        tx_hash: tx_hash(block_number),
        block_number: BlockNumber::new(block_number),
    };
    (event, after)
}

/// Like [`correct_assertion`], but claims a machine state that execution does not produce.
pub(crate) fn wrong_assertion(
    observer: &ChainObserver<NumberMachine>,
    prev: &CryptoHash,
    machine: &NumberMachine,
    imported: u64,
    block_number: u64,
) -> AssertedEvent {
    let (mut event, _) = correct_assertion(observer, prev, machine, imported, block_number);
    event.claim.assertion_stub.after_hash = NumberMachine::new(u64::MAX).hash();
    event
}

pub(crate) fn stake(staker: Address, node_hash: CryptoHash, block_number: u64) -> ChainEvent {
    ChainEvent::StakeCreated(StakeCreatedEvent {
        staker,
        node_hash,
        block_number: BlockNumber::new(block_number),
    })
}

pub(crate) fn start_challenge(asserter: Address, challenger: Address, contract: Address) -> ChainEvent {
    ChainEvent::ChallengeStarted(ChallengeStartedEvent {
        asserter,
        challenger,
        challenge_type: ChallengeType::InvalidExecution,
        challenge_contract: contract,
    })
}

pub(crate) fn confirm(node_hash: CryptoHash) -> ChainEvent {
    ChainEvent::Confirmed(ConfirmedEvent { node_hash })
}
