use std::{
    sync::{mpsc, Arc},
    time::Duration,
};

use log::LevelFilter;
use rollup_observer::{
    chain_observer::ChainObserver,
    checkpoint::{
        make_initial_chain_observer_buf, unmarshal_chain_observer_from_bytes, variables,
        CheckpointContext, CheckpointError, CheckpointerConfiguration, KVCheckpointer,
        RestoreContext, RollupCheckpointer, SaveOutcome,
    },
    events::ChainEvent,
    types::{
        assertion::ChildType,
        data_types::{BlockNumber, CryptoHash},
        machine::Machine,
    },
};

mod common;

use crate::common::{
    assertions::*, logging::setup_logger, mem_db::MemDB, number_machine::NumberMachine,
};

/// An opinionated observer with a challenged assertion on top of genesis, whose valid child holds a
/// machine.
fn challenged_observer() -> (ChainObserver<NumberMachine>, CryptoHash, CryptoHash) {
    let mut observer = ChainObserver::new(
        rollup_address(),
        NumberMachine::new(0),
        chain_params(),
        true,
        true,
        block(0),
    );
    let genesis = observer.node_graph().latest_confirmed();
    observer.handle_event(deliver(3, 1)).unwrap();
    observer.handle_event(deliver(4, 1)).unwrap();
    let (assertion, _) = correct_assertion(&observer, &genesis, &NumberMachine::new(0), 2, 2);
    observer.handle_event(ChainEvent::Asserted(assertion)).unwrap();
    assert_eq!(observer.update_opinion(), 1);

    let node = observer.node_graph().node(&genesis).unwrap();
    let valid = node.successor(ChildType::Valid).unwrap();
    let invalid = node.successor(ChildType::Invalid).unwrap();
    observer.handle_event(stake(address(1), valid, 3)).unwrap();
    observer.handle_event(stake(address(2), invalid, 3)).unwrap();
    observer
        .handle_event(start_challenge(address(1), address(2), address(0xc1)))
        .unwrap();
    observer.notify_new_block(block(4));
    (observer, valid, invalid)
}

#[test]
fn observer_round_trip_test() {
    let (observer, valid, invalid) = challenged_observer();
    let mut ctx = CheckpointContext::new();
    let bytes = observer.marshal_to_bytes(&mut ctx).unwrap();
    // Genesis holds the initial machine, the valid child the machine after both messages.
    assert_eq!(ctx.len(), 2);

    let restored: ChainObserver<NumberMachine> = unmarshal_chain_observer_from_bytes(&bytes, &ctx).unwrap();
    assert!(restored == observer);
    assert_eq!(restored.known_valid_node(), valid);
    assert_eq!(restored.calculated_valid_node(), valid);
    assert_eq!(restored.latest_block(), block(4));
    assert!(restored.is_opinionated());

    let graph = restored.node_graph();
    assert_eq!(graph.node(&valid).unwrap().machine().unwrap().number(), 7);
    assert!(graph.node(&invalid).unwrap().machine().is_none());
    assert_eq!(graph.node(&valid).unwrap().num_stakers(), 1);
    assert_eq!(graph.node(&invalid).unwrap().num_stakers(), 1);
    assert_eq!(
        graph.challenge(&address(0xc1)),
        observer.node_graph().challenge(&address(0xc1))
    );
    assert_eq!(
        restored.pending_inbox().top_hash(),
        observer.pending_inbox().top_hash()
    );
}

#[test]
fn initial_buf_matches_new_observer_test() {
    let initial_machine = Arc::new(NumberMachine::new(0));
    let buf = make_initial_chain_observer_buf(
        rollup_address(),
        initial_machine.hash(),
        chain_params(),
        true,
        false,
        block(0),
    );
    let observer = ChainObserver::new(
        rollup_address(),
        NumberMachine::new(0),
        chain_params(),
        true,
        false,
        block(0),
    );

    let mut ctx = CheckpointContext::new();
    assert_eq!(observer.marshal_for_checkpoint(&mut ctx), buf);

    let mut restore_ctx = CheckpointContext::new();
    restore_ctx.add_machine(&initial_machine);
    let restored: ChainObserver<NumberMachine> = buf.unmarshal_from_checkpoint(&restore_ctx).unwrap();
    assert!(restored == observer);
}

#[test]
fn corrupt_buffers_are_rejected_test() {
    let (observer, valid, _) = challenged_observer();
    let mut ctx = CheckpointContext::new();
    let buf = observer.marshal_for_checkpoint(&mut ctx);
    let genesis = observer.node_graph().latest_confirmed();

    let mut tampered = buf.clone();
    let node = tampered
        .staked_node_graph
        .nodes
        .iter_mut()
        .find(|node| node.hash == valid)
        .unwrap();
    node.deadline = BlockNumber::new(999);
    assert!(matches!(
        tampered.unmarshal_from_checkpoint::<NumberMachine, _>(&ctx),
        Err(CheckpointError::NodeHashMismatch { stored, .. }) if stored == valid
    ));

    let mut orphaned = buf.clone();
    orphaned
        .staked_node_graph
        .nodes
        .retain(|node| node.hash != genesis);
    assert!(matches!(
        orphaned.unmarshal_from_checkpoint::<NumberMachine, _>(&ctx),
        Err(CheckpointError::MissingNode { node }) if node == genesis
    ));

    let mut duplicated = buf.clone();
    let copy = duplicated.staked_node_graph.nodes[1].clone();
    duplicated.staked_node_graph.nodes.push(copy);
    assert!(matches!(
        duplicated.unmarshal_from_checkpoint::<NumberMachine, _>(&ctx),
        Err(CheckpointError::DuplicateNode { .. })
    ));

    let mut unknown_pointer = buf.clone();
    unknown_pointer.known_valid_node = CryptoHash::new([7; 32]);
    assert!(matches!(
        unknown_pointer.unmarshal_from_checkpoint::<NumberMachine, _>(&ctx),
        Err(CheckpointError::MissingNode { .. })
    ));

    let mut missing_staker = buf.clone();
    missing_staker
        .staked_node_graph
        .stakers
        .retain(|staker| staker.address != address(2));
    assert!(matches!(
        missing_staker.unmarshal_from_checkpoint::<NumberMachine, _>(&ctx),
        Err(CheckpointError::MissingStaker { staker }) if staker == address(2)
    ));

    assert!(matches!(
        buf.unmarshal_from_checkpoint::<NumberMachine, _>(&CheckpointContext::new()),
        Err(CheckpointError::MissingMachine { .. })
    ));

    assert!(matches!(
        unmarshal_chain_observer_from_bytes::<NumberMachine, _>(&[1, 2, 3], &ctx),
        Err(CheckpointError::Deserialize(_))
    ));
}

/* ↓↓↓ KVCheckpointer ↓↓↓ */

fn checkpointer(db: &MemDB, max_retained_checkpoints: usize) -> KVCheckpointer<MemDB, NumberMachine> {
    KVCheckpointer::new(
        db.clone(),
        NumberMachine::new(0),
        CheckpointerConfiguration::builder()
            .max_retained_checkpoints(max_retained_checkpoints)
            .poll_interval(Duration::from_millis(10))
            .build(),
    )
}

fn context_with(numbers: &[u64]) -> CheckpointContext<NumberMachine> {
    let mut ctx = CheckpointContext::new();
    for number in numbers {
        ctx.add_machine(&Arc::new(NumberMachine::new(*number)));
    }
    ctx
}

fn save_and_wait(
    checkpointer: &KVCheckpointer<MemDB, NumberMachine>,
    block_number: u64,
    buf: Vec<u8>,
    ctx: CheckpointContext<NumberMachine>,
) -> SaveOutcome {
    let (sender, receiver) = mpsc::channel();
    checkpointer.async_save_checkpoint(
        block(block_number),
        buf,
        ctx,
        Some(Box::new(move |outcome| {
            let _ = sender.send(outcome);
        })),
    );
    receiver.recv_timeout(Duration::from_secs(5)).unwrap()
}

fn retained(checkpointer: &KVCheckpointer<MemDB, NumberMachine>) -> Vec<u64> {
    checkpointer
        .retained_checkpoints()
        .unwrap()
        .into_iter()
        .map(|number| number.int())
        .collect()
}

#[test]
fn kv_checkpointer_retention_test() {
    setup_logger(LevelFilter::Debug);
    let db = MemDB::new();
    let checkpointer = checkpointer(&db, 2);
    assert_eq!(checkpointer.latest_checkpoint().unwrap(), None);
    assert_eq!(checkpointer.initial_machine().unwrap(), NumberMachine::new(0));

    for (block_number, machines) in [(1, [1, 2]), (2, [2, 3]), (3, [3, 4])] {
        let outcome = save_and_wait(&checkpointer, block_number, vec![block_number as u8], context_with(&machines));
        assert_eq!(outcome, SaveOutcome::Saved);
    }

    assert_eq!(retained(&checkpointer), vec![2, 3]);
    assert_eq!(
        checkpointer.latest_checkpoint().unwrap(),
        Some((block(3), vec![3]))
    );
    assert!(checkpointer
        .checkpoint_at_block(BlockNumber::new(1))
        .unwrap()
        .is_none());
    assert_eq!(db.count_with_prefix(&variables::CHECKPOINT_AT_BLOCK), 2);

    // Machine 1 was only referenced by the evicted checkpoint.
    assert_eq!(db.count_with_prefix(&variables::MACHINE_STATE), 3);
    assert_eq!(db.count_with_prefix(&variables::MACHINE_STATE_REF_COUNT), 3);
    let restore_ctx = RollupCheckpointer::<NumberMachine>::restore_context(&checkpointer);
    assert_eq!(
        RestoreContext::<NumberMachine>::machine(&restore_ctx, &NumberMachine::new(3).hash()).unwrap(),
        Some(NumberMachine::new(3))
    );
    assert_eq!(
        RestoreContext::<NumberMachine>::machine(&restore_ctx, &NumberMachine::new(1).hash()).unwrap(),
        None
    );
}

#[test]
fn kv_checkpointer_drops_abandoned_blocks_test() {
    let db = MemDB::new();
    let checkpointer = checkpointer(&db, 10);
    for (block_number, machines) in [(1, [1, 2]), (2, [2, 3]), (3, [3, 4])] {
        save_and_wait(&checkpointer, block_number, vec![block_number as u8], context_with(&machines));
    }
    assert_eq!(retained(&checkpointer), vec![1, 2, 3]);
    assert_eq!(db.count_with_prefix(&variables::MACHINE_STATE), 4);

    // The chain reorganized below block 3: block 2 is replaced and block 3 abandoned.
    let outcome = save_and_wait(&checkpointer, 2, vec![20], context_with(&[5]));
    assert_eq!(outcome, SaveOutcome::Saved);
    assert_eq!(retained(&checkpointer), vec![1, 2]);
    assert_eq!(
        checkpointer.latest_checkpoint().unwrap(),
        Some((block(2), vec![20]))
    );
    let record = checkpointer
        .checkpoint_at_block(BlockNumber::new(2))
        .unwrap()
        .unwrap();
    assert_eq!(record.machine_hashes, vec![NumberMachine::new(5).hash()]);
    // Machines 1 and 2 are still referenced by block 1.
    assert_eq!(db.count_with_prefix(&variables::MACHINE_STATE), 3);
}

#[test]
fn kv_checkpointer_newest_queued_checkpoint_wins_test() {
    let db = MemDB::new();
    let checkpointer = checkpointer(&db, 3);
    let (sender, receiver) = mpsc::channel();
    for block_number in 1..=5u64 {
        let sender = sender.clone();
        checkpointer.async_save_checkpoint(
            block(block_number),
            vec![block_number as u8],
            context_with(&[block_number]),
            Some(Box::new(move |outcome| {
                let _ = sender.send((block_number, outcome));
            })),
        );
    }

    let mut outcomes = Vec::new();
    for _ in 1..=5 {
        outcomes.push(receiver.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    outcomes.sort_by_key(|(block_number, _)| *block_number);
    assert_eq!(outcomes[4], (5, SaveOutcome::Saved));
    for (_, outcome) in &outcomes {
        assert!(*outcome == SaveOutcome::Saved || *outcome == SaveOutcome::Superseded);
    }
    let saved = outcomes
        .iter()
        .filter(|(_, outcome)| *outcome == SaveOutcome::Saved)
        .count();
    assert_eq!(retained(&checkpointer).len(), saved.min(3));
    assert_eq!(
        checkpointer.latest_checkpoint().unwrap(),
        Some((block(5), vec![5]))
    );
}
