use rollup_observer::{
    node_graph::{ConflictError, ConflictPair, NodeGraphError, StakedNodeGraph},
    types::{
        assertion::{
            AssertionClaim, AssertionParams, ChallengeType, ChildType, DisputableNode,
            ExecutionAssertionStub, TimeBounds,
        },
        crypto_primitives::hash_parts,
        data_types::{BlockNumber, CryptoHash, NodeDepth},
    },
};

mod common;

use crate::common::{
    assertions::{address, chain_params, tx_hash, GRACE_PERIOD},
    number_machine::NumberMachine,
};

fn new_graph(create_invalid_nodes: bool) -> StakedNodeGraph<NumberMachine> {
    StakedNodeGraph::new(NumberMachine::new(0), chain_params(), create_invalid_nodes)
}

// An assertion whose only distinguishing features are its step count and gas.
fn disputable(n: u64, num_gas: u64) -> DisputableNode {
    DisputableNode::new(
        AssertionParams {
            num_steps: n,
            time_bounds: TimeBounds::new(BlockNumber::new(0), BlockNumber::new(10)),
            imported_message_count: 0,
        },
        AssertionClaim {
            after_pending_top: CryptoHash::zero(),
            imported_messages_hash: CryptoHash::zero(),
            assertion_stub: ExecutionAssertionStub {
                after_hash: hash_parts(&[b"after", &n.to_le_bytes()]),
                did_inbox_insn: false,
                num_gas,
                last_message_hash: CryptoHash::zero(),
                last_log_hash: CryptoHash::zero(),
            },
        },
        CryptoHash::zero(),
        0,
    )
}

#[test]
fn create_nodes_on_assert_test() {
    let mut graph = new_graph(true);
    let genesis = graph.latest_confirmed();
    assert_eq!(graph.leaves().copied().collect::<Vec<_>>(), vec![genesis]);

    // Gas 250 at 100 per block takes 3 blocks to check.
    let nodes = graph
        .create_nodes_on_assert(&genesis, disputable(1, 250), BlockNumber::new(2), tx_hash(1))
        .unwrap();
    let invalid = nodes.invalid.unwrap();
    assert_ne!(nodes.valid, invalid);
    assert!(!graph.is_leaf(&genesis));
    assert!(graph.is_leaf(&nodes.valid) && graph.is_leaf(&invalid));

    let valid_node = graph.node(&nodes.valid).unwrap();
    let invalid_node = graph.node(&invalid).unwrap();
    assert_eq!(valid_node.depth(), NodeDepth::new(1));
    assert_eq!(valid_node.prev(), Some(genesis));
    assert_eq!(valid_node.link_type(), ChildType::Valid);
    assert_eq!(invalid_node.link_type(), ChildType::Invalid);
    assert_eq!(
        valid_node.vm_proto_data().machine_hash,
        disputable(1, 250).claim.assertion_stub.after_hash
    );
    assert_eq!(
        invalid_node.vm_proto_data(),
        graph.node(&genesis).unwrap().vm_proto_data()
    );
    assert_eq!(valid_node.deadline(), BlockNumber::new(2 + GRACE_PERIOD + 3));
    assert_eq!(valid_node.assertion_tx_hash(), tx_hash(1));

    let genesis_node = graph.node(&genesis).unwrap();
    assert_eq!(genesis_node.successor(ChildType::Valid), Some(nodes.valid));
    assert_eq!(genesis_node.successor(ChildType::Invalid), Some(invalid));

    assert_eq!(
        graph.create_nodes_on_assert(&genesis, disputable(2, 0), BlockNumber::new(3), tx_hash(2)),
        Err(NodeGraphError::NotALeaf { node: genesis })
    );
    assert_eq!(graph.num_nodes(), 3);
}

#[test]
fn create_nodes_without_invalid_nodes_test() {
    let mut graph = new_graph(false);
    let genesis = graph.latest_confirmed();
    assert_eq!(graph.child_types(), &[ChildType::Valid]);

    let nodes = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap();
    assert_eq!(nodes.invalid, None);
    assert!(!graph.is_leaf(&genesis));
    assert_eq!(graph.leaves().copied().collect::<Vec<_>>(), vec![nodes.valid]);

    // Deadlines never decrease along a branch.
    let child = graph
        .create_nodes_on_assert(&nodes.valid, disputable(2, 0), BlockNumber::new(0), tx_hash(2))
        .unwrap();
    assert_eq!(
        graph.node(&child.valid).unwrap().deadline(),
        BlockNumber::new(2 * GRACE_PERIOD)
    );
}

#[test]
fn stake_lifecycle_test() {
    let mut graph = new_graph(false);
    let genesis = graph.latest_confirmed();
    let n1 = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap()
        .valid;
    let (alice, bob) = (address(1), address(2));

    graph.create_stake(alice, genesis, BlockNumber::new(1)).unwrap();
    assert_eq!(
        graph.create_stake(alice, n1, BlockNumber::new(1)),
        Err(NodeGraphError::StakerExists { staker: alice })
    );
    let unknown = CryptoHash::new([9; 32]);
    assert_eq!(
        graph.create_stake(bob, unknown, BlockNumber::new(1)),
        Err(NodeGraphError::NodeNotFound { node: unknown })
    );
    assert_eq!(graph.node(&genesis).unwrap().num_stakers(), 1);

    graph.move_stake(alice, n1).unwrap();
    assert_eq!(graph.node(&genesis).unwrap().num_stakers(), 0);
    assert_eq!(graph.node(&n1).unwrap().num_stakers(), 1);
    assert_eq!(graph.staker(&alice).unwrap().location, n1);

    // Stakes only move forward.
    assert_eq!(
        graph.move_stake(alice, genesis),
        Err(NodeGraphError::NotADescendant {
            from: n1,
            to: genesis
        })
    );
    assert_eq!(
        graph.move_stake(alice, n1),
        Err(NodeGraphError::NotADescendant { from: n1, to: n1 })
    );

    let removed = graph.remove_stake(alice).unwrap();
    assert_eq!(removed.location, n1);
    assert_eq!(removed.creation_time, BlockNumber::new(1));
    assert_eq!(graph.node(&n1).unwrap().num_stakers(), 0);
    assert_eq!(
        graph.remove_stake(alice),
        Err(NodeGraphError::StakerNotFound { staker: alice })
    );
}

#[test]
fn challenge_test() {
    let mut graph = new_graph(true);
    let genesis = graph.latest_confirmed();
    let nodes = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap();
    let invalid = nodes.invalid.unwrap();
    let (alice, bob, carol) = (address(1), address(2), address(3));
    let (contract, other_contract) = (address(0xc1), address(0xc2));

    graph.create_stake(alice, nodes.valid, BlockNumber::new(1)).unwrap();
    graph.create_stake(bob, invalid, BlockNumber::new(1)).unwrap();
    graph.create_stake(carol, genesis, BlockNumber::new(1)).unwrap();

    // Carol sits on an ancestor of Alice's node, so they agree.
    assert_eq!(
        graph.new_challenge(other_contract, alice, carol, ChallengeType::InvalidExecution),
        Err(NodeGraphError::Conflict(ConflictError::NoConflict { ancestor: genesis }))
    );

    let conflict = graph
        .new_challenge(contract, alice, bob, ChallengeType::InvalidExecution)
        .unwrap();
    assert_eq!(
        conflict,
        ConflictPair {
            ancestor: genesis,
            first_branch: nodes.valid,
            second_branch: invalid,
        }
    );
    assert_eq!(
        graph.conflict_ancestor(&invalid, &nodes.valid).unwrap(),
        conflict.swapped()
    );
    assert_eq!(graph.staker(&alice).unwrap().challenge, Some(contract));
    assert_eq!(graph.staker(&bob).unwrap().challenge, Some(contract));

    assert_eq!(
        graph.new_challenge(other_contract, bob, carol, ChallengeType::InvalidMessages),
        Err(NodeGraphError::StakerInChallenge {
            staker: bob,
            challenge: contract
        })
    );
    // A staker cannot withdraw from an open challenge.
    assert_eq!(
        graph.remove_stake(bob),
        Err(NodeGraphError::StakerInChallenge {
            staker: bob,
            challenge: contract
        })
    );
    assert_eq!(graph.staker(&bob).unwrap().location, invalid);
    assert_eq!(graph.node(&invalid).unwrap().num_stakers(), 1);
    assert_eq!(
        graph.challenge_resolved(contract, alice, carol),
        Err(NodeGraphError::ChallengeParticipantsMismatch {
            contract,
            winner: alice,
            loser: carol
        })
    );

    let challenge = graph.challenge_resolved(contract, alice, bob).unwrap();
    assert_eq!(challenge.conflict, conflict);
    assert!(graph.challenge(&contract).is_none());
    assert!(graph.staker(&bob).is_none());
    assert_eq!(graph.staker(&alice).unwrap().challenge, None);
    assert_eq!(graph.node(&invalid).unwrap().num_stakers(), 0);
    assert_eq!(
        graph.challenge_resolved(contract, alice, bob),
        Err(NodeGraphError::ChallengeNotFound { contract })
    );
}

#[test]
fn confirmable_nodes_test() {
    let mut graph = new_graph(true);
    let genesis = graph.latest_confirmed();
    let first = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap();
    let deadline = graph.node(&first.valid).unwrap().deadline();
    assert_eq!(deadline, BlockNumber::new(GRACE_PERIOD));

    assert!(graph.confirmable_nodes(deadline).is_empty());
    // Without stakers, both outcomes qualify, and neither can be chosen.
    assert!(graph.confirmable_nodes(deadline + 1).is_empty());

    let alice = address(1);
    graph.create_stake(alice, first.valid, BlockNumber::new(1)).unwrap();
    assert_eq!(graph.confirmable_nodes(deadline + 1), vec![first.valid]);

    let second = graph
        .create_nodes_on_assert(&first.valid, disputable(2, 0), deadline + 1, tx_hash(2))
        .unwrap();
    graph.move_stake(alice, second.valid).unwrap();
    let second_deadline = graph.node(&second.valid).unwrap().deadline();
    assert_eq!(second_deadline, deadline + 1 + GRACE_PERIOD);
    assert_eq!(graph.confirmable_nodes(deadline + 1), vec![first.valid]);
    assert_eq!(
        graph.confirmable_nodes(second_deadline + 1),
        vec![first.valid, second.valid]
    );

    // A staker on the other branch blocks confirmation.
    graph.create_stake(address(2), first.invalid.unwrap(), BlockNumber::new(1)).unwrap();
    assert!(graph.confirmable_nodes(second_deadline + 1).is_empty());
}

#[test]
fn prune_node_by_hash_test() {
    let mut graph = new_graph(false);
    let genesis = graph.latest_confirmed();
    let n1 = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap()
        .valid;
    let n2 = graph
        .create_nodes_on_assert(&n1, disputable(2, 0), BlockNumber::new(0), tx_hash(2))
        .unwrap()
        .valid;

    assert!(!graph.is_prunable(&genesis));
    assert!(!graph.is_prunable(&n1));
    assert_eq!(
        graph.prune_node_by_hash(&genesis),
        Err(NodeGraphError::PruneProtectedNode { node: genesis })
    );

    let pruned = graph.prune_node_by_hash(&n2).unwrap();
    assert_eq!(pruned.hash(), n2);
    assert!(!graph.contains(&n2));
    assert!(!graph.is_leaf(&n2));
    assert_eq!(graph.node(&n1).unwrap().successor(ChildType::Valid), None);

    // n1 filled its only slot and so stays out of the leaf set; with no children left it is scheduled.
    assert!(!graph.is_leaf(&n1));
    assert!(graph.is_prunable(&n1));
    assert_eq!(graph.prune_candidates().copied().collect::<Vec<_>>(), vec![n1]);

    // A staked node is never prunable.
    graph.create_stake(address(1), n1, BlockNumber::new(1)).unwrap();
    assert!(!graph.is_prunable(&n1));
    assert!(!graph.consider_pruning_node(&n1));
}

#[test]
fn prune_staked_leaf_test() {
    let mut graph = new_graph(true);
    let genesis = graph.latest_confirmed();
    let nodes = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap();
    let invalid = nodes.invalid.unwrap();
    graph.create_stake(address(1), invalid, BlockNumber::new(1)).unwrap();

    assert_eq!(
        graph.prune_node_by_hash(&invalid).map(|node| node.hash()),
        Err(NodeGraphError::PruneStakedNode {
            node: invalid,
            num_stakers: 1
        })
    );
    assert!(graph.contains(&invalid));
    assert!(graph.is_leaf(&invalid));

    graph.remove_stake(address(1)).unwrap();
    assert_eq!(graph.prune_node_by_hash(&invalid).unwrap().hash(), invalid);
}

#[test]
fn is_descendant_test() {
    let mut graph = new_graph(true);
    let genesis = graph.latest_confirmed();
    let first = graph
        .create_nodes_on_assert(&genesis, disputable(1, 0), BlockNumber::new(0), tx_hash(1))
        .unwrap();
    let second = graph
        .create_nodes_on_assert(&first.valid, disputable(2, 0), BlockNumber::new(0), tx_hash(2))
        .unwrap();

    assert!(graph.is_descendant(&genesis, &genesis));
    assert!(graph.is_descendant(&genesis, &second.valid));
    assert!(graph.is_descendant(&first.valid, &second.invalid.unwrap()));
    assert!(!graph.is_descendant(&first.invalid.unwrap(), &second.valid));
    assert!(!graph.is_descendant(&second.valid, &first.valid));
}
