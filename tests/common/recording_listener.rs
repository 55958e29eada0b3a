//! [`RecordingListener`], a [`ChainListener`] that remembers every notification it receives.

use std::sync::Mutex;

use rollup_observer::{
    events::*,
    listener::ChainListener,
    node_graph::{AssertionNodes, ConflictPair},
    types::{assertion::ChildType, data_types::CryptoHash},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    SawAssertion(AssertionNodes),
    PrunedLeaf(CryptoHash),
    StakeCreated(StakeCreatedEvent),
    StakeRemoved(StakeRefundedEvent),
    StakeMoved(StakeMovedEvent),
    StartedChallenge(ConflictPair),
    CompletedChallenge(ChallengeCompletedEvent),
    ConfirmedNode(CryptoHash),
    PrunableLeaves(Vec<CryptoHash>),
    ConfirmableNodes(Vec<CryptoHash>),
    AdvancedCalculatedValidNode(CryptoHash, ChildType),
}

pub(crate) struct RecordingListener {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub(crate) fn new() -> RecordingListener {
        RecordingListener {
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Whether any notification recorded so far satisfies `predicate`.
    pub(crate) fn any(&self, predicate: impl Fn(&Notification) -> bool) -> bool {
        self.notifications.lock().unwrap().iter().any(predicate)
    }

    fn record(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification)
    }
}

impl ChainListener for RecordingListener {
    fn saw_assertion(&self, _event: &AssertedEvent, nodes: &AssertionNodes) {
        self.record(Notification::SawAssertion(*nodes))
    }

    fn pruned_leaf(&self, event: &PrunedEvent) {
        self.record(Notification::PrunedLeaf(event.leaf))
    }

    fn stake_created(&self, event: &StakeCreatedEvent) {
        self.record(Notification::StakeCreated(event.clone()))
    }

    fn stake_removed(&self, event: &StakeRefundedEvent) {
        self.record(Notification::StakeRemoved(event.clone()))
    }

    fn stake_moved(&self, event: &StakeMovedEvent) {
        self.record(Notification::StakeMoved(event.clone()))
    }

    fn started_challenge(&self, _event: &ChallengeStartedEvent, conflict: &ConflictPair) {
        self.record(Notification::StartedChallenge(*conflict))
    }

    fn completed_challenge(&self, event: &ChallengeCompletedEvent) {
        self.record(Notification::CompletedChallenge(event.clone()))
    }

    fn confirmed_node(&self, event: &ConfirmedEvent) {
        self.record(Notification::ConfirmedNode(event.node_hash))
    }

    fn prunable_leaves(&self, leaves: &[CryptoHash]) {
        self.record(Notification::PrunableLeaves(leaves.to_vec()))
    }

    fn confirmable_nodes(&self, nodes: &[CryptoHash]) {
        self.record(Notification::ConfirmableNodes(nodes.to_vec()))
    }

    fn advanced_calculated_valid_node(&self, node: &CryptoHash, verdict: ChildType) {
        self.record(Notification::AdvancedCalculatedValidNode(*node, verdict))
    }
}
