/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Opinion forming: how an opinionated observer decides for itself which child of its calculated
//! valid node is the right one.
//!
//! Forming an opinion on one assertion takes three steps, so that the (potentially long) execution
//! never happens while the observer's lock is held:
//! 1. [`ChainObserver::next_opinion_job`], under the read lock, copies the machine at the calculated
//!    valid node and collects the assertion made on top of it.
//! 2. [`OpinionJob::execute`], without any lock, runs the machine and compares the result with what
//!    the assertion claims.
//! 3. [`ChainObserver::apply_opinion`], under the write lock, moves the calculated valid node to the
//!    child matching the verdict, unless the observer's state changed in the meantime.

use std::sync::Arc;

use crate::{
    chain_observer::ChainObserver,
    types::{
        assertion::{AssertionClaim, AssertionParams, ChildType, InboxValue, TimeBounds},
        data_types::CryptoHash,
        machine::Machine,
    },
};

/// The assertion below a calculated valid node, with everything needed to check it.
pub struct OpinionJob<M: Machine> {
    pub from: CryptoHash,
    machine: Arc<M>,
    params: AssertionParams,
    claim: AssertionClaim,
    time_bounds: TimeBounds,
    // None if the claimed inbox range does not exist in the observer's inbox.
    inbox: Option<InboxValue>,
}

/// The result of executing an [`OpinionJob`].
pub struct Opinion<M: Machine> {
    pub from: CryptoHash,
    pub verdict: ChildType,
    /// The machine state of the child matching `verdict`.
    machine: Arc<M>,
}

impl<M: Machine> OpinionJob<M> {
    /// Run the machine over the assertion's inbox range and judge whether the assertion holds.
    pub fn execute(self) -> Opinion<M> {
        let Some(inbox) = self.inbox else {
            log::debug!("Assertion below {} imports messages the inbox never had", self.from);
            return Opinion {
                from: self.from,
                verdict: ChildType::Invalid,
                machine: self.machine,
            };
        };

        let mut machine = M::clone(&self.machine);
        let (assertion, steps) =
            machine.execute_assertion(self.params.num_steps, &self.time_bounds, &inbox);
        let valid = steps == self.params.num_steps
            && assertion.stub() == self.claim.assertion_stub
            && inbox.hash == self.claim.imported_messages_hash;
        log::debug!(
            "Executed assertion below {}: {} of {} steps, valid: {}",
            self.from,
            steps,
            self.params.num_steps,
            valid
        );

        if valid {
            Opinion {
                from: self.from,
                verdict: ChildType::Valid,
                machine: Arc::new(machine),
            }
        } else {
            Opinion {
                from: self.from,
                verdict: ChildType::Invalid,
                machine: self.machine,
            }
        }
    }
}

impl<M: Machine> ChainObserver<M> {
    /// Get the assertion made on top of the calculated valid node, if there is one and the observer
    /// holds the machine needed to check it.
    pub fn next_opinion_job(&self) -> Option<OpinionJob<M>> {
        let from = self.calculated_valid_node;
        let node = self.node_graph.node(&from)?;
        let machine = node.machine()?.clone();
        let child = node
            .live_successors()
            .find_map(|successor| self.node_graph.node(&successor))?;
        let disputable = child.disputable()?;

        // The assertion must import exactly the messages following the node's inbox cursor.
        let start = node.vm_proto_data().pending_count;
        let end = start + disputable.params.imported_message_count;
        let inbox = match self
            .pending_inbox
            .get_height(&disputable.claim.after_pending_top)
        {
            Some(height) if height == end => self.pending_inbox.value_for_subseq(start, end).ok(),
            _ => None,
        };

        Some(OpinionJob {
            from,
            machine,
            params: disputable.params,
            claim: disputable.claim,
            time_bounds: disputable.params.time_bounds,
            inbox,
        })
    }

    /// Move the calculated valid node to the child of `opinion.from` matching the opinion's verdict.
    ///
    /// Returns the new calculated valid node, or `None` if the opinion is stale (the calculated valid
    /// node moved since the job was created) or the verdict's branch is not tracked.
    pub fn apply_opinion(&mut self, opinion: Opinion<M>) -> Option<CryptoHash> {
        if self.calculated_valid_node != opinion.from {
            log::debug!("Discarding stale opinion on {}", opinion.from);
            return None;
        }
        let target = self.node_graph.node(&opinion.from)?.successor(opinion.verdict);
        let Some(target) = target else {
            log::warn!(
                "Opinion on {} is {:?}, but no such branch is tracked",
                opinion.from,
                opinion.verdict
            );
            return None;
        };

        let node = self.node_graph.node_mut(&target)?;
        node.set_machine(opinion.machine);
        let depth = node.depth();
        self.calculated_valid_node = target;
        let known_valid_is_shallower = self
            .node_graph
            .node(&self.known_valid_node)
            .map_or(true, |known| depth > known.depth());
        if known_valid_is_shallower {
            self.known_valid_node = target;
        }
        self.update_oldest();

        for listener in &self.listeners {
            listener.advanced_calculated_valid_node(&target, opinion.verdict);
        }
        Some(target)
    }

    /// Form opinions on every assertion below the calculated valid node, one after another, without
    /// releasing `self`. Returns the number of nodes the calculated valid node advanced by.
    pub fn update_opinion(&mut self) -> usize {
        let mut advanced = 0;
        while let Some(job) = self.next_opinion_job() {
            match self.apply_opinion(job.execute()) {
                Some(_) => advanced += 1,
                None => break,
            }
        }
        advanced
    }
}
