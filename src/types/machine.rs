/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Machine`] trait, the interface through which the observer drives the rollup's execution
//! engine.
//!
//! The observer never inspects machine state. It only needs to be able to:
//! 1. Cheaply [clone](Clone) a machine so that execution can happen outside of the observer's lock.
//! 2. Get a machine's [hash](Machine::hash), which is what nodes commit to and what checkpoints
//!    store machines under.
//! 3. [Execute](Machine::execute_assertion) a bounded number of steps against a run of inbox
//!    messages.
//! 4. Serialize and deserialize a machine so that checkpoints can store it out-of-band.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    assertion::{ExecutionAssertion, InboxValue, TimeBounds},
    data_types::CryptoHash,
};

pub trait Machine: Clone + Send + Sync + BorshSerialize + BorshDeserialize + 'static {
    /// Commitment to the full state of this machine.
    fn hash(&self) -> CryptoHash;

    /// Run this machine for at most `max_steps` steps, consuming messages from `inbox`. Returns the
    /// resulting assertion and the number of steps actually taken.
    fn execute_assertion(
        &mut self,
        max_steps: u64,
        time_bounds: &TimeBounds,
        inbox: &InboxValue,
    ) -> (ExecutionAssertion, u64);
}
