/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Registries of stakers and of the challenges between them.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    assertion::ChallengeType,
    data_types::{Address, BlockNumber, CryptoHash},
};

use super::conflict::ConflictPair;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Staker {
    pub address: Address,
    /// Hash of the node this staker is staked on. Always present in the graph.
    pub location: CryptoHash,
    pub creation_time: BlockNumber,
    /// Contract address of the challenge this staker is currently in, if any.
    pub challenge: Option<Address>,
}

impl Staker {
    pub fn new(address: Address, location: CryptoHash, creation_time: BlockNumber) -> Staker {
        Staker {
            address,
            location,
            creation_time,
            challenge: None,
        }
    }
}

/// An active dispute between two stakers whose nodes diverge at `conflict.ancestor`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Challenge {
    pub contract: Address,
    pub asserter: Address,
    pub challenger: Address,
    pub challenge_type: ChallengeType,
    pub conflict: ConflictPair,
}

impl Challenge {
    /// Whether `winner` and `loser` are exactly the two parties of this challenge, in either role.
    pub fn is_between(&self, winner: &Address, loser: &Address) -> bool {
        (self.asserter == *winner && self.challenger == *loser)
            || (self.asserter == *loser && self.challenger == *winner)
    }
}
