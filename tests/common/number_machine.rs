//! [`NumberMachine`], a simple implementation of [`Machine`] used in all of the integration tests.

use borsh::{BorshDeserialize, BorshSerialize};
use rollup_observer::types::{
    assertion::{ExecutionAssertion, InboxValue, Message, TimeBounds},
    crypto_primitives::hash_parts,
    data_types::{Address, BlockNumber, CryptoHash},
    machine::Machine,
};

/// Gas charged for every message the machine consumes.
pub(crate) const GAS_PER_STEP: u64 = 10;

/// A machine whose state is a single number.
///
/// Every step consumes one inbox message and adds the number carried in the message's payload (see
/// [`increment_message`]) to the state. After each step, the new number is emitted as an output
/// message. Execution panics if the number overflows.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct NumberMachine {
    number: u64,
}

impl NumberMachine {
    pub(crate) fn new(number: u64) -> NumberMachine {
        NumberMachine { number }
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
    }
}

impl Machine for NumberMachine {
    fn hash(&self) -> CryptoHash {
        hash_parts(&[b"number machine", &self.number.to_le_bytes()])
    }

    fn execute_assertion(
        &mut self,
        max_steps: u64,
        _time_bounds: &TimeBounds,
        inbox: &InboxValue,
    ) -> (ExecutionAssertion, u64) {
        let mut out_messages = Vec::new();
        for message in inbox.messages.iter().take(max_steps as usize) {
            self.number = self
                .number
                .checked_add(increment_of(message))
                .expect("number machine overflowed");
            out_messages.push(self.number.to_le_bytes().to_vec());
        }
        let steps = out_messages.len() as u64;
        let assertion = ExecutionAssertion {
            after_hash: self.hash(),
            did_inbox_insn: steps > 0,
            num_gas: steps * GAS_PER_STEP,
            out_messages,
            logs: Vec::new(),
        };
        (assertion, steps)
    }
}

/// Create a message that increments a number machine by `amount`.
pub(crate) fn increment_message(sender: Address, block_number: BlockNumber, amount: u64) -> Message {
    Message::new(sender, block_number, amount.to_le_bytes().to_vec())
}

fn increment_of(message: &Message) -> u64 {
    let mut bytes = [0u8; 8];
    let len = message.payload.len().min(8);
    bytes[..len].copy_from_slice(&message.payload[..len]);
    u64::from_le_bytes(bytes)
}
