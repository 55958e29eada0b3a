/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pending inbox: the append-only log of messages that have been delivered to the rollup but may
//! not yet have been consumed by an assertion.
//!
//! ## Heights and tops
//!
//! Every message delivered into the inbox extends a hash chain that starts from the zero hash. The
//! value of this chain after `h` messages have been delivered is called the inbox's **top** at
//! **height** `h`. The top at height 0 is the zero hash.
//!
//! Heights are cursors *between* messages: the message delivered at height `h` is the one that moved
//! the inbox from height `h - 1` to height `h`. Consequently, [`PendingInbox::value_for_subseq`]
//! with cursors `(start, end)` returns the messages delivered at heights `start + 1` through `end`,
//! i.e., everything a machine whose inbox cursor is at `start` must consume to reach `end`.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use crate::types::{
    assertion::{InboxValue, Message},
    crypto_primitives::chain_hash,
    data_types::CryptoHash,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingInbox {
    messages: Vec<Message>,
    // tops[h] is the top at height h.
    tops: Vec<CryptoHash>,
    height_of: HashMap<CryptoHash, u64>,
}

impl PendingInbox {
    pub fn new() -> PendingInbox {
        let mut height_of = HashMap::new();
        height_of.insert(CryptoHash::zero(), 0);
        PendingInbox {
            messages: Vec::new(),
            tops: vec![CryptoHash::zero()],
            height_of,
        }
    }

    /// Rebuild an inbox by re-delivering `messages` in order.
    pub fn from_messages(messages: Vec<Message>) -> PendingInbox {
        let mut inbox = PendingInbox::new();
        for message in messages {
            inbox.deliver_message(message);
        }
        inbox
    }

    /// Append `message` to the inbox, returning the height of the inbox after the delivery.
    pub fn deliver_message(&mut self, message: Message) -> u64 {
        let new_top = chain_hash(&self.top_hash(), &message.hash());
        self.messages.push(message);
        self.tops.push(new_top);
        let height = self.height();
        self.height_of.insert(new_top, height);
        height
    }

    /// Get the height at which the inbox's top was `top`, if it ever was.
    pub fn get_height(&self, top: &CryptoHash) -> Option<u64> {
        self.height_of.get(top).copied()
    }

    pub fn height(&self) -> u64 {
        self.messages.len() as u64
    }

    pub fn top_hash(&self) -> CryptoHash {
        // Safety: tops always contains at least the top at height 0.
        *self.tops.last().unwrap()
    }

    pub fn top_at(&self, height: u64) -> Option<CryptoHash> {
        self.tops.get(height as usize).copied()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the messages delivered after the inbox was at height `start`, up to and including the
    /// message that brought it to height `end`.
    pub fn value_for_subseq(&self, start: u64, end: u64) -> Result<InboxValue, InboxError> {
        if end < start {
            return Err(InboxError::InvalidRange { start, end });
        }
        if end > self.height() {
            return Err(InboxError::OutOfBounds {
                end,
                height: self.height(),
            });
        }
        Ok(InboxValue::new(
            self.messages[start as usize..end as usize].to_vec(),
        ))
    }

    /// Like [`value_for_subseq`](Self::value_for_subseq), but with the cursors identified by the
    /// inbox tops at those heights.
    pub fn value_for_subseq_by_hash(
        &self,
        start_top: &CryptoHash,
        end_top: &CryptoHash,
    ) -> Result<InboxValue, InboxError> {
        let start = self
            .get_height(start_top)
            .ok_or(InboxError::UnknownTop { top: *start_top })?;
        let end = self
            .get_height(end_top)
            .ok_or(InboxError::UnknownTop { top: *end_top })?;
        self.value_for_subseq(start, end)
    }
}

impl Default for PendingInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboxError {
    InvalidRange { start: u64, end: u64 },
    OutOfBounds { end: u64, height: u64 },
    UnknownTop { top: CryptoHash },
}

impl Display for InboxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InboxError::InvalidRange { start, end } => {
                write!(f, "Invalid inbox range: end {} is before start {}", end, start)
            }
            InboxError::OutOfBounds { end, height } => write!(
                f,
                "Inbox range end {} is beyond the inbox height {}",
                end, height
            ),
            InboxError::UnknownTop { top } => write!(f, "Unknown inbox top {}", top),
        }
    }
}

#[cfg(test)]
fn test_message(n: u8) -> Message {
    use crate::types::data_types::{Address, BlockNumber};
    Message::new(Address::new([n; 20]), BlockNumber::new(n as u64), vec![n])
}

/// Heights are cursors: (1, 3) yields the second and third messages.
#[test]
fn value_for_subseq_boundaries_test() {
    let mut inbox = PendingInbox::new();
    let heights: Vec<u64> = (1..=3).map(|n| inbox.deliver_message(test_message(n))).collect();
    assert_eq!(heights, vec![1, 2, 3]);

    let value = inbox.value_for_subseq(1, 3).unwrap();
    assert_eq!(value.messages, vec![test_message(2), test_message(3)]);

    let whole = inbox.value_for_subseq(0, 3).unwrap();
    assert_eq!(whole.hash, inbox.top_hash());

    assert!(inbox.value_for_subseq(2, 2).unwrap().is_empty());
    assert_eq!(inbox.value_for_subseq(2, 2).unwrap().hash, CryptoHash::zero());
    assert_eq!(
        inbox.value_for_subseq(3, 1),
        Err(InboxError::InvalidRange { start: 3, end: 1 })
    );
    assert_eq!(
        inbox.value_for_subseq(0, 4),
        Err(InboxError::OutOfBounds { end: 4, height: 3 })
    );
}

#[test]
fn get_height_test() {
    let mut inbox = PendingInbox::new();
    assert_eq!(inbox.get_height(&CryptoHash::zero()), Some(0));

    let mut previous = 0;
    for n in 1..=5 {
        inbox.deliver_message(test_message(n));
        let height = inbox.get_height(&inbox.top_hash()).unwrap();
        assert!(height > previous);
        previous = height;
    }
    assert_eq!(inbox.get_height(&CryptoHash::new([7u8; 32])), None);

    let by_hash = inbox
        .value_for_subseq_by_hash(&inbox.top_at(2).unwrap(), &inbox.top_at(4).unwrap())
        .unwrap();
    assert_eq!(by_hash, inbox.value_for_subseq(2, 4).unwrap());
}
