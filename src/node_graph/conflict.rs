/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Conflict-ancestor computation.
//!
//! Two stakers are in conflict when their nodes lie on different branches of the graph. The
//! challenge protocol needs to know the deepest node both branches share (the **conflict
//! ancestor**), and which child of that node each staker is defending.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::{CryptoHash, NodeDepth};

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConflictPair {
    /// The deepest node that is an ancestor of both inputs.
    pub ancestor: CryptoHash,
    /// Child of `ancestor` on the path to the first input.
    pub first_branch: CryptoHash,
    /// Child of `ancestor` on the path to the second input.
    pub second_branch: CryptoHash,
}

impl ConflictPair {
    pub fn swapped(&self) -> ConflictPair {
        ConflictPair {
            ancestor: self.ancestor,
            first_branch: self.second_branch,
            second_branch: self.first_branch,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictError {
    NodeNotFound {
        node: CryptoHash,
    },
    /// One input is an ancestor of (or equal to) the other.
    NoConflict {
        ancestor: CryptoHash,
    },
    /// The ancestor chains ran out before meeting.
    NoCommonAncestor {
        first: CryptoHash,
        second: CryptoHash,
    },
}

impl Display for ConflictError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConflictError::NodeNotFound { node } => write!(f, "Node {} not found", node),
            ConflictError::NoConflict { ancestor } => {
                write!(f, "Nodes do not conflict: both lie on the branch through {}", ancestor)
            }
            ConflictError::NoCommonAncestor { first, second } => {
                write!(f, "Nodes {} and {} have no common ancestor", first, second)
            }
        }
    }
}

/// Find the conflict ancestor of `first` and `second`.
///
/// `lookup` gets the depth and predecessor of a node, returning `None` if the node is not known.
pub(crate) fn find_conflict<F>(
    first: CryptoHash,
    second: CryptoHash,
    lookup: F,
) -> Result<ConflictPair, ConflictError>
where
    F: Fn(&CryptoHash) -> Option<(NodeDepth, Option<CryptoHash>)>,
{
    let (mut a_depth, mut a_prev) = lookup(&first).ok_or(ConflictError::NodeNotFound { node: first })?;
    let (mut b_depth, mut b_prev) =
        lookup(&second).ok_or(ConflictError::NodeNotFound { node: second })?;
    let (mut a, mut b) = (first, second);
    let (mut a_child, mut b_child) = (None, None);
    let no_common_ancestor = ConflictError::NoCommonAncestor { first, second };

    // Step 1: bring both cursors to the same depth.
    while a_depth > b_depth {
        a_child = Some(a);
        a = a_prev.ok_or(no_common_ancestor.clone())?;
        (a_depth, a_prev) = lookup(&a).ok_or(no_common_ancestor.clone())?;
    }
    while b_depth > a_depth {
        b_child = Some(b);
        b = b_prev.ok_or(no_common_ancestor.clone())?;
        (b_depth, b_prev) = lookup(&b).ok_or(no_common_ancestor.clone())?;
    }

    // Step 2: walk up in lockstep until the cursors meet.
    while a != b {
        a_child = Some(a);
        b_child = Some(b);
        a = a_prev.ok_or(no_common_ancestor.clone())?;
        b = b_prev.ok_or(no_common_ancestor.clone())?;
        (_, a_prev) = lookup(&a).ok_or(no_common_ancestor.clone())?;
        (_, b_prev) = lookup(&b).ok_or(no_common_ancestor.clone())?;
    }

    match (a_child, b_child) {
        (Some(first_branch), Some(second_branch)) => Ok(ConflictPair {
            ancestor: a,
            first_branch,
            second_branch,
        }),
        _ => Err(ConflictError::NoConflict { ancestor: a }),
    }
}

#[cfg(test)]
fn test_tree(edges: &[(u8, Option<u8>)]) -> std::collections::HashMap<CryptoHash, (NodeDepth, Option<CryptoHash>)> {
    use std::collections::HashMap;

    let h = |n: u8| CryptoHash::new([n; 32]);
    let mut tree: HashMap<CryptoHash, (NodeDepth, Option<CryptoHash>)> = HashMap::new();
    for (node, prev) in edges {
        let depth = match prev {
            Some(prev) => tree[&h(*prev)].0 + 1,
            None => NodeDepth::new(0),
        };
        tree.insert(h(*node), (depth, prev.map(h)));
    }
    tree
}

/// Tests that the ancestor is the deepest shared node, and that swapping the inputs only swaps the
/// branches.
#[test]
fn find_conflict_depth_and_symmetry_test() {
    // 0 ── 1 ── 3 ── 5
    //  │    └── 4
    //  └── 2
    let tree = test_tree(&[(0, None), (1, Some(0)), (2, Some(0)), (3, Some(1)), (4, Some(1)), (5, Some(3))]);
    let h = |n: u8| CryptoHash::new([n; 32]);
    let lookup = |hash: &CryptoHash| tree.get(hash).copied();

    let pair = find_conflict(h(5), h(4), lookup).unwrap();
    assert_eq!(
        pair,
        ConflictPair {
            ancestor: h(1),
            first_branch: h(3),
            second_branch: h(4)
        }
    );
    assert_eq!(find_conflict(h(4), h(5), lookup).unwrap(), pair.swapped());

    let pair = find_conflict(h(2), h(5), lookup).unwrap();
    assert_eq!(pair.ancestor, h(0));
    assert_eq!((pair.first_branch, pair.second_branch), (h(2), h(1)));
}

#[test]
fn find_conflict_errors_test() {
    let tree = test_tree(&[(0, None), (1, Some(0)), (2, Some(1)), (9, None)]);
    let h = |n: u8| CryptoHash::new([n; 32]);
    let lookup = |hash: &CryptoHash| tree.get(hash).copied();

    assert_eq!(
        find_conflict(h(0), h(2), lookup),
        Err(ConflictError::NoConflict { ancestor: h(0) })
    );
    assert_eq!(
        find_conflict(h(2), h(2), lookup),
        Err(ConflictError::NoConflict { ancestor: h(2) })
    );
    assert_eq!(
        find_conflict(h(2), h(7), lookup),
        Err(ConflictError::NodeNotFound { node: h(7) })
    );
    assert_eq!(
        find_conflict(h(1), h(9), lookup),
        Err(ConflictError::NoCommonAncestor {
            first: h(1),
            second: h(9)
        })
    );
}
