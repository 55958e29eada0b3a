/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple components of the rollup observer.
//!
//! Types specific to single components, e.g., the node and staker types of the
//! [staked node graph](crate::node_graph), live in those components' own modules.

pub mod assertion;

pub mod crypto_primitives;

pub mod data_types;

pub mod machine;
