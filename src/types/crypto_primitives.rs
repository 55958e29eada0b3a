/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! All content-derived identifiers in this crate (node hashes, inbox tops, message hashes) are
//! SHA256 digests provided by the [`sha2`] crate.

use borsh::BorshSerialize;

use super::data_types::CryptoHash;

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

/// Hash the concatenation of `parts`.
pub fn hash_parts(parts: &[&[u8]]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    for part in parts {
        hasher.update(part);
    }
    CryptoHash::new(hasher.finalize().into())
}

/// Hash the Borsh serialization of `value`.
pub fn hash_borsh<T: BorshSerialize>(value: &T) -> CryptoHash {
    // Safety: serializing into a Vec only fails if the writer fails, and writing to a Vec does not.
    let bytes = value.try_to_vec().unwrap();
    hash_parts(&[&bytes])
}

/// Extend a hash chain whose current top is `top` with an item whose hash is `item`.
pub fn chain_hash(top: &CryptoHash, item: &CryptoHash) -> CryptoHash {
    hash_parts(&[&top.bytes(), &item.bytes()])
}
