//! Test utilities for the primitive types.

use crate::{BatchHeader, ExtBatch};
use alloy_primitives::B256;

/// Returns an arbitrary instance of the passed type.
#[macro_export]
macro_rules! random {
    ($typ: ty) => {{
        let mut bytes = Box::new([0u8; 4 * size_of::<$typ>() + 512]);
        let mut rng = ::rand::rng();
        ::rand::RngCore::fill_bytes(&mut rng, bytes.as_mut_slice());
        let mut u = ::arbitrary::Unstructured::new(bytes.as_slice());
        <$typ as ::arbitrary::Arbitrary<'_>>::arbitrary(&mut u).unwrap()
    }};
}

/// Returns a random genesis batch: height zero with a zero parent.
pub fn genesis_batch() -> ExtBatch {
    let (mut header, tx_hashes, blob) = random!(ExtBatch).into_parts();
    header.number = 0;
    header.parent_hash = B256::ZERO;
    ExtBatch::new(header, tx_hashes, blob)
}

/// Returns a random batch extending `parent`.
pub fn child_of(parent: &ExtBatch) -> ExtBatch {
    let (mut header, tx_hashes, blob) = random!(ExtBatch).into_parts();
    header.number = parent.number() + 1;
    header.parent_hash = parent.hash();
    header.sequencer = parent.header().sequencer;
    header.chain_id = parent.header().chain_id;
    ExtBatch::new(header, tx_hashes, blob)
}

/// Returns a chain of `len` random batches starting at genesis.
pub fn batch_chain(len: usize) -> Vec<ExtBatch> {
    assert!(len >= 1, "chain should have a minimal length of one");
    batch_chain_from(genesis_batch(), len - 1)
}

/// Returns `start` followed by `len` random batches extending it.
pub fn batch_chain_from(start: ExtBatch, len: usize) -> Vec<ExtBatch> {
    let mut chain = Vec::with_capacity(len + 1);
    chain.push(start);
    for i in 0..len {
        let next = child_of(&chain[i]);
        chain.push(next);
    }
    chain
}

/// Returns a random batch header at the provided height with the provided parent.
pub fn header_at(number: u64, parent_hash: B256) -> BatchHeader {
    BatchHeader { number, parent_hash, ..random!(BatchHeader) }
}
