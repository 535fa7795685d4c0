//! Primitive types for the Obscuro data plane.

pub use batch::{BatchHeader, ExtBatch};
mod batch;

pub use block::{BlockInfo, L1Block, L1BlockHeader, L1Transaction};
mod block;

pub use error::ErrorKind;
mod error;

pub use rollup::{ExtRollup, RollupHeader, RollupIntegrityError};
mod rollup;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
