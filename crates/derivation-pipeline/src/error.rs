use alloy_primitives::B256;
use obscuro_db::DatabaseError;
use obscuro_primitives::{ErrorKind, RollupIntegrityError};

/// A rollup failing verification.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The rollup is internally inconsistent.
    #[error("invalid rollup: {0}")]
    Integrity(#[from] RollupIntegrityError),
    /// A batch at height zero references a parent.
    #[error("genesis batch with non zero parent")]
    InvalidGenesis,
    /// The first batch of the rollup does not extend the canonical chain.
    #[error("batch {number} references unknown parent {parent_hash}")]
    UnknownParent {
        /// The height of the first batch.
        number: u64,
        /// The parent it references.
        parent_hash: B256,
    },
}

impl ValidationError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::ChainInconsistent
    }

    /// Returns true if fetching missing batches from peers may resolve the error.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownParent { .. })
    }
}

/// An error occurred during the derivation process.
#[derive(Debug, thiserror::Error)]
pub enum DerivationPipelineError {
    /// The rollup failed verification.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An error in the database.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl DerivationPipelineError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(err) => err.kind(),
            Self::Database(err) => err.kind(),
        }
    }
}
