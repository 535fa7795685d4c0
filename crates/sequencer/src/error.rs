use obscuro_db::DatabaseError;
use obscuro_primitives::ErrorKind;
use obscuro_providers::L1ProviderError;

/// An error type for the sequencer.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// The sequencer encountered an error when interacting with the database.
    #[error("Encountered an error interacting with the database: {0}")]
    DatabaseError(#[from] DatabaseError),
    /// The sequencer failed to submit a rollup to the L1.
    #[error("Encountered an error submitting the rollup to the L1: {0}")]
    L1ProviderError(#[from] L1ProviderError),
}

impl SequencerError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseError(err) => err.kind(),
            Self::L1ProviderError(err) => err.kind(),
        }
    }
}
