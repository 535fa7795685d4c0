use alloy_primitives::B256;
use obscuro_codec::CodecError;
use obscuro_primitives::ErrorKind;

/// The error type for database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A database error occurred.
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    /// A persisted record could not be decoded.
    #[error("corrupted record under key {key}: {source}")]
    Corrupted {
        /// The printable key of the record.
        key: String,
        /// The decoding error.
        #[source]
        source: CodecError,
    },
    /// A stored pointer or rollup references a record that is not stored.
    #[error("dangling reference to {0}")]
    DanglingReference(B256),
    /// A rollup was appended before one of its batches.
    #[error("batch {0} referenced by rollup is not stored")]
    MissingBatch(B256),
}

impl DatabaseError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseError(_) => ErrorKind::Io,
            Self::Corrupted { .. } | Self::DanglingReference(_) => ErrorKind::Internal,
            Self::MissingBatch(_) => ErrorKind::ChainInconsistent,
        }
    }

    /// Returns true if the error comes from the database backend and the operation may succeed
    /// when attempted again.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseError(_))
    }

    /// Returns true if the error indicates that the store holds invalid data.
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::DanglingReference(_))
    }
}
