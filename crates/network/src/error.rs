use alloy_primitives::B256;
use obscuro_db::DatabaseError;
use obscuro_primitives::ErrorKind;
use obscuro_wire::{PeerId, WireError};

/// The reason a batch received from a peer was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBatch {
    /// The first batch does not extend a stored batch.
    #[error("batch {number} has unknown parent {parent_hash}")]
    UnknownParent {
        /// The height of the batch.
        number: u64,
        /// The parent hash of the batch.
        parent_hash: B256,
    },
    /// The batch does not link to the previous batch of the response.
    #[error("batch {number} does not extend {expected}")]
    BrokenLinkage {
        /// The height of the batch.
        number: u64,
        /// The hash of the previous batch.
        expected: B256,
    },
    /// The height of the batch does not follow its parent.
    #[error("batch {number} does not follow height {parent_number}")]
    NonMonotonic {
        /// The height of the batch.
        number: u64,
        /// The height of the parent.
        parent_number: u64,
    },
    /// A genesis batch conflicts with the stored genesis.
    #[error("conflicting genesis batch {0}")]
    ConflictingGenesis(B256),
}

/// An error of the sync service.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The store failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// A frame could not be delivered or decoded.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// A batch did not extend the local chain.
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] InvalidBatch),
    /// No ancestor of the requested head is known.
    #[error("no common ancestor for head {0}")]
    NoCommonAncestor(B256),
    /// No peer is available for a request.
    #[error("no peer available")]
    NoPeerAvailable,
    /// The peer is blacklisted.
    #[error("peer {0} is blacklisted")]
    Blacklisted(PeerId),
    /// The sync service stopped.
    #[error("sync service stopped")]
    ServiceStopped,
}

impl SyncError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(err) => err.kind(),
            Self::Wire(err) => err.kind(),
            Self::InvalidBatch(_) => ErrorKind::ChainInconsistent,
            Self::NoCommonAncestor(_) => ErrorKind::NoCommonAncestor,
            Self::NoPeerAvailable | Self::Blacklisted(_) => ErrorKind::Io,
            Self::ServiceStopped => ErrorKind::Cancelled,
        }
    }
}
