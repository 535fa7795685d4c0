use obscuro_db::DatabaseError;
use obscuro_derivation_pipeline::DerivationPipelineError;
use obscuro_network::SyncError;
use obscuro_primitives::ErrorKind;
use obscuro_providers::{EnclaveError, L1ProviderError};
use obscuro_sequencer::SequencerError;
use obscuro_subscriptions::SubscriptionError;

/// An error of the node manager.
#[derive(Debug, thiserror::Error)]
pub enum NodeManagerError {
    /// The store failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Rollup derivation failed.
    #[error(transparent)]
    Derivation(#[from] DerivationPipelineError),
    /// The sequencer failed.
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    /// The sync service failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// The logs router failed.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// The enclave failed.
    #[error(transparent)]
    Enclave(#[from] EnclaveError),
    /// The L1 client failed.
    #[error(transparent)]
    L1Provider(#[from] L1ProviderError),
    /// No rollup has been stored yet.
    #[error("node not ready: no rollup observed yet")]
    NotReady,
    /// The node does not run the sequencer.
    #[error("node is not a sequencer")]
    NotSequencer,
    /// The L1 watcher stopped.
    #[error("L1 notification channel closed")]
    L1NotificationsClosed,
    /// The manager stopped.
    #[error("node manager stopped")]
    ManagerStopped,
}

impl NodeManagerError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(err) => err.kind(),
            Self::Derivation(err) => err.kind(),
            Self::Sequencer(err) => err.kind(),
            Self::Sync(err) => err.kind(),
            Self::Subscription(err) => err.kind(),
            Self::Enclave(err) => err.kind(),
            Self::L1Provider(err) => err.kind(),
            Self::NotReady => ErrorKind::NotReady,
            Self::NotSequencer => ErrorKind::Internal,
            Self::L1NotificationsClosed => ErrorKind::Io,
            Self::ManagerStopped => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the error reveals a corrupted store.
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Database(err) |
            Self::Derivation(DerivationPipelineError::Database(err)) |
            Self::Sequencer(SequencerError::DatabaseError(err)) |
            Self::Sync(SyncError::Database(err)) => err.is_corruption(),
            _ => false,
        }
    }
}
