use crate::L1Notification;

use obscuro_db::DatabaseError;
use obscuro_primitives::ErrorKind;
use obscuro_providers::L1ProviderError;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;

/// A [`Result`] that uses [`L1WatcherError`] as the error type.
pub(crate) type L1WatcherResult<T> = Result<T, L1WatcherError>;

/// An error that occurred with the L1 watcher.
#[derive(Debug, thiserror::Error)]
pub enum L1WatcherError {
    /// An error with the L1 client, surfaced after the retry ceiling.
    #[error("l1 provider error: {0}")]
    L1Provider(#[from] L1ProviderError),
    /// An error with the database.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// The L1 notification channel was closed.
    #[error("l1 notification channel closed")]
    SendError(#[from] SendError<Arc<L1Notification>>),
}

impl L1WatcherError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::L1Provider(err) => err.kind(),
            Self::Database(err) => err.kind(),
            Self::SendError(_) => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the error originates from the L1 connection.
    pub const fn is_l1_failure(&self) -> bool {
        matches!(self, Self::L1Provider(_))
    }

    /// Returns true if the error reveals a corrupted store.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Database(err) if err.is_corruption())
    }
}
