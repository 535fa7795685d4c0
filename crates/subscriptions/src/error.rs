use crate::SubscriptionStateError;

use obscuro_primitives::ErrorKind;
use obscuro_providers::{EnclaveError, SubscriptionId};

/// An error of the logs router.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The subscription was driven through an illegal transition.
    #[error(transparent)]
    State(#[from] SubscriptionStateError),
    /// The enclave failed.
    #[error(transparent)]
    Enclave(#[from] EnclaveError),
    /// The subscription is not known to the router.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
    /// The router stopped.
    #[error("logs router stopped")]
    RouterStopped,
}

impl SubscriptionError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::State(err) => err.kind(),
            Self::Enclave(err) => err.kind(),
            Self::UnknownSubscription(_) => ErrorKind::NotFound,
            Self::RouterStopped => ErrorKind::Cancelled,
        }
    }
}
