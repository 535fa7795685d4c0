use alloy_transport::TransportError;
use obscuro_primitives::ErrorKind;

/// An error occurring while talking to the L1.
#[derive(Debug, thiserror::Error)]
pub enum L1ProviderError {
    /// A transport error at the RPC level.
    #[error("l1 rpc error: {0}")]
    Rpc(#[from] TransportError),
    /// The requested block does not exist.
    #[error("unknown l1 block {0}")]
    MissingBlock(u64),
    /// The L1 rejected a submitted transaction.
    #[error("l1 rejected transaction: {0}")]
    Rejected(String),
    /// The client is disconnected from the L1.
    #[error("l1 client disconnected")]
    Disconnected,
}

impl L1ProviderError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc(_) | Self::Disconnected => ErrorKind::Io,
            Self::MissingBlock(_) => ErrorKind::NotFound,
            Self::Rejected(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if retrying the request may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io)
    }
}

/// An error occurring while talking to the enclave.
#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    /// The enclave could not be reached.
    #[error("enclave unavailable: {0}")]
    Unavailable(String),
    /// The enclave refused the request.
    #[error("enclave rejected request: {0}")]
    Rejected(String),
}

impl EnclaveError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::Io,
            Self::Rejected(_) => ErrorKind::Internal,
        }
    }
}

impl From<jsonrpsee::core::ClientError> for EnclaveError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        match err {
            jsonrpsee::core::ClientError::Call(err) => Self::Rejected(err.message().to_owned()),
            err => Self::Unavailable(err.to_string()),
        }
    }
}
