use serde::{Deserialize, Serialize};

/// The error taxonomy of the data plane.
///
/// Every component error maps onto one of these kinds, which in turn carry the stable numeric
/// codes used in JSON-RPC error objects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The requested record does not exist.
    #[display("NOT_FOUND")]
    NotFound,
    /// The node has not observed the genesis rollup yet.
    #[display("NOT_READY")]
    NotReady,
    /// Transport to the store, the L1 or a peer failed.
    #[display("IO_ERROR")]
    Io,
    /// Bytes could not be decoded into the expected record.
    #[display("DECODE_ERROR")]
    Decode,
    /// Data does not extend the canonical chain.
    #[display("CHAIN_INCONSISTENT")]
    ChainInconsistent,
    /// No common ancestor with a peer's branch could be found.
    #[display("NO_COMMON_ANCESTOR")]
    NoCommonAncestor,
    /// A subscription was driven through an illegal state transition.
    #[display("SUBSCRIPTION_STATE_ERROR")]
    SubscriptionState,
    /// The operation was cancelled.
    #[display("CANCELLED")]
    Cancelled,
    /// Any other failure.
    #[display("INTERNAL")]
    Internal,
}

impl ErrorKind {
    /// Returns the stable JSON-RPC error code for the kind.
    pub const fn code(&self) -> i32 {
        match self {
            Self::NotFound => -32001,
            Self::NotReady => -32002,
            Self::Io => -32003,
            Self::Decode => -32004,
            Self::ChainInconsistent => -32005,
            Self::NoCommonAncestor => -32006,
            Self::SubscriptionState => -32007,
            Self::Cancelled => -32008,
            Self::Internal => -32603,
        }
    }

    /// Returns true for kinds that are normal control flow rather than failures.
    pub const fn is_control_flow(&self) -> bool {
        matches!(self, Self::NotFound | Self::NotReady)
    }
}
