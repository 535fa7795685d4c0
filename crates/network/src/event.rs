use crate::InvalidBatch;

use alloy_primitives::B256;
use obscuro_wire::PeerId;

/// An event emitted by the sync service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Batches received from a peer were imported.
    BatchesImported {
        /// The peer the batches came from.
        peer: PeerId,
        /// The amount of batches committed.
        applied: usize,
        /// Whether the batch head advanced.
        head_advanced: bool,
    },
    /// A batch received from a peer was refused.
    BatchRefused {
        /// The peer the batch came from.
        peer: PeerId,
        /// The reason of the refusal.
        reason: InvalidBatch,
    },
    /// The peer knows no ancestor of the local head.
    NoCommonAncestor {
        /// The peer.
        peer: PeerId,
        /// The head the request was made from.
        head: B256,
    },
    /// A request to the peer failed or timed out.
    RequestFailed(PeerId),
    /// The peer got blacklisted.
    PeerBlacklisted(PeerId),
}
