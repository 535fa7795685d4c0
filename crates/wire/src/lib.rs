//! The peer wire of the sync protocol.
//!
//! Hosts exchange frames made of a one byte [`WireMessageId`] followed by the RLP encoding of the
//! message. Frames are delivered by a [`PeerTransport`]; inbound frames are handed to the sync
//! service as [`InboundFrame`]s.

pub use error::WireError;
mod error;

pub use message::{
    BatchRequest, BatchResponse, NewBatch, NoCommonAncestor, PeerId, WireMessage, WireMessageId,
    MAX_FRAME_SIZE,
};
mod message;

pub use transport::{
    InboundFrame, PeerApiClient, PeerApiHandler, PeerApiServer, PeerTransport, RpcPeerTransport,
    INBOUND_CHANNEL_CAPACITY,
};
mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
