use crate::PeerId;
use obscuro_primitives::ErrorKind;

/// An error on the peer wire.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame carried no message id.
    #[error("empty frame")]
    EmptyFrame,
    /// The frame exceeds the maximum frame size.
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
    /// The message id is not part of the protocol.
    #[error("unknown message id {0}")]
    UnknownMessageId(u8),
    /// The message payload is malformed.
    #[error("malformed message: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// The frame holds bytes past the message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    /// The peer could not be reached.
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable {
        /// The peer.
        peer: PeerId,
        /// The transport failure.
        reason: String,
    },
}

impl WireError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable { .. } => ErrorKind::Io,
            _ => ErrorKind::Decode,
        }
    }
}
