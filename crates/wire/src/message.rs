use crate::WireError;

use alloy_primitives::{
    bytes::{BufMut, BytesMut},
    B256,
};
use alloy_rlp::{
    Decodable, Encodable, Header, RlpDecodable, RlpDecodableWrapper, RlpEncodable,
    RlpEncodableWrapper, EMPTY_STRING_CODE,
};
use obscuro_primitives::ExtBatch;
use serde::{Deserialize, Serialize};

/// The maximum size of a frame accepted from a peer.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The identity of a peer host, used to address replies.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    RlpEncodableWrapper,
    RlpDecodableWrapper,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Returns a new [`PeerId`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of the identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The message ids of the sync protocol. The id is the first byte of every frame.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WireMessageId {
    /// A [`BatchRequest`].
    BatchRequest = 0,
    /// A [`BatchResponse`].
    BatchResponse = 1,
    /// A [`NoCommonAncestor`] answer to a batch request.
    NoCommonAncestor = 2,
    /// A batch announced by its producer.
    NewBatch = 3,
}

impl TryFrom<u8> for WireMessageId {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::BatchRequest),
            1 => Ok(Self::BatchResponse),
            2 => Ok(Self::NoCommonAncestor),
            3 => Ok(Self::NewBatch),
            id => Err(WireError::UnknownMessageId(id)),
        }
    }
}

/// A request for the batches following the requester's head. A missing head requests the chain
/// from genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRequest {
    /// The identity of the requesting host.
    pub requester: PeerId,
    /// The head batch of the requester, if any.
    pub current_head: Option<B256>,
}

impl BatchRequest {
    fn payload_length(&self) -> usize {
        self.requester.length() + self.current_head.as_ref().map_or(1, Encodable::length)
    }
}

impl Encodable for BatchRequest {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.requester.encode(out);
        match &self.current_head {
            Some(head) => head.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for BatchRequest {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started = buf.len();

        let requester = PeerId::decode(buf)?;
        let current_head = match buf.first() {
            Some(&EMPTY_STRING_CODE) => {
                *buf = &buf[1..];
                None
            }
            _ => Some(B256::decode(buf)?),
        };

        let consumed = started - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            })
        }
        Ok(Self { requester, current_head })
    }
}

/// A contiguous run of batches answering a [`BatchRequest`], ascending by height.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BatchResponse {
    /// The batches.
    pub batches: Vec<ExtBatch>,
}

/// Signals that no ancestor of the requester's head is known to the responder.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct NoCommonAncestor {
    /// The head the request was made from.
    pub head: B256,
}

/// Announces a batch freshly produced by the sequencer.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct NewBatch {
    /// The batch.
    pub batch: ExtBatch,
}

/// A message of the sync protocol.
#[derive(Clone, Debug, PartialEq, Eq, derive_more::From)]
pub enum WireMessage {
    BatchRequest(BatchRequest),
    BatchResponse(BatchResponse),
    NoCommonAncestor(NoCommonAncestor),
    NewBatch(NewBatch),
}

impl WireMessage {
    /// Returns the id of the message.
    pub const fn id(&self) -> WireMessageId {
        match self {
            Self::BatchRequest(_) => WireMessageId::BatchRequest,
            Self::BatchResponse(_) => WireMessageId::BatchResponse,
            Self::NoCommonAncestor(_) => WireMessageId::NoCommonAncestor,
            Self::NewBatch(_) => WireMessageId::NewBatch,
        }
    }

    /// Encodes the message into a frame: the message id followed by the RLP payload.
    pub fn encoded(&self) -> BytesMut {
        let mut buffer = BytesMut::new();
        buffer.put_u8(self.id() as u8);
        match self {
            Self::BatchRequest(request) => request.encode(&mut buffer),
            Self::BatchResponse(response) => response.encode(&mut buffer),
            Self::NoCommonAncestor(message) => message.encode(&mut buffer),
            Self::NewBatch(message) => message.encode(&mut buffer),
        }
        buffer
    }

    /// Decodes a message from a frame. The frame must be consumed entirely.
    pub fn decode(buffer: &mut &[u8]) -> Result<Self, WireError> {
        if buffer.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(buffer.len()))
        }
        let (&id, rest) = buffer.split_first().ok_or(WireError::EmptyFrame)?;
        let id = WireMessageId::try_from(id)?;
        *buffer = rest;

        let message = match id {
            WireMessageId::BatchRequest => Self::BatchRequest(BatchRequest::decode(buffer)?),
            WireMessageId::BatchResponse => Self::BatchResponse(BatchResponse::decode(buffer)?),
            WireMessageId::NoCommonAncestor => {
                Self::NoCommonAncestor(NoCommonAncestor::decode(buffer)?)
            }
            WireMessageId::NewBatch => Self::NewBatch(NewBatch::decode(buffer)?),
        };

        if !buffer.is_empty() {
            return Err(WireError::TrailingBytes(buffer.len()))
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscuro_primitives::test_utils::batch_chain;

    fn decode(frame: &[u8]) -> Result<WireMessage, WireError> {
        WireMessage::decode(&mut &frame[..])
    }

    #[test]
    fn test_batch_request_without_head() -> eyre::Result<()> {
        let message: WireMessage =
            BatchRequest { requester: "ws://host-a:8545".into(), current_head: None }.into();
        let frame = message.encoded();

        assert_eq!(frame[0], WireMessageId::BatchRequest as u8);
        assert_eq!(decode(&frame)?, message);

        Ok(())
    }

    #[test]
    fn test_batch_response_preserves_order() -> eyre::Result<()> {
        let batches = batch_chain(3);
        let message: WireMessage = BatchResponse { batches: batches.clone() }.into();

        let WireMessage::BatchResponse(response) = decode(&message.encoded())? else {
            panic!("expected a batch response")
        };
        assert_eq!(response.batches, batches);
        assert_eq!(response.batches[2].hash(), batches[2].hash());

        Ok(())
    }

    #[test]
    fn test_rejects_malformed_frames() {
        assert!(matches!(decode(&[]), Err(WireError::EmptyFrame)));
        assert!(matches!(decode(&[9, 0xc0]), Err(WireError::UnknownMessageId(9))));

        let mut frame =
            WireMessage::from(NoCommonAncestor { head: B256::repeat_byte(1) }).encoded().to_vec();
        frame.push(0);
        assert!(matches!(decode(&frame), Err(WireError::TrailingBytes(1))));
        assert!(matches!(decode(&frame[..10]), Err(WireError::Rlp(_))));
    }
}
