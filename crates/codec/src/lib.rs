//! The codec implementation for Obscuro.
//!
//! Every persisted or transmitted record is framed as a single version byte followed by the
//! recursive length prefix encoding of the record's fields in a fixed order. The keccak hash of
//! that framed encoding is the canonical identity of a header.

pub use error::{CodecError, DecodingError};
mod error;

use alloy_primitives::{keccak256, B256};
use alloy_rlp::{Decodable, Encodable};

/// The Codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Codec {
    /// V1 variant of the codec: version tag followed by the rlp payload.
    V1 = 1,
}

impl Codec {
    /// The version used for all new encodings.
    pub const LATEST: Self = Self::V1;

    /// Returns the version tag of the codec.
    pub const fn version(self) -> u8 {
        self as u8
    }

    /// Returns the codec for the provided version tag.
    pub const fn from_version(version: u8) -> Result<Self, DecodingError> {
        match version {
            1 => Ok(Self::V1),
            v => Err(DecodingError::UnsupportedCodecVersion(v)),
        }
    }

    /// Encodes the value with the latest codec version.
    pub fn encode<T: Encodable + ?Sized>(value: &T) -> Vec<u8> {
        Self::LATEST.encode_with(value)
    }

    /// Encodes the value with this codec version.
    pub fn encode_with<T: Encodable + ?Sized>(self, value: &T) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + value.length());
        out.push(self.version());
        value.encode(&mut out);
        out
    }

    /// Decodes a value from its framed encoding. The whole input must be consumed.
    pub fn decode<T: Decodable>(input: &[u8]) -> Result<T, CodecError> {
        let version = input.first().ok_or(DecodingError::MissingCodecVersion)?;
        let codec = Self::from_version(*version)?;
        tracing::trace!(target: "obscuro::codec", ?codec, len = input.len(), "decoding");

        let total = input.len();
        let mut buf = &input[1..];
        let value =
            T::decode(&mut buf).map_err(|err| DecodingError::from_rlp(err, total - buf.len()))?;

        if !buf.is_empty() {
            return Err(DecodingError::TrailingBytes {
                offset: total - buf.len(),
                remaining: buf.len(),
            }
            .into())
        }

        Ok(value)
    }

    /// Returns the canonical hash of the value: keccak-256 of its framed encoding.
    pub fn hash<T: Encodable + ?Sized>(value: &T) -> B256 {
        keccak256(Self::encode(value))
    }
}
