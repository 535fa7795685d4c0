use crate::ExtBatch;

use alloy_primitives::{Address, B256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use obscuro_codec::Codec;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The header of a rollup published to the L1.
///
/// The rollup number is the number of its head batch.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct RollupHeader {
    /// The height of the rollup, equal to the height of its head batch.
    pub number: u64,
    /// The hash of the highest batch included in the rollup.
    pub head_batch_hash: B256,
    /// The hash of the L1 block the rollup is anchored to.
    pub l1_anchor: B256,
    /// The identity of the sequencer that published the rollup.
    pub sequencer: Address,
    /// The L2 chain id.
    pub chain_id: u64,
    /// The timestamp of the head batch.
    pub timestamp: u64,
    /// The state root after the head batch.
    pub state_root: B256,
    /// The number of batches in the rollup.
    pub batch_count: u64,
}

impl RollupHeader {
    /// Computes the hash of the rollup header.
    pub fn hash_slow(&self) -> B256 {
        Codec::hash(self)
    }
}

/// A violation of the structural rules of a rollup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollupIntegrityError {
    /// The rollup carries no batch.
    #[error("rollup contains no batch")]
    Empty,
    /// Batches are not strictly ascending by height without gaps.
    #[error("batch at position {position} has height {got}, expected {expected}")]
    NonContiguous {
        /// Position of the offending batch in the rollup.
        position: usize,
        /// The expected height.
        expected: u64,
        /// The observed height.
        got: u64,
    },
    /// A batch follows a batch at the maximal height.
    #[error("batch at position {position} follows a batch at the maximal height")]
    HeightOverflow {
        /// Position of the offending batch in the rollup.
        position: usize,
    },
    /// A batch does not reference the batch preceding it in the rollup.
    #[error("batch {number} does not chain to its predecessor")]
    BrokenLinkage {
        /// The height of the offending batch.
        number: u64,
    },
    /// The header's head batch hash does not match the last batch.
    #[error("head batch hash mismatch: header {header}, last batch {last}")]
    HeadHashMismatch {
        /// The hash recorded in the rollup header.
        header: B256,
        /// The hash of the last batch.
        last: B256,
    },
    /// The header's number does not match the last batch.
    #[error("rollup number {header} does not match head batch height {last}")]
    NumberMismatch {
        /// The number recorded in the rollup header.
        header: u64,
        /// The height of the last batch.
        last: u64,
    },
}

/// A rollup: its header and the ordered batches it publishes.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtRollup {
    header: RollupHeader,
    batches: Vec<ExtBatch>,
    #[serde(skip)]
    hash: OnceLock<B256>,
}

impl ExtRollup {
    /// Returns a new [`ExtRollup`] from its parts. No structural validation is performed, see
    /// [`ExtRollup::check_integrity`].
    pub const fn new(header: RollupHeader, batches: Vec<ExtBatch>) -> Self {
        Self { header, batches, hash: OnceLock::new() }
    }

    /// Builds a rollup from the provided batches: the batches are sorted by ascending height and
    /// the header is derived from the highest one. Returns `None` if no batch is provided.
    pub fn from_batches(mut batches: Vec<ExtBatch>, l1_anchor: B256) -> Option<Self> {
        batches.sort_by_key(ExtBatch::number);
        let head = batches.last()?;
        let header = head.header().to_rollup_header(head.hash(), l1_anchor, batches.len() as u64);
        Some(Self::new(header, batches))
    }

    /// Returns the hash of the rollup header, computing it on first access.
    pub fn hash(&self) -> B256 {
        *self.hash.get_or_init(|| self.header.hash_slow())
    }

    /// Returns the rollup header.
    pub const fn header(&self) -> &RollupHeader {
        &self.header
    }

    /// Returns the batches of the rollup.
    pub fn batches(&self) -> &[ExtBatch] {
        &self.batches
    }

    /// Consumes the rollup and returns its batches.
    pub fn into_batches(self) -> Vec<ExtBatch> {
        self.batches
    }

    /// Checks that the rollup is non-empty, that its batches are strictly ascending by height
    /// without gaps and chain to each other, and that the header references the last batch.
    pub fn check_integrity(&self) -> Result<(), RollupIntegrityError> {
        let first = self.batches.first().ok_or(RollupIntegrityError::Empty)?;

        for (position, pair) in self.batches.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let expected = prev
                .number()
                .checked_add(1)
                .ok_or(RollupIntegrityError::HeightOverflow { position: position + 1 })?;
            if next.number() != expected {
                return Err(RollupIntegrityError::NonContiguous {
                    position: position + 1,
                    expected,
                    got: next.number(),
                })
            }
            if next.parent_hash() != prev.hash() {
                return Err(RollupIntegrityError::BrokenLinkage { number: next.number() })
            }
        }

        let last = self.batches.last().unwrap_or(first);
        if self.header.head_batch_hash != last.hash() {
            return Err(RollupIntegrityError::HeadHashMismatch {
                header: self.header.head_batch_hash,
                last: last.hash(),
            })
        }
        if self.header.number != last.number() {
            return Err(RollupIntegrityError::NumberMismatch {
                header: self.header.number,
                last: last.number(),
            })
        }

        Ok(())
    }

    fn payload_length(&self) -> usize {
        self.header.length() + self.batches.length()
    }
}

impl PartialEq for ExtRollup {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.batches == other.batches
    }
}

impl Eq for ExtRollup {}

impl Encodable for ExtRollup {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.header.encode(out);
        self.batches.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for ExtRollup {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started = buf.len();

        let rollup = Self::new(Decodable::decode(buf)?, Decodable::decode(buf)?);

        let consumed = started - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            })
        }
        Ok(rollup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{batch_chain, header_at};

    #[test]
    fn test_from_batches_sorts_and_derives_header() {
        let mut batches = batch_chain(3);
        let head = batches[2].clone();
        batches.reverse();

        let rollup = ExtRollup::from_batches(batches, B256::with_last_byte(7)).unwrap();

        assert_eq!(rollup.batches().iter().map(ExtBatch::number).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(rollup.header().head_batch_hash, head.hash());
        assert_eq!(rollup.header().number, 2);
        assert_eq!(rollup.header().l1_anchor, B256::with_last_byte(7));
        assert_eq!(rollup.header().batch_count, 3);
        assert_eq!(rollup.header().timestamp, head.header().timestamp);
        assert_eq!(rollup.check_integrity(), Ok(()));
    }

    #[test]
    fn test_empty_rollup_is_rejected() {
        assert!(ExtRollup::from_batches(vec![], B256::ZERO).is_none());
        let rollup = ExtRollup::new(RollupHeader::default(), vec![]);
        assert_eq!(rollup.check_integrity(), Err(RollupIntegrityError::Empty));
    }

    #[test]
    fn test_gap_is_rejected() {
        let mut batches = batch_chain(4);
        batches.remove(2);
        let rollup = ExtRollup::from_batches(batches, B256::ZERO).unwrap();

        assert_eq!(
            rollup.check_integrity(),
            Err(RollupIntegrityError::NonContiguous { position: 2, expected: 2, got: 3 })
        );
    }

    #[test]
    fn test_height_overflow_is_rejected() {
        let last = ExtBatch::from(header_at(u64::MAX, B256::repeat_byte(1)));
        let wrapped = ExtBatch::from(header_at(0, last.hash()));
        let header = wrapped.header().to_rollup_header(wrapped.hash(), B256::ZERO, 2);
        let rollup = ExtRollup::new(header, vec![last, wrapped]);

        assert_eq!(
            rollup.check_integrity(),
            Err(RollupIntegrityError::HeightOverflow { position: 1 })
        );
    }

    #[test]
    fn test_head_hash_mismatch_is_rejected() {
        let batches = batch_chain(2);
        let mut header = batches[1].header().to_rollup_header(B256::ZERO, B256::ZERO, 2);
        header.head_batch_hash = batches[0].hash();
        let rollup = ExtRollup::new(header, batches);

        assert!(matches!(
            rollup.check_integrity(),
            Err(RollupIntegrityError::HeadHashMismatch { .. })
        ));
    }

    #[test]
    fn test_decoded_rollup_keeps_identity() -> eyre::Result<()> {
        let rollup = ExtRollup::from_batches(batch_chain(3), B256::with_last_byte(1)).unwrap();
        let decoded: ExtRollup = Codec::decode(&Codec::encode(&rollup))?;

        assert_eq!(decoded, rollup);
        assert_eq!(decoded.hash(), rollup.hash());
        assert_eq!(decoded.batches()[2].hash(), rollup.batches()[2].hash());
        Ok(())
    }
}
