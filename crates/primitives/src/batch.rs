use crate::RollupHeader;

use alloy_primitives::{Address, Bloom, Bytes, B256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use obscuro_codec::Codec;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The header of an L2 batch produced by the enclave.
///
/// The canonical identity of a batch is [`BatchHeader::hash_slow`]: the keccak hash of the
/// versioned encoding of this header alone.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct BatchHeader {
    /// The hash of the parent batch. Zero for the genesis batch.
    pub parent_hash: B256,
    /// The height of the batch.
    pub number: u64,
    /// The identity of the sequencer that produced the batch.
    pub sequencer: Address,
    /// The L2 chain id.
    pub chain_id: u64,
    /// The batch timestamp in seconds.
    pub timestamp: u64,
    /// The state root commitment after the batch.
    pub state_root: B256,
    /// The root of the batch transactions.
    pub tx_root: B256,
    /// The root of the batch receipts.
    pub receipt_root: B256,
    /// The bloom filter of the batch logs.
    pub logs_bloom: Bloom,
    /// The hash of the L1 block the batch was produced against.
    pub l1_proof: B256,
}

impl BatchHeader {
    /// Computes the hash of the header. Prefer [`ExtBatch::hash`] which caches the result.
    pub fn hash_slow(&self) -> B256 {
        Codec::hash(self)
    }

    /// Returns true if the header is a genesis header: height zero with a zero parent.
    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash.is_zero()
    }

    /// Derives the header of a rollup whose highest batch is this header.
    pub const fn to_rollup_header(
        &self,
        head_batch_hash: B256,
        l1_anchor: B256,
        batch_count: u64,
    ) -> RollupHeader {
        RollupHeader {
            number: self.number,
            head_batch_hash,
            l1_anchor,
            sequencer: self.sequencer,
            chain_id: self.chain_id,
            timestamp: self.timestamp,
            state_root: self.state_root,
            batch_count,
        }
    }
}

/// A batch with its transaction hashes and the encrypted transaction payloads.
///
/// The header is immutable once the batch is constructed, so the cached hash is always the hash
/// of the current header.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtBatch {
    header: BatchHeader,
    tx_hashes: Vec<B256>,
    encrypted_tx_blob: Bytes,
    #[serde(skip)]
    hash: OnceLock<B256>,
}

impl ExtBatch {
    /// Returns a new [`ExtBatch`].
    pub const fn new(header: BatchHeader, tx_hashes: Vec<B256>, encrypted_tx_blob: Bytes) -> Self {
        Self { header, tx_hashes, encrypted_tx_blob, hash: OnceLock::new() }
    }

    /// Returns the hash of the batch header, computing it on first access.
    pub fn hash(&self) -> B256 {
        *self.hash.get_or_init(|| self.header.hash_slow())
    }

    /// Returns the batch header.
    pub const fn header(&self) -> &BatchHeader {
        &self.header
    }

    /// Returns the height of the batch.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// Returns the hash of the parent batch.
    pub const fn parent_hash(&self) -> B256 {
        self.header.parent_hash
    }

    /// Returns the hashes of the transactions in the batch.
    pub fn tx_hashes(&self) -> &[B256] {
        &self.tx_hashes
    }

    /// Returns the opaque encrypted transactions payload.
    pub const fn encrypted_tx_blob(&self) -> &Bytes {
        &self.encrypted_tx_blob
    }

    /// Consumes the batch and returns its parts.
    pub fn into_parts(self) -> (BatchHeader, Vec<B256>, Bytes) {
        (self.header, self.tx_hashes, self.encrypted_tx_blob)
    }

    fn payload_length(&self) -> usize {
        self.header.length() + self.tx_hashes.length() + self.encrypted_tx_blob.length()
    }
}

impl PartialEq for ExtBatch {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header &&
            self.tx_hashes == other.tx_hashes &&
            self.encrypted_tx_blob == other.encrypted_tx_blob
    }
}

impl Eq for ExtBatch {}

impl From<BatchHeader> for ExtBatch {
    fn from(header: BatchHeader) -> Self {
        Self::new(header, Vec::new(), Bytes::new())
    }
}

impl Encodable for ExtBatch {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.header.encode(out);
        self.tx_hashes.encode(out);
        self.encrypted_tx_blob.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for ExtBatch {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started = buf.len();

        let batch = Self::new(
            Decodable::decode(buf)?,
            Decodable::decode(buf)?,
            Decodable::decode(buf)?,
        );

        let consumed = started - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            })
        }
        Ok(batch)
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl arbitrary::Arbitrary<'_> for ExtBatch {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let tx_count = u.int_in_range(0..=4usize)?;
        let tx_hashes = (0..tx_count).map(|_| u.arbitrary()).collect::<Result<_, _>>()?;
        Ok(Self::new(u.arbitrary()?, tx_hashes, u.arbitrary()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random;
    use arbitrary::Arbitrary;

    #[test]
    fn test_should_cache_hash_of_header() {
        let batch = random!(ExtBatch);
        let expected = Codec::hash(batch.header());

        assert_eq!(batch.hash(), expected);
        // the cached value survives clones.
        assert_eq!(batch.clone().hash(), expected);
    }

    #[test]
    fn test_decoded_batch_hashes_as_original() -> eyre::Result<()> {
        let batch = random!(ExtBatch);
        let decoded: ExtBatch = Codec::decode(&Codec::encode(&batch))?;

        assert_eq!(decoded, batch);
        assert_eq!(decoded.hash(), batch.hash());
        Ok(())
    }

    #[test]
    fn test_hash_ignores_body() {
        let batch = random!(ExtBatch);
        let (header, _, _) = batch.clone().into_parts();
        let stripped = ExtBatch::from(header);

        assert_eq!(stripped.hash(), batch.hash());
        assert!(stripped.tx_hashes().is_empty());
    }

    #[test]
    fn test_genesis_header() {
        let header = BatchHeader { number: 0, parent_hash: B256::ZERO, ..Default::default() };
        assert!(header.is_genesis());

        let header = BatchHeader { number: 1, ..header };
        assert!(!header.is_genesis());
    }
}
