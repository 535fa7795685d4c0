use alloy_primitives::{Address, Bytes, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// Information about a block.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    RlpEncodable,
    RlpDecodable,
    derive_more::Display,
)]
#[display("({number}, {hash})")]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
}

impl BlockInfo {
    /// Returns a new instance of [`BlockInfo`].
    pub const fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

/// The header of an L1 block, as far as the data plane is concerned.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct L1BlockHeader {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
    /// The hash of the parent block.
    pub parent_hash: B256,
    /// The block timestamp in seconds.
    pub timestamp: u64,
}

impl L1BlockHeader {
    /// Returns the [`BlockInfo`] of the header.
    pub const fn block_info(&self) -> BlockInfo {
        BlockInfo::new(self.number, self.hash)
    }
}

/// A transaction included in an L1 block.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(any(test, feature = "arbitrary"), derive(arbitrary::Arbitrary))]
pub struct L1Transaction {
    /// The transaction hash.
    pub hash: B256,
    /// The sender of the transaction.
    pub from: Address,
    /// The recipient of the transaction, `None` for contract creations.
    pub to: Option<Address>,
    /// The transaction calldata.
    pub input: Bytes,
}

/// An L1 block with its full transactions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Block {
    /// The block header.
    pub header: L1BlockHeader,
    /// The transactions of the block in inclusion order.
    pub transactions: Vec<L1Transaction>,
}

impl L1Block {
    /// Returns the [`BlockInfo`] of the block.
    pub const fn block_info(&self) -> BlockInfo {
        self.header.block_info()
    }
}
