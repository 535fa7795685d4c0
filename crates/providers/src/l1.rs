use crate::L1ProviderError;

use alloy_eips::BlockNumberOrTag;
use alloy_network::{TransactionBuilder, TransactionResponse};
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{Block, TransactionRequest, TransactionTrait};
use obscuro_primitives::{L1Block, L1BlockHeader, L1Transaction};

/// Access to the L1 chain.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait L1Client: Send + Sync {
    /// Returns the header of the current L1 head.
    async fn head_block(&self) -> Result<L1BlockHeader, L1ProviderError>;

    /// Returns the block at the provided height with its transactions.
    async fn block_by_number(&self, number: u64) -> Result<Option<L1Block>, L1ProviderError>;

    /// Returns the blocks in the inclusive range `[from, to]`, stopping at the first missing
    /// block.
    async fn blocks_between(&self, from: u64, to: u64) -> Result<Vec<L1Block>, L1ProviderError> {
        let mut blocks = Vec::with_capacity(to.saturating_sub(from) as usize + 1);
        for number in from..=to {
            match self.block_by_number(number).await? {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        Ok(blocks)
    }

    /// Sends a transaction with the provided calldata to `to`, returning its hash.
    async fn send_transaction(&self, to: Address, input: Bytes) -> Result<B256, L1ProviderError>;
}

/// An [`L1Client`] backed by an alloy [`Provider`].
///
/// The provider is expected to carry a wallet filler for transaction submission, along with any
/// retry or rate limiting layers the deployment needs.
#[derive(Debug, Clone)]
pub struct AlloyL1Client<P> {
    provider: P,
}

impl<P> AlloyL1Client<P> {
    /// Returns a new [`AlloyL1Client`] over the provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn into_l1_block(block: Block) -> L1Block {
    let header = L1BlockHeader {
        number: block.header.number,
        hash: block.header.hash,
        parent_hash: block.header.parent_hash,
        timestamp: block.header.timestamp,
    };
    let transactions = block
        .transactions
        .into_transactions()
        .map(|tx| L1Transaction {
            hash: tx.tx_hash(),
            from: tx.from(),
            to: tx.to(),
            input: tx.input().clone(),
        })
        .collect();
    L1Block { header, transactions }
}

#[async_trait::async_trait]
impl<P: Provider + Send + Sync> L1Client for AlloyL1Client<P> {
    async fn head_block(&self) -> Result<L1BlockHeader, L1ProviderError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or(L1ProviderError::Disconnected)?;
        Ok(L1BlockHeader {
            number: block.header.number,
            hash: block.header.hash,
            parent_hash: block.header.parent_hash,
            timestamp: block.header.timestamp,
        })
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<L1Block>, L1ProviderError> {
        let block = self.provider.get_block_by_number(number.into()).full().await?;
        Ok(block.map(into_l1_block))
    }

    async fn send_transaction(&self, to: Address, input: Bytes) -> Result<B256, L1ProviderError> {
        let request = TransactionRequest::default().with_to(to).with_input(input);
        let pending = self.provider.send_transaction(request).await?;
        tracing::debug!(target: "obscuro::providers", tx_hash = %pending.tx_hash(), "Sent L1 transaction");
        Ok(*pending.tx_hash())
    }
}
