//! Test utils for providers.

use crate::{EnclaveClient, EnclaveError, EnclaveEvent, L1Client, L1ProviderError, SubscriptionId};

use alloy_primitives::{keccak256, Address, Bytes, B256};
use obscuro_primitives::{BlockInfo, L1Block, L1BlockHeader, L1Transaction};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct MockL1State {
    blocks: BTreeMap<u64, L1Block>,
    sent: Vec<(Address, Bytes)>,
    failures: usize,
    fork: u64,
}

/// An in-memory [`L1Client`]. The head is the highest pushed block.
#[derive(Debug, Clone, Default)]
pub struct MockL1Client {
    state: Arc<Mutex<MockL1State>>,
}

impl MockL1Client {
    /// Returns a new [`MockL1Client`] with a genesis block at height 0.
    pub fn new() -> Self {
        let client = Self::default();
        client.mine(vec![]);
        client
    }

    /// Appends a block holding the provided transactions on top of the current head and returns
    /// its header.
    pub fn mine(&self, transactions: Vec<L1Transaction>) -> L1BlockHeader {
        let mut state = self.state.lock();
        let (number, parent_hash) = state
            .blocks
            .last_key_value()
            .map(|(number, block)| (number + 1, block.header.hash))
            .unwrap_or_default();
        let hash = keccak256(
            [parent_hash.as_slice(), &number.to_be_bytes(), &state.fork.to_be_bytes()].concat(),
        );
        let header = L1BlockHeader { number, hash, parent_hash, timestamp: number * 12 };
        state.blocks.insert(number, L1Block { header: header.clone(), transactions });
        header
    }

    /// Mines `n` empty blocks.
    pub fn mine_empty(&self, n: usize) {
        for _ in 0..n {
            self.mine(vec![]);
        }
    }

    /// Drops every block at or above `number`, so that subsequently mined blocks form a fork.
    pub fn reorg_from(&self, number: u64) {
        let mut state = self.state.lock();
        state.blocks.retain(|n, _| *n < number);
        state.fork += 1;
    }

    /// Makes the next `n` requests fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures = n;
    }

    /// Returns the transactions sent through the client.
    pub fn sent_transactions(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().sent.clone()
    }

    /// Returns the [`BlockInfo`] of the block at `number`.
    pub fn block_info(&self, number: u64) -> Option<BlockInfo> {
        self.state.lock().blocks.get(&number).map(L1Block::block_info)
    }

    fn check_failure(&self) -> Result<(), L1ProviderError> {
        let mut state = self.state.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(L1ProviderError::Disconnected)
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl L1Client for MockL1Client {
    async fn head_block(&self) -> Result<L1BlockHeader, L1ProviderError> {
        self.check_failure()?;
        self.state
            .lock()
            .blocks
            .last_key_value()
            .map(|(_, block)| block.header.clone())
            .ok_or(L1ProviderError::MissingBlock(0))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<L1Block>, L1ProviderError> {
        self.check_failure()?;
        Ok(self.state.lock().blocks.get(&number).cloned())
    }

    async fn send_transaction(&self, to: Address, input: Bytes) -> Result<B256, L1ProviderError> {
        self.check_failure()?;
        let hash = B256::from(rand::random::<[u8; 32]>());
        self.state.lock().sent.push((to, input));
        Ok(hash)
    }
}

/// A call recorded by the [`MockEnclaveClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnclaveCall {
    /// An encrypted transaction submission.
    SubmitTransaction(Bytes),
    /// A subscription registration.
    Subscribe(SubscriptionId, Bytes),
    /// A subscription termination.
    Unsubscribe(SubscriptionId),
    /// A forwarded L1 transaction.
    L1Transaction(BlockInfo, L1Transaction),
}

#[derive(Debug, Default)]
struct MockEnclaveState {
    calls: Vec<EnclaveCall>,
    reject_subscriptions: bool,
}

/// An in-memory [`EnclaveClient`] recording every call, along with a handle to push
/// [`EnclaveEvent`]s on its delivery channel.
#[derive(Debug, Clone)]
pub struct MockEnclaveClient {
    state: Arc<Mutex<MockEnclaveState>>,
    events: mpsc::Sender<EnclaveEvent>,
}

impl MockEnclaveClient {
    /// Returns a new [`MockEnclaveClient`] and the receiving half of its delivery channel.
    pub fn new() -> (Self, mpsc::Receiver<EnclaveEvent>) {
        let (events, rx) = mpsc::channel(1024);
        (Self { state: Default::default(), events }, rx)
    }

    /// Pushes an event on the delivery channel.
    pub async fn emit(&self, event: EnclaveEvent) {
        let _ = self.events.send(event).await;
    }

    /// Makes subsequent subscription requests fail.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.state.lock().reject_subscriptions = reject;
    }

    /// Returns the calls received so far.
    pub fn calls(&self) -> Vec<EnclaveCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: EnclaveCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait::async_trait]
impl EnclaveClient for MockEnclaveClient {
    async fn submit_transaction(&self, ciphertext: Bytes) -> Result<B256, EnclaveError> {
        let hash = keccak256(&ciphertext);
        self.record(EnclaveCall::SubmitTransaction(ciphertext));
        Ok(hash)
    }

    async fn subscribe(
        &self,
        id: SubscriptionId,
        encrypted_subscription: Bytes,
    ) -> Result<(), EnclaveError> {
        if self.state.lock().reject_subscriptions {
            return Err(EnclaveError::Rejected("subscription refused".to_owned()))
        }
        self.record(EnclaveCall::Subscribe(id, encrypted_subscription));
        Ok(())
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EnclaveError> {
        self.record(EnclaveCall::Unsubscribe(id));
        Ok(())
    }

    async fn submit_l1_transaction(
        &self,
        block: BlockInfo,
        tx: L1Transaction,
    ) -> Result<(), EnclaveError> {
        self.record(EnclaveCall::L1Transaction(block, tx));
        Ok(())
    }
}
