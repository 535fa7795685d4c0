use crate::EnclaveError;

use alloy_primitives::{Bytes, B256};
use futures::StreamExt;
use jsonrpsee::{
    core::{RpcResult, SubscriptionResult},
    proc_macros::rpc,
    ws_client::{WsClient, WsClientBuilder},
};
use obscuro_primitives::{BlockInfo, ExtBatch, L1Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The opaque handle of a log subscription.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Returns a new [`SubscriptionId`] from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of the handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An event pushed by the enclave on its delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EnclaveEvent {
    /// Encrypted logs matching a subscription.
    Logs {
        /// The subscription the logs match.
        subscription: SubscriptionId,
        /// The logs, encrypted for the subscriber.
        payload: Bytes,
    },
    /// The enclave terminated the subscription.
    Revoked {
        /// The revoked subscription.
        subscription: SubscriptionId,
    },
    /// A batch produced by the enclave, on sequencer nodes.
    Batch(ExtBatch),
}

/// The trusted enclave, as seen by the host.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait EnclaveClient: Send + Sync {
    /// Submits an encrypted L2 transaction, returning its hash.
    async fn submit_transaction(&self, ciphertext: Bytes) -> Result<B256, EnclaveError>;

    /// Registers an encrypted log subscription under the provided handle.
    async fn subscribe(
        &self,
        id: SubscriptionId,
        encrypted_subscription: Bytes,
    ) -> Result<(), EnclaveError>;

    /// Terminates the subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EnclaveError>;

    /// Forwards an L1 transaction relevant to the enclave (deposits, network secret
    /// management) along with the block that included it.
    async fn submit_l1_transaction(
        &self,
        block: BlockInfo,
        tx: L1Transaction,
    ) -> Result<(), EnclaveError>;
}

/// The JSON-RPC interface served by the enclave process.
#[rpc(client, namespace = "enclave")]
pub trait EnclaveApi {
    /// Submits an encrypted transaction.
    #[method(name = "submitTx")]
    async fn submit_tx(&self, ciphertext: Bytes) -> RpcResult<B256>;

    /// Registers a log subscription.
    #[method(name = "subscribeLogs")]
    async fn subscribe_logs(&self, id: SubscriptionId, payload: Bytes) -> RpcResult<()>;

    /// Terminates a log subscription.
    #[method(name = "unsubscribeLogs")]
    async fn unsubscribe_logs(&self, id: SubscriptionId) -> RpcResult<()>;

    /// Forwards an L1 transaction.
    #[method(name = "submitL1Tx")]
    async fn submit_l1_tx(&self, block: BlockInfo, tx: L1Transaction) -> RpcResult<()>;

    /// Streams the enclave events.
    #[subscription(name = "subscribeEvents" => "events", unsubscribe = "unsubscribeEvents", item = EnclaveEvent)]
    async fn events(&self) -> SubscriptionResult;
}

/// An [`EnclaveClient`] talking to an enclave process over a websocket.
#[derive(Debug, Clone)]
pub struct RpcEnclaveClient {
    client: Arc<WsClient>,
}

impl RpcEnclaveClient {
    /// The capacity of the enclave event channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

    /// Connects to the enclave and returns the client along with the receiving half of the
    /// enclave's delivery channel. The channel closes when the enclave connection drops.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<EnclaveEvent>), EnclaveError> {
        let client = Arc::new(WsClientBuilder::default().build(url).await?);
        let mut events = EnclaveApiClient::events(client.as_ref()).await?;

        let (tx, rx) = mpsc::channel(Self::EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break
                        }
                    }
                    Err(err) => {
                        tracing::warn!(target: "obscuro::providers", ?err, "Dropping malformed enclave event");
                    }
                }
            }
            tracing::info!(target: "obscuro::providers", "Enclave event stream closed");
        });

        tracing::info!(target: "obscuro::providers", url, "Connected to enclave");
        Ok((Self { client }, rx))
    }
}

#[async_trait::async_trait]
impl EnclaveClient for RpcEnclaveClient {
    async fn submit_transaction(&self, ciphertext: Bytes) -> Result<B256, EnclaveError> {
        Ok(self.client.submit_tx(ciphertext).await?)
    }

    async fn subscribe(
        &self,
        id: SubscriptionId,
        encrypted_subscription: Bytes,
    ) -> Result<(), EnclaveError> {
        Ok(self.client.subscribe_logs(id, encrypted_subscription).await?)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EnclaveError> {
        Ok(self.client.unsubscribe_logs(id).await?)
    }

    async fn submit_l1_transaction(
        &self,
        block: BlockInfo,
        tx: L1Transaction,
    ) -> Result<(), EnclaveError> {
        Ok(self.client.submit_l1_tx(block, tx).await?)
    }
}
