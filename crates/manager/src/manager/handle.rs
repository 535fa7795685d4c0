use super::{metrics::HandleMetrics, NodeEvent, NodeManagerCommand, Reply};
use crate::{HealthStatus, NodeManagerError};

use alloy_primitives::{Bytes, B256};
use obscuro_db::HeadUpdate;
use obscuro_primitives::{BatchHeader, ExtBatch, L1BlockHeader, RollupHeader};
use obscuro_providers::SubscriptionId;
use obscuro_subscriptions::Subscription;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;

/// The handle used to send commands to the node manager.
#[derive(Debug, Clone)]
pub struct NodeManagerHandle {
    /// The channel used to send commands to the node manager.
    to_manager_tx: mpsc::UnboundedSender<NodeManagerCommand>,
    handle_metrics: HandleMetrics,
}

impl NodeManagerHandle {
    /// Create a new node manager handle.
    pub fn new(to_manager_tx: mpsc::UnboundedSender<NodeManagerCommand>) -> Self {
        Self { to_manager_tx, handle_metrics: HandleMetrics::default() }
    }

    /// Sends a command to the node manager.
    pub fn send_command(&self, command: NodeManagerCommand) -> Result<(), NodeManagerError> {
        self.to_manager_tx.send(command).map_err(|err| {
            self.handle_metrics.handle_send_command_failed.increment(1);
            tracing::error!(target: "obscuro::manager", %err, "Failed to send command to node manager");
            NodeManagerError::ManagerStopped
        })
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> NodeManagerCommand,
    ) -> Result<T, NodeManagerError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(command(tx))?;
        rx.await.map_err(|_| NodeManagerError::ManagerStopped)?
    }

    /// Returns the head batch header, or `None` on an empty store.
    pub async fn batch_head(&self) -> Result<Option<BatchHeader>, NodeManagerError> {
        self.request(NodeManagerCommand::BatchHead).await
    }

    /// Returns the head rollup header. Fails with [`NodeManagerError::NotReady`] until the first
    /// rollup is stored.
    pub async fn rollup_head(&self) -> Result<RollupHeader, NodeManagerError> {
        self.request(NodeManagerCommand::RollupHead).await
    }

    /// Returns the current L1 head.
    pub async fn l1_head(&self) -> Result<L1BlockHeader, NodeManagerError> {
        self.request(NodeManagerCommand::L1Head).await
    }

    /// Returns the health of the node.
    pub async fn health(&self) -> Result<HealthStatus, NodeManagerError> {
        self.request(NodeManagerCommand::Health).await
    }

    /// Stores and announces a batch produced by the enclave. Sequencer only.
    pub async fn submit_batch(&self, batch: ExtBatch) -> Result<HeadUpdate, NodeManagerError> {
        self.request(|reply| NodeManagerCommand::SubmitBatch(batch, reply)).await
    }

    /// Submits an encrypted transaction to the enclave, returning its hash.
    pub async fn send_raw_transaction(&self, ciphertext: Bytes) -> Result<B256, NodeManagerError> {
        self.request(|reply| NodeManagerCommand::SendRawTransaction(ciphertext, reply)).await
    }

    /// Creates a log subscription from the encrypted subscription payload.
    pub async fn subscribe_logs(&self, payload: Bytes) -> Result<Subscription, NodeManagerError> {
        self.request(|reply| NodeManagerCommand::SubscribeLogs(payload, reply)).await
    }

    /// Terminates a log subscription.
    pub async fn unsubscribe_logs(&self, id: SubscriptionId) -> Result<(), NodeManagerError> {
        self.request(|reply| NodeManagerCommand::UnsubscribeLogs(id, reply)).await
    }

    /// Returns a stream of the node events.
    pub async fn event_listener(&self) -> Result<BroadcastStream<NodeEvent>, NodeManagerError> {
        self.request(NodeManagerCommand::EventListener).await
    }

    /// Stops the node manager.
    pub fn shutdown(&self) -> Result<(), NodeManagerError> {
        self.send_command(NodeManagerCommand::Shutdown)
    }
}
