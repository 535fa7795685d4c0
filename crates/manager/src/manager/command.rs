use super::NodeEvent;
use crate::{HealthStatus, NodeManagerError};

use alloy_primitives::{Bytes, B256};
use obscuro_db::HeadUpdate;
use obscuro_primitives::{BatchHeader, ExtBatch, L1BlockHeader, RollupHeader};
use obscuro_providers::SubscriptionId;
use obscuro_subscriptions::Subscription;
use tokio::sync::oneshot;
use tokio_stream::wrappers::BroadcastStream;

/// The reply channel of a [`NodeManagerCommand`].
pub type Reply<T> = oneshot::Sender<Result<T, NodeManagerError>>;

/// The commands that can be sent to the node manager.
#[derive(Debug)]
pub enum NodeManagerCommand {
    /// Returns the head batch header, if any.
    BatchHead(Reply<Option<BatchHeader>>),
    /// Returns the head rollup header.
    RollupHead(Reply<RollupHeader>),
    /// Returns the current L1 head.
    L1Head(Reply<L1BlockHeader>),
    /// Returns the health of the node.
    Health(Reply<HealthStatus>),
    /// Stores and announces a batch produced by the enclave.
    SubmitBatch(ExtBatch, Reply<HeadUpdate>),
    /// Submits an encrypted transaction to the enclave.
    SendRawTransaction(Bytes, Reply<B256>),
    /// Creates a log subscription.
    SubscribeLogs(Bytes, Reply<Subscription>),
    /// Terminates a log subscription.
    UnsubscribeLogs(SubscriptionId, Reply<()>),
    /// Returns a stream of the node events.
    EventListener(Reply<BroadcastStream<NodeEvent>>),
    /// Stops the node manager.
    Shutdown,
}
