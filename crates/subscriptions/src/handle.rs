use crate::{SubscriptionError, SubscriptionState};

use alloy_primitives::Bytes;
use obscuro_primitives::{BlockInfo, L1Transaction};
use obscuro_providers::SubscriptionId;
use tokio::sync::{
    mpsc::{self, UnboundedSender},
    oneshot,
};

/// An active log subscription. The channel closes once the subscription terminates.
#[derive(Debug)]
pub struct Subscription {
    /// The handle of the subscription.
    pub id: SubscriptionId,
    /// The encrypted log events, in delivery order.
    pub logs: mpsc::Receiver<Bytes>,
}

/// A _sharable_ frontend used to communicate with the [`super::LogsRouter`].
#[derive(Debug, Clone)]
pub struct RouterHandle {
    to_router_tx: UnboundedSender<RouterCommand>,
}

impl RouterHandle {
    pub(crate) const fn new(to_router_tx: UnboundedSender<RouterCommand>) -> Self {
        Self { to_router_tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, SubscriptionError>>) -> RouterCommand,
    ) -> Result<T, SubscriptionError> {
        let (tx, rx) = oneshot::channel();
        self.to_router_tx.send(command(tx)).map_err(|_| SubscriptionError::RouterStopped)?;
        rx.await.map_err(|_| SubscriptionError::RouterStopped)?
    }

    /// Creates a subscription from the encrypted subscription payload.
    pub async fn subscribe(&self, payload: Bytes) -> Result<Subscription, SubscriptionError> {
        self.request(|reply| RouterCommand::Subscribe { payload, reply }).await
    }

    /// Terminates the subscription.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SubscriptionError> {
        self.request(|reply| RouterCommand::Unsubscribe { id, reply }).await
    }

    /// Returns the state of the subscription.
    pub async fn state(&self, id: SubscriptionId) -> Result<SubscriptionState, SubscriptionError> {
        self.request(|reply| RouterCommand::State { id, reply }).await
    }

    /// Forwards an L1 transaction to the enclave.
    pub fn forward_l1_transaction(
        &self,
        block: BlockInfo,
        tx: L1Transaction,
    ) -> Result<(), SubscriptionError> {
        self.to_router_tx
            .send(RouterCommand::ForwardL1Transaction { block, tx })
            .map_err(|_| SubscriptionError::RouterStopped)
    }
}

/// A command sent by the [`RouterHandle`] to the router.
#[derive(Debug)]
pub enum RouterCommand {
    /// Create a subscription.
    Subscribe { payload: Bytes, reply: oneshot::Sender<Result<Subscription, SubscriptionError>> },
    /// Terminate a subscription.
    Unsubscribe { id: SubscriptionId, reply: oneshot::Sender<Result<(), SubscriptionError>> },
    /// Query the state of a subscription.
    State {
        id: SubscriptionId,
        reply: oneshot::Sender<Result<SubscriptionState, SubscriptionError>>,
    },
    /// Forward an L1 transaction to the enclave.
    ForwardL1Transaction { block: BlockInfo, tx: L1Transaction },
}
