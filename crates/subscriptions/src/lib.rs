//! The subscription and logs router.
//!
//! The [`LogsRouter`] owns the enclave delivery channel. It registers log subscriptions with the
//! enclave, fans the encrypted log events out to the subscribers and passes the batches produced
//! by the enclave through to the node. Once a subscription is closed, by its subscriber or by the
//! enclave, no further event is delivered for it.

mod error;
pub use error::SubscriptionError;

mod handle;
pub use handle::{RouterCommand, RouterHandle, Subscription};

mod metrics;
pub use metrics::RouterMetrics;

mod state;
pub use state::{SubscriptionState, SubscriptionStateError};

use alloy_primitives::{hex, Bytes};
use obscuro_primitives::{BlockInfo, ExtBatch, L1Transaction};
use obscuro_providers::{EnclaveClient, EnclaveEvent, SubscriptionId};
use std::collections::{HashMap, VecDeque};
use tokio::{
    sync::mpsc::{self, error::TrySendError, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// The capacity of the log channel of a subscription.
pub const LOGS_CHANNEL_CAPACITY: usize = 256;

/// The capacity of the channel of the batches produced by the enclave.
pub const BATCH_CHANNEL_CAPACITY: usize = 1024;

/// The amount of closed subscriptions remembered to refuse their reuse.
pub const MAX_CLOSED_SUBSCRIPTIONS: usize = 1024;

#[derive(Debug)]
struct Entry {
    state: SubscriptionState,
    logs: Option<mpsc::Sender<Bytes>>,
    /// Events dropped since the subscriber last had room.
    lagged: u64,
}

/// Routes the enclave events to the subscribers.
pub struct LogsRouter<E> {
    /// The enclave.
    enclave: E,
    /// The subscriptions, by handle. Closed subscriptions are kept until pruned.
    subscriptions: HashMap<SubscriptionId, Entry>,
    /// The closed subscriptions, oldest first.
    closed: VecDeque<SubscriptionId>,
    /// The sender half of the channel between the handles and the router.
    to_router_tx: UnboundedSender<RouterCommand>,
    /// The receiver half of the channel between the handles and the router.
    from_handle_rx: UnboundedReceiver<RouterCommand>,
    /// The enclave delivery channel.
    enclave_events: mpsc::Receiver<EnclaveEvent>,
    /// The batches produced by the enclave.
    batches: mpsc::Sender<ExtBatch>,
    /// The metrics of the router.
    metrics: RouterMetrics,
}

impl<E> LogsRouter<E>
where
    E: EnclaveClient + 'static,
{
    /// Returns a new router consuming the enclave delivery channel, along with the receiver of
    /// the batches produced by the enclave.
    pub fn new(
        enclave: E,
        enclave_events: mpsc::Receiver<EnclaveEvent>,
    ) -> (Self, mpsc::Receiver<ExtBatch>) {
        let (to_router_tx, from_handle_rx) = mpsc::unbounded_channel();
        let (batches, batches_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let router = Self {
            enclave,
            subscriptions: HashMap::new(),
            closed: VecDeque::new(),
            to_router_tx,
            from_handle_rx,
            enclave_events,
            batches,
            metrics: RouterMetrics::default(),
        };
        (router, batches_rx)
    }

    /// Spawns the router, returning a handle to it, the receiver of the produced batches and the
    /// handle of the task.
    pub fn spawn(
        enclave: E,
        enclave_events: mpsc::Receiver<EnclaveEvent>,
        cancellation: CancellationToken,
    ) -> (RouterHandle, mpsc::Receiver<ExtBatch>, JoinHandle<()>) {
        let (router, batches) = Self::new(enclave, enclave_events);
        let handle = router.handle();
        (handle, batches, tokio::spawn(router.run(cancellation)))
    }

    /// Returns a new [`RouterHandle`].
    pub fn handle(&self) -> RouterHandle {
        RouterHandle::new(self.to_router_tx.clone())
    }

    /// Runs the router until cancelled or until the enclave delivery channel closes. Every open
    /// subscription is closed on exit.
    pub async fn run(mut self, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                Some(command) = self.from_handle_rx.recv() => self.on_command(command).await,
                event = self.enclave_events.recv() => match event {
                    Some(event) => self.on_enclave_event(event).await,
                    None => {
                        tracing::warn!(target: "obscuro::subscriptions", "Enclave delivery channel closed");
                        break
                    }
                },
            }
        }

        let open = self
            .subscriptions
            .iter()
            .filter(|(_, entry)| entry.state.is_open())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        for id in open {
            let _ = self.transition(&id, SubscriptionState::Closed);
        }
        tracing::info!(target: "obscuro::subscriptions", "Logs router stopped");
    }

    async fn on_command(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Subscribe { payload, reply } => {
                let _ = reply.send(self.subscribe(payload).await);
            }
            RouterCommand::Unsubscribe { id, reply } => {
                let _ = reply.send(self.unsubscribe(id).await);
            }
            RouterCommand::State { id, reply } => {
                let state = self
                    .subscriptions
                    .get(&id)
                    .map(|entry| entry.state)
                    .ok_or(SubscriptionError::UnknownSubscription(id));
                let _ = reply.send(state);
            }
            RouterCommand::ForwardL1Transaction { block, tx } => {
                self.forward_l1_transaction(block, tx).await
            }
        }
    }

    async fn subscribe(&mut self, payload: Bytes) -> Result<Subscription, SubscriptionError> {
        let id = SubscriptionId::new(hex::encode_prefixed(rand::random::<[u8; 16]>()));
        let (tx, logs) = mpsc::channel(LOGS_CHANNEL_CAPACITY);
        self.subscriptions
            .insert(id.clone(), Entry { state: SubscriptionState::Pending, logs: Some(tx), lagged: 0 });

        if let Err(err) = self.enclave.subscribe(id.clone(), payload).await {
            tracing::warn!(target: "obscuro::subscriptions", %id, %err, "Enclave refused subscription");
            self.transition(&id, SubscriptionState::Closed)?;
            return Err(err.into())
        }
        self.transition(&id, SubscriptionState::Active)?;

        self.metrics.subscriptions_created.increment(1);
        tracing::debug!(target: "obscuro::subscriptions", %id, "Subscription active");
        Ok(Subscription { id, logs })
    }

    async fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), SubscriptionError> {
        self.transition(&id, SubscriptionState::Closed)?;
        if let Err(err) = self.enclave.unsubscribe(id.clone()).await {
            tracing::warn!(target: "obscuro::subscriptions", %id, %err, "Failed to unsubscribe from enclave");
        }
        tracing::debug!(target: "obscuro::subscriptions", %id, "Subscription closed");
        Ok(())
    }

    async fn on_enclave_event(&mut self, event: EnclaveEvent) {
        match event {
            EnclaveEvent::Logs { subscription, payload } => {
                self.deliver(subscription, payload).await
            }
            EnclaveEvent::Revoked { subscription } => {
                match self.transition(&subscription, SubscriptionState::Closed) {
                    Ok(()) => {
                        self.metrics.subscriptions_revoked.increment(1);
                        tracing::info!(target: "obscuro::subscriptions", id = %subscription, "Enclave revoked subscription");
                    }
                    Err(err) => {
                        tracing::debug!(target: "obscuro::subscriptions", id = %subscription, %err, "Ignoring revocation");
                    }
                }
            }
            EnclaveEvent::Batch(batch) => {
                tracing::trace!(target: "obscuro::subscriptions", number = batch.number(), "Passing produced batch through");
                if self.batches.send(batch).await.is_err() {
                    tracing::debug!(target: "obscuro::subscriptions", "Batch receiver dropped");
                }
            }
        }
    }

    async fn deliver(&mut self, id: SubscriptionId, payload: Bytes) {
        let Some(entry) =
            self.subscriptions.get_mut(&id).filter(|entry| entry.state == SubscriptionState::Active)
        else {
            tracing::trace!(target: "obscuro::subscriptions", %id, "Dropping logs of inactive subscription");
            self.metrics.events_dropped.increment(1);
            return
        };
        let Some(logs) = entry.logs.as_ref() else {
            self.metrics.events_dropped.increment(1);
            return
        };

        match logs.try_send(payload) {
            Ok(()) => {
                if entry.lagged > 0 {
                    tracing::info!(target: "obscuro::subscriptions", %id, dropped = entry.lagged, "Subscriber caught up");
                    entry.lagged = 0;
                }
                self.metrics.events_delivered.increment(1);
            }
            Err(TrySendError::Full(_)) => {
                entry.lagged += 1;
                tracing::warn!(target: "obscuro::subscriptions", %id, dropped = entry.lagged, capacity = LOGS_CHANNEL_CAPACITY, "Subscriber lagging, dropping logs");
                self.metrics.events_dropped.increment(1);
                self.metrics.events_lagged.increment(1);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(target: "obscuro::subscriptions", %id, "Subscriber gone");
                self.metrics.events_dropped.increment(1);
                let _ = self.unsubscribe(id).await;
            }
        }
    }

    async fn forward_l1_transaction(&mut self, block: BlockInfo, tx: L1Transaction) {
        let hash = tx.hash;
        match self.enclave.submit_l1_transaction(block, tx).await {
            Ok(()) => {
                self.metrics.l1_transactions_forwarded.increment(1);
                tracing::debug!(target: "obscuro::subscriptions", %block, %hash, "Forwarded L1 transaction to enclave");
            }
            Err(err) => {
                tracing::error!(target: "obscuro::subscriptions", %block, %hash, %err, "Failed to forward L1 transaction");
            }
        }
    }

    /// Moves the subscription to the provided state. Closing drops the log sender, which ends the
    /// subscriber's stream.
    fn transition(
        &mut self,
        id: &SubscriptionId,
        to: SubscriptionState,
    ) -> Result<(), SubscriptionError> {
        let entry = self
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| SubscriptionError::UnknownSubscription(id.clone()))?;
        entry.state = entry.state.transition(to)?;

        if to == SubscriptionState::Closed {
            entry.logs = None;
            self.closed.push_back(id.clone());
            while self.closed.len() > MAX_CLOSED_SUBSCRIPTIONS {
                if let Some(id) = self.closed.pop_front() {
                    self.subscriptions.remove(&id);
                }
            }
        }
        self.metrics.open_subscriptions.set((self.subscriptions.len() - self.closed.len()) as f64);
        Ok(())
    }
}

impl<E> std::fmt::Debug for LogsRouter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogsRouter")
            .field("enclave", &"EnclaveClient")
            .field("subscriptions", &self.subscriptions)
            .field("closed", &self.closed.len())
            .finish()
    }
}
