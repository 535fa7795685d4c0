//! The node manager: the event loop driving the components of the host.

use crate::{HealthConfig, HealthOracle, NodeManagerError};

use alloy_primitives::B256;
use futures::StreamExt;
use obscuro_db::{HeadUpdate, HeaderStore};
use obscuro_derivation_pipeline::{DerivationEvent, RollupValidator};
use obscuro_network::{SyncEvent, SyncHandle};
use obscuro_primitives::{BlockInfo, ExtBatch};
use obscuro_providers::{EnclaveClient, L1Client};
use obscuro_sequencer::{RollupSubmission, Sequencer, SequencerError};
use obscuro_subscriptions::RouterHandle;
use obscuro_watcher::L1Notification;
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{broadcast, mpsc},
    time::{Interval, MissedTickBehavior},
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

mod command;
pub use command::{NodeManagerCommand, Reply};

mod event;
pub use event::NodeEvent;

mod handle;
pub use handle::NodeManagerHandle;

mod metrics;
use metrics::NodeManagerMetrics;

/// The capacity of the node event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The configuration of the [`NodeManager`].
#[derive(Debug, Clone, Copy)]
pub struct NodeManagerConfig {
    /// The health thresholds.
    pub health: HealthConfig,
    /// The period at which missing batches are requested again while rollups are quarantined.
    pub catch_up_interval: Duration,
}

impl Default for NodeManagerConfig {
    fn default() -> Self {
        Self { health: HealthConfig::default(), catch_up_interval: Duration::from_secs(5) }
    }
}

/// The node manager drives the host: it routes L1 notifications to rollup derivation and the
/// enclave, feeds the batches produced by the enclave to the sequencer and peers, triggers
/// catch-up cycles and answers the commands of its handles.
pub struct NodeManager<C, E> {
    /// The header store.
    store: HeaderStore,
    /// The L1 client.
    l1: Arc<C>,
    /// The enclave client.
    enclave: Arc<E>,
    /// The rollup validator.
    validator: RollupValidator,
    /// The sequencer, if the node runs one.
    sequencer: Option<Sequencer<C>>,
    /// The handle to the sync service.
    sync: SyncHandle,
    /// The handle to the logs router.
    router: RouterHandle,
    /// The health oracle.
    health: HealthOracle,
    /// The latest processed L1 block not yet persisted, held back while rollups are quarantined.
    pending_l1_processed: Option<BlockInfo>,
    /// The receiver of the commands sent by the handles.
    handle_rx: mpsc::UnboundedReceiver<NodeManagerCommand>,
    /// The receiver of the L1 notifications.
    l1_notification_rx: mpsc::Receiver<Arc<L1Notification>>,
    /// The receiver of the sync service events.
    sync_event_rx: mpsc::UnboundedReceiver<SyncEvent>,
    /// The receiver of the batches produced by the enclave.
    produced_batch_rx: mpsc::Receiver<ExtBatch>,
    /// The sender of the node events.
    event_sender: broadcast::Sender<NodeEvent>,
    /// The catch-up trigger.
    catch_up_interval: Interval,
    /// The metrics of the manager.
    metrics: NodeManagerMetrics,
}

impl<C, E> Debug for NodeManager<C, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeManager")
            .field("store", &self.store)
            .field("validator", &self.validator)
            .field("sequencer", &self.sequencer.as_ref().map(|_| "Sequencer"))
            .field("sync", &self.sync)
            .field("router", &self.router)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl<C, E> NodeManager<C, E>
where
    C: L1Client + 'static,
    E: EnclaveClient + 'static,
{
    /// Create a new [`NodeManager`] along with its handle. Must be called within a tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: HeaderStore,
        l1: Arc<C>,
        enclave: Arc<E>,
        sequencer: Option<Sequencer<C>>,
        sync: SyncHandle,
        sync_event_rx: mpsc::UnboundedReceiver<SyncEvent>,
        router: RouterHandle,
        produced_batch_rx: mpsc::Receiver<ExtBatch>,
        l1_notification_rx: mpsc::Receiver<Arc<L1Notification>>,
        config: NodeManagerConfig,
    ) -> (Self, NodeManagerHandle) {
        let (handle_tx, handle_rx) = mpsc::unbounded_channel();
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let catch_up_interval = delayed_interval(config.catch_up_interval);

        let manager = Self {
            validator: RollupValidator::new(store.clone()),
            store,
            l1,
            enclave,
            sequencer,
            sync,
            router,
            health: HealthOracle::new(config.health, Instant::now()),
            pending_l1_processed: None,
            handle_rx,
            l1_notification_rx,
            sync_event_rx,
            produced_batch_rx,
            event_sender,
            catch_up_interval,
            metrics: NodeManagerMetrics::default(),
        };
        (manager, NodeManagerHandle::new(handle_tx))
    }

    /// Runs the manager until cancelled, shut down by a handle, or until a fatal error occurs.
    /// Errors revealing a corrupted store are fatal, the other ones are logged.
    pub async fn run(mut self, cancellation: CancellationToken) -> Result<(), NodeManagerError> {
        tracing::info!(target: "obscuro::manager", sequencer = self.sequencer.is_some(), "Starting node manager");

        loop {
            let res = tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,
                command = self.handle_rx.recv() => match command {
                    Some(NodeManagerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                notification = self.l1_notification_rx.recv() => match notification {
                    Some(notification) => self.handle_l1_notification(&notification).await,
                    None => return Err(NodeManagerError::L1NotificationsClosed),
                },
                Some(event) = self.sync_event_rx.recv() => self.handle_sync_event(event).await,
                Some(batch) = self.produced_batch_rx.recv() => {
                    self.handle_produced_batch(batch).await.map(|_| ())
                }
                Some(outcome) = next_submission(self.sequencer.as_mut()) => {
                    self.handle_submission(outcome);
                    Ok(())
                }
                _ = self.catch_up_interval.tick() => {
                    self.handle_catch_up_tick().await
                }
            };

            if let Err(err) = res {
                if err.is_corruption() {
                    tracing::error!(target: "obscuro::manager", %err, "Store corruption detected, stopping");
                    return Err(err)
                }
                tracing::warn!(target: "obscuro::manager", %err, kind = ?err.kind(), "Failed to handle event");
            }
        }

        tracing::info!(target: "obscuro::manager", "Node manager stopped");
        Ok(())
    }

    async fn handle_command(&mut self, command: NodeManagerCommand) -> Result<(), NodeManagerError> {
        self.metrics.commands.increment(1);

        match command {
            NodeManagerCommand::BatchHead(reply) => {
                let _ = reply.send(self.store.get_head_batch_header().await.map_err(Into::into));
            }
            NodeManagerCommand::RollupHead(reply) => {
                let head = match self.store.get_head_rollup_header().await {
                    Ok(head) => head.ok_or(NodeManagerError::NotReady),
                    Err(err) => Err(err.into()),
                };
                let _ = reply.send(head);
            }
            NodeManagerCommand::L1Head(reply) => {
                let l1 = self.l1.clone();
                tokio::spawn(async move {
                    let _ = reply.send(l1.head_block().await.map_err(Into::into));
                });
            }
            NodeManagerCommand::Health(reply) => {
                let status = match self.store.get_head_rollup_hash().await {
                    Ok(head) => Ok(self.health.check(
                        Instant::now(),
                        head.is_some(),
                        self.sync.longest_unreachable(),
                    )),
                    Err(err) => Err(err.into()),
                };
                let _ = reply.send(status);
            }
            NodeManagerCommand::SubmitBatch(batch, reply) => {
                let _ = reply.send(self.handle_produced_batch(batch).await);
            }
            NodeManagerCommand::SendRawTransaction(ciphertext, reply) => {
                let enclave = self.enclave.clone();
                tokio::spawn(async move {
                    let _ = reply.send(enclave.submit_transaction(ciphertext).await.map_err(Into::into));
                });
            }
            NodeManagerCommand::SubscribeLogs(payload, reply) => {
                let router = self.router.clone();
                tokio::spawn(async move {
                    let _ = reply.send(router.subscribe(payload).await.map_err(Into::into));
                });
            }
            NodeManagerCommand::UnsubscribeLogs(id, reply) => {
                let router = self.router.clone();
                tokio::spawn(async move {
                    let _ = reply.send(router.unsubscribe(id).await.map_err(Into::into));
                });
            }
            NodeManagerCommand::EventListener(reply) => {
                let _ = reply.send(Ok(BroadcastStream::new(self.event_sender.subscribe())));
            }
            NodeManagerCommand::Shutdown => {}
        }

        Ok(())
    }

    async fn handle_l1_notification(
        &mut self,
        notification: &L1Notification,
    ) -> Result<(), NodeManagerError> {
        self.metrics.l1_notifications.increment(1);
        tracing::trace!(target: "obscuro::manager", %notification, "Handling L1 notification");

        match notification {
            L1Notification::RollupPublished { block, tx } => {
                let events = self.validator.handle_rollup_publication(*block, tx).await?;
                self.handle_derivation_events(events);
            }
            L1Notification::EnclaveTransaction { block, tx, kind } => {
                tracing::debug!(target: "obscuro::manager", %block, %kind, hash = %tx.hash, "Forwarding L1 transaction to the enclave");
                self.router.forward_l1_transaction(*block, tx.clone())?;
            }
            L1Notification::NewHead(block) => {
                self.health.on_l1_head(block.number);
                if let Some(sequencer) = self.sequencer.as_mut() {
                    sequencer.handle_new_l1_block(*block);
                }
            }
            L1Notification::Processed(block) => {
                self.health.on_l1_processed(block.number);
                self.pending_l1_processed = Some(*block);
                self.persist_l1_progress().await?;
            }
            L1Notification::Synced => {
                tracing::info!(target: "obscuro::manager", "L1 ingestor synced");
                self.notify(NodeEvent::L1Synced);
            }
        }

        Ok(())
    }

    fn handle_derivation_events(&mut self, events: Vec<DerivationEvent>) {
        for event in events {
            match event {
                DerivationEvent::RollupAccepted { hash, number, batch_head } => {
                    if batch_head.is_advanced() {
                        self.health.on_batch_head_advanced(Instant::now());
                    }
                    self.notify(NodeEvent::RollupAccepted { hash, number });
                }
                DerivationEvent::RollupQuarantined { hash, first_batch } => {
                    self.notify(NodeEvent::RollupQuarantined { hash, first_batch });
                }
                DerivationEvent::CatchUpRequired { head } => self.trigger_catch_up(head),
                DerivationEvent::RollupDropped { block } => {
                    tracing::debug!(target: "obscuro::manager", %block, "Rollup publication dropped");
                }
            }
        }
    }

    async fn handle_sync_event(&mut self, event: SyncEvent) -> Result<(), NodeManagerError> {
        match event {
            SyncEvent::BatchesImported { peer, applied, head_advanced } => {
                if head_advanced {
                    self.health.on_batch_head_advanced(Instant::now());
                }
                self.notify(NodeEvent::BatchesImported { peer, applied });
                if self.validator.quarantined() > 0 {
                    let events = self.validator.replay_quarantined().await?;
                    self.handle_derivation_events(events);
                    self.persist_l1_progress().await?;
                }
            }
            SyncEvent::BatchRefused { peer, reason } => {
                tracing::warn!(target: "obscuro::manager", %peer, %reason, "Peer sent inconsistent batches");
                let head = self.store.get_head_batch_hash().await?;
                self.trigger_catch_up(head);
            }
            SyncEvent::NoCommonAncestor { peer, head } => {
                tracing::warn!(target: "obscuro::manager", %peer, %head, "No common ancestor with peer");
            }
            SyncEvent::RequestFailed(peer) => {
                tracing::debug!(target: "obscuro::manager", %peer, "Batch request failed");
            }
            SyncEvent::PeerBlacklisted(peer) => {
                tracing::warn!(target: "obscuro::manager", %peer, "Peer blacklisted");
            }
        }
        Ok(())
    }

    /// Persists the pending processed L1 block once no rollup read up to it is quarantined, so that
    /// a restart reads again every block whose rollups are not stored yet.
    async fn persist_l1_progress(&mut self) -> Result<(), NodeManagerError> {
        if self.validator.quarantined() > 0 {
            return Ok(())
        }
        if let Some(block) = self.pending_l1_processed {
            self.store.set_l1_processed(block).await?;
            self.pending_l1_processed = None;
        }
        Ok(())
    }

    /// Stores the batch through the sequencer and announces it to the peers.
    async fn handle_produced_batch(
        &mut self,
        batch: ExtBatch,
    ) -> Result<HeadUpdate, NodeManagerError> {
        let Some(sequencer) = self.sequencer.as_mut() else {
            tracing::warn!(target: "obscuro::manager", hash = %batch.hash(), "Dropping produced batch, node is not a sequencer");
            return Err(NodeManagerError::NotSequencer)
        };
        self.metrics.batches_produced.increment(1);

        let (hash, number) = (batch.hash(), batch.number());
        let update = sequencer.handle_batch(batch.clone()).await?;
        if update.is_advanced() {
            self.health.on_batch_head_advanced(Instant::now());
        }
        self.sync.announce_batch(batch)?;
        self.notify(NodeEvent::BatchProduced { hash, number });

        Ok(update)
    }

    fn handle_submission(&self, outcome: Result<RollupSubmission, SequencerError>) {
        match outcome {
            Ok(submission) => self.notify(NodeEvent::RollupSubmitted(submission)),
            Err(err) => {
                tracing::warn!(target: "obscuro::manager", %err, "Rollup submission failed");
            }
        }
    }

    async fn handle_catch_up_tick(&mut self) -> Result<(), NodeManagerError> {
        if self.validator.quarantined() == 0 {
            return Ok(())
        }
        let head = self.store.get_head_batch_hash().await?;
        self.trigger_catch_up(head);
        Ok(())
    }

    /// Requests the batches following `head` from the best available peer. The request waits for
    /// a free slot of the peer's window outside of the event loop.
    fn trigger_catch_up(&self, head: Option<B256>) {
        self.metrics.catch_ups.increment(1);
        let sync = self.sync.clone();
        tokio::spawn(async move {
            match sync.catch_up(head).await {
                Ok(peer) => {
                    tracing::debug!(target: "obscuro::manager", %peer, ?head, "Requested missing batches");
                }
                Err(err) => {
                    tracing::warn!(target: "obscuro::manager", %err, ?head, "Failed to request missing batches");
                }
            }
        });
    }

    fn notify(&self, event: NodeEvent) {
        // no listener is not an error.
        let _ = self.event_sender.send(event);
    }
}

/// Polls the sequencer for its next rollup submission, pending forever without a sequencer.
async fn next_submission<C: L1Client + 'static>(
    sequencer: Option<&mut Sequencer<C>>,
) -> Option<Result<RollupSubmission, SequencerError>> {
    match sequencer {
        Some(sequencer) => sequencer.next().await,
        None => std::future::pending().await,
    }
}

/// Creates a delayed interval that will not skip ticks if the interval is missed but will delay
/// the next tick until the interval has passed.
fn delayed_interval(interval: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use obscuro_db::{test_utils::setup_test_store, RetryConfig};
    use obscuro_l1::L1RollupTx;
    use obscuro_network::{SyncConfig, SyncService};
    use obscuro_primitives::{test_utils::batch_chain, ExtRollup};
    use obscuro_providers::{
        test_utils::{MockEnclaveClient, MockL1Client},
        EnclaveEvent,
    };
    use obscuro_sequencer::SequencerConfig;
    use obscuro_subscriptions::LogsRouter;
    use obscuro_wire::{test_utils::MockNetwork, InboundFrame, PeerId, WireMessage};
    use tokio::task::JoinHandle;

    const REMOTE: &str = "remote";

    struct TestNode {
        handle: NodeManagerHandle,
        l1_tx: mpsc::Sender<Arc<L1Notification>>,
        l1: Arc<MockL1Client>,
        enclave: Arc<MockEnclaveClient>,
        network: MockNetwork,
        store: HeaderStore,
        events: BroadcastStream<NodeEvent>,
        task: JoinHandle<Result<(), NodeManagerError>>,
        _remote: mpsc::Receiver<InboundFrame>,
    }

    impl TestNode {
        async fn next_event(&mut self) -> eyre::Result<NodeEvent> {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.next())
                .await?
                .ok_or_else(|| eyre::eyre!("event stream closed"))??;
            Ok(event)
        }

        async fn notify(&self, notification: L1Notification) -> eyre::Result<()> {
            self.l1_tx.send(Arc::new(notification)).await?;
            Ok(())
        }
    }

    async fn setup(sequencer: bool) -> eyre::Result<TestNode> {
        let store = setup_test_store().await;
        let l1 = Arc::new(MockL1Client::new());
        let (enclave, enclave_events) = MockEnclaveClient::new();
        let enclave = Arc::new(enclave);
        let cancellation = CancellationToken::new();

        let network = MockNetwork::new();
        let (transport, inbound) = network.join("local");
        let (_, remote) = network.join(REMOTE);
        let config = SyncConfig { peers: vec![PeerId::from(REMOTE)], ..Default::default() };
        let (sync, sync_events, _) =
            SyncService::spawn(transport, store.clone(), config, inbound, cancellation.clone());
        let (router, produced, _) =
            LogsRouter::spawn(enclave.clone(), enclave_events, cancellation.clone());

        let sequencer = sequencer.then(|| {
            let config = SequencerConfig {
                management_contract: Address::repeat_byte(0x42),
                max_batches: 2,
                rollup_interval: None,
                retry: RetryConfig::default(),
            };
            Sequencer::new(l1.clone(), store.clone(), config)
        });

        let (l1_tx, l1_rx) = mpsc::channel(16);
        let (manager, handle) = NodeManager::new(
            store.clone(),
            l1.clone(),
            enclave.clone(),
            sequencer,
            sync,
            sync_events,
            router,
            produced,
            l1_rx,
            NodeManagerConfig::default(),
        );
        let task = tokio::spawn(manager.run(cancellation));
        let events = handle.event_listener().await?;

        Ok(TestNode { handle, l1_tx, l1, enclave, network, store, events, task, _remote: remote })
    }

    fn block(number: u64) -> BlockInfo {
        BlockInfo { number, hash: B256::repeat_byte(number as u8) }
    }

    fn publication(batches: &[ExtBatch]) -> L1RollupTx {
        let rollup = ExtRollup::from_batches(batches.to_vec(), B256::ZERO).expect("non empty");
        L1RollupTx::new(&rollup)
    }

    #[tokio::test]
    async fn test_validator_accepts_published_rollup() -> eyre::Result<()> {
        let mut node = setup(false).await?;
        assert!(matches!(node.handle.rollup_head().await, Err(NodeManagerError::NotReady)));
        assert!(!node.handle.health().await?.overall_health);

        let chain = batch_chain(3);
        node.notify(L1Notification::NewHead(block(1))).await?;
        node.notify(L1Notification::Processed(block(1))).await?;
        node.notify(L1Notification::RollupPublished { block: block(1), tx: publication(&chain) })
            .await?;

        let event = node.next_event().await?;
        assert!(matches!(event, NodeEvent::RollupAccepted { number: 2, .. }));

        assert_eq!(node.handle.rollup_head().await?.number, 2);
        assert_eq!(node.handle.batch_head().await?.map(|h| h.hash_slow()), Some(chain[2].hash()));
        let health = node.handle.health().await?;
        assert!(health.overall_health, "{health:?}");

        node.handle.shutdown()?;
        node.task.await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_quarantined_rollup_requests_missing_batches() -> eyre::Result<()> {
        let mut node = setup(false).await?;
        let chain = batch_chain(8);

        node.notify(L1Notification::RollupPublished { block: block(1), tx: publication(&chain[..1]) })
            .await?;
        node.notify(L1Notification::RollupPublished { block: block(2), tx: publication(&chain[5..]) })
            .await?;

        assert!(matches!(node.next_event().await?, NodeEvent::RollupAccepted { number: 0, .. }));
        assert!(matches!(
            node.next_event().await?,
            NodeEvent::RollupQuarantined { first_batch: 5, .. }
        ));

        let request = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let sent = node.network.sent();
                if let Some((_, to, WireMessage::BatchRequest(request))) = sent.into_iter().next() {
                    return (to, request)
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        assert_eq!(request.0, PeerId::from(REMOTE));
        assert_eq!(request.1.current_head, Some(chain[0].hash()));
        assert_eq!(node.store.get_head_batch_hash().await?, Some(chain[0].hash()));

        Ok(())
    }

    #[tokio::test]
    async fn test_l1_progress_is_persisted_after_rollups_are_stored() -> eyre::Result<()> {
        let mut node = setup(false).await?;
        let chain = batch_chain(8);

        node.notify(L1Notification::RollupPublished { block: block(1), tx: publication(&chain[..1]) })
            .await?;
        node.notify(L1Notification::Processed(block(1))).await?;
        assert!(matches!(node.next_event().await?, NodeEvent::RollupAccepted { number: 0, .. }));

        tokio::time::timeout(Duration::from_secs(5), async {
            while node.store.get_l1_processed().await? != Some(block(1)) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok::<_, eyre::Report>(())
        })
        .await??;
        assert!(node.store.get_head_rollup_hash().await?.is_some());

        // a quarantined rollup holds the progress back.
        node.notify(L1Notification::RollupPublished { block: block(2), tx: publication(&chain[5..]) })
            .await?;
        node.notify(L1Notification::Processed(block(2))).await?;
        node.notify(L1Notification::Synced).await?;
        loop {
            match node.next_event().await? {
                NodeEvent::L1Synced => break,
                NodeEvent::RollupQuarantined { first_batch, .. } => assert_eq!(first_batch, 5),
                _ => {}
            }
        }
        assert_eq!(node.store.get_l1_processed().await?, Some(block(1)));

        Ok(())
    }

    #[tokio::test]
    async fn test_sequencer_stores_announces_and_publishes_batches() -> eyre::Result<()> {
        let mut node = setup(true).await?;
        let chain = batch_chain(2);

        for batch in &chain {
            node.enclave.emit(EnclaveEvent::Batch(batch.clone())).await;
        }

        let mut produced = Vec::new();
        let submission = loop {
            match node.next_event().await? {
                NodeEvent::BatchProduced { number, .. } => produced.push(number),
                NodeEvent::RollupSubmitted(submission) => break submission,
                _ => {}
            }
        };
        assert_eq!(produced, vec![0, 1]);
        assert_eq!(submission.batch_count, 2);
        assert_eq!(node.l1.sent_transactions().len(), 1);
        assert_eq!(node.store.get_head_batch_hash().await?, Some(chain[1].hash()));

        let announced = node
            .network
            .sent()
            .into_iter()
            .filter(|(_, _, message)| matches!(message, WireMessage::NewBatch(_)))
            .count();
        assert_eq!(announced, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_validator_refuses_batch_submission() -> eyre::Result<()> {
        let node = setup(false).await?;
        let err = node.handle.submit_batch(batch_chain(1).remove(0)).await.unwrap_err();
        assert!(matches!(err, NodeManagerError::NotSequencer));
        Ok(())
    }
}
