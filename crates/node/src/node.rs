use crate::ExitStatus;

use obscuro_db::{DatabaseError, HeaderStore};
use obscuro_l1::ManagementContract;
use obscuro_manager::{NodeManager, NodeManagerConfig, NodeManagerError, NodeManagerHandle};
use obscuro_network::{SyncConfig, SyncHandle, SyncService};
use obscuro_providers::{EnclaveClient, EnclaveEvent, L1Client};
use obscuro_sequencer::{Sequencer, SequencerConfig};
use obscuro_subscriptions::LogsRouter;
use obscuro_watcher::{L1Watcher, L1WatcherConfig, L1WatcherError};
use obscuro_wire::{InboundFrame, PeerTransport};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The typed configuration of the node components.
#[derive(Debug, Clone)]
pub struct ObscuroNodeConfig {
    /// The L1 ingestor configuration.
    pub watcher: L1WatcherConfig,
    /// The L1 contracts the ingestor listens to.
    pub contract: ManagementContract,
    /// The sequencer configuration, if the node runs one.
    pub sequencer: Option<SequencerConfig>,
    /// The sync service configuration.
    pub sync: SyncConfig,
    /// The node manager configuration.
    pub manager: NodeManagerConfig,
}

/// The external collaborators of a node.
#[derive(Debug)]
pub struct NodeComponents<C, E, T> {
    /// The L1 client.
    pub l1: Arc<C>,
    /// The enclave client.
    pub enclave: Arc<E>,
    /// The delivery channel of the enclave.
    pub enclave_events: mpsc::Receiver<EnclaveEvent>,
    /// The transport to the peers.
    pub transport: T,
    /// The frames received from the peers.
    pub inbound: mpsc::Receiver<InboundFrame>,
}

/// An error raised while launching the node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The store failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// The L1 ingestor failed to start.
    #[error(transparent)]
    Watcher(#[from] L1WatcherError),
}

/// A running node.
#[derive(Debug)]
pub struct ObscuroNode {
    /// The handle to the node manager.
    pub handle: NodeManagerHandle,
    /// The header store.
    pub store: HeaderStore,
    /// The handle to the sync service.
    pub sync: SyncHandle,
    /// The cancellation token stopping every component.
    pub cancellation: CancellationToken,
    manager: JoinHandle<Result<(), NodeManagerError>>,
    watcher: JoinHandle<Result<(), L1WatcherError>>,
}

impl ObscuroNode {
    /// Spawns every component of the node: the L1 ingestor, the sync service, the logs router,
    /// the sequencer if configured, and the node manager driving them.
    pub async fn launch<C, E, T>(
        config: ObscuroNodeConfig,
        store: HeaderStore,
        components: NodeComponents<C, E, T>,
        cancellation: CancellationToken,
    ) -> Result<Self, NodeError>
    where
        C: L1Client + 'static,
        E: EnclaveClient + 'static,
        T: PeerTransport + 'static,
    {
        let NodeComponents { l1, enclave, enclave_events, transport, inbound } = components;

        let (l1_notification_rx, watcher) = L1Watcher::spawn(
            l1.clone(),
            store.clone(),
            config.contract,
            config.watcher,
            cancellation.clone(),
        )
        .await?;

        let (sync, sync_event_rx, _) = SyncService::spawn(
            transport,
            store.clone(),
            config.sync,
            inbound,
            cancellation.clone(),
        );
        let (router, produced_batch_rx, _) =
            LogsRouter::spawn(enclave.clone(), enclave_events, cancellation.clone());

        let sequencer =
            config.sequencer.map(|config| Sequencer::new(l1.clone(), store.clone(), config));

        let (manager, handle) = NodeManager::new(
            store.clone(),
            l1,
            enclave,
            sequencer,
            sync.clone(),
            sync_event_rx,
            router,
            produced_batch_rx,
            l1_notification_rx,
            config.manager,
        );
        let manager = tokio::spawn(manager.run(cancellation.clone()));

        tracing::info!(target: "obscuro::node", "Node launched");
        Ok(Self { handle, store, sync, cancellation, manager, watcher })
    }

    /// Waits for the node to stop and returns the matching exit status.
    pub async fn wait(self) -> ExitStatus {
        let manager = self.manager.await;
        self.cancellation.cancel();
        let watcher = self.watcher.await;

        let status = match (manager, watcher) {
            (Ok(Ok(())), _) => ExitStatus::Clean,
            (Ok(Err(err)), _) if err.is_corruption() => ExitStatus::Corruption,
            (_, Ok(Err(err))) if err.is_corruption() => ExitStatus::Corruption,
            (_, Ok(Err(err))) if err.is_l1_failure() => ExitStatus::L1Disconnected,
            (manager, watcher) => {
                tracing::error!(target: "obscuro::node", ?manager, ?watcher, "Node stopped unexpectedly");
                ExitStatus::Fatal
            }
        };

        tracing::info!(target: "obscuro::node", ?status, "Node stopped");
        status
    }
}
