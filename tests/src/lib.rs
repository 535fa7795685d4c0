//! Fixtures for the end-to-end scenarios: full nodes wired to an in-memory L1, enclave and peer
//! network.

use alloy_primitives::{Address, B256};
use obscuro_db::{HeaderStore, RetryConfig};
use obscuro_l1::{L1RollupTx, ManagementContract};
use obscuro_manager::NodeManagerConfig;
use obscuro_network::SyncConfig;
use obscuro_node::{NodeComponents, ObscuroNode, ObscuroNodeConfig};
use obscuro_primitives::{ExtBatch, ExtRollup, L1BlockHeader, L1Transaction};
use obscuro_providers::test_utils::{MockEnclaveClient, MockL1Client};
use obscuro_watcher::L1WatcherConfig;
use obscuro_wire::{test_utils::MockNetwork, PeerId};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// The address of the management contract on the mock L1.
pub const MANAGEMENT_CONTRACT: Address = Address::repeat_byte(0x42);

/// The time a scenario waits for the nodes to converge.
pub const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns a node configuration tuned for fast convergence.
pub fn node_config(local: &str, peers: &[&str]) -> ObscuroNodeConfig {
    let retry = RetryConfig { max_retries: Some(3), initial_delay_ms: 5, ..Default::default() };
    ObscuroNodeConfig {
        watcher: L1WatcherConfig {
            poll_interval: Duration::from_millis(10),
            retry,
            ..Default::default()
        },
        contract: ManagementContract::new(MANAGEMENT_CONTRACT, []),
        sequencer: None,
        sync: SyncConfig {
            local: PeerId::new(local),
            peers: peers.iter().map(|peer| PeerId::new(*peer)).collect(),
            request_timeout: Duration::from_secs(1),
            ..Default::default()
        },
        manager: NodeManagerConfig {
            catch_up_interval: Duration::from_millis(50),
            ..Default::default()
        },
    }
}

/// Launches a validator node named `id` on the network, reading the L1 through `l1`.
pub async fn spawn_node(
    network: &MockNetwork,
    id: &str,
    l1: &MockL1Client,
    store: HeaderStore,
    peers: &[&str],
) -> eyre::Result<ObscuroNode> {
    let (enclave, enclave_events) = MockEnclaveClient::new();
    let (transport, inbound) = network.join(id);
    let components = NodeComponents {
        l1: Arc::new(l1.clone()),
        enclave: Arc::new(enclave),
        enclave_events,
        transport,
        inbound,
    };

    let node = ObscuroNode::launch(
        node_config(id, peers),
        store,
        components,
        CancellationToken::new(),
    )
    .await?;
    tracing::info!(target: "obscuro::tests", id, "node spawned");

    Ok(node)
}

/// Mines an L1 block publishing a rollup made of the provided batches.
pub fn publish_rollup(l1: &MockL1Client, batches: &[ExtBatch]) -> eyre::Result<L1BlockHeader> {
    let rollup = ExtRollup::from_batches(batches.to_vec(), B256::ZERO)
        .ok_or_else(|| eyre::eyre!("empty rollup"))?;
    let tx = L1Transaction {
        hash: rollup.hash(),
        from: Address::repeat_byte(0x01),
        to: Some(MANAGEMENT_CONTRACT),
        input: L1RollupTx::new(&rollup).calldata(),
    };
    Ok(l1.mine(vec![tx]))
}

/// Polls `condition` until it holds, failing after [`CONVERGENCE_TIMEOUT`].
pub async fn eventually<F, Fut>(what: &str, mut condition: F) -> eyre::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = eyre::Result<bool>>,
{
    let res = tokio::time::timeout(CONVERGENCE_TIMEOUT, async {
        loop {
            if condition().await? {
                return Ok::<_, eyre::Report>(())
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    match res {
        Ok(res) => res,
        Err(_) => Err(eyre::eyre!("timed out waiting for {what}")),
    }
}
