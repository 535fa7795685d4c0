//! L1 watcher for the Obscuro host.
//!
//! The [`L1Watcher`] follows the L1 head, reads every block up to the confirmation depth and
//! classifies the transactions addressed to the management contract. Rollup publications and
//! the transactions destined to the enclave are yielded as [`L1Notification`]s. The watcher only
//! tracks its progress in memory: the consumer persists a block once it has stored everything the
//! block carried, and a restart resumes after the last persisted block.

mod error;
pub use error::L1WatcherError;

mod metrics;
pub use metrics::WatcherMetrics;

use error::L1WatcherResult;
use obscuro_db::{retry_while, HeaderStore, RetryConfig};
use obscuro_l1::{L1RollupTx, L1Tx, ManagementContract};
use obscuro_primitives::{BlockInfo, L1Block, L1BlockHeader, L1Transaction};
use obscuro_providers::{L1Client, L1ProviderError};
use std::{
    fmt::{Display, Formatter},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The maximum amount of blocks read in one step.
pub const MAX_BLOCKS_PER_STEP: u64 = 100;

/// The capacity of the notification channel.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// The configuration of the [`L1Watcher`].
#[derive(Debug, Clone)]
pub struct L1WatcherConfig {
    /// The L1 block at which the scan starts on a cold start.
    pub genesis_block: u64,
    /// The amount of blocks a block must be buried under before being processed.
    pub confirmations: u64,
    /// The interval between two polls of the L1 head once synced.
    pub poll_interval: Duration,
    /// The retry policy applied to L1 requests failing with I/O errors.
    pub retry: RetryConfig,
}

impl Default for L1WatcherConfig {
    fn default() -> Self {
        Self {
            genesis_block: 0,
            confirmations: 0,
            poll_interval: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

/// The L1 notification type yielded by the [`L1Watcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L1Notification {
    /// A rollup was published to the management contract.
    RollupPublished {
        /// The block including the publication.
        block: BlockInfo,
        /// The publication.
        tx: L1RollupTx,
    },
    /// A transaction to forward to the enclave.
    EnclaveTransaction {
        /// The block including the transaction.
        block: BlockInfo,
        /// The raw transaction.
        tx: L1Transaction,
        /// The decoded transaction.
        kind: L1Tx,
    },
    /// A new L1 head was observed.
    NewHead(BlockInfo),
    /// Every notification up to and including the block was emitted.
    Processed(BlockInfo),
    /// The watcher has caught up with the confirmed L1 head.
    Synced,
}

impl Display for L1Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RollupPublished { block, tx } => {
                write!(f, "RollupPublished{{ block: {block}, size: {} }}", tx.rollup.len())
            }
            Self::EnclaveTransaction { block, tx, kind } => {
                write!(f, "EnclaveTransaction{{ block: {block}, hash: {}, kind: {kind} }}", tx.hash)
            }
            Self::NewHead(block) => write!(f, "NewHead({block})"),
            Self::Processed(block) => write!(f, "Processed({block})"),
            Self::Synced => write!(f, "Synced"),
        }
    }
}

/// The L1 watcher reads the confirmed L1 chain block by block.
#[derive(Debug)]
pub struct L1Watcher<C> {
    /// The L1 client.
    client: C,
    /// The contracts the watcher listens to.
    contract: ManagementContract,
    /// The watcher configuration.
    config: L1WatcherConfig,
    /// The last fully processed block.
    last_processed: Option<BlockInfo>,
    /// The latest L1 head.
    l1_head: Option<BlockInfo>,
    /// The sender part of the channel for [`L1Notification`].
    sender: mpsc::Sender<Arc<L1Notification>>,
    /// The metrics for the watcher.
    metrics: WatcherMetrics,
    /// Whether the watcher is synced to the confirmed L1 head.
    is_synced: bool,
}

impl<C> L1Watcher<C>
where
    C: L1Client + 'static,
{
    /// Returns a new [`L1Watcher`] resuming after the persisted L1 progress, along with the
    /// receiving half of its notification channel.
    pub async fn new(
        client: C,
        store: HeaderStore,
        contract: ManagementContract,
        config: L1WatcherConfig,
    ) -> L1WatcherResult<(Self, mpsc::Receiver<Arc<L1Notification>>)> {
        let last_processed = store.get_l1_processed().await?;
        match last_processed {
            Some(block) => {
                tracing::info!(target: "obscuro::watcher", %block, "resuming after processed L1 block")
            }
            None => {
                tracing::info!(target: "obscuro::watcher", genesis = config.genesis_block, "no L1 progress, starting from genesis block")
            }
        }

        let (sender, rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let watcher = Self {
            client,
            contract,
            config,
            last_processed,
            l1_head: None,
            sender,
            metrics: WatcherMetrics::default(),
            is_synced: false,
        };

        Ok((watcher, rx))
    }

    /// Spawns a new [`L1Watcher`]. The returned handle resolves when the watcher stops: on
    /// cancellation, when the notification channel closes, or on an unrecoverable error.
    pub async fn spawn(
        client: C,
        store: HeaderStore,
        contract: ManagementContract,
        config: L1WatcherConfig,
        cancellation: CancellationToken,
    ) -> L1WatcherResult<(mpsc::Receiver<Arc<L1Notification>>, JoinHandle<L1WatcherResult<()>>)>
    {
        let (watcher, rx) = Self::new(client, store, contract, config).await?;
        Ok((rx, tokio::spawn(watcher.run(cancellation))))
    }

    /// Returns the last block the watcher emitted [`L1Notification::Processed`] for.
    pub const fn last_processed(&self) -> Option<BlockInfo> {
        self.last_processed
    }

    /// Returns the next L1 block to process.
    pub fn next_block(&self) -> u64 {
        self.last_processed.map_or(self.config.genesis_block, |block| block.number + 1)
    }

    /// Main execution loop for the [`L1Watcher`].
    pub async fn run(mut self, cancellation: CancellationToken) -> L1WatcherResult<()> {
        loop {
            let progressed = tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                res = self.step() => match res {
                    Ok(progressed) => progressed,
                    Err(L1WatcherError::SendError(_)) => {
                        tracing::warn!(target: "obscuro::watcher", "L1 watcher channel closed, stopping the watcher");
                        break
                    }
                    Err(err) => {
                        tracing::error!(target: "obscuro::watcher", ?err, "unrecoverable L1 watcher error");
                        return Err(err)
                    }
                }
            };

            if progressed {
                continue
            }

            if !self.is_synced {
                // notify the channel once we have caught up with the confirmed head.
                if self.notify(L1Notification::Synced).await.is_err() {
                    tracing::warn!(target: "obscuro::watcher", "L1 watcher channel closed, stopping the watcher");
                    break
                }
                self.is_synced = true;
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(target: "obscuro::watcher", "L1 watcher stopped");
        Ok(())
    }

    /// A step of work for the [`L1Watcher`]. Returns true if at least one block was processed.
    pub async fn step(&mut self) -> L1WatcherResult<bool> {
        let head = self.fetch_head().await?;
        self.handle_head(&head).await?;

        let next = self.next_block();
        let Some(confirmed) = head.number.checked_sub(self.config.confirmations) else {
            return Ok(false)
        };
        if next > confirmed {
            return Ok(false)
        }

        let end = confirmed.min(next + MAX_BLOCKS_PER_STEP - 1);
        let blocks = self.fetch_blocks(next, end).await?;
        if blocks.is_empty() {
            return Ok(false)
        }
        self.is_synced = false;

        for block in blocks {
            if let Some(last) = self.last_processed {
                if block.header.parent_hash != last.hash {
                    self.rewind(last).await?;
                    return Ok(true)
                }
            }
            self.handle_block(block).await?;
        }

        Ok(true)
    }

    /// Handles the latest L1 head.
    async fn handle_head(&mut self, head: &L1BlockHeader) -> L1WatcherResult<()> {
        let head = head.block_info();
        if self.l1_head == Some(head) {
            return Ok(())
        }

        tracing::trace!(target: "obscuro::watcher", %head, "new L1 head");
        self.l1_head = Some(head);
        self.notify(L1Notification::NewHead(head)).await
    }

    /// Handles a block extending the processed chain: classifies its transactions and emits the
    /// notifications, closing with [`L1Notification::Processed`].
    #[tracing::instrument(target = "obscuro::watcher", skip_all, fields(number = block.header.number))]
    async fn handle_block(&mut self, block: L1Block) -> L1WatcherResult<()> {
        let info = block.block_info();
        let mut notifications = Vec::new();

        for tx in block.transactions {
            match self.contract.classify(&tx) {
                Ok(None) => {}
                Ok(Some(L1Tx::Rollup(rollup))) => {
                    tracing::debug!(target: "obscuro::watcher", block = %info, hash = %tx.hash, "found rollup publication");
                    notifications.push(L1Notification::RollupPublished { block: info, tx: rollup });
                }
                Ok(Some(kind)) => {
                    tracing::debug!(target: "obscuro::watcher", block = %info, hash = %tx.hash, %kind, "found enclave transaction");
                    notifications.push(L1Notification::EnclaveTransaction { block: info, tx, kind });
                }
                Err(err) => {
                    tracing::warn!(target: "obscuro::watcher", block = %info, hash = %tx.hash, %err, "skipping undecodable management contract transaction");
                    self.metrics.decode_failures.increment(1);
                }
            }
        }

        for notification in notifications {
            self.notify(notification).await?;
        }

        self.last_processed = Some(info);
        self.notify(L1Notification::Processed(info)).await
    }

    /// Rewinds the processed chain by one block after a parent linkage mismatch with `last`, so
    /// that the next step reads the canonical block at `last`'s height again.
    async fn rewind(&mut self, last: BlockInfo) -> L1WatcherResult<()> {
        self.metrics.reorgs.increment(1);

        let canonical = if last.number > self.config.genesis_block {
            self.fetch_blocks(last.number, last.number).await?.into_iter().next()
        } else {
            None
        };
        let rewound =
            canonical.map(|block| BlockInfo::new(last.number - 1, block.header.parent_hash));

        tracing::warn!(target: "obscuro::watcher", %last, ?rewound, "L1 parent linkage mismatch, rewinding");
        self.last_processed = rewound;
        Ok(())
    }

    async fn fetch_head(&self) -> L1WatcherResult<L1BlockHeader> {
        Ok(retry_while(
            "fetch_l1_head",
            || self.client.head_block(),
            L1ProviderError::is_transient,
            self.config.retry,
        )
        .await?)
    }

    async fn fetch_blocks(&self, from: u64, to: u64) -> L1WatcherResult<Vec<L1Block>> {
        Ok(retry_while(
            "fetch_l1_blocks",
            || self.client.blocks_between(from, to),
            L1ProviderError::is_transient,
            self.config.retry,
        )
        .await?)
    }

    /// Send the notification in the channel.
    async fn notify(&self, notification: L1Notification) -> L1WatcherResult<()> {
        self.metrics.process_l1_notification(&notification);
        tracing::trace!(target: "obscuro::watcher", %notification, "sending l1 notification");
        Ok(self.sender.send(Arc::new(notification)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscuro_db::test_utils::setup_test_store;
    use obscuro_providers::test_utils::MockL1Client;

    fn config() -> L1WatcherConfig {
        L1WatcherConfig {
            poll_interval: Duration::from_millis(1),
            retry: RetryConfig { initial_delay_ms: 1, ..Default::default() },
            ..Default::default()
        }
    }

    async fn drain(rx: &mut mpsc::Receiver<Arc<L1Notification>>) -> Vec<L1Notification> {
        let mut notifications = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            notifications.push((*notification).clone());
        }
        notifications
    }

    #[tokio::test]
    async fn test_step_processes_confirmed_blocks_only() -> eyre::Result<()> {
        let client = MockL1Client::new();
        client.mine_empty(9);
        let store = setup_test_store().await;
        let config = L1WatcherConfig { confirmations: 3, ..config() };

        let (mut watcher, mut rx) =
            L1Watcher::new(client.clone(), store.clone(), Default::default(), config).await?;
        assert!(watcher.step().await?);
        assert!(!watcher.step().await?);

        assert_eq!(watcher.last_processed().map(|b| b.number), Some(6));
        assert_eq!(store.get_l1_processed().await?, None);
        let notifications = drain(&mut rx).await;
        let head = client.block_info(9).unwrap();
        assert_eq!(notifications.first(), Some(&L1Notification::NewHead(head)));
        assert_eq!(
            notifications.iter().filter(|n| matches!(n, L1Notification::Processed(_))).count(),
            7
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_retries_transient_failures() -> eyre::Result<()> {
        let client = MockL1Client::new();
        client.mine_empty(2);
        client.fail_next(3);
        let store = setup_test_store().await;

        let (mut watcher, _rx) =
            L1Watcher::new(client, store, Default::default(), config()).await?;
        assert!(watcher.step().await?);
        assert_eq!(watcher.last_processed().map(|b| b.number), Some(2));

        Ok(())
    }

    #[tokio::test]
    async fn test_surfaces_failure_after_retry_ceiling() -> eyre::Result<()> {
        let client = MockL1Client::new();
        client.fail_next(10);
        let store = setup_test_store().await;
        let config = L1WatcherConfig {
            retry: RetryConfig { max_retries: Some(2), initial_delay_ms: 1, ..Default::default() },
            ..config()
        };

        let (mut watcher, _rx) = L1Watcher::new(client, store, Default::default(), config).await?;
        let err = watcher.step().await.unwrap_err();
        assert!(err.is_l1_failure());

        Ok(())
    }

    #[tokio::test]
    async fn test_rewinds_on_parent_mismatch() -> eyre::Result<()> {
        let client = MockL1Client::new();
        client.mine_empty(4);
        let store = setup_test_store().await;

        let (mut watcher, _rx) =
            L1Watcher::new(client.clone(), store, Default::default(), config()).await?;
        watcher.step().await?;
        let stale = client.block_info(4).unwrap();

        client.reorg_from(4);
        client.mine_empty(2);
        watcher.step().await?;
        assert_eq!(watcher.next_block(), 4);

        watcher.step().await?;
        assert_eq!(watcher.last_processed(), client.block_info(5));
        assert_ne!(client.block_info(4), Some(stale));

        Ok(())
    }
}
