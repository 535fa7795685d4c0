//! This library contains the sequencer, which is responsible for grouping the batches produced by
//! the enclave into rollups and publishing them to the L1.

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use alloy_primitives::B256;
use futures::{task::AtomicWaker, Stream};
use obscuro_db::{retry_while, HeadUpdate, HeaderStore};
use obscuro_l1::L1RollupTx;
use obscuro_primitives::{BlockInfo, ExtBatch, ExtRollup};
use obscuro_providers::{L1Client, L1ProviderError};
use tokio::time::{Interval, MissedTickBehavior};

mod config;
pub use config::SequencerConfig;

mod error;
pub use error::SequencerError;

mod metrics;
pub use metrics::SequencerMetrics;

/// A rollup published to the L1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupSubmission {
    /// The hash of the rollup.
    pub hash: B256,
    /// The number of the rollup.
    pub number: u64,
    /// The amount of batches in the rollup.
    pub batch_count: usize,
    /// The hash of the L1 transaction.
    pub tx_hash: B256,
}

/// A type alias for the rollup dispatch job future. On failure, the batches of the rollup are
/// handed back for the next attempt.
pub type DispatchJobFuture = Pin<
    Box<dyn Future<Output = Result<RollupSubmission, (Vec<ExtBatch>, SequencerError)>> + Send>,
>;

/// The sequencer buffers the batches produced by the enclave and publishes them as rollups.
pub struct Sequencer<C> {
    /// The L1 client.
    client: Arc<C>,
    /// The store receiving the produced batches.
    store: HeaderStore,
    /// The sequencer configuration.
    config: SequencerConfig,
    /// The batches waiting for the next rollup, by height.
    buffer: BTreeMap<u64, ExtBatch>,
    /// The latest L1 block, used as anchor of the rollups.
    l1_anchor: Option<BlockInfo>,
    /// The time trigger.
    interval: Option<Interval>,
    /// The inflight dispatch job.
    dispatch_job: Option<DispatchJobFuture>,
    /// A waker to notify when the Sequencer should be polled.
    waker: AtomicWaker,
    /// The metrics of the sequencer.
    metrics: SequencerMetrics,
}

impl<C> Sequencer<C>
where
    C: L1Client + 'static,
{
    /// Creates a new sequencer. Must be called within a tokio runtime if the time trigger is
    /// enabled.
    pub fn new(client: Arc<C>, store: HeaderStore, config: SequencerConfig) -> Self {
        let interval = config.rollup_interval.map(|period| {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self {
            client,
            store,
            config,
            buffer: BTreeMap::new(),
            l1_anchor: None,
            interval,
            dispatch_job: None,
            waker: AtomicWaker::new(),
            metrics: SequencerMetrics::default(),
        }
    }

    /// Returns the amount of buffered batches.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Handle a new L1 block.
    pub fn handle_new_l1_block(&mut self, block: BlockInfo) {
        self.l1_anchor = Some(block);
    }

    /// Handles a batch produced by the enclave: the batch is stored and buffered for the next
    /// rollup. Reaching the count trigger starts a dispatch.
    pub async fn handle_batch(&mut self, batch: ExtBatch) -> Result<HeadUpdate, SequencerError> {
        let update = self.store.add_batch(&batch).await?;
        self.metrics.batches_received.increment(1);

        let number = batch.number();
        if let Some((last, _)) = self.buffer.last_key_value() {
            if number <= *last {
                tracing::warn!(target: "obscuro::sequencer", number, last, "received batch out of order");
            }
        }
        tracing::debug!(target: "obscuro::sequencer", number, hash = %batch.hash(), "buffered batch");
        self.buffer.insert(number, batch);
        self.metrics.buffered_batches.set(self.buffer.len() as f64);

        if self.count_triggered() {
            self.dispatch();
        }

        Ok(update)
    }

    /// Returns true if the buffer holds enough batches for a count-triggered dispatch.
    fn count_triggered(&self) -> bool {
        self.config.max_batches > 0 && self.buffer.len() >= self.config.max_batches
    }

    /// Starts the dispatch of the buffered batches as a rollup. No-op if the buffer is empty or a
    /// dispatch is in progress.
    pub fn dispatch(&mut self) {
        if self.dispatch_job.is_some() {
            tracing::trace!(target: "obscuro::sequencer", "A dispatch job is already in progress");
            return
        }

        let batches: Vec<_> = std::mem::take(&mut self.buffer).into_values().collect();
        let l1_anchor = self.l1_anchor.map(|block| block.hash).unwrap_or_default();
        let Some(rollup) = ExtRollup::from_batches(batches, l1_anchor) else { return };
        self.metrics.buffered_batches.set(0.0);

        tracing::info!(target: "obscuro::sequencer", number = rollup.header().number, batches = rollup.batches().len(), "New rollup dispatch");

        let client = self.client.clone();
        let management_contract = self.config.management_contract;
        let retry = self.config.retry;
        let metrics = self.metrics.clone();

        self.dispatch_job = Some(Box::pin(async move {
            let started = Instant::now();
            let calldata = L1RollupTx::new(&rollup).calldata();
            let res = retry_while(
                "submit_rollup",
                || client.send_transaction(management_contract, calldata.clone()),
                L1ProviderError::is_transient,
                retry,
            )
            .await;
            metrics.submission_duration.record(started.elapsed().as_secs_f64() * 1000.0);

            match res {
                Ok(tx_hash) => Ok(RollupSubmission {
                    hash: rollup.hash(),
                    number: rollup.header().number,
                    batch_count: rollup.batches().len(),
                    tx_hash,
                }),
                Err(err) => Err((rollup.into_batches(), err.into())),
            }
        }));

        self.waker.wake();
    }
}

/// A stream that yields the outcome of the rollup dispatches.
impl<C> Stream for Sequencer<C>
where
    C: L1Client + 'static,
{
    type Item = Result<RollupSubmission, SequencerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.waker.register(cx.waker());

        // drive the time trigger.
        let mut triggered = false;
        if let Some(interval) = this.interval.as_mut() {
            while interval.poll_tick(cx).is_ready() {
                triggered = true;
            }
        }
        if triggered && this.dispatch_job.is_none() && !this.buffer.is_empty() {
            this.dispatch();
        }

        let Some(job) = this.dispatch_job.as_mut() else { return Poll::Pending };
        match job.as_mut().poll(cx) {
            Poll::Ready(Ok(submission)) => {
                this.dispatch_job = None;
                this.metrics.rollups_submitted.increment(1);
                tracing::info!(target: "obscuro::sequencer", hash = %submission.hash, number = submission.number, tx_hash = %submission.tx_hash, "Rollup submitted");
                // batches buffered during the dispatch may already fill a rollup.
                if this.count_triggered() {
                    this.dispatch();
                    cx.waker().wake_by_ref();
                }
                Poll::Ready(Some(Ok(submission)))
            }
            Poll::Ready(Err((batches, err))) => {
                this.dispatch_job = None;
                this.metrics.submission_failures.increment(1);
                tracing::error!(target: "obscuro::sequencer", ?err, batches = batches.len(), "Rollup submission failed, batches buffered again");
                for batch in batches {
                    this.buffer.entry(batch.number()).or_insert(batch);
                }
                this.metrics.buffered_batches.set(this.buffer.len() as f64);
                Poll::Ready(Some(Err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<C> std::fmt::Debug for Sequencer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("client", &"L1Client")
            .field("config", &self.config)
            .field("buffer", &self.buffer.keys().collect::<Vec<_>>())
            .field("l1_anchor", &self.l1_anchor)
            .field("dispatch_job", &self.dispatch_job.as_ref().map(|_| "DispatchJob"))
            .finish()
    }
}
