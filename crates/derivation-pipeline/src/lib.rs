//! Rollup derivation for validator nodes.
//!
//! The [`RollupValidator`] turns rollup publications surfaced by the L1 watcher into stored
//! batches and rollups. A rollup is accepted when it is internally consistent and its first batch
//! extends the canonical batch chain. A consistent rollup whose first batch references an
//! unknown parent is quarantined until the missing batches are fetched from peers, after which
//! it is replayed.

mod error;
pub use error::{DerivationPipelineError, ValidationError};

mod metrics;
pub use metrics::DerivationPipelineMetrics;

use alloy_primitives::B256;
use obscuro_db::{HeadUpdate, HeaderStore};
use obscuro_l1::L1RollupTx;
use obscuro_primitives::{BlockInfo, ExtRollup};
use std::{collections::BTreeMap, time::Instant};

/// The maximum amount of rollups held in quarantine.
pub const MAX_QUARANTINED_ROLLUPS: usize = 64;

/// An event emitted by the [`RollupValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationEvent {
    /// A rollup was verified and stored.
    RollupAccepted {
        /// The hash of the rollup.
        hash: B256,
        /// The number of the rollup.
        number: u64,
        /// The effect of the rollup on the batch head.
        batch_head: HeadUpdate,
    },
    /// A rollup was quarantined until its missing parent batches are available.
    RollupQuarantined {
        /// The hash of the rollup.
        hash: B256,
        /// The height of its first batch.
        first_batch: u64,
    },
    /// Batches are missing locally and must be fetched from peers, starting after the provided
    /// head.
    CatchUpRequired {
        /// The local head batch hash.
        head: Option<B256>,
    },
    /// A publication could not be decoded and was dropped.
    RollupDropped {
        /// The L1 block including the publication.
        block: BlockInfo,
    },
}

/// Verifies and persists published rollups.
#[derive(Debug)]
pub struct RollupValidator {
    /// The store receiving the rollups.
    store: HeaderStore,
    /// The quarantined rollups, by height of their first batch.
    quarantine: BTreeMap<u64, ExtRollup>,
    /// The metrics of the validator.
    metrics: DerivationPipelineMetrics,
}

impl RollupValidator {
    /// Returns a new instance of the [`RollupValidator`].
    pub fn new(store: HeaderStore) -> Self {
        Self { store, quarantine: BTreeMap::new(), metrics: DerivationPipelineMetrics::default() }
    }

    /// Returns the amount of quarantined rollups.
    pub fn quarantined(&self) -> usize {
        self.quarantine.len()
    }

    /// Handles a rollup publication. Undecodable publications are dropped.
    pub async fn handle_rollup_publication(
        &mut self,
        block: BlockInfo,
        tx: &L1RollupTx,
    ) -> Result<Vec<DerivationEvent>, DerivationPipelineError> {
        match tx.decode_rollup() {
            Ok(rollup) => {
                tracing::debug!(target: "obscuro::derivation", %block, hash = %rollup.hash(), "decoded rollup");
                self.handle_rollup(rollup).await
            }
            Err(err) => {
                tracing::warn!(target: "obscuro::derivation", %block, %err, "dropping undecodable rollup");
                self.metrics.rollups_dropped.increment(1);
                Ok(vec![DerivationEvent::RollupDropped { block }])
            }
        }
    }

    /// Verifies and stores the rollup, then replays the quarantined rollups it unblocked.
    pub async fn handle_rollup(
        &mut self,
        rollup: ExtRollup,
    ) -> Result<Vec<DerivationEvent>, DerivationPipelineError> {
        let hash = rollup.hash();
        let mut events = Vec::new();

        match self.verify(&rollup).await {
            Ok(()) => {
                events.push(self.store_rollup(&rollup).await?);
                events.extend(self.replay_quarantined().await?);
            }
            Err(DerivationPipelineError::Validation(err)) if err.is_recoverable() => {
                tracing::warn!(target: "obscuro::derivation", %hash, %err, "quarantining rollup");
                let first_batch = rollup.batches()[0].number();
                self.quarantine_rollup(first_batch, rollup);
                events.push(DerivationEvent::RollupQuarantined { hash, first_batch });
                events.push(DerivationEvent::CatchUpRequired {
                    head: self.store.get_head_batch_hash().await?,
                });
            }
            Err(DerivationPipelineError::Validation(err)) => {
                tracing::warn!(target: "obscuro::derivation", %hash, %err, "rejecting rollup");
                self.metrics.rollups_rejected.increment(1);
                return Err(err.into())
            }
            Err(err) => return Err(err),
        }

        Ok(events)
    }

    /// Replays the quarantined rollups in ascending order of their first batch, storing the ones
    /// which now extend the canonical chain. Stops at the first rollup still missing its parent.
    pub async fn replay_quarantined(
        &mut self,
    ) -> Result<Vec<DerivationEvent>, DerivationPipelineError> {
        let mut events = Vec::new();

        while let Some((first_batch, rollup)) = self.quarantine.pop_first() {
            match self.verify(&rollup).await {
                Ok(()) => {
                    tracing::info!(target: "obscuro::derivation", hash = %rollup.hash(), "replaying quarantined rollup");
                    events.push(self.store_rollup(&rollup).await?);
                }
                Err(DerivationPipelineError::Validation(err)) if err.is_recoverable() => {
                    self.quarantine.insert(first_batch, rollup);
                    break
                }
                Err(DerivationPipelineError::Validation(err)) => {
                    tracing::warn!(target: "obscuro::derivation", hash = %rollup.hash(), %err, "dropping quarantined rollup");
                }
                Err(err) => {
                    self.quarantine.insert(first_batch, rollup);
                    return Err(err)
                }
            }
        }

        self.metrics.quarantine_size.set(self.quarantine.len() as f64);
        Ok(events)
    }

    /// Verifies the integrity of the rollup and that its first batch is the genesis batch or
    /// extends the canonical chain.
    async fn verify(&self, rollup: &ExtRollup) -> Result<(), DerivationPipelineError> {
        rollup.check_integrity().map_err(ValidationError::from)?;

        let first = &rollup.batches()[0];
        if first.header().is_genesis() {
            return Ok(())
        }

        let number = first.number();
        let parent_hash = first.parent_hash();
        let parent_number = number.checked_sub(1).ok_or(ValidationError::InvalidGenesis)?;
        if !self.store.is_canonical_batch(parent_number, parent_hash).await? {
            return Err(ValidationError::UnknownParent { number, parent_hash }.into())
        }

        Ok(())
    }

    /// Persists every batch of the rollup, then the rollup itself.
    async fn store_rollup(
        &self,
        rollup: &ExtRollup,
    ) -> Result<DerivationEvent, DerivationPipelineError> {
        let started = Instant::now();

        let mut batch_head = HeadUpdate::Retained;
        for batch in rollup.batches() {
            if self.store.add_batch(batch).await?.is_advanced() {
                batch_head = HeadUpdate::Advanced;
            }
        }
        self.store.add_rollup(rollup).await?;

        self.metrics.batches_stored.increment(rollup.batches().len() as u64);
        self.metrics.rollups_accepted.increment(1);
        self.metrics.derivation_duration.record(started.elapsed().as_secs_f64() * 1000.0);

        let hash = rollup.hash();
        let number = rollup.header().number;
        tracing::info!(target: "obscuro::derivation", %hash, number, batches = rollup.batches().len(), "accepted rollup");

        Ok(DerivationEvent::RollupAccepted { hash, number, batch_head })
    }

    fn quarantine_rollup(&mut self, first_batch: u64, rollup: ExtRollup) {
        self.metrics.rollups_quarantined.increment(1);
        self.quarantine.insert(first_batch, rollup);

        // keep the lowest rollups, they unblock the ones above them.
        while self.quarantine.len() > MAX_QUARANTINED_ROLLUPS {
            if let Some((number, rollup)) = self.quarantine.pop_last() {
                tracing::warn!(target: "obscuro::derivation", number, hash = %rollup.hash(), "quarantine full, evicting rollup");
            }
        }
        self.metrics.quarantine_size.set(self.quarantine.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscuro_db::test_utils::setup_test_store;
    use obscuro_primitives::{
        test_utils::{batch_chain, batch_chain_from, child_of},
        ErrorKind, ExtBatch, RollupHeader,
    };

    fn rollup(batches: &[ExtBatch]) -> ExtRollup {
        ExtRollup::from_batches(batches.to_vec(), B256::ZERO).expect("non empty")
    }

    #[tokio::test]
    async fn test_accepts_genesis_and_extensions() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let mut validator = RollupValidator::new(store.clone());
        let chain = batch_chain(4);

        let events = validator.handle_rollup(rollup(&chain[..1])).await?;
        assert!(matches!(events[..], [DerivationEvent::RollupAccepted { number: 0, .. }]));

        let events = validator.handle_rollup(rollup(&chain[1..])).await?;
        assert!(matches!(
            events[..],
            [DerivationEvent::RollupAccepted { number: 3, batch_head: HeadUpdate::Advanced, .. }]
        ));
        assert_eq!(store.get_head_batch_hash().await?, Some(chain[3].hash()));
        assert_eq!(store.get_rollup_hash_by_number(3).await?, Some(rollup(&chain[1..]).hash()));

        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_empty_rollup() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let mut validator = RollupValidator::new(store);
        let header = RollupHeader::default();

        let err = validator.handle_rollup(ExtRollup::new(header, vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChainInconsistent);
        assert_eq!(validator.quarantined(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_quarantines_and_replays_out_of_order_rollup() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let mut validator = RollupValidator::new(store.clone());
        let chain = batch_chain(8);

        validator.handle_rollup(rollup(&chain[..1])).await?;

        let events = validator.handle_rollup(rollup(&chain[5..])).await?;
        assert_eq!(
            events,
            vec![
                DerivationEvent::RollupQuarantined {
                    hash: rollup(&chain[5..]).hash(),
                    first_batch: 5
                },
                DerivationEvent::CatchUpRequired { head: Some(chain[0].hash()) },
            ]
        );
        assert_eq!(validator.quarantined(), 1);

        // the missing batches arrive from peers.
        for batch in &chain[1..5] {
            store.add_batch(batch).await?;
        }
        let events = validator.replay_quarantined().await?;
        assert!(matches!(events[..], [DerivationEvent::RollupAccepted { number: 7, .. }]));
        assert_eq!(validator.quarantined(), 0);
        assert_eq!(store.get_head_batch_header().await?.map(|h| h.number), Some(7));

        Ok(())
    }

    #[tokio::test]
    async fn test_parent_must_be_canonical() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let mut validator = RollupValidator::new(store.clone());
        let chain = batch_chain(2);
        validator.handle_rollup(rollup(&chain)).await?;

        // a sibling of batch 1 is stored but not canonical.
        let sibling = child_of(&chain[0]);
        store.add_batch(&sibling).await?;
        let orphan = batch_chain_from(child_of(&sibling), 1);

        let events = validator.handle_rollup(rollup(&orphan)).await?;
        assert!(matches!(events[0], DerivationEvent::RollupQuarantined { first_batch: 2, .. }));

        Ok(())
    }
}
