use crate::{keys, metrics::HeaderStoreMetrics, retry_while, Database, DatabaseError, RetryConfig};

use alloy_primitives::B256;
use alloy_rlp::Decodable;
use obscuro_codec::Codec;
use obscuro_primitives::{BatchHeader, BlockInfo, ExtBatch, ExtRollup, RollupHeader};
use std::{sync::Arc, time::Instant};
use tokio::sync::Mutex;

/// The outcome of an append on the [`HeaderStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadUpdate {
    /// The appended header became the head.
    Advanced,
    /// The head was left in place.
    Retained,
}

impl HeadUpdate {
    /// Returns true if the head moved.
    pub const fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced)
    }
}

/// The two chains tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    Batch,
    Rollup,
}

impl Chain {
    const fn head_key(self) -> &'static [u8] {
        match self {
            Self::Batch => keys::HEAD_BATCH_KEY,
            Self::Rollup => keys::HEAD_ROLLUP_KEY,
        }
    }

    fn number_key(self, number: u64) -> Vec<u8> {
        match self {
            Self::Batch => keys::batch_number(number),
            Self::Rollup => keys::rollup_number(number),
        }
    }
}

/// Typed persistence of batch and rollup headers, indexed by hash and by height, with head
/// pointer maintenance.
///
/// Every append stages the header, its number index and the head pointer (when the header is
/// strictly higher than the current head) in one [`crate::WriteBatch`]. Appends are serialized
/// by a mutex covering "read head, decide, write, commit". Reads take no lock and may observe
/// the pre-commit head.
///
/// Reads and commits failing with a backend error are attempted again under the store's
/// [`RetryConfig`]. A failed append attempt commits nothing, and the next attempt reads the head
/// again.
#[derive(Debug, Clone)]
pub struct HeaderStore {
    db: Arc<Database>,
    write_lock: Arc<Mutex<()>>,
    retry: RetryConfig,
    metrics: HeaderStoreMetrics,
}

impl HeaderStore {
    /// Returns a new [`HeaderStore`] over the database, retrying backend errors with the default
    /// [`RetryConfig`].
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
            retry: RetryConfig::default(),
            metrics: HeaderStoreMetrics::default(),
        }
    }

    /// Sets the retry policy applied to backend errors.
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the header of the head batch.
    pub async fn get_head_batch_header(&self) -> Result<Option<BatchHeader>, DatabaseError> {
        let Some(hash) = self.get_head_batch_hash().await? else { return Ok(None) };
        self.get_batch_header(hash).await?.map(Some).ok_or(DatabaseError::DanglingReference(hash))
    }

    /// Returns the hash of the head batch.
    pub async fn get_head_batch_hash(&self) -> Result<Option<B256>, DatabaseError> {
        self.get_decoded(keys::HEAD_BATCH_KEY.to_vec()).await
    }

    /// Returns the header of the head rollup.
    pub async fn get_head_rollup_header(&self) -> Result<Option<RollupHeader>, DatabaseError> {
        let Some(hash) = self.get_head_rollup_hash().await? else { return Ok(None) };
        self.get_rollup_header(hash).await?.map(Some).ok_or(DatabaseError::DanglingReference(hash))
    }

    /// Returns the hash of the head rollup.
    pub async fn get_head_rollup_hash(&self) -> Result<Option<B256>, DatabaseError> {
        self.get_decoded(keys::HEAD_ROLLUP_KEY.to_vec()).await
    }

    /// Returns the hash of the canonical batch at the provided height.
    pub async fn get_batch_hash_by_number(
        &self,
        number: u64,
    ) -> Result<Option<B256>, DatabaseError> {
        self.get_decoded(keys::batch_number(number)).await
    }

    /// Returns the hash of the canonical rollup at the provided height.
    pub async fn get_rollup_hash_by_number(
        &self,
        number: u64,
    ) -> Result<Option<B256>, DatabaseError> {
        self.get_decoded(keys::rollup_number(number)).await
    }

    /// Returns the batch header with the provided hash, canonical or not.
    pub async fn get_batch_header(&self, hash: B256) -> Result<Option<BatchHeader>, DatabaseError> {
        self.get_decoded(keys::batch_header(&hash)).await
    }

    /// Returns the rollup header with the provided hash, canonical or not.
    pub async fn get_rollup_header(
        &self,
        hash: B256,
    ) -> Result<Option<RollupHeader>, DatabaseError> {
        self.get_decoded(keys::rollup_header(&hash)).await
    }

    /// Returns the full batch with the provided hash. Batches appended through
    /// [`HeaderStore::add_batch_header`] have no body and are not returned.
    pub async fn get_batch(&self, hash: B256) -> Result<Option<ExtBatch>, DatabaseError> {
        self.get_decoded(keys::batch_body(&hash)).await
    }

    /// Returns the full canonical batch at the provided height.
    pub async fn get_batch_by_number(&self, number: u64) -> Result<Option<ExtBatch>, DatabaseError> {
        match self.get_batch_hash_by_number(number).await? {
            Some(hash) => self.get_batch(hash).await,
            None => Ok(None),
        }
    }

    /// Returns the full rollup with the provided hash.
    pub async fn get_rollup(&self, hash: B256) -> Result<Option<ExtRollup>, DatabaseError> {
        let Some(header) = self.get_rollup_header(hash).await? else { return Ok(None) };
        let batch_hashes: Vec<B256> = self
            .get_decoded(keys::rollup_body(&hash))
            .await?
            .ok_or(DatabaseError::DanglingReference(hash))?;

        let mut batches = Vec::with_capacity(batch_hashes.len());
        for batch_hash in batch_hashes {
            let batch = self
                .get_batch(batch_hash)
                .await?
                .ok_or(DatabaseError::DanglingReference(batch_hash))?;
            batches.push(batch);
        }

        Ok(Some(ExtRollup::new(header, batches)))
    }

    /// Returns true if the batch with the provided hash is the canonical batch at its height.
    pub async fn is_canonical_batch(&self, number: u64, hash: B256) -> Result<bool, DatabaseError> {
        Ok(self.get_batch_hash_by_number(number).await? == Some(hash))
    }

    /// Returns the last fully processed L1 block.
    pub async fn get_l1_processed(&self) -> Result<Option<BlockInfo>, DatabaseError> {
        self.get_decoded(keys::L1_PROCESSED_KEY.to_vec()).await
    }

    /// Records the last fully processed L1 block.
    pub async fn set_l1_processed(&self, block: BlockInfo) -> Result<(), DatabaseError> {
        retry_while(
            "set_l1_processed",
            || {
                let mut batch = self.db.new_batch();
                batch.put(keys::L1_PROCESSED_KEY, Codec::encode(&block));
                batch.commit()
            },
            DatabaseError::is_transient,
            self.retry,
        )
        .await?;
        tracing::trace!(target: "obscuro::db", %block, "Recorded processed L1 block");
        Ok(())
    }

    /// Appends a batch header. The head advances iff there is no head yet or the header is
    /// strictly higher than the current head; ties keep the first committed header.
    pub async fn add_batch_header(&self, header: &BatchHeader) -> Result<HeadUpdate, DatabaseError> {
        let hash = header.hash_slow();
        let records = vec![(keys::batch_header(&hash), Codec::encode(header))];
        self.append(Chain::Batch, header.number, hash, records).await
    }

    /// Appends a full batch: its header with the semantics of [`HeaderStore::add_batch_header`]
    /// and its body, atomically.
    pub async fn add_batch(&self, batch: &ExtBatch) -> Result<HeadUpdate, DatabaseError> {
        let hash = batch.hash();
        let records = vec![
            (keys::batch_header(&hash), Codec::encode(batch.header())),
            (keys::batch_body(&hash), Codec::encode(batch)),
        ];
        self.append(Chain::Batch, batch.number(), hash, records).await
    }

    /// Appends a rollup header with the head semantics of [`HeaderStore::add_batch_header`].
    pub async fn add_rollup_header(
        &self,
        header: &RollupHeader,
    ) -> Result<HeadUpdate, DatabaseError> {
        let hash = header.hash_slow();
        let records = vec![(keys::rollup_header(&hash), Codec::encode(header))];
        self.append(Chain::Rollup, header.number, hash, records).await
    }

    /// Appends a rollup and the list of its batches. Every batch of the rollup must already be
    /// stored.
    pub async fn add_rollup(&self, rollup: &ExtRollup) -> Result<HeadUpdate, DatabaseError> {
        let batch_hashes = rollup.batches().iter().map(ExtBatch::hash).collect::<Vec<_>>();
        for hash in &batch_hashes {
            if !self.has(&keys::batch_body(hash)).await? {
                return Err(DatabaseError::MissingBatch(*hash))
            }
        }

        let hash = rollup.hash();
        let records = vec![
            (keys::rollup_header(&hash), Codec::encode(rollup.header())),
            (keys::rollup_body(&hash), Codec::encode(&batch_hashes)),
        ];
        self.append(Chain::Rollup, rollup.header().number, hash, records).await
    }

    async fn append(
        &self,
        chain: Chain,
        number: u64,
        hash: B256,
        records: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<HeadUpdate, DatabaseError> {
        retry_while(
            "append",
            || self.try_append(chain, number, hash, &records),
            DatabaseError::is_transient,
            self.retry,
        )
        .await
    }

    async fn try_append(
        &self,
        chain: Chain,
        number: u64,
        hash: B256,
        records: &[(Vec<u8>, Vec<u8>)],
    ) -> Result<HeadUpdate, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let started = Instant::now();

        let mut batch = self.db.new_batch();
        for (key, value) in records {
            batch.put(key.clone(), value.clone());
        }

        // the first header committed at a height owns the number index.
        let number_key = chain.number_key(number);
        if !self.has(&number_key).await? {
            batch.put(number_key, Codec::encode(&hash));
        }

        let head = self.head_number(chain).await?;
        let update = if head.is_none_or(|head| number > head) {
            batch.put(chain.head_key(), Codec::encode(&hash));
            HeadUpdate::Advanced
        } else {
            HeadUpdate::Retained
        };

        batch.commit().await?;
        self.metrics.append_duration.record(started.elapsed().as_secs_f64() * 1000.0);

        match (chain, update) {
            (Chain::Batch, HeadUpdate::Advanced) => {
                self.metrics.batch_head_advances.increment(1);
                tracing::info!(target: "obscuro::db", number, %hash, "Batch head advanced");
            }
            (Chain::Rollup, HeadUpdate::Advanced) => {
                self.metrics.rollup_head_advances.increment(1);
                tracing::info!(target: "obscuro::db", number, %hash, "Rollup head advanced");
            }
            (_, HeadUpdate::Retained) => {
                self.metrics.retained_heads.increment(1);
                tracing::debug!(target: "obscuro::db", ?chain, number, %hash, ?head, "Head retained");
            }
        }

        Ok(update)
    }

    async fn head_number(&self, chain: Chain) -> Result<Option<u64>, DatabaseError> {
        Ok(match chain {
            Chain::Batch => self.get_head_batch_header().await?.map(|h| h.number),
            Chain::Rollup => self.get_head_rollup_header().await?.map(|h| h.number),
        })
    }

    async fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        retry_while("has", || self.db.has(key), DatabaseError::is_transient, self.retry).await
    }

    async fn get_decoded<T: Decodable>(&self, key: Vec<u8>) -> Result<Option<T>, DatabaseError> {
        let bytes =
            retry_while("get", || self.db.get(&key), DatabaseError::is_transient, self.retry)
                .await?;
        let Some(bytes) = bytes else { return Ok(None) };
        Codec::decode(&bytes)
            .map(Some)
            .map_err(|source| DatabaseError::Corrupted { key: keys::display(&key), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_store;
    use obscuro_primitives::test_utils::{batch_chain, child_of, genesis_batch, header_at};

    #[tokio::test]
    async fn test_empty_store_has_no_head() -> eyre::Result<()> {
        let store = setup_test_store().await;

        assert_eq!(store.get_head_batch_header().await?, None);
        assert_eq!(store.get_head_rollup_header().await?, None);
        assert_eq!(store.get_batch_hash_by_number(0).await?, None);
        assert_eq!(store.get_l1_processed().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_head_follows_highest_batch() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let chain = batch_chain(4);

        // Given: batches appended in an arbitrary order.
        for i in [0, 2, 1, 3] {
            store.add_batch(&chain[i]).await?;
        }

        // Then: the head is the highest batch.
        assert_eq!(store.get_head_batch_hash().await?, Some(chain[3].hash()));
        for batch in &chain {
            assert_eq!(store.get_batch_hash_by_number(batch.number()).await?, Some(batch.hash()));
            assert_eq!(store.get_batch(batch.hash()).await?.as_ref(), Some(batch));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_append_is_idempotent() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let header = header_at(10, B256::with_last_byte(9));

        assert_eq!(store.add_batch_header(&header).await?, HeadUpdate::Advanced);
        assert_eq!(store.add_batch_header(&header).await?, HeadUpdate::Retained);

        assert_eq!(store.get_head_batch_header().await?, Some(header.clone()));
        assert_eq!(store.get_batch_header(header.hash_slow()).await?, Some(header));
        Ok(())
    }

    #[tokio::test]
    async fn test_lower_header_does_not_rewind_head() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let high = header_at(5, B256::ZERO);
        let low = header_at(3, B256::ZERO);

        store.add_batch_header(&high).await?;
        assert_eq!(store.add_batch_header(&low).await?, HeadUpdate::Retained);

        assert_eq!(store.get_head_batch_header().await?.map(|h| h.number), Some(5));
        assert_eq!(store.get_batch_hash_by_number(3).await?, Some(low.hash_slow()));
        Ok(())
    }

    #[tokio::test]
    async fn test_sibling_keeps_first_writer() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let parent = genesis_batch();
        store.add_batch(&parent).await?;

        let a = child_of(&parent);
        let b = child_of(&parent);
        assert_eq!(store.add_batch(&a).await?, HeadUpdate::Advanced);
        assert_eq!(store.add_batch(&b).await?, HeadUpdate::Retained);

        assert_eq!(store.get_head_batch_hash().await?, Some(a.hash()));
        assert_eq!(store.get_batch_hash_by_number(1).await?, Some(a.hash()));
        assert_eq!(store.get_batch_header(b.hash()).await?.as_ref(), Some(b.header()));
        assert!(store.is_canonical_batch(1, a.hash()).await?);
        assert!(!store.is_canonical_batch(1, b.hash()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_append_advances_once() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let header = header_at(10, B256::ZERO);
        store.add_batch_header(&header_at(9, B256::ZERO)).await?;

        let (s1, s2) = (store.clone(), store.clone());
        let (h1, h2) = (header.clone(), header.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.add_batch_header(&h1).await }),
            tokio::spawn(async move { s2.add_batch_header(&h2).await })
        );
        let advances = [r1??, r2??].iter().filter(|u| u.is_advanced()).count();

        assert_eq!(advances, 1);
        assert_eq!(store.get_head_batch_header().await?.map(|h| h.number), Some(10));
        Ok(())
    }

    #[tokio::test]
    async fn test_rollup_requires_stored_batches() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let chain = batch_chain(3);
        let rollup = ExtRollup::from_batches(chain.clone(), B256::with_last_byte(1)).unwrap();

        let err = store.add_rollup(&rollup).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MissingBatch(_)));
        assert_eq!(store.get_head_rollup_header().await?, None);

        for batch in &chain {
            store.add_batch(batch).await?;
        }
        assert!(store.add_rollup(&rollup).await?.is_advanced());

        assert_eq!(store.get_head_rollup_header().await?.as_ref(), Some(rollup.header()));
        assert_eq!(store.get_rollup_hash_by_number(2).await?, Some(rollup.hash()));
        assert_eq!(store.get_rollup(rollup.hash()).await?, Some(rollup));
        Ok(())
    }

    #[tokio::test]
    async fn test_l1_processed_round_trip() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let block = BlockInfo::new(500, B256::with_last_byte(5));

        store.set_l1_processed(block).await?;
        assert_eq!(store.get_l1_processed().await?, Some(block));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_record_is_reported() -> eyre::Result<()> {
        let store = setup_test_store().await;

        let mut batch = store.database().new_batch();
        batch.put(keys::HEAD_BATCH_KEY, vec![0xff, 0x00]);
        batch.commit().await?;

        let err = store.get_head_batch_hash().await.unwrap_err();
        assert!(err.is_corruption());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_commit_is_retried() -> eyre::Result<()> {
        let store = setup_test_store().await.with_retry(RetryConfig {
            max_retries: Some(3),
            initial_delay_ms: 1,
            ..Default::default()
        });
        let chain = batch_chain(2);
        store.add_batch(&chain[0]).await?;

        store.database().fail_next_commits(2);
        assert_eq!(store.add_batch(&chain[1]).await?, HeadUpdate::Advanced);
        assert_eq!(store.get_head_batch_hash().await?, Some(chain[1].hash()));
        assert_eq!(store.get_batch_hash_by_number(1).await?, Some(chain[1].hash()));

        let block = BlockInfo::new(7, B256::with_last_byte(7));
        store.database().fail_next_commits(1);
        store.set_l1_processed(block).await?;
        assert_eq!(store.get_l1_processed().await?, Some(block));
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_failure_surfaces_after_retry_ceiling() -> eyre::Result<()> {
        let store = setup_test_store().await.with_retry(RetryConfig {
            max_retries: Some(1),
            initial_delay_ms: 1,
            ..Default::default()
        });
        let batch = genesis_batch();

        store.database().fail_next_commits(2);
        let err = store.add_batch(&batch).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.get_head_batch_hash().await?, None);

        // the next append goes through.
        assert!(store.add_batch(&batch).await?.is_advanced());
        Ok(())
    }
}
