use crate::InvalidBatch;

use obscuro_db::{DatabaseError, HeaderStore};
use obscuro_primitives::ExtBatch;

/// The outcome of a batch import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// The amount of batches committed.
    pub applied: usize,
    /// Whether the batch head advanced.
    pub head_advanced: bool,
    /// The reason the import stopped early, if it did.
    pub rejected: Option<InvalidBatch>,
}

/// Validates and commits a run of batches one by one. The first invalid batch ends the import:
/// the batches before it stay committed and the ones after it are discarded.
///
/// The first batch must be a genesis batch or extend a stored batch; every following batch must
/// extend its predecessor in the run.
pub async fn import_batches(
    store: &HeaderStore,
    batches: &[ExtBatch],
) -> Result<ImportOutcome, DatabaseError> {
    let mut outcome = ImportOutcome::default();
    let mut previous: Option<&ExtBatch> = None;

    for batch in batches {
        let check = match previous {
            Some(previous) => check_linkage(previous, batch),
            None => check_anchor(store, batch).await?,
        };
        if let Err(reason) = check {
            tracing::warn!(target: "obscuro::network", number = batch.number(), hash = %batch.hash(), %reason, "Refusing batch");
            outcome.rejected = Some(reason);
            break
        }

        if store.add_batch(batch).await?.is_advanced() {
            outcome.head_advanced = true;
        }
        outcome.applied += 1;
        tracing::trace!(target: "obscuro::network", number = batch.number(), hash = %batch.hash(), "Imported batch");
        previous = Some(batch);
    }

    Ok(outcome)
}

fn check_linkage(previous: &ExtBatch, batch: &ExtBatch) -> Result<(), InvalidBatch> {
    if batch.parent_hash() != previous.hash() {
        return Err(InvalidBatch::BrokenLinkage { number: batch.number(), expected: previous.hash() })
    }
    if previous.number().checked_add(1) != Some(batch.number()) {
        return Err(InvalidBatch::NonMonotonic {
            number: batch.number(),
            parent_number: previous.number(),
        })
    }
    Ok(())
}

async fn check_anchor(
    store: &HeaderStore,
    batch: &ExtBatch,
) -> Result<Result<(), InvalidBatch>, DatabaseError> {
    if batch.header().is_genesis() {
        let conflicting = store
            .get_batch_hash_by_number(0)
            .await?
            .is_some_and(|genesis| genesis != batch.hash());
        return Ok(if conflicting { Err(InvalidBatch::ConflictingGenesis(batch.hash())) } else { Ok(()) })
    }

    let parent_hash = batch.parent_hash();
    let Some(parent) = store.get_batch_header(parent_hash).await? else {
        return Ok(Err(InvalidBatch::UnknownParent { number: batch.number(), parent_hash }))
    };
    if parent.number.checked_add(1) != Some(batch.number()) {
        return Ok(Err(InvalidBatch::NonMonotonic {
            number: batch.number(),
            parent_number: parent.number,
        }))
    }
    Ok(Ok(()))
}
