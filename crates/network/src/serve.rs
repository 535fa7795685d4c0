use crate::SyncError;

use alloy_primitives::B256;
use obscuro_db::HeaderStore;
use obscuro_primitives::BatchHeader;
use obscuro_wire::{BatchRequest, BatchResponse, NoCommonAncestor, WireMessage};
use std::collections::HashMap;

/// Answers a batch request from the local store.
///
/// The response follows the chain ending at the local head batch, walked back by parent hash. It
/// starts at the successor of the requester's head, or at genesis if the requester has nothing,
/// and is capped at `max_range` batches. A requester head off that chain is walked back along its
/// branch, at most `fork_depth` batches, to the first ancestor on the chain.
pub async fn serve_batch_request(
    store: &HeaderStore,
    request: &BatchRequest,
    max_range: usize,
    fork_depth: u64,
) -> Result<WireMessage, SyncError> {
    let Some(head) = store.get_head_batch_header().await? else {
        return Ok(BatchResponse::default().into())
    };
    let mut chain = HeadChain::new(head.hash_slow(), head);

    let start = match request.current_head {
        None => 0,
        Some(hash) => match common_ancestor(store, &mut chain, hash, fork_depth).await? {
            Some(ancestor) => match ancestor.checked_add(1) {
                Some(start) => start,
                None => return Ok(BatchResponse::default().into()),
            },
            None => {
                tracing::debug!(target: "obscuro::network", requester = %request.requester, %hash, "No common ancestor");
                return Ok(NoCommonAncestor { head: hash }.into())
            }
        },
    };

    let mut batches = Vec::new();
    let mut number = start;
    while number <= chain.head_number() && batches.len() < max_range {
        let Some(hash) = chain.hash_at(store, number).await? else { break };
        let Some(batch) = store.get_batch(hash).await? else { break };
        batches.push(batch);
        number += 1;
    }

    tracing::trace!(target: "obscuro::network", requester = %request.requester, start, count = batches.len(), "Serving batches");
    Ok(BatchResponse { batches }.into())
}

/// The ancestry of the head batch, read lazily from the head down.
#[derive(Debug)]
struct HeadChain {
    head_number: u64,
    /// The lowest header walked so far and its hash.
    cursor: (B256, BatchHeader),
    hashes: HashMap<u64, B256>,
}

impl HeadChain {
    fn new(hash: B256, head: BatchHeader) -> Self {
        let hashes = HashMap::from([(head.number, hash)]);
        Self { head_number: head.number, cursor: (hash, head), hashes }
    }

    const fn head_number(&self) -> u64 {
        self.head_number
    }

    /// Returns the hash of the head's ancestor at `number`, or `None` above the head or below a
    /// missing parent.
    async fn hash_at(&mut self, store: &HeaderStore, number: u64) -> Result<Option<B256>, SyncError> {
        if number > self.head_number {
            return Ok(None)
        }
        while self.cursor.1.number > number && !self.cursor.1.is_genesis() {
            let parent_hash = self.cursor.1.parent_hash;
            let Some(parent) = store.get_batch_header(parent_hash).await? else { break };
            self.hashes.insert(parent.number, parent_hash);
            self.cursor = (parent_hash, parent);
        }
        Ok(self.hashes.get(&number).copied())
    }
}

/// Returns the height of the first batch on the head's chain along the branch ending at `hash`,
/// walking at most `fork_depth` batches back. Returns `None` if the branch is unknown or diverges
/// deeper.
async fn common_ancestor(
    store: &HeaderStore,
    chain: &mut HeadChain,
    hash: B256,
    fork_depth: u64,
) -> Result<Option<u64>, SyncError> {
    let mut current = hash;
    for _ in 0..=fork_depth {
        let Some(header) = store.get_batch_header(current).await? else { return Ok(None) };
        if chain.hash_at(store, header.number).await? == Some(current) {
            return Ok(Some(header.number))
        }
        if header.is_genesis() {
            return Ok(None)
        }
        current = header.parent_hash;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscuro_db::test_utils::setup_test_store;
    use obscuro_primitives::test_utils::{batch_chain, batch_chain_from, child_of};
    use obscuro_wire::PeerId;

    fn request(current_head: Option<B256>) -> BatchRequest {
        BatchRequest { requester: PeerId::new("peer"), current_head }
    }

    fn batches(message: WireMessage) -> Vec<u64> {
        match message {
            WireMessage::BatchResponse(response) => {
                response.batches.iter().map(|b| b.number()).collect()
            }
            message => panic!("expected a batch response, got {message:?}"),
        }
    }

    #[tokio::test]
    async fn test_serves_from_genesis_capped() -> eyre::Result<()> {
        let store = setup_test_store().await;
        assert_eq!(batches(serve_batch_request(&store, &request(None), 8, 8).await?), Vec::<u64>::new());

        for batch in batch_chain(6) {
            store.add_batch(&batch).await?;
        }
        let served = serve_batch_request(&store, &request(None), 4, 8).await?;
        assert_eq!(batches(served), vec![0, 1, 2, 3]);

        Ok(())
    }

    #[tokio::test]
    async fn test_serves_successors_of_canonical_head() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let chain = batch_chain(6);
        for batch in &chain {
            store.add_batch(batch).await?;
        }

        let served = serve_batch_request(&store, &request(Some(chain[2].hash())), 64, 8).await?;
        assert_eq!(batches(served), vec![3, 4, 5]);

        let served = serve_batch_request(&store, &request(Some(chain[5].hash())), 64, 8).await?;
        assert_eq!(batches(served), Vec::<u64>::new());

        Ok(())
    }

    #[tokio::test]
    async fn test_serves_suffix_from_common_ancestor() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let chain = batch_chain(6);
        for batch in &chain {
            store.add_batch(batch).await?;
        }
        // the requester followed a fork of two batches from height 2.
        let fork = batch_chain_from(child_of(&chain[1]), 1);
        for batch in &fork {
            store.add_batch(batch).await?;
        }

        let served = serve_batch_request(&store, &request(Some(fork[1].hash())), 64, 8).await?;
        assert_eq!(batches(served), vec![2, 3, 4, 5]);

        // the ancestor lies deeper than the search.
        let served = serve_batch_request(&store, &request(Some(fork[1].hash())), 64, 1).await?;
        assert_eq!(served, NoCommonAncestor { head: fork[1].hash() }.into());

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_head_has_no_common_ancestor() -> eyre::Result<()> {
        let store = setup_test_store().await;
        store.add_batch(&batch_chain(1)[0]).await?;

        let unknown = B256::repeat_byte(7);
        let served = serve_batch_request(&store, &request(Some(unknown)), 64, 8).await?;
        assert_eq!(served, NoCommonAncestor { head: unknown }.into());

        Ok(())
    }

    #[tokio::test]
    async fn test_serves_the_head_chain_across_sibling_heights() -> eyre::Result<()> {
        let store = setup_test_store().await;
        let chain = batch_chain(6);
        for batch in &chain {
            store.add_batch(batch).await?;
        }
        // a longer branch from height 2 takes the head while the lower heights keep their first
        // stored batch.
        let branch = batch_chain_from(child_of(&chain[1]), 4);
        for batch in &branch {
            store.add_batch(batch).await?;
        }
        assert_eq!(store.get_head_batch_hash().await?, Some(branch[4].hash()));
        assert_eq!(store.get_batch_hash_by_number(3).await?, Some(chain[3].hash()));

        let served = serve_batch_request(&store, &request(Some(chain[1].hash())), 64, 8).await?;
        let WireMessage::BatchResponse(response) = served else { panic!("expected batches") };
        let hashes = response.batches.iter().map(|b| b.hash()).collect::<Vec<_>>();
        assert_eq!(hashes, branch.iter().map(|b| b.hash()).collect::<Vec<_>>());

        // a requester on the abandoned branch gets the suffix from the fork point.
        let served = serve_batch_request(&store, &request(Some(chain[5].hash())), 2, 8).await?;
        let WireMessage::BatchResponse(response) = served else { panic!("expected batches") };
        let hashes = response.batches.iter().map(|b| b.hash()).collect::<Vec<_>>();
        assert_eq!(hashes, vec![branch[0].hash(), branch[1].hash()]);

        Ok(())
    }
}
