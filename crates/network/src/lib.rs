//! The sync service: peer-to-peer catch-up of the batch chain.
//!
//! The [`SyncService`] answers [`obscuro_wire::BatchRequest`]s from the local store and imports
//! the batches peers send back, one by one. Outstanding requests are bounded per peer by a window
//! of slots; a [`SyncHandle`] waits for a free slot before issuing a request. Peers returning
//! batches that do not extend the local chain collect strikes and are blacklisted for a cooldown.

mod config;
pub use config::{SyncConfig, DEFAULT_FORK_DEPTH, DEFAULT_MAX_RANGE, DEFAULT_WINDOW};

mod error;
pub use error::{InvalidBatch, SyncError};

mod event;
pub use event::SyncEvent;

mod handle;
pub use handle::{SyncCommand, SyncHandle};

mod import;
pub use import::{import_batches, ImportOutcome};

mod manager;
pub use manager::SyncService;

mod metrics;
pub use metrics::SyncMetrics;

mod peers;
pub use peers::{PeerBook, PeerState};

mod serve;
pub use serve::serve_batch_request;

#[cfg(test)]
mod tests {
    use super::*;
    use obscuro_db::{test_utils::setup_test_store, HeaderStore};
    use obscuro_primitives::{
        test_utils::{batch_chain, batch_chain_from, child_of},
        ExtBatch,
    };
    use obscuro_wire::{
        test_utils::MockNetwork,
        BatchResponse, PeerId, PeerTransport, WireMessage,
    };
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_util::sync::CancellationToken;

    fn config(local: &str, peers: &[&str]) -> SyncConfig {
        SyncConfig {
            local: local.into(),
            peers: peers.iter().map(|p| PeerId::from(*p)).collect(),
            max_range: 4,
            window: 2,
            request_timeout: Duration::from_millis(200),
            blacklist_strikes: 2,
            ..Default::default()
        }
    }

    fn spawn(
        network: &MockNetwork,
        local: &str,
        peers: &[&str],
        store: HeaderStore,
        cancellation: &CancellationToken,
    ) -> (SyncHandle, UnboundedReceiver<SyncEvent>) {
        let (transport, inbound) = network.join(local);
        let (handle, events, _) = SyncService::spawn(
            transport,
            store,
            config(local, peers),
            inbound,
            cancellation.clone(),
        );
        (handle, events)
    }

    async fn next_event(events: &mut UnboundedReceiver<SyncEvent>) -> SyncEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("service running")
    }

    #[tokio::test]
    async fn test_catch_up_across_multiple_responses() -> eyre::Result<()> {
        let network = MockNetwork::new();
        let cancellation = CancellationToken::new();
        let chain = batch_chain(10);

        let serving = setup_test_store().await;
        for batch in &chain {
            serving.add_batch(batch).await?;
        }
        let _serving = spawn(&network, "a", &[], serving, &cancellation);

        let store = setup_test_store().await;
        store.add_batch(&chain[0]).await?;
        let (handle, mut events) = spawn(&network, "b", &["a"], store.clone(), &cancellation);

        let peer = handle.catch_up(Some(chain[0].hash())).await?;
        assert_eq!(peer, PeerId::from("a"));

        let mut applied = 0;
        while applied < 9 {
            match next_event(&mut events).await {
                SyncEvent::BatchesImported { applied: count, .. } => applied += count,
                event => panic!("unexpected event {event:?}"),
            }
        }
        assert_eq!(store.get_head_batch_hash().await?, Some(chain[9].hash()));
        assert_eq!(handle.in_flight(&peer), 0);

        cancellation.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_announced_batch_is_imported() -> eyre::Result<()> {
        let network = MockNetwork::new();
        let cancellation = CancellationToken::new();
        let chain = batch_chain(2);

        let sequencer_store = setup_test_store().await;
        sequencer_store.add_batch(&chain[0]).await?;
        let (sequencer, _) =
            spawn(&network, "sequencer", &["validator"], sequencer_store, &cancellation);

        let store = setup_test_store().await;
        store.add_batch(&chain[0]).await?;
        let (_, mut events) =
            spawn(&network, "validator", &["sequencer"], store.clone(), &cancellation);

        sequencer.announce_batch(chain[1].clone())?;
        assert_eq!(
            next_event(&mut events).await,
            SyncEvent::BatchesImported { peer: "sequencer".into(), applied: 1, head_advanced: true }
        );
        assert_eq!(store.get_head_batch_hash().await?, Some(chain[1].hash()));

        cancellation.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_window_blocks_until_request_times_out() -> eyre::Result<()> {
        let network = MockNetwork::new();
        let cancellation = CancellationToken::new();
        // the silent peer never answers.
        let (_silent, _silent_inbound) = network.join("silent");
        let (handle, mut events) =
            spawn(&network, "b", &["silent"], setup_test_store().await, &cancellation);
        let peer = PeerId::from("silent");

        handle.request_batches(peer.clone(), None).await?;
        handle.request_batches(peer.clone(), None).await?;
        assert_eq!(handle.in_flight(&peer), 2);

        // the third request waits for the first one to time out.
        let third = tokio::time::timeout(Duration::from_millis(50), handle.request_batches(peer.clone(), None));
        assert!(third.await.is_err());
        handle.request_batches(peer.clone(), None).await?;

        assert_eq!(next_event(&mut events).await, SyncEvent::RequestFailed(peer));
        assert!(handle.longest_unreachable().is_some());

        cancellation.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_inconsistent_peer_is_blacklisted() -> eyre::Result<()> {
        let network = MockNetwork::new();
        let cancellation = CancellationToken::new();
        let (evil, mut evil_inbound) = network.join("evil");
        let store = setup_test_store().await;
        let genesis = batch_chain(1).remove(0);
        store.add_batch(&genesis).await?;
        let (handle, mut events) = spawn(&network, "b", &["evil"], store, &cancellation);
        let peer = PeerId::from("evil");

        for _ in 0..2 {
            handle.request_batches(peer.clone(), Some(genesis.hash())).await?;
            let request = evil_inbound.recv().await.expect("request");
            assert!(matches!(
                WireMessage::decode(&mut request.frame.as_ref())?,
                WireMessage::BatchRequest(_)
            ));

            // a run whose second batch skips a height.
            let first = child_of(&genesis);
            let (mut header, hashes, blob) = child_of(&child_of(&first)).into_parts();
            header.parent_hash = first.hash();
            let gap = ExtBatch::new(header, hashes, blob);
            evil.send_message(&"b".into(), &BatchResponse { batches: vec![first, gap] }.into())
                .await?;

            assert!(matches!(next_event(&mut events).await, SyncEvent::BatchesImported { applied: 1, .. }));
            assert!(matches!(
                next_event(&mut events).await,
                SyncEvent::BatchRefused { reason: InvalidBatch::NonMonotonic { number: 3, .. }, .. }
            ));
        }

        assert_eq!(next_event(&mut events).await, SyncEvent::PeerBlacklisted(peer.clone()));
        assert!(matches!(handle.request_batches(peer, None).await, Err(SyncError::Blacklisted(_))));

        cancellation.cancel();
        Ok(())
    }

    #[tokio::test]
    async fn test_unsolicited_response_is_dropped() -> eyre::Result<()> {
        let network = MockNetwork::new();
        let cancellation = CancellationToken::new();
        let (evil, _evil_inbound) = network.join("evil");
        let store = setup_test_store().await;
        let (handle, mut events) = spawn(&network, "b", &["evil"], store.clone(), &cancellation);

        let chain = batch_chain_from(batch_chain(1).remove(0), 2);
        evil.send_message(&"b".into(), &BatchResponse { batches: chain }.into()).await?;
        evil.send(&"b".into(), vec![0xff].into()).await?;

        assert!(tokio::time::timeout(Duration::from_millis(100), events.recv()).await.is_err());
        assert_eq!(store.get_head_batch_hash().await?, None);
        assert_eq!(handle.in_flight(&"evil".into()), 0);

        cancellation.cancel();
        Ok(())
    }

}
