//! End-to-end scenarios of the data plane, driving full nodes through the mock L1 and peer
//! network.

use obscuro_db::{keys, test_utils::setup_test_store, HeadUpdate};
use obscuro_node::ExitStatus;
use obscuro_primitives::test_utils::{batch_chain, child_of};
use obscuro_providers::test_utils::MockL1Client;
use obscuro_wire::test_utils::MockNetwork;
use tests::{eventually, publish_rollup, spawn_node};

#[tokio::test]
async fn test_genesis_rollup_is_accepted() -> eyre::Result<()> {
    let l1 = MockL1Client::new();
    let store = setup_test_store().await;
    let node = spawn_node(&MockNetwork::new(), "validator", &l1, store.clone(), &[]).await?;

    // the genesis rollup lands in L1 block 100.
    let chain = batch_chain(1);
    l1.mine_empty(99);
    let block = publish_rollup(&l1, &chain)?;
    assert_eq!(block.number, 100);

    let handle = &node.handle;
    eventually("genesis rollup", move || async move {
        Ok(handle.rollup_head().await.is_ok_and(|head| head.number == 0))
    })
    .await?;

    assert_eq!(store.get_head_batch_hash().await?, Some(chain[0].hash()));
    assert_eq!(store.get_batch_hash_by_number(0).await?, Some(chain[0].hash()));
    eventually("healthy node", move || async move { Ok(handle.health().await?.overall_health) })
        .await?;

    node.handle.shutdown()?;
    assert_eq!(node.wait().await, ExitStatus::Clean);
    Ok(())
}

#[tokio::test]
async fn test_rollups_extend_the_chain() -> eyre::Result<()> {
    let l1 = MockL1Client::new();
    let store = setup_test_store().await;
    let node = spawn_node(&MockNetwork::new(), "validator", &l1, store.clone(), &[]).await?;

    let chain = batch_chain(4);
    let genesis = publish_rollup(&l1, &chain[..1])?;
    let extension = publish_rollup(&l1, &chain[1..])?;
    assert!(extension.number > genesis.number);

    let handle = &node.handle;
    eventually("extension rollup", move || async move {
        Ok(handle.rollup_head().await.is_ok_and(|head| head.number == 3))
    })
    .await?;

    let head = store.get_head_batch_header().await?.ok_or_else(|| eyre::eyre!("no head"))?;
    assert_eq!(head.number, 3);
    assert_eq!(head.hash_slow(), chain[3].hash());
    assert!(store.get_rollup_hash_by_number(0).await?.is_some());
    assert!(store.get_rollup_hash_by_number(3).await?.is_some());
    for batch in &chain {
        assert_eq!(store.get_batch_by_number(batch.number()).await?.as_ref(), Some(batch));
    }

    node.handle.shutdown()?;
    node.wait().await;
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_rollup_is_completed_from_peers() -> eyre::Result<()> {
    let l1 = MockL1Client::new();
    let network = MockNetwork::new();
    let chain = batch_chain(8);

    // a peer already holding the whole batch chain.
    let server_store = setup_test_store().await;
    for batch in &chain {
        server_store.add_batch(batch).await?;
    }
    let server = spawn_node(&network, "server", &l1, server_store, &[]).await?;

    let store = setup_test_store().await;
    let validator = spawn_node(&network, "validator", &l1, store.clone(), &["server"]).await?;

    // batches 1..=4 are only ever published by peers.
    publish_rollup(&l1, &chain[..1])?;
    publish_rollup(&l1, &chain[5..])?;

    let handle = &validator.handle;
    eventually("quarantined rollup replayed", move || async move {
        Ok(handle.rollup_head().await.is_ok_and(|head| head.number == 7))
    })
    .await?;

    assert_eq!(store.get_head_batch_hash().await?, Some(chain[7].hash()));
    for batch in &chain[1..5] {
        assert_eq!(store.get_batch_hash_by_number(batch.number()).await?, Some(batch.hash()));
    }

    validator.handle.shutdown()?;
    server.handle.shutdown()?;
    validator.wait().await;
    server.wait().await;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_duplicate_appends_advance_once() -> eyre::Result<()> {
    let store = setup_test_store().await;
    let chain = batch_chain(10);
    for batch in &chain {
        store.add_batch(batch).await?;
    }

    let batch = child_of(&chain[9]);
    assert_eq!(batch.number(), 10);
    let (first, second) = tokio::join!(store.add_batch(&batch), store.add_batch(&batch));
    let mut updates = [first?, second?];
    updates.sort_by_key(HeadUpdate::is_advanced);
    assert_eq!(updates, [HeadUpdate::Retained, HeadUpdate::Advanced]);

    assert_eq!(store.get_head_batch_hash().await?, Some(batch.hash()));
    assert!(store.database().has(&keys::batch_header(&batch.hash())).await?);
    assert_eq!(store.get_batch_hash_by_number(10).await?, Some(batch.hash()));

    Ok(())
}

#[tokio::test]
async fn test_sibling_batches_keep_first_committed() -> eyre::Result<()> {
    let store = setup_test_store().await;
    let chain = batch_chain(10);
    for batch in &chain {
        store.add_batch(batch).await?;
    }

    let a = child_of(&chain[9]);
    let b = child_of(&chain[9]);
    assert_ne!(a.hash(), b.hash());

    assert_eq!(store.add_batch(&a).await?, HeadUpdate::Advanced);
    assert_eq!(store.add_batch(&b).await?, HeadUpdate::Retained);

    assert_eq!(store.get_batch_hash_by_number(10).await?, Some(a.hash()));
    assert_eq!(store.get_head_batch_hash().await?, Some(a.hash()));
    assert_eq!(store.get_batch(a.hash()).await?, Some(a));
    assert_eq!(store.get_batch(b.hash()).await?, Some(b));

    Ok(())
}

#[tokio::test]
async fn test_restart_resumes_from_processed_block() -> eyre::Result<()> {
    let l1 = MockL1Client::new();
    let store = setup_test_store().await;
    let chain = batch_chain(6);

    let node = spawn_node(&MockNetwork::new(), "validator", &l1, store.clone(), &[]).await?;
    let published = publish_rollup(&l1, &chain[..3])?.number;
    let (handle, store_ref) = (&node.handle, &store);
    eventually("first rollup", move || async move {
        let processed = store_ref.get_l1_processed().await?;
        let stored = handle.rollup_head().await.is_ok_and(|head| head.number == 2);
        Ok(stored && processed.is_some_and(|block| block.number >= published))
    })
    .await?;

    node.cancellation.cancel();
    assert_eq!(node.wait().await, ExitStatus::Clean);
    let processed = store.get_l1_processed().await?.ok_or_else(|| eyre::eyre!("not processed"))?;
    let head = store.get_head_batch_header().await?.ok_or_else(|| eyre::eyre!("no head"))?;
    assert_eq!(head.number, 2);

    // the node comes back over the same store while the L1 moved on.
    publish_rollup(&l1, &chain[3..])?;
    let node = spawn_node(&MockNetwork::new(), "validator", &l1, store.clone(), &[]).await?;

    assert!(store.get_l1_processed().await?.is_some_and(|block| block.number >= processed.number));
    assert!(store.get_head_batch_header().await?.is_some_and(|h| h.number >= head.number));

    let handle = &node.handle;
    eventually("resumed ingestion", move || async move {
        Ok(handle.rollup_head().await.is_ok_and(|head| head.number == 5))
    })
    .await?;
    eventually("healthy node", move || async move { Ok(handle.health().await?.overall_health) })
        .await?;
    assert_eq!(store.get_head_batch_hash().await?, Some(chain[5].hash()));

    node.handle.shutdown()?;
    assert_eq!(node.wait().await, ExitStatus::Clean);
    Ok(())
}
