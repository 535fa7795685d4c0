//! Integration tests of the L1 watcher against an in-memory L1.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_sol_types::SolCall;
use obscuro_db::test_utils::setup_test_store;
use obscuro_l1::{abi::transferCall, L1RollupTx, L1Tx, ManagementContract};
use obscuro_primitives::{test_utils::batch_chain, ExtRollup, L1Transaction};
use obscuro_providers::test_utils::MockL1Client;
use obscuro_watcher::{L1Notification, L1Watcher, L1WatcherConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MANAGEMENT: Address = Address::repeat_byte(0xaa);
const TOKEN: Address = Address::repeat_byte(0xbb);

fn contract() -> ManagementContract {
    ManagementContract::new(MANAGEMENT, [TOKEN])
}

fn config() -> L1WatcherConfig {
    L1WatcherConfig { poll_interval: Duration::from_millis(1), ..Default::default() }
}

fn call(to: Address, input: Bytes) -> L1Transaction {
    L1Transaction { hash: keccak256(&input), from: Address::repeat_byte(0x11), to: Some(to), input }
}

#[tokio::test]
async fn test_classifies_management_transactions() -> eyre::Result<()> {
    let client = MockL1Client::new();
    let rollup = ExtRollup::from_batches(batch_chain(2), Default::default()).unwrap();
    let publication = L1RollupTx::new(&rollup);
    let deposit = transferCall { to: MANAGEMENT, amount: U256::from(5) }.abi_encode();

    client.mine(vec![
        call(MANAGEMENT, publication.calldata()),
        call(MANAGEMENT, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef, 0x00])),
        call(TOKEN, deposit.into()),
        call(Address::repeat_byte(0x01), Bytes::new()),
    ]);

    let store = setup_test_store().await;
    let cancellation = CancellationToken::new();
    let (mut rx, handle) =
        L1Watcher::spawn(client.clone(), store, contract(), config(), cancellation.clone()).await?;

    let mut rollups = Vec::new();
    let mut enclave = Vec::new();
    while let Some(notification) = rx.recv().await {
        match (*notification).clone() {
            L1Notification::RollupPublished { tx, .. } => rollups.push(tx),
            L1Notification::EnclaveTransaction { kind, .. } => enclave.push(kind),
            L1Notification::Synced => break,
            _ => {}
        }
    }
    cancellation.cancel();
    handle.await??;

    assert_eq!(rollups, vec![publication.clone()]);
    assert_eq!(rollups[0].decode_rollup()?, rollup);
    assert_eq!(enclave.len(), 1);
    assert!(matches!(enclave[0], L1Tx::Deposit(ref deposit) if deposit.amount == U256::from(5)));

    Ok(())
}

#[tokio::test]
async fn test_restart_resumes_after_processed_block() -> eyre::Result<()> {
    let client = MockL1Client::new();
    client.mine_empty(5);
    let store = setup_test_store().await;

    let cancellation = CancellationToken::new();
    let (mut rx, handle) = L1Watcher::spawn(
        client.clone(),
        store.clone(),
        contract(),
        config(),
        cancellation.clone(),
    )
    .await?;
    while let Some(notification) = rx.recv().await {
        match *notification {
            L1Notification::Processed(block) => store.set_l1_processed(block).await?,
            L1Notification::Synced => break,
            _ => {}
        }
    }
    cancellation.cancel();
    handle.await??;
    assert_eq!(store.get_l1_processed().await?.map(|b| b.number), Some(5));

    // restart with new L1 blocks.
    client.mine_empty(2);
    let cancellation = CancellationToken::new();
    let (mut rx, handle) =
        L1Watcher::spawn(client.clone(), store.clone(), contract(), config(), cancellation.clone())
            .await?;

    let mut processed = Vec::new();
    while let Some(notification) = rx.recv().await {
        match *notification {
            L1Notification::Processed(block) => processed.push(block.number),
            L1Notification::Synced => break,
            _ => {}
        }
    }
    cancellation.cancel();
    handle.await??;

    assert_eq!(processed, vec![6, 7]);

    Ok(())
}

#[tokio::test]
async fn test_unacknowledged_block_is_read_again_after_restart() -> eyre::Result<()> {
    let client = MockL1Client::new();
    client.mine_empty(3);
    let rollup = ExtRollup::from_batches(batch_chain(1), Default::default()).unwrap();
    let publication = L1RollupTx::new(&rollup);
    let block = client.mine(vec![call(MANAGEMENT, publication.calldata())]);
    let store = setup_test_store().await;

    // the consumer acknowledges the empty blocks, then stops before storing the rollup.
    let (mut watcher, mut rx) =
        L1Watcher::new(client.clone(), store.clone(), contract(), config()).await?;
    assert!(watcher.step().await?);
    assert_eq!(watcher.last_processed().map(|b| b.number), Some(block.number));
    while let Ok(notification) = rx.try_recv() {
        match *notification {
            L1Notification::Processed(processed) if processed.number < block.number => {
                store.set_l1_processed(processed).await?
            }
            L1Notification::RollupPublished { .. } => break,
            _ => {}
        }
    }
    drop(rx);
    drop(watcher);
    assert_eq!(store.get_l1_processed().await?.map(|b| b.number), Some(block.number - 1));

    // the restarted watcher emits the publication again.
    let (mut watcher, mut rx) =
        L1Watcher::new(client.clone(), store.clone(), contract(), config()).await?;
    assert_eq!(watcher.next_block(), block.number);
    assert!(watcher.step().await?);

    let mut rollups = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let L1Notification::RollupPublished { block: included, tx } = (*notification).clone() {
            assert_eq!(included.number, block.number);
            rollups.push(tx);
        }
    }
    assert_eq!(rollups, vec![publication]);

    Ok(())
}
