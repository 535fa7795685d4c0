use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use jsonrpsee::{
    core::{RpcResult, SubscriptionResult},
    proc_macros::rpc,
    server::{Server, ServerHandle, SubscriptionMessage},
    types::ErrorObjectOwned,
    PendingSubscriptionSink, RpcModule,
};
use obscuro_db::{DatabaseError, HeaderStore};
use obscuro_manager::{HealthStatus, NodeManagerError, NodeManagerHandle};
use obscuro_primitives::{
    BatchHeader, ErrorKind, ExtBatch, ExtRollup, L1BlockHeader, RollupHeader,
};
use obscuro_wire::{PeerApiHandler, PeerApiServer};
use std::net::SocketAddr;

/// Returns the JSON-RPC error object of the kind.
fn rpc_error(kind: ErrorKind, message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(kind.code(), message.into(), Some(kind))
}

fn manager_error(err: NodeManagerError) -> ErrorObjectOwned {
    rpc_error(err.kind(), err.to_string())
}

fn database_error(err: DatabaseError) -> ErrorObjectOwned {
    rpc_error(err.kind(), err.to_string())
}

fn not_found(what: impl std::fmt::Display) -> ErrorObjectOwned {
    rpc_error(ErrorKind::NotFound, format!("{what} not found"))
}

/// The `obscuro` JSON-RPC namespace.
///
/// Every error carries the code of its [`ErrorKind`] and the kind itself as data:
/// ```json
/// {"code": -32002, "message": "node not ready: no rollup observed yet", "data": "NOT_READY"}
/// ```
#[rpc(server, namespace = "obscuro")]
pub trait ObscuroApi {
    /// Returns the health of the node.
    #[method(name = "health")]
    async fn health(&self) -> RpcResult<HealthStatus>;

    /// Returns the current L1 head.
    #[method(name = "getCurrentBlockHead")]
    async fn get_current_block_head(&self) -> RpcResult<L1BlockHeader>;

    /// Returns the header of the head rollup.
    #[method(name = "getCurrentRollupHead")]
    async fn get_current_rollup_head(&self) -> RpcResult<RollupHeader>;

    /// Returns the rollup with the provided hash.
    #[method(name = "getRollup")]
    async fn get_rollup(&self, hash: B256) -> RpcResult<ExtRollup>;

    /// Returns the header of the head batch.
    #[method(name = "getCurrentBatchHead")]
    async fn get_current_batch_head(&self) -> RpcResult<BatchHeader>;

    /// Returns the batch with the provided hash.
    #[method(name = "getBatch")]
    async fn get_batch(&self, hash: B256) -> RpcResult<ExtBatch>;

    /// Returns the canonical batch at the provided height.
    #[method(name = "getBatchByNumber")]
    async fn get_batch_by_number(&self, number: u64) -> RpcResult<ExtBatch>;

    /// Submits an encrypted transaction to the enclave and returns its hash.
    #[method(name = "sendRawTransaction")]
    async fn send_raw_transaction(&self, ciphertext: Bytes) -> RpcResult<B256>;

    /// Streams the encrypted log events matching the encrypted subscription.
    #[subscription(name = "logs", unsubscribe = "unsubscribeLogs", item = Bytes)]
    async fn logs(&self, subscription: Bytes) -> SubscriptionResult;
}

/// The implementation of the `obscuro` namespace.
#[derive(Debug, Clone)]
pub struct ObscuroRpc {
    handle: NodeManagerHandle,
    store: HeaderStore,
}

impl ObscuroRpc {
    /// Returns a new [`ObscuroRpc`].
    pub const fn new(handle: NodeManagerHandle, store: HeaderStore) -> Self {
        Self { handle, store }
    }
}

#[async_trait]
impl ObscuroApiServer for ObscuroRpc {
    async fn health(&self) -> RpcResult<HealthStatus> {
        self.handle.health().await.map_err(manager_error)
    }

    async fn get_current_block_head(&self) -> RpcResult<L1BlockHeader> {
        self.handle.l1_head().await.map_err(manager_error)
    }

    async fn get_current_rollup_head(&self) -> RpcResult<RollupHeader> {
        self.handle.rollup_head().await.map_err(manager_error)
    }

    async fn get_rollup(&self, hash: B256) -> RpcResult<ExtRollup> {
        self.store
            .get_rollup(hash)
            .await
            .map_err(database_error)?
            .ok_or_else(|| not_found(format_args!("rollup {hash}")))
    }

    async fn get_current_batch_head(&self) -> RpcResult<BatchHeader> {
        self.handle
            .batch_head()
            .await
            .map_err(manager_error)?
            .ok_or_else(|| manager_error(NodeManagerError::NotReady))
    }

    async fn get_batch(&self, hash: B256) -> RpcResult<ExtBatch> {
        self.store
            .get_batch(hash)
            .await
            .map_err(database_error)?
            .ok_or_else(|| not_found(format_args!("batch {hash}")))
    }

    async fn get_batch_by_number(&self, number: u64) -> RpcResult<ExtBatch> {
        self.store
            .get_batch_by_number(number)
            .await
            .map_err(database_error)?
            .ok_or_else(|| not_found(format_args!("batch {number}")))
    }

    async fn send_raw_transaction(&self, ciphertext: Bytes) -> RpcResult<B256> {
        self.handle.send_raw_transaction(ciphertext).await.map_err(manager_error)
    }

    async fn logs(
        &self,
        pending: PendingSubscriptionSink,
        subscription: Bytes,
    ) -> SubscriptionResult {
        let mut subscription = match self.handle.subscribe_logs(subscription).await {
            Ok(subscription) => subscription,
            Err(err) => {
                pending.reject(manager_error(err)).await;
                return Ok(())
            }
        };
        let sink = pending.accept().await?;
        let handle = self.handle.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // dropped by the client
                    _ = sink.closed() => break,
                    log = subscription.logs.recv() => {
                        // terminated by the enclave
                        let Some(log) = log else { break };
                        let msg = match SubscriptionMessage::new(
                            sink.method_name(),
                            sink.subscription_id(),
                            &log,
                        ) {
                            Ok(msg) => msg,
                            Err(err) => {
                                tracing::error!(target: "obscuro::rpc", %err, "Failed to serialize log event");
                                break
                            }
                        };
                        if sink.send(msg).await.is_err() {
                            break
                        }
                    }
                }
            }

            let id = subscription.id;
            if let Err(err) = handle.unsubscribe_logs(id.clone()).await {
                tracing::debug!(target: "obscuro::rpc", %id, %err, "Subscription already terminated");
            }
        });

        Ok(())
    }
}

/// Starts the JSON-RPC server serving the `obscuro` namespace and the peer endpoint.
pub async fn start_rpc_server(
    addr: SocketAddr,
    rpc: ObscuroRpc,
    peer: PeerApiHandler,
) -> eyre::Result<(SocketAddr, ServerHandle)> {
    let mut module = RpcModule::new(());
    module.merge(rpc.into_rpc())?;
    module.merge(peer.into_rpc())?;

    let server = Server::builder().build(addr).await?;
    let addr = server.local_addr()?;
    tracing::info!(target: "obscuro::rpc", %addr, "RPC server started");

    Ok((addr, server.start(module)))
}
