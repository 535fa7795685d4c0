use crate::{PeerId, WireError, WireMessage};

use alloy_primitives::Bytes;
use jsonrpsee::{
    core::{async_trait, RpcResult},
    proc_macros::rpc,
    ws_client::{WsClient, WsClientBuilder},
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;

/// The capacity of the inbound frame channel.
pub const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// A frame received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// The sending peer.
    pub peer: PeerId,
    /// The raw frame.
    pub frame: Bytes,
}

/// Delivers frames to peers.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait PeerTransport: Send + Sync {
    /// Sends a frame to the peer.
    async fn send(&self, peer: &PeerId, frame: Bytes) -> Result<(), WireError>;

    /// Encodes the message and sends it to the peer.
    async fn send_message(&self, peer: &PeerId, message: &WireMessage) -> Result<(), WireError> {
        self.send(peer, message.encoded().freeze().into()).await
    }
}

/// The JSON-RPC interface hosts use to exchange frames.
#[rpc(client, server, namespace = "obscuro")]
pub trait PeerApi {
    /// Delivers a frame sent by `from`.
    #[method(name = "peerMessage")]
    async fn peer_message(&self, from: PeerId, frame: Bytes) -> RpcResult<()>;
}

/// Forwards the frames received over JSON-RPC to the sync service.
#[derive(Debug, Clone)]
pub struct PeerApiHandler {
    inbound: mpsc::Sender<InboundFrame>,
}

impl PeerApiHandler {
    /// Returns a new handler along with the receiving half of the inbound frame channel.
    pub fn new() -> (Self, mpsc::Receiver<InboundFrame>) {
        let (inbound, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        (Self { inbound }, rx)
    }
}

#[async_trait]
impl PeerApiServer for PeerApiHandler {
    async fn peer_message(&self, from: PeerId, frame: Bytes) -> RpcResult<()> {
        if self.inbound.send(InboundFrame { peer: from, frame }).await.is_err() {
            tracing::debug!(target: "obscuro::wire", "Sync service stopped, dropping frame");
        }
        Ok(())
    }
}

/// A [`PeerTransport`] reaching peers through their JSON-RPC endpoint. The peer id is the
/// websocket url of the peer.
#[derive(Debug, Clone)]
pub struct RpcPeerTransport {
    /// The identity of the local host, attached to every frame.
    local: PeerId,
    /// The open connections, by peer.
    connections: Arc<Mutex<HashMap<PeerId, Arc<WsClient>>>>,
}

impl RpcPeerTransport {
    /// Returns a new transport for the local host.
    pub fn new(local: PeerId) -> Self {
        Self { local, connections: Default::default() }
    }

    async fn connection(&self, peer: &PeerId) -> Result<Arc<WsClient>, WireError> {
        if let Some(client) = self.connections.lock().get(peer).filter(|c| c.is_connected()) {
            return Ok(client.clone())
        }

        let client = WsClientBuilder::default()
            .build(peer.as_str())
            .await
            .map_err(|err| unreachable(peer, err))?;
        let client = Arc::new(client);
        self.connections.lock().insert(peer.clone(), client.clone());
        tracing::debug!(target: "obscuro::wire", %peer, "Connected to peer");
        Ok(client)
    }
}

#[async_trait::async_trait]
impl PeerTransport for RpcPeerTransport {
    async fn send(&self, peer: &PeerId, frame: Bytes) -> Result<(), WireError> {
        let client = self.connection(peer).await?;
        let res = client.peer_message(self.local.clone(), frame).await;
        if let Err(err) = res {
            self.connections.lock().remove(peer);
            return Err(unreachable(peer, err))
        }
        Ok(())
    }
}

fn unreachable(peer: &PeerId, err: impl std::fmt::Display) -> WireError {
    WireError::Unreachable { peer: peer.clone(), reason: err.to_string() }
}
