//! An in-memory peer network.

use crate::{InboundFrame, PeerId, PeerTransport, WireError, WireMessage};

use alloy_primitives::Bytes;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Hub {
    inboxes: HashMap<PeerId, mpsc::UnboundedSender<InboundFrame>>,
    offline: HashSet<PeerId>,
    sent: Vec<(PeerId, PeerId, WireMessage)>,
}

/// Connects in-memory peers. Frames sent to an offline or unknown peer fail as unreachable.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MockNetwork {
    /// Returns a new empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer to the network, returning its transport and inbound frames.
    pub fn join(&self, id: impl Into<PeerId>) -> (MockPeerTransport, mpsc::Receiver<InboundFrame>) {
        let id = id.into();
        let (tx, mut unbounded) = mpsc::unbounded_channel();
        self.hub.lock().inboxes.insert(id.clone(), tx);

        // bridge to the bounded channel consumed by the sync service.
        let (inbound, rx) = mpsc::channel(crate::INBOUND_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(frame) = unbounded.recv().await {
                if inbound.send(frame).await.is_err() {
                    break
                }
            }
        });

        (MockPeerTransport { local: id, hub: self.hub.clone() }, rx)
    }

    /// Takes the peer offline or back online.
    pub fn set_offline(&self, id: &PeerId, offline: bool) {
        let mut hub = self.hub.lock();
        if offline {
            hub.offline.insert(id.clone());
        } else {
            hub.offline.remove(id);
        }
    }

    /// Returns the decoded messages sent on the network as `(from, to, message)`.
    pub fn sent(&self) -> Vec<(PeerId, PeerId, WireMessage)> {
        self.hub.lock().sent.clone()
    }
}

/// The transport of a peer of the [`MockNetwork`].
#[derive(Debug, Clone)]
pub struct MockPeerTransport {
    local: PeerId,
    hub: Arc<Mutex<Hub>>,
}

impl MockPeerTransport {
    /// Returns the identity of the peer.
    pub const fn local(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait::async_trait]
impl PeerTransport for MockPeerTransport {
    async fn send(&self, peer: &PeerId, frame: Bytes) -> Result<(), WireError> {
        let mut hub = self.hub.lock();
        let unreachable =
            || WireError::Unreachable { peer: peer.clone(), reason: "offline".to_string() };
        if hub.offline.contains(peer) || hub.offline.contains(&self.local) {
            return Err(unreachable())
        }
        let inbox = hub.inboxes.get(peer).cloned().ok_or_else(unreachable)?;

        if let Ok(message) = WireMessage::decode(&mut frame.as_ref()) {
            hub.sent.push((self.local.clone(), peer.clone(), message));
        }
        inbox.send(InboundFrame { peer: self.local.clone(), frame }).map_err(|_| unreachable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoCommonAncestor;
    use alloy_primitives::B256;

    #[tokio::test]
    async fn test_delivers_frames_between_peers() -> eyre::Result<()> {
        let network = MockNetwork::new();
        let (a, _) = network.join("a");
        let (_, mut b_inbound) = network.join("b");

        let message: WireMessage = NoCommonAncestor { head: B256::ZERO }.into();
        a.send_message(&"b".into(), &message).await?;

        let frame = b_inbound.recv().await.expect("frame");
        assert_eq!(frame.peer, PeerId::from("a"));
        assert_eq!(WireMessage::decode(&mut frame.frame.as_ref())?, message);

        network.set_offline(&"b".into(), true);
        let err = a.send_message(&"b".into(), &message).await.unwrap_err();
        assert!(matches!(err, WireError::Unreachable { .. }));
        assert!(a.send_message(&"c".into(), &message).await.is_err());

        Ok(())
    }
}
