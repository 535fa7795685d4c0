use crate::{PeerBook, SyncError};

use alloy_primitives::B256;
use obscuro_primitives::ExtBatch;
use obscuro_wire::PeerId;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{mpsc::UnboundedSender, OwnedSemaphorePermit, Semaphore};

/// The state shared between the [`SyncHandle`]s and the [`super::SyncService`].
#[derive(Debug)]
pub(crate) struct SharedState {
    /// The peer book.
    pub(crate) peers: Mutex<PeerBook>,
    /// The request windows, by peer.
    windows: Mutex<HashMap<PeerId, Arc<Semaphore>>>,
    /// The size of a request window.
    window: usize,
}

impl SharedState {
    pub(crate) fn new(peers: PeerBook, window: usize) -> Self {
        Self { peers: Mutex::new(peers), windows: Default::default(), window: window.max(1) }
    }

    /// Returns the request window of the peer.
    pub(crate) fn window(&self, peer: &PeerId) -> Arc<Semaphore> {
        self.windows
            .lock()
            .entry(peer.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.window)))
            .clone()
    }
}

/// A _sharable_ frontend used to communicate with the [`super::SyncService`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    /// The sender half of the channel set up between this type and the service.
    to_service_tx: UnboundedSender<SyncCommand>,
    /// The shared state.
    shared: Arc<SharedState>,
}

impl SyncHandle {
    pub(crate) const fn new(
        to_service_tx: UnboundedSender<SyncCommand>,
        shared: Arc<SharedState>,
    ) -> Self {
        Self { to_service_tx, shared }
    }

    fn send_command(&self, command: SyncCommand) -> Result<(), SyncError> {
        self.to_service_tx.send(command).map_err(|_| SyncError::ServiceStopped)
    }

    /// Requests the batches following `head` from the peer. Waits for a free slot in the request
    /// window of the peer.
    pub async fn request_batches(&self, peer: PeerId, head: Option<B256>) -> Result<(), SyncError> {
        if self.shared.peers.lock().is_blacklisted(&peer, Instant::now()) {
            return Err(SyncError::Blacklisted(peer))
        }
        let permit = self
            .shared
            .window(&peer)
            .acquire_owned()
            .await
            .map_err(|_| SyncError::ServiceStopped)?;
        self.send_command(SyncCommand::RequestBatches { peer, head, permit })
    }

    /// Requests the batches following `head` from the best available peer, returning the peer.
    pub async fn catch_up(&self, head: Option<B256>) -> Result<PeerId, SyncError> {
        let peer = self.shared.peers.lock().select(Instant::now()).ok_or(SyncError::NoPeerAvailable)?;
        self.request_batches(peer.clone(), head).await?;
        Ok(peer)
    }

    /// Announces a batch to every available peer.
    pub fn announce_batch(&self, batch: ExtBatch) -> Result<(), SyncError> {
        self.send_command(SyncCommand::AnnounceBatch(batch))
    }

    /// Adds a peer to sync with.
    pub fn add_peer(&self, peer: PeerId) -> Result<(), SyncError> {
        self.send_command(SyncCommand::AddPeer(peer))
    }

    /// Returns the amount of known peers.
    pub fn peer_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    /// Returns the longest time any peer has been unreachable.
    pub fn longest_unreachable(&self) -> Option<Duration> {
        self.shared.peers.lock().longest_unreachable(Instant::now())
    }

    /// Returns the amount of outstanding requests to the peer.
    pub fn in_flight(&self, peer: &PeerId) -> usize {
        self.shared.window - self.shared.window(peer).available_permits()
    }
}

/// A command sent by the [`SyncHandle`] to the service.
#[derive(Debug)]
pub enum SyncCommand {
    /// Send a batch request, holding a slot of the peer's window until it completes.
    RequestBatches {
        /// The peer to request the batches from.
        peer: PeerId,
        /// The local head batch the response should follow, if any.
        head: Option<B256>,
        /// The slot of the peer's request window, released once the request completes.
        permit: OwnedSemaphorePermit,
    },
    /// Announce a batch.
    AnnounceBatch(ExtBatch),
    /// Add a peer.
    AddPeer(PeerId),
}
