use crate::{
    handle::{SharedState, SyncCommand},
    import_batches, serve_batch_request, InvalidBatch, PeerBook, SyncConfig, SyncEvent, SyncHandle,
    SyncMetrics,
};

use alloy_primitives::B256;
use obscuro_db::HeaderStore;
use obscuro_primitives::ExtBatch;
use obscuro_wire::{
    BatchRequest, BatchResponse, InboundFrame, NewBatch, PeerId, PeerTransport, WireMessage,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        OwnedSemaphorePermit,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// An outstanding batch request.
#[derive(Debug)]
struct InFlightRequest {
    /// When the request was sent.
    sent_at: Instant,
    /// The slot of the request in the peer's window, freed on drop.
    _permit: OwnedSemaphorePermit,
}

/// [`SyncService`] serves and consumes batch ranges over the peer wire.
///
/// The service owns the following components:
/// - transport: delivers frames to peers.
/// - inbound: the frames received from peers.
/// - from_handle_rx: the commands from the [`SyncHandle`]s.
/// - in_flight: the outstanding requests per peer. Responses are matched to requests in FIFO
///   order and every request holds a slot of the peer's window until it completes or times out.
pub struct SyncService<T> {
    /// The peer transport.
    transport: T,
    /// The store serving and receiving batches.
    store: HeaderStore,
    /// The sync configuration.
    config: SyncConfig,
    /// The state shared with the handles.
    shared: Arc<SharedState>,
    /// The sender half of the channel between the handles and the service.
    to_service_tx: UnboundedSender<SyncCommand>,
    /// The receiver half of the channel between the handles and the service.
    from_handle_rx: UnboundedReceiver<SyncCommand>,
    /// The frames received from peers.
    inbound: mpsc::Receiver<InboundFrame>,
    /// The sender of the service events.
    events: UnboundedSender<SyncEvent>,
    /// The outstanding requests, by peer.
    in_flight: HashMap<PeerId, VecDeque<InFlightRequest>>,
    /// The metrics of the service.
    metrics: SyncMetrics,
}

impl<T> SyncService<T>
where
    T: PeerTransport + 'static,
{
    /// Returns a new [`SyncService`] along with the receiver of its events.
    pub fn new(
        transport: T,
        store: HeaderStore,
        config: SyncConfig,
        inbound: mpsc::Receiver<InboundFrame>,
    ) -> (Self, UnboundedReceiver<SyncEvent>) {
        let peers = PeerBook::new(
            config.peers.iter().cloned(),
            config.blacklist_strikes,
            config.blacklist_cooldown,
        );
        let shared = Arc::new(SharedState::new(peers, config.window));
        let (to_service_tx, from_handle_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let service = Self {
            transport,
            store,
            config,
            shared,
            to_service_tx,
            from_handle_rx,
            inbound,
            events,
            in_flight: HashMap::new(),
            metrics: SyncMetrics::default(),
        };
        (service, events_rx)
    }

    /// Spawns the service, returning a handle to it, the receiver of its events and the handle of
    /// the task.
    pub fn spawn(
        transport: T,
        store: HeaderStore,
        config: SyncConfig,
        inbound: mpsc::Receiver<InboundFrame>,
        cancellation: CancellationToken,
    ) -> (SyncHandle, UnboundedReceiver<SyncEvent>, JoinHandle<()>) {
        let (service, events) = Self::new(transport, store, config, inbound);
        let handle = service.handle();
        let task = tokio::spawn(service.run(cancellation));
        (handle, events, task)
    }

    /// Returns a new [`SyncHandle`].
    pub fn handle(&self) -> SyncHandle {
        SyncHandle::new(self.to_service_tx.clone(), self.shared.clone())
    }

    /// Runs the service until cancelled or until the inbound frames and the handles are gone.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let period = (self.config.request_timeout / 2).max(Duration::from_millis(10));
        let mut expiry = tokio::time::interval(period);
        tracing::info!(target: "obscuro::network", local = %self.config.local, peers = self.config.peers.len(), "Sync service started");

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                Some(command) = self.from_handle_rx.recv() => self.on_handle_message(command).await,
                Some(frame) = self.inbound.recv() => self.on_frame(frame).await,
                _ = expiry.tick() => self.expire_requests(Instant::now()),
            }
        }

        tracing::info!(target: "obscuro::network", "Sync service stopped");
    }

    /// Handler for the commands from the [`SyncHandle`].
    async fn on_handle_message(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::RequestBatches { peer, head, permit } => {
                self.send_request(peer, head, permit).await
            }
            SyncCommand::AnnounceBatch(batch) => self.announce_batch(batch).await,
            SyncCommand::AddPeer(peer) => {
                if self.shared.peers.lock().add(peer.clone()) {
                    tracing::info!(target: "obscuro::network", %peer, "Added peer");
                }
            }
        }
    }

    /// Sends a batch request to the peer. The request holds the permit until it completes.
    async fn send_request(
        &mut self,
        peer: PeerId,
        head: Option<B256>,
        permit: OwnedSemaphorePermit,
    ) {
        let request = BatchRequest { requester: self.config.local.clone(), current_head: head };
        match self.transport.send_message(&peer, &request.into()).await {
            Ok(()) => {
                tracing::debug!(target: "obscuro::network", %peer, ?head, "Requested batches");
                self.metrics.requests_sent.increment(1);
                self.in_flight
                    .entry(peer)
                    .or_default()
                    .push_back(InFlightRequest { sent_at: Instant::now(), _permit: permit });
            }
            Err(err) => {
                tracing::warn!(target: "obscuro::network", %peer, %err, "Failed to request batches");
                self.shared.peers.lock().record_failure(&peer, Instant::now());
                self.emit(SyncEvent::RequestFailed(peer));
            }
        }
    }

    /// Announces a batch to the peers that are not blacklisted.
    async fn announce_batch(&mut self, batch: ExtBatch) {
        let hash = batch.hash();
        let message: WireMessage = NewBatch { batch }.into();
        let peers = self.shared.peers.lock().available(Instant::now());

        for peer in peers {
            tracing::trace!(target: "obscuro::network", %peer, %hash, "Announcing batch to peer");
            if let Err(err) = self.transport.send_message(&peer, &message).await {
                tracing::debug!(target: "obscuro::network", %peer, %err, "Failed to announce batch");
                self.shared.peers.lock().record_failure(&peer, Instant::now());
            }
        }
    }

    /// Handler for the frames received from peers. Undecodable frames are dropped.
    async fn on_frame(&mut self, InboundFrame { peer, frame }: InboundFrame) {
        let message = match WireMessage::decode(&mut frame.as_ref()) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(target: "obscuro::network", %peer, %err, "Dropping undecodable frame");
                self.metrics.frames_dropped.increment(1);
                return
            }
        };

        let now = Instant::now();
        {
            let mut peers = self.shared.peers.lock();
            if peers.is_blacklisted(&peer, now) {
                tracing::debug!(target: "obscuro::network", %peer, id = ?message.id(), "Ignoring blacklisted peer");
                return
            }
            peers.record_contact(&peer, now);
        }

        match message {
            WireMessage::BatchRequest(request) => self.on_batch_request(peer, request).await,
            WireMessage::BatchResponse(response) => self.on_batch_response(peer, response).await,
            WireMessage::NoCommonAncestor(message) => {
                self.complete_request(&peer);
                tracing::warn!(target: "obscuro::network", %peer, head = %message.head, "Peer has no common ancestor");
                self.emit(SyncEvent::NoCommonAncestor { peer, head: message.head });
            }
            WireMessage::NewBatch(NewBatch { batch }) => self.on_new_batch(peer, batch).await,
        }
    }

    async fn on_batch_request(&mut self, peer: PeerId, request: BatchRequest) {
        let response = match serve_batch_request(
            &self.store,
            &request,
            self.config.max_range,
            self.config.fork_depth,
        )
        .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(target: "obscuro::network", %peer, %err, "Failed to serve batch request");
                return
            }
        };

        if let WireMessage::BatchResponse(BatchResponse { batches }) = &response {
            self.metrics.requests_served.increment(1);
            self.metrics.batches_served.increment(batches.len() as u64);
        }
        if let Err(err) = self.transport.send_message(&peer, &response).await {
            tracing::warn!(target: "obscuro::network", %peer, %err, "Failed to answer batch request");
            self.shared.peers.lock().record_failure(&peer, Instant::now());
        }
    }

    async fn on_batch_response(&mut self, peer: PeerId, BatchResponse { batches }: BatchResponse) {
        if self.complete_request(&peer).is_none() {
            tracing::warn!(target: "obscuro::network", %peer, "Dropping unsolicited batch response");
            return
        }

        let Some(outcome) = self.import(&peer, &batches).await else { return };
        if let Some(reason) = outcome.rejected {
            self.on_inconsistency(peer, reason);
            return
        }

        // a full response means the peer may hold more batches.
        if batches.len() >= self.config.max_range {
            let head = batches.last().map(ExtBatch::hash);
            self.follow_up(peer, head).await;
        }
    }

    async fn on_new_batch(&mut self, peer: PeerId, batch: ExtBatch) {
        let Some(outcome) = self.import(&peer, std::slice::from_ref(&batch)).await else { return };
        match outcome.rejected {
            // the local chain lags behind the announced batch.
            Some(InvalidBatch::UnknownParent { .. }) => {
                let head = match self.store.get_head_batch_hash().await {
                    Ok(head) => head,
                    Err(err) => {
                        tracing::error!(target: "obscuro::network", %err, "Failed to read head batch");
                        return
                    }
                };
                self.follow_up(peer, head).await;
            }
            Some(reason) => self.on_inconsistency(peer, reason),
            None => {}
        }
    }

    /// Imports the batches, emitting the outcome. Returns `None` if the store failed.
    async fn import(
        &mut self,
        peer: &PeerId,
        batches: &[ExtBatch],
    ) -> Option<crate::ImportOutcome> {
        let outcome = match import_batches(&self.store, batches).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(target: "obscuro::network", %peer, %err, "Failed to import batches");
                return None
            }
        };

        self.metrics.batches_applied.increment(outcome.applied as u64);
        if outcome.applied > 0 || batches.is_empty() {
            tracing::debug!(target: "obscuro::network", %peer, applied = outcome.applied, head_advanced = outcome.head_advanced, "Imported batches");
            self.emit(SyncEvent::BatchesImported {
                peer: peer.clone(),
                applied: outcome.applied,
                head_advanced: outcome.head_advanced,
            });
        }
        Some(outcome)
    }

    /// Sends a follow-up request if the peer's window has a free slot.
    async fn follow_up(&mut self, peer: PeerId, head: Option<B256>) {
        match self.shared.window(&peer).try_acquire_owned() {
            Ok(permit) => self.send_request(peer, head, permit).await,
            Err(_) => {
                tracing::debug!(target: "obscuro::network", %peer, "Request window full, skipping follow-up");
            }
        }
    }

    fn on_inconsistency(&mut self, peer: PeerId, reason: InvalidBatch) {
        self.metrics.batches_refused.increment(1);
        let now = Instant::now();
        let (blacklisted, count) = {
            let mut peers = self.shared.peers.lock();
            (peers.record_strike(&peer, now), peers.blacklisted(now))
        };
        self.emit(SyncEvent::BatchRefused { peer: peer.clone(), reason });

        if blacklisted {
            tracing::warn!(target: "obscuro::network", %peer, cooldown = ?self.config.blacklist_cooldown, "Blacklisted peer");
            self.metrics.blacklisted_peers.set(count as f64);
            self.in_flight.remove(&peer);
            self.emit(SyncEvent::PeerBlacklisted(peer));
        }
    }

    /// Completes the oldest outstanding request to the peer, freeing its slot.
    fn complete_request(&mut self, peer: &PeerId) -> Option<Instant> {
        let request = self.in_flight.get_mut(peer)?.pop_front()?;
        Some(request.sent_at)
    }

    /// Expires the requests older than the request timeout.
    fn expire_requests(&mut self, now: Instant) {
        let timeout = self.config.request_timeout;
        let mut expired = Vec::new();
        for (peer, requests) in &mut self.in_flight {
            while requests.front().is_some_and(|r| now.duration_since(r.sent_at) >= timeout) {
                requests.pop_front();
                expired.push(peer.clone());
            }
        }
        self.in_flight.retain(|_, requests| !requests.is_empty());

        for peer in expired {
            tracing::warn!(target: "obscuro::network", %peer, "Batch request timed out");
            self.metrics.requests_timed_out.increment(1);
            self.shared.peers.lock().record_failure(&peer, now);
            self.emit(SyncEvent::RequestFailed(peer));
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

impl<T> std::fmt::Debug for SyncService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.iter().map(|(p, r)| (p, r.len())).collect::<Vec<_>>())
            .finish()
    }
}
