use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics of the sync service.
#[derive(Metrics, Clone)]
#[metrics(scope = "sync")]
pub struct SyncMetrics {
    /// A counter on the batch requests served.
    pub requests_served: Counter,
    /// A counter on the batches served.
    pub batches_served: Counter,
    /// A counter on the batch requests sent.
    pub requests_sent: Counter,
    /// A counter on the batches applied from peers.
    pub batches_applied: Counter,
    /// A counter on the batches refused.
    pub batches_refused: Counter,
    /// A counter on the requests that timed out.
    pub requests_timed_out: Counter,
    /// A counter on the frames dropped because they failed to decode.
    pub frames_dropped: Counter,
    /// The amount of blacklisted peers.
    pub blacklisted_peers: Gauge,
}
