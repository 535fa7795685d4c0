use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// The metrics for the [`super::Sequencer`].
#[derive(Metrics, Clone)]
#[metrics(scope = "sequencer")]
pub struct SequencerMetrics {
    /// A counter on the batches received from the enclave.
    pub batches_received: Counter,
    /// A counter on the rollups submitted to the L1.
    pub rollups_submitted: Counter,
    /// A counter on the failed rollup submissions.
    pub submission_failures: Counter,
    /// The amount of batches waiting for the next rollup.
    pub buffered_batches: Gauge,
    /// The rollup submission duration, in milliseconds.
    pub submission_duration: Histogram,
}
