use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// The metrics for the [`super::RollupValidator`].
#[derive(Metrics, Clone)]
#[metrics(scope = "derivation_pipeline")]
pub struct DerivationPipelineMetrics {
    /// A counter on the rollups accepted.
    pub rollups_accepted: Counter,
    /// A counter on the rollups quarantined.
    pub rollups_quarantined: Counter,
    /// A counter on the rollups rejected.
    pub rollups_rejected: Counter,
    /// A counter on the publications that failed to decode.
    pub rollups_dropped: Counter,
    /// A counter on the batches stored from rollups.
    pub batches_stored: Counter,
    /// The amount of rollups currently in quarantine.
    pub quarantine_size: Gauge,
    /// The duration of a rollup verification and persistence, in milliseconds.
    pub derivation_duration: Histogram,
}
