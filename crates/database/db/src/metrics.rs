use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// The metrics for the [`super::HeaderStore`].
#[derive(Metrics, Clone)]
#[metrics(scope = "header_store")]
pub(crate) struct HeaderStoreMetrics {
    /// Appends that moved the batch head.
    pub batch_head_advances: Counter,
    /// Appends that moved the rollup head.
    pub rollup_head_advances: Counter,
    /// Appends that left the head in place.
    pub retained_heads: Counter,
    /// Time (ms) spent in the head critical section of an append.
    pub append_duration: Histogram,
}
