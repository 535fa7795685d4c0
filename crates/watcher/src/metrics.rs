use crate::L1Notification;

use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::L1Watcher`].
#[derive(Metrics, Clone)]
#[metrics(scope = "l1_watcher")]
pub struct WatcherMetrics {
    /// A counter on the L1 blocks processed.
    pub blocks_processed: Counter,
    /// A counter on the rollup publications found.
    pub rollups: Counter,
    /// A counter on the transactions forwarded to the enclave.
    pub enclave_transactions: Counter,
    /// A counter on the management contract transactions that failed to decode.
    pub decode_failures: Counter,
    /// A counter on the parent linkage mismatches.
    pub reorgs: Counter,
    /// The latest L1 head seen.
    pub l1_head: Gauge,
}

impl WatcherMetrics {
    /// Processed an L1 notification by updating the appropriate metric.
    pub fn process_l1_notification(&self, notification: &L1Notification) {
        match notification {
            L1Notification::RollupPublished { .. } => self.rollups.increment(1),
            L1Notification::EnclaveTransaction { .. } => self.enclave_transactions.increment(1),
            L1Notification::Processed(_) => self.blocks_processed.increment(1),
            L1Notification::NewHead(head) => self.l1_head.set(head.number as f64),
            L1Notification::Synced => {}
        }
    }
}
