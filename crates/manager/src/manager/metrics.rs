use metrics::Counter;
use metrics_derive::Metrics;

/// The metrics of the [`super::NodeManagerHandle`].
#[derive(Metrics, Clone)]
#[metrics(scope = "manager")]
pub(crate) struct HandleMetrics {
    /// Failed to send command to the node manager from handle counter.
    pub handle_send_command_failed: Counter,
}

/// The metrics of the [`super::NodeManager`].
#[derive(Metrics, Clone)]
#[metrics(scope = "manager")]
pub(crate) struct NodeManagerMetrics {
    /// The amount of L1 notifications handled.
    pub l1_notifications: Counter,
    /// The amount of commands handled.
    pub commands: Counter,
    /// The amount of catch-up cycles triggered.
    pub catch_ups: Counter,
    /// The amount of batches produced by the enclave.
    pub batches_produced: Counter,
}
