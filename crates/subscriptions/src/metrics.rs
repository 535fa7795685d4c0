use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics of the [`super::LogsRouter`].
#[derive(Metrics, Clone)]
#[metrics(scope = "subscriptions")]
pub struct RouterMetrics {
    /// The amount of open subscriptions.
    pub open_subscriptions: Gauge,
    /// A counter on the subscriptions created.
    pub subscriptions_created: Counter,
    /// A counter on the subscriptions revoked by the enclave.
    pub subscriptions_revoked: Counter,
    /// A counter on the log events delivered.
    pub events_delivered: Counter,
    /// A counter on the log events dropped for slow or gone subscribers.
    pub events_dropped: Counter,
    /// A counter on the log events dropped because the subscriber's channel was full.
    pub events_lagged: Counter,
    /// A counter on the L1 transactions forwarded to the enclave.
    pub l1_transactions_forwarded: Counter,
}
