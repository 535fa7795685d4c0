use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The thresholds of the health predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// The maximum amount of L1 blocks the ingestor may lag behind the L1 head.
    pub lag: u64,
    /// The maximum age of the head batch.
    pub head_staleness: Duration,
    /// The maximum time a peer may stay unreachable.
    pub peer_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            lag: 5,
            head_staleness: Duration::from_secs(120),
            peer_timeout: Duration::from_secs(60),
        }
    }
}

/// The health of the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// The conjunction of the health checks.
    #[serde(rename = "OverallHealth")]
    pub overall_health: bool,
    /// The individual checks.
    pub details: HealthDetails,
}

/// The individual health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDetails {
    /// Whether a rollup has been stored.
    pub ready: bool,
    /// The latest L1 head seen.
    pub l1_head: Option<u64>,
    /// The last L1 block processed by the ingestor.
    pub l1_processed: Option<u64>,
    /// Whether the ingestor is within the lag of the L1 head.
    pub l1_synced: bool,
    /// The seconds since the head batch last advanced, or since startup.
    pub head_age_secs: u64,
    /// Whether the head batch is younger than the staleness threshold.
    pub head_fresh: bool,
    /// The longest time any peer has been unreachable, in seconds.
    pub longest_unreachable_secs: Option<u64>,
    /// Whether every peer was reachable within the peer timeout.
    pub peers_reachable: bool,
}

/// Derives the health of the node from the progress it observes.
#[derive(Debug, Clone)]
pub struct HealthOracle {
    config: HealthConfig,
    started: Instant,
    l1_head: Option<u64>,
    l1_processed: Option<u64>,
    last_head_advance: Option<Instant>,
}

impl HealthOracle {
    /// Returns a new [`HealthOracle`].
    pub const fn new(config: HealthConfig, now: Instant) -> Self {
        Self { config, started: now, l1_head: None, l1_processed: None, last_head_advance: None }
    }

    /// Records a new L1 head.
    pub fn on_l1_head(&mut self, number: u64) {
        self.l1_head = Some(number);
    }

    /// Records a processed L1 block.
    pub fn on_l1_processed(&mut self, number: u64) {
        self.l1_processed = Some(number);
    }

    /// Records an advance of the head batch.
    pub fn on_batch_head_advanced(&mut self, now: Instant) {
        self.last_head_advance = Some(now);
    }

    /// Evaluates the health predicate.
    pub fn check(
        &self,
        now: Instant,
        ready: bool,
        longest_unreachable: Option<Duration>,
    ) -> HealthStatus {
        let l1_synced = match (self.l1_head, self.l1_processed) {
            (Some(head), Some(processed)) => head.saturating_sub(processed) <= self.config.lag,
            _ => false,
        };

        let head_age = now.saturating_duration_since(self.last_head_advance.unwrap_or(self.started));
        let head_fresh = head_age < self.config.head_staleness;
        let peers_reachable = longest_unreachable.is_none_or(|d| d <= self.config.peer_timeout);

        HealthStatus {
            overall_health: ready && l1_synced && head_fresh && peers_reachable,
            details: HealthDetails {
                ready,
                l1_head: self.l1_head,
                l1_processed: self.l1_processed,
                l1_synced,
                head_age_secs: head_age.as_secs(),
                head_fresh,
                longest_unreachable_secs: longest_unreachable.map(|d| d.as_secs()),
                peers_reachable,
            },
        }
    }
}
