use alloy_primitives::Address;
use obscuro_db::RetryConfig;
use std::time::Duration;

/// Configuration for the sequencer.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// The management contract receiving the rollups.
    pub management_contract: Address,
    /// The amount of buffered batches triggering a rollup. Zero disables the count trigger.
    pub max_batches: usize,
    /// The interval between two rollups. `None` disables the time trigger.
    pub rollup_interval: Option<Duration>,
    /// The retry policy of the rollup submission.
    pub retry: RetryConfig,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            management_contract: Address::ZERO,
            max_batches: 16,
            rollup_interval: Some(Duration::from_secs(10)),
            retry: RetryConfig::default(),
        }
    }
}

impl SequencerConfig {
    /// Returns true if at least one rollup trigger is enabled.
    pub const fn has_trigger(&self) -> bool {
        self.max_batches > 0 || self.rollup_interval.is_some()
    }
}
