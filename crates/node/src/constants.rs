//! Default values of the node arguments.

/// The default L2 chain id.
pub(crate) const CHAIN_ID: u64 = 777;

/// The default average L1 block duration in milliseconds.
pub(crate) const AVG_BLOCK_DURATION_MS: u64 = 12_000;

/// The default database path.
pub(crate) const DB_PATH: &str = "obscuro.db";

/// The default L1 poll interval in milliseconds.
pub(crate) const L1_POLL_INTERVAL_MS: u64 = 2_000;

/// The default amount of retries of a failing L1 request.
pub(crate) const L1_MAX_RETRIES: usize = 10;

/// The default initial backoff of a failing L1 request in milliseconds.
pub(crate) const L1_INITIAL_BACKOFF_MS: u64 = 100;

/// The default enclave websocket URL.
pub(crate) const ENCLAVE_URL: &str = "ws://127.0.0.1:11000";

/// The default rollup interval in milliseconds.
pub(crate) const ROLLUP_INTERVAL_MS: u64 = 10_000;

/// The default amount of batches triggering a rollup.
pub(crate) const ROLLUP_MAX_BATCHES: usize = 64;

/// The default amount of strikes before a peer is blacklisted.
pub(crate) const BLACKLIST_STRIKES: u32 = 3;

/// The default blacklist cooldown in seconds.
pub(crate) const BLACKLIST_COOLDOWN_SECS: u64 = 300;

/// The default timeout of a batch request in seconds.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 10;

/// The default health lag in L1 blocks.
pub(crate) const HEALTH_LAG: u64 = 5;

/// The default head staleness in seconds.
pub(crate) const HEAD_STALENESS_SECS: u64 = 120;

/// The default peer timeout in seconds.
pub(crate) const PEER_TIMEOUT_SECS: u64 = 60;

/// The default RPC listen address.
pub(crate) const RPC_ADDR: &str = "127.0.0.1:13000";
