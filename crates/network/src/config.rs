use obscuro_wire::PeerId;
use std::time::Duration;

/// The default maximum amount of batches per response.
pub const DEFAULT_MAX_RANGE: usize = 64;

/// The default depth of the common ancestor search.
pub const DEFAULT_FORK_DEPTH: u64 = 64;

/// The default amount of outstanding requests per peer.
pub const DEFAULT_WINDOW: usize = 4;

/// The configuration of the sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The identity of the local host.
    pub local: PeerId,
    /// The peers to sync with.
    pub peers: Vec<PeerId>,
    /// The maximum amount of batches served per response.
    pub max_range: usize,
    /// The maximum amount of batches walked back when searching a common ancestor.
    pub fork_depth: u64,
    /// The maximum amount of outstanding requests per peer.
    pub window: usize,
    /// The time after which an unanswered request frees its slot.
    pub request_timeout: Duration,
    /// The amount of inconsistent responses after which a peer is blacklisted.
    pub blacklist_strikes: u32,
    /// The duration of a blacklisting.
    pub blacklist_cooldown: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local: PeerId::new("local"),
            peers: Vec::new(),
            max_range: DEFAULT_MAX_RANGE,
            fork_depth: DEFAULT_FORK_DEPTH,
            window: DEFAULT_WINDOW,
            request_timeout: Duration::from_secs(10),
            blacklist_strikes: 3,
            blacklist_cooldown: Duration::from_secs(300),
        }
    }
}
