//! Command line arguments of the host and their mapping onto the component configurations.

use crate::{constants, ObscuroNodeConfig};

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use obscuro_db::RetryConfig;
use obscuro_l1::ManagementContract;
use obscuro_manager::{HealthConfig, NodeManagerConfig};
use obscuro_network::{SyncConfig, DEFAULT_FORK_DEPTH, DEFAULT_MAX_RANGE, DEFAULT_WINDOW};
use obscuro_sequencer::SequencerConfig;
use obscuro_watcher::L1WatcherConfig;
use obscuro_wire::PeerId;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// The arguments of the Obscuro host.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "obscuro-node", version, about = "The Obscuro host data plane")]
pub struct ObscuroNodeArgs {
    /// Database args
    #[command(flatten)]
    pub database_args: DatabaseArgs,
    /// The L1 arguments
    #[command(flatten)]
    pub l1_args: L1Args,
    /// The enclave arguments
    #[command(flatten)]
    pub enclave_args: EnclaveArgs,
    /// The sequencer arguments
    #[command(flatten)]
    pub sequencer_args: SequencerArgs,
    /// The network arguments
    #[command(flatten)]
    pub network_args: NetworkArgs,
    /// The health arguments
    #[command(flatten)]
    pub health_args: HealthArgs,
    /// The rpc arguments
    #[command(flatten)]
    pub rpc_args: RpcArgs,
    /// The L2 chain id.
    #[arg(long = "chain-id", env = "OBSCURO_CHAIN_ID", default_value_t = constants::CHAIN_ID)]
    pub chain_id: u64,
    /// The average L1 block duration in milliseconds.
    #[arg(long = "avg-block-duration-ms", default_value_t = constants::AVG_BLOCK_DURATION_MS)]
    pub avg_block_duration_ms: u64,
}

impl ObscuroNodeArgs {
    /// Validates the combination of arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.l1_args.url.is_none() {
            return Err("An L1 URL is required".to_string())
        }
        if self.l1_args.management_contract.is_none() {
            return Err("A management contract address is required".to_string())
        }
        if self.network_args.max_range == 0 {
            return Err("The network max range must be greater than zero".to_string())
        }
        if self.network_args.window == 0 {
            return Err("The network window must be greater than zero".to_string())
        }
        if self.health_args.lag < self.l1_args.confirmations {
            return Err("The health lag must cover the L1 confirmations".to_string())
        }
        if self.avg_block_duration_ms == 0 {
            return Err("The average block duration must be greater than zero".to_string())
        }

        if self.sequencer_args.enabled {
            let Some(address) = self.sequencer_args.address else {
                return Err("A sequencer address is required when the sequencer is enabled".to_string())
            };
            if self.sequencer_args.rollup_interval_ms == 0 && self.sequencer_args.max_batches == 0 {
                return Err("At least one rollup trigger must be enabled".to_string())
            }
            if let Some(signer) = self.sequencer_args.signer()? {
                if signer.address() != address {
                    return Err(format!(
                        "The sequencer key controls {} instead of {address}",
                        signer.address()
                    ))
                }
            }
        }

        Ok(())
    }

    /// Returns the typed configuration of the node components. The arguments are expected to be
    /// validated.
    pub fn node_config(&self) -> ObscuroNodeConfig {
        let l1 = &self.l1_args;
        let management_contract = l1.management_contract.unwrap_or_default();
        let retry = RetryConfig {
            max_retries: Some(l1.max_retries),
            initial_delay_ms: l1.initial_backoff_ms,
            ..Default::default()
        };

        let sequencer = self.sequencer_args.enabled.then(|| SequencerConfig {
            management_contract,
            max_batches: self.sequencer_args.max_batches,
            rollup_interval: (self.sequencer_args.rollup_interval_ms > 0)
                .then(|| Duration::from_millis(self.sequencer_args.rollup_interval_ms)),
            retry,
        });

        let network = &self.network_args;
        let local = network
            .local_id
            .clone()
            .unwrap_or_else(|| format!("ws://{}", self.rpc_args.addr));
        let sync = SyncConfig {
            local: PeerId::new(local),
            peers: network.peers.iter().cloned().map(PeerId::new).collect(),
            max_range: network.max_range,
            fork_depth: network.fork_depth,
            window: network.window,
            request_timeout: Duration::from_secs(network.request_timeout_secs),
            blacklist_strikes: network.blacklist_strikes,
            blacklist_cooldown: Duration::from_secs(network.blacklist_cooldown_secs),
        };

        let health = HealthConfig {
            lag: self.health_args.lag,
            head_staleness: Duration::from_secs(self.health_args.head_staleness_secs),
            peer_timeout: Duration::from_secs(self.health_args.peer_timeout_secs),
        };

        ObscuroNodeConfig {
            watcher: L1WatcherConfig {
                genesis_block: l1.genesis_block,
                confirmations: l1.confirmations,
                poll_interval: Duration::from_millis(l1.poll_interval_ms),
                retry,
            },
            contract: ManagementContract::new(management_contract, l1.erc20_contracts.clone()),
            sequencer,
            sync,
            manager: NodeManagerConfig {
                health,
                catch_up_interval: Duration::from_millis(self.avg_block_duration_ms),
            },
        }
    }
}

/// The database arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct DatabaseArgs {
    /// The path of the sqlite database file.
    #[arg(long = "db.path", value_name = "DB_PATH", default_value = constants::DB_PATH)]
    pub path: PathBuf,
}

impl DatabaseArgs {
    /// Returns the URL of the database.
    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

/// The L1 arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct L1Args {
    /// The URL for the L1 RPC.
    #[arg(long = "l1.url", id = "l1_url", value_name = "L1_URL", env = "OBSCURO_L1_URL")]
    pub url: Option<reqwest::Url>,
    /// The L1 block at which the scan starts on a cold start.
    #[arg(long = "l1.genesis-block", default_value_t = 0)]
    pub genesis_block: u64,
    /// The amount of blocks an L1 block must be buried under before being processed.
    #[arg(long = "l1.confirmations", default_value_t = 0)]
    pub confirmations: u64,
    /// The interval between two polls of the L1 head in milliseconds.
    #[arg(long = "l1.poll-interval-ms", default_value_t = constants::L1_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// The max amount of retries of a failing L1 request.
    #[arg(long = "l1.max-retries", default_value_t = constants::L1_MAX_RETRIES)]
    pub max_retries: usize,
    /// The initial backoff of a failing L1 request in milliseconds.
    #[arg(long = "l1.initial-backoff-ms", default_value_t = constants::L1_INITIAL_BACKOFF_MS)]
    pub initial_backoff_ms: u64,
    /// The address of the management contract.
    #[arg(long = "l1.management-contract", value_name = "ADDRESS")]
    pub management_contract: Option<Address>,
    /// The ERC20 contracts whose deposits are forwarded to the enclave.
    #[arg(long = "l1.erc20-contracts", value_name = "ADDRESS", value_delimiter = ',')]
    pub erc20_contracts: Vec<Address>,
}

/// The enclave arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct EnclaveArgs {
    /// The websocket URL of the enclave.
    #[arg(long = "enclave.url", default_value = constants::ENCLAVE_URL, env = "OBSCURO_ENCLAVE_URL")]
    pub url: String,
}

/// The sequencer arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct SequencerArgs {
    /// Whether the node runs the sequencer.
    #[arg(long = "sequencer.enabled")]
    pub enabled: bool,
    /// The interval between two rollups in milliseconds. Zero disables the time trigger.
    #[arg(long = "sequencer.rollup-interval-ms", default_value_t = constants::ROLLUP_INTERVAL_MS)]
    pub rollup_interval_ms: u64,
    /// The amount of buffered batches triggering a rollup. Zero disables the count trigger.
    #[arg(long = "sequencer.max-batches", default_value_t = constants::ROLLUP_MAX_BATCHES)]
    pub max_batches: usize,
    /// The L1 address publishing the rollups.
    #[arg(long = "sequencer.address", value_name = "ADDRESS")]
    pub address: Option<Address>,
    /// The hex encoded private key signing the rollup transactions. Without it, the L1 node is
    /// expected to sign for the sequencer address.
    #[arg(long = "sequencer.private-key", env = "OBSCURO_SEQUENCER_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

impl SequencerArgs {
    /// Returns the signer of the rollup transactions, if a private key is configured.
    pub fn signer(&self) -> Result<Option<PrivateKeySigner>, String> {
        self.private_key
            .as_deref()
            .map(|key| key.parse::<PrivateKeySigner>().map_err(|err| format!("Invalid sequencer key: {err}")))
            .transpose()
    }
}

/// The network arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct NetworkArgs {
    /// The identity announced to peers. Defaults to the websocket URL of the RPC server.
    #[arg(long = "network.local-id")]
    pub local_id: Option<String>,
    /// The websocket URLs of the peers.
    #[arg(long = "network.peers", value_delimiter = ',')]
    pub peers: Vec<String>,
    /// The maximum amount of batches per response.
    #[arg(long = "network.max-range", default_value_t = DEFAULT_MAX_RANGE)]
    pub max_range: usize,
    /// The maximum depth of the common ancestor search.
    #[arg(long = "network.fork-depth", default_value_t = DEFAULT_FORK_DEPTH)]
    pub fork_depth: u64,
    /// The maximum amount of outstanding requests per peer.
    #[arg(long = "network.window", default_value_t = DEFAULT_WINDOW)]
    pub window: usize,
    /// The time after which an unanswered batch request is abandoned, in seconds.
    #[arg(long = "network.request-timeout-secs", default_value_t = constants::REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    /// The amount of inconsistent responses after which a peer is blacklisted.
    #[arg(long = "network.blacklist-strikes", default_value_t = constants::BLACKLIST_STRIKES)]
    pub blacklist_strikes: u32,
    /// The duration of a blacklisting in seconds.
    #[arg(long = "network.blacklist-cooldown-secs", default_value_t = constants::BLACKLIST_COOLDOWN_SECS)]
    pub blacklist_cooldown_secs: u64,
}

/// The health arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct HealthArgs {
    /// The maximum amount of L1 blocks the ingestor may lag behind the L1 head.
    #[arg(long = "health.lag", default_value_t = constants::HEALTH_LAG)]
    pub lag: u64,
    /// The maximum age of the head batch in seconds.
    #[arg(long = "health.head-staleness-secs", default_value_t = constants::HEAD_STALENESS_SECS)]
    pub head_staleness_secs: u64,
    /// The maximum time a peer may stay unreachable in seconds.
    #[arg(long = "health.peer-timeout-secs", default_value_t = constants::PEER_TIMEOUT_SECS)]
    pub peer_timeout_secs: u64,
}

/// The rpc arguments.
#[derive(Debug, Clone, clap::Args)]
pub struct RpcArgs {
    /// The listen address of the JSON-RPC server.
    #[arg(long = "rpc.addr", default_value = constants::RPC_ADDR)]
    pub addr: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000aa";

    fn parse(extra: &[&str]) -> ObscuroNodeArgs {
        let base = ["obscuro-node", "--l1.url", "http://localhost:8545", "--l1.management-contract", CONTRACT];
        ObscuroNodeArgs::parse_from(base.iter().chain(extra))
    }

    #[test]
    fn test_validator_defaults_are_valid() {
        let args = parse(&[]);
        assert_eq!(args.validate(), Ok(()));

        let config = args.node_config();
        assert!(config.sequencer.is_none());
        assert_eq!(config.sync.local, PeerId::new("ws://127.0.0.1:13000"));
        assert_eq!(config.watcher.confirmations, 0);
        assert_eq!(args.database_args.url(), "sqlite://obscuro.db?mode=rwc");
    }

    #[test]
    fn test_rejects_nonsensical_combinations() {
        assert!(parse(&["--network.max-range", "0"]).validate().is_err());
        assert!(parse(&["--network.window", "0"]).validate().is_err());
        assert!(parse(&["--l1.confirmations", "6", "--health.lag", "5"]).validate().is_err());
        assert!(parse(&["--sequencer.enabled"]).validate().is_err());
        assert!(parse(&[
            "--sequencer.enabled",
            "--sequencer.address",
            CONTRACT,
            "--sequencer.rollup-interval-ms",
            "0",
            "--sequencer.max-batches",
            "0",
        ])
        .validate()
        .is_err());
    }

    #[test]
    fn test_sequencer_config() {
        let args = parse(&[
            "--sequencer.enabled",
            "--sequencer.address",
            CONTRACT,
            "--sequencer.rollup-interval-ms",
            "0",
            "--network.peers",
            "ws://a:1,ws://b:2",
        ]);
        assert_eq!(args.validate(), Ok(()));

        let config = args.node_config();
        let sequencer = config.sequencer.expect("sequencer enabled");
        assert_eq!(sequencer.rollup_interval, None);
        assert_eq!(sequencer.max_batches, 64);
        assert_eq!(config.sync.peers, vec![PeerId::new("ws://a:1"), PeerId::new("ws://b:2")]);
    }
}
