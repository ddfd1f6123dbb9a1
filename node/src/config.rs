//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use strata_ledger::GenesisConfig;
use strata_types::{AccountId, Amount, ChainParams, NetworkId, PublicKey, Timestamp, ValidatorId};
use strata_utils::LogFormat;

use crate::NodeError;

/// Configuration for a Strata node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network this node belongs to. Selects default chain params and
    /// is mixed into the genesis hash.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Identity stamped on sub-blocks this node produces.
    #[serde(default = "default_validator_id")]
    pub validator_id: String,

    /// Data directory for the block log and snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub lmdb_map_size: usize,

    /// Chain parameters. Any field left out takes the live default; the
    /// whole table left out takes the network's defaults.
    #[serde(default)]
    pub params: Option<ChainParams>,

    /// Accounts seeded at genesis.
    #[serde(default)]
    pub genesis_accounts: Vec<GenesisAccountConfig>,

    /// Fixed genesis timestamp, overriding the network's.
    #[serde(default)]
    pub genesis_timestamp: Option<u64>,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSONL file receiving audit records. Records are only logged when unset.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,

    /// Interval between daemon ticks (expiry, retries, time-bound closes).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Submit each child-chain batch to the root chain as soon as it is built.
    #[serde(default = "default_true")]
    pub auto_submit_batches: bool,

    /// Whether to print Prometheus metrics on shutdown.
    #[serde(default)]
    pub enable_metrics: bool,
}

/// A genesis account as written in the config file. The public key is hex
/// and the balance fits in 64 bits, since TOML integers are signed 64-bit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccountConfig {
    pub id: String,
    pub public_key: String,
    pub balance: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_validator_id() -> String {
    "validator-0".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./strata_data")
}

fn default_map_size() -> usize {
    strata_store_lmdb::environment::DEFAULT_MAP_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// The params in force: the configured table, or the network defaults.
    pub fn chain_params(&self) -> ChainParams {
        self.params
            .clone()
            .unwrap_or_else(|| ChainParams::for_network(self.network))
    }

    pub fn validator(&self) -> ValidatorId {
        ValidatorId::new(self.validator_id.clone())
    }

    pub fn genesis(&self) -> Result<GenesisConfig, NodeError> {
        let mut genesis = GenesisConfig::new(self.network);
        genesis.timestamp = self.genesis_timestamp.map(Timestamp::new);
        for account in &self.genesis_accounts {
            let id = AccountId::new(account.id.clone());
            if !id.is_valid() {
                return Err(NodeError::Config(format!("invalid account id '{}'", account.id)));
            }
            genesis = genesis.with_account(
                id,
                parse_public_key(&account.public_key)?,
                Amount::new(u128::from(account.balance)),
            );
        }
        Ok(genesis)
    }
}

fn parse_public_key(s: &str) -> Result<PublicKey, NodeError> {
    let bytes = hex::decode(s).map_err(|e| NodeError::Config(format!("public key: {e}")))?;
    let raw: [u8; 32] = bytes
        .try_into()
        .map_err(|_| NodeError::Config("public key must be 32 bytes".to_string()))?;
    Ok(PublicKey(raw))
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            validator_id: default_validator_id(),
            data_dir: default_data_dir(),
            lmdb_map_size: default_map_size(),
            params: None,
            genesis_accounts: Vec::new(),
            genesis_timestamp: None,
            log_format: LogFormat::Human,
            log_level: default_log_level(),
            audit_log: None,
            tick_interval_ms: default_tick_interval_ms(),
            auto_submit_batches: true,
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::BlockSealPolicy;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().expect("should serialize");
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.validator_id, config.validator_id);
        assert_eq!(parsed.tick_interval_ms, config.tick_interval_ms);
    }

    #[test]
    fn minimal_toml_uses_network_defaults() {
        let config = NodeConfig::from_toml_str("network = \"test\"").expect("should parse");
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(config.chain_params(), ChainParams::for_network(NetworkId::Test));
    }

    #[test]
    fn partial_params_table_fills_from_defaults() {
        let toml = r#"
            log_format = "json"

            [params]
            sub_blocks_per_block = 4
            seal_policy = { mode = "time_boxed_partial", max_wait_secs = 5 }
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        let params = config.chain_params();
        assert_eq!(params.sub_blocks_per_block, 4);
        assert_eq!(params.seal_policy, BlockSealPolicy::TimeBoxedPartial { max_wait_secs: 5 });
        assert_eq!(params.max_sub_block_txs, ChainParams::default().max_sub_block_txs);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn genesis_accounts_are_decoded() {
        let toml = format!(
            r#"
            [[genesis_accounts]]
            id = "alice"
            public_key = "{}"
            balance = 100
            "#,
            "ab".repeat(32)
        );
        let config = NodeConfig::from_toml_str(&toml).expect("should parse");
        let genesis = config.genesis().expect("valid genesis");
        assert_eq!(genesis.accounts.len(), 1);
        assert_eq!(genesis.accounts[0].balance, Amount::new(100));
        assert_eq!(genesis.accounts[0].public_key, PublicKey([0xab; 32]));
    }

    #[test]
    fn short_public_key_is_a_config_error() {
        let config = NodeConfig {
            genesis_accounts: vec![GenesisAccountConfig {
                id: "alice".into(),
                public_key: "abcd".into(),
                balance: 1,
            }],
            ..NodeConfig::default()
        };
        assert!(matches!(config.genesis(), Err(NodeError::Config(_))));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/strata.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
