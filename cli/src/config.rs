//! `stakeindex.toml`: every section is optional and falls back to defaults.
//!
//! Secrets can be supplied through the environment instead of the file:
//! `STAKEINDEX_DATABASE_URL` and `STAKEINDEX_REDIS_URL` win over the
//! corresponding keys.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::{IndexerConfig, DEFAULT_BATCH_SIZE, DEFAULT_LAG, DEFAULT_POLL_INTERVAL_MS};
use stakeindex_core::reward::DEFAULT_REWARD_FLUSH_SIZE;
use stakeindex_core::rpc::RetryPolicy;
use stakeindex_core::stake::StakeGenesis;
use stakeindex_core::telemetry::LogConfig;
use stakeindex_core::uptime::DEFAULT_VOTE_WINDOW;
use stakeindex_cosmos::{
    CL_BLOCK, CL_STAKING_EVENT, CL_TOTAL_STAKE, CL_TOTAL_STAKE_HIST, CL_VALIDATOR_UPTIME,
    CL_VALIDATOR_VOTE,
};
use stakeindex_evm::{DEFAULT_STAKING_CONTRACT, EL_BLOCK, EL_REWARD, EL_STAKING_EVENT};

pub const ENV_DATABASE_URL: &str = "STAKEINDEX_DATABASE_URL";
pub const ENV_REDIS_URL: &str = "STAKEINDEX_REDIS_URL";

/// Every indexer the binary knows how to build, in start-up order.
pub const ALL_INDEXERS: [&str; 9] = [
    CL_BLOCK,
    CL_STAKING_EVENT,
    CL_TOTAL_STAKE,
    CL_TOTAL_STAKE_HIST,
    CL_VALIDATOR_UPTIME,
    CL_VALIDATOR_VOTE,
    EL_BLOCK,
    EL_STAKING_EVENT,
    EL_REWARD,
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub indexer: IndexerSection,
    pub genesis: GenesisConfig,
    pub log: LogConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub cometbft_rpc: String,
    pub evm_rpc: String,
    pub staking_contract: String,
    pub rpc_timeout_ms: u64,
    /// Retries of a failed HTTP request before the tick gives up.
    pub rpc_max_retries: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cometbft_rpc: "http://localhost:26657".into(),
            evm_rpc: "http://localhost:8545".into(),
            staking_contract: DEFAULT_STAKING_CONTRACT.into(),
            rpc_timeout_ms: 10_000,
            rpc_max_retries: 3,
        }
    }
}

impl ChainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.rpc_max_retries,
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://…` or `sqlite:…`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://stakeindex.db?mode=rwc".into(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// In-process cache when unset.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSection {
    pub poll_interval_ms: u64,
    pub lag: u64,
    pub batch_size: u64,
    pub reward_flush_size: usize,
    pub vote_window: u64,
    /// Indexers to run; all of them when empty.
    pub enabled: Vec<String>,
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            lag: DEFAULT_LAG,
            batch_size: DEFAULT_BATCH_SIZE,
            reward_flush_size: DEFAULT_REWARD_FLUSH_SIZE,
            vote_window: DEFAULT_VOTE_WINDOW,
            enabled: Vec::new(),
        }
    }
}

impl IndexerSection {
    pub fn scheduling(&self) -> IndexerConfig {
        IndexerConfig {
            poll_interval_ms: self.poll_interval_ms,
            lag: self.lag,
            batch_size: self.batch_size,
        }
    }

    pub fn enabled_indexers(&self) -> Vec<&str> {
        if self.enabled.is_empty() {
            return ALL_INDEXERS.to_vec();
        }
        ALL_INDEXERS
            .iter()
            .copied()
            .filter(|name| self.enabled.iter().any(|e| e == name))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Total stake at genesis, in gwei.
    pub stake_amount: i64,
    /// RFC 3339.
    pub time: String,
    pub block: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let d = StakeGenesis::default();
        Self {
            stake_amount: d.amount,
            time: "2025-01-19T15:00:00Z".into(),
            block: d.block,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// OTLP/gRPC collector, e.g. `http://localhost:4317`. Metrics stay
    /// in-process no-ops when unset.
    pub otlp_endpoint: Option<String>,
    pub export_interval_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            export_interval_ms: 60_000,
        }
    }
}

impl MetricsConfig {
    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }
}

impl GenesisConfig {
    pub fn stake_genesis(&self) -> Result<StakeGenesis, IndexerError> {
        let time = chrono::DateTime::parse_from_rfc3339(&self.time)
            .map_err(|e| IndexerError::Config(format!("genesis.time '{}': {e}", self.time)))?;
        Ok(StakeGenesis {
            amount: self.stake_amount,
            time: time.timestamp(),
            block: self.block,
        })
    }
}

impl Config {
    /// Read `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, IndexerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IndexerError::Config(format!("read {}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, IndexerError> {
        toml::from_str(raw).map_err(|e| IndexerError::Config(e.to_string()))
    }

    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            self.database.url = url;
        }
        if let Some(url) = get(ENV_REDIS_URL).filter(|v| !v.is_empty()) {
            self.cache.redis_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        let fail = |msg: &str| Err(IndexerError::Config(msg.to_string()));
        if self.chain.cometbft_rpc.is_empty() {
            return fail("chain.cometbft_rpc must not be empty");
        }
        if self.chain.evm_rpc.is_empty() {
            return fail("chain.evm_rpc must not be empty");
        }
        if self.database.url.is_empty() {
            return fail("database.url must not be empty");
        }
        if self.indexer.batch_size == 0 {
            return fail("indexer.batch_size must be at least 1");
        }
        if self.indexer.vote_window == 0 {
            return fail("indexer.vote_window must be at least 1");
        }
        if self.metrics.otlp_endpoint.is_some() && self.metrics.export_interval_ms == 0 {
            return fail("metrics.export_interval_ms must be at least 1");
        }
        if self.indexer.reward_flush_size == 0 {
            return fail("indexer.reward_flush_size must be at least 1");
        }
        if let Some(unknown) = self
            .indexer
            .enabled
            .iter()
            .find(|name| !ALL_INDEXERS.contains(&name.as_str()))
        {
            return Err(IndexerError::Config(format!("unknown indexer '{unknown}'")));
        }
        self.genesis.stake_genesis()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.indexer.lag, 10);
        assert_eq!(config.indexer.batch_size, 100);
        assert_eq!(config.indexer.vote_window, 43_200);
        assert_eq!(config.indexer.enabled_indexers().len(), 9);
        assert_eq!(config.genesis.stake_genesis().unwrap(), StakeGenesis::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [chain]
            cometbft_rpc = "http://node:26657"

            [indexer]
            batch_size = 50
            enabled = ["el_reward", "cl_block"]

            [genesis]
            stake_amount = 1000
            time = "2024-01-01T00:00:00Z"

            [log]
            level = "debug"
            json = true

            [metrics]
            otlp_endpoint = "http://collector:4317"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.chain.cometbft_rpc, "http://node:26657");
        assert_eq!(config.chain.evm_rpc, "http://localhost:8545");
        assert_eq!(config.indexer.scheduling().batch_size, 50);
        // Start-up order, not file order.
        assert_eq!(config.indexer.enabled_indexers(), vec!["cl_block", "el_reward"]);
        assert_eq!(config.genesis.stake_genesis().unwrap().time, 1_704_067_200);
        assert!(config.log.json);
        assert_eq!(config.metrics.otlp_endpoint.as_deref(), Some("http://collector:4317"));
        assert_eq!(config.metrics.export_interval(), Duration::from_secs(60));
    }

    #[test]
    fn example_file_is_valid() {
        let config = Config::from_toml_str(include_str!("../../stakeindex.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.log.components.get("sqlx").map(String::as_str), Some("warn"));
        assert_eq!(config.cache.redis_url, None);
    }

    #[test]
    fn env_overrides_secrets() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_DATABASE_URL => Some("postgres://u:p@db/stake".into()),
            ENV_REDIS_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.database.url, "postgres://u:p@db/stake");
        assert_eq!(config.cache.redis_url, None);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.indexer.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.indexer.vote_window = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chain.evm_rpc.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.genesis.time = "yesterday".into();
        assert!(matches!(config.validate(), Err(IndexerError::Config(_))));

        let mut config = Config::default();
        config.metrics.otlp_endpoint = Some("http://collector:4317".into());
        config.metrics.export_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.indexer.enabled = vec!["el_blocks".into()];
        assert!(config.validate().is_err());
    }
}
