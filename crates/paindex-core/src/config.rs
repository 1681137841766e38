//! Indexer configuration.
//!
//! Deserialised from the YAML file passed to `paindex run`; every field
//! except the network/contract identities has a default.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::cursor::PairKey;
use crate::error::IndexerError;
use crate::types::normalize_hex;

/// An EVM network and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Slug used in cursors and logs (e.g. `"sepolia"`).
    pub name: String,
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
    /// Rate limiter bucket; networks sharing a provider key share a bucket.
    /// Defaults to the network name.
    #[serde(default)]
    pub rate_limit_key: Option<String>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
}

impl NetworkConfig {
    pub fn limiter_key(&self) -> &str {
        self.rate_limit_key.as_deref().unwrap_or(&self.name)
    }
}

/// A protocol adapter deployment to track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Name of a configured network.
    pub network: String,
    pub address: String,
    /// Explicit first block. Used when no cursor exists, or when it lies
    /// beyond the cursor.
    #[serde(default)]
    pub start_block: Option<u64>,
}

impl ContractConfig {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.network.clone(), &self.address)
    }
}

/// Sync cycle and retry policy, shared by all pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between cycles for one pair (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Blocks behind head to start from when no cursor or start block exists.
    #[serde(default = "default_backfill_blocks")]
    pub backfill_blocks: u64,
    /// Maximum blocks per `eth_getLogs` request.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// Consecutive failed attempts before a pair is reported stalled.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
    /// Entries in the per-pair calldata cache.
    #[serde(default = "default_calldata_cache_capacity")]
    pub calldata_cache_capacity: u64,
    /// Fetch and decode `execute` calldata for action-bearing transactions.
    #[serde(default = "bool_true")]
    pub decode_calldata: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backfill_blocks: default_backfill_blocks(),
            max_block_range: default_max_block_range(),
            max_attempts: default_max_attempts(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            calldata_cache_capacity: default_calldata_cache_capacity(),
            decode_calldata: true,
        }
    }
}

/// Where entities and cursors are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Sqlite { path: String },
}

/// Top-level indexer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub networks: Vec<NetworkConfig>,
    pub contracts: Vec<ContractConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl IndexerConfig {
    /// Check cross references and normalise addresses.
    pub fn validate(mut self) -> Result<Self, IndexerError> {
        let mut names = HashSet::new();
        for net in &self.networks {
            if !names.insert(net.name.as_str()) {
                return Err(IndexerError::Config(format!(
                    "duplicate network '{}'",
                    net.name
                )));
            }
            if net.requests_per_second <= 0.0 {
                return Err(IndexerError::Config(format!(
                    "network '{}': requests_per_second must be positive",
                    net.name
                )));
            }
        }
        for contract in &mut self.contracts {
            if !names.contains(contract.network.as_str()) {
                return Err(IndexerError::Config(format!(
                    "contract {} references unknown network '{}'",
                    contract.address, contract.network
                )));
            }
            contract.address = normalize_hex(&contract.address);
        }
        if self.sync.max_block_range == 0 {
            return Err(IndexerError::Config("max_block_range must be at least 1".into()));
        }
        if self.sync.max_attempts == 0 {
            return Err(IndexerError::Config("max_attempts must be at least 1".into()));
        }
        Ok(self)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }
}

fn default_requests_per_second() -> f64 { 10.0 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_backfill_blocks() -> u64 { 10_000 }
fn default_max_block_range() -> u64 { 2_000 }
fn default_max_attempts() -> u32 { 5 }
fn default_retry_initial_backoff_ms() -> u64 { 500 }
fn default_retry_max_backoff_ms() -> u64 { 30_000 }
fn default_calldata_cache_capacity() -> u64 { 1_024 }
fn bool_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
networks:
  - name: sepolia
    chain_id: 11155111
    rpc_url: https://rpc.sepolia.example
    requests_per_second: 5
contracts:
  - network: sepolia
    address: "0xAAAA000000000000000000000000000000000001"
    start_block: 100
sync:
  poll_interval_ms: 1000
storage:
  kind: sqlite
  path: ./paindex.db
"#;

    #[test]
    fn yaml_with_defaults() {
        let cfg: IndexerConfig = serde_yaml::from_str(YAML).unwrap();
        let cfg = cfg.validate().unwrap();
        assert_eq!(cfg.sync.poll_interval_ms, 1000);
        assert_eq!(cfg.sync.max_attempts, 5);
        assert!(cfg.sync.decode_calldata);
        assert_eq!(
            cfg.contracts[0].address,
            "0xaaaa000000000000000000000000000000000001"
        );
        assert_eq!(cfg.storage, StorageConfig::Sqlite { path: "./paindex.db".into() });
        assert_eq!(cfg.network("sepolia").unwrap().limiter_key(), "sepolia");
    }

    #[test]
    fn unknown_network_rejected() {
        let mut cfg: IndexerConfig = serde_yaml::from_str(YAML).unwrap();
        cfg.contracts[0].network = "mainnet".into();
        assert!(matches!(cfg.validate(), Err(IndexerError::Config(_))));
    }

    #[test]
    fn zero_range_rejected() {
        let mut cfg: IndexerConfig = serde_yaml::from_str(YAML).unwrap();
        cfg.sync.max_block_range = 0;
        assert!(cfg.validate().is_err());
    }
}
