//! YAML configuration file and the store it selects.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use paindex_core::{EntityStore, IndexerConfig, StorageConfig};
use paindex_storage::{InMemoryStore, SqliteStore};

use crate::logging::LogConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl CliConfig {
    pub fn parse(yaml: &str) -> Result<Self> {
        let raw: CliConfig = serde_yaml::from_str(yaml).context("parse config YAML")?;
        Ok(Self {
            indexer: raw.indexer.validate()?,
            log: raw.log,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config file '{}'", path.display()))?;
        Self::parse(&yaml).with_context(|| format!("load config '{}'", path.display()))
    }
}

pub async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn EntityStore>> {
    Ok(match storage {
        StorageConfig::Memory => Arc::new(InMemoryStore::new()),
        StorageConfig::Sqlite { path } => Arc::new(
            SqliteStore::open(path)
                .await
                .with_context(|| format!("open SQLite store '{path}'"))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
networks:
  - name: sepolia
    chain_id: 11155111
    rpc_url: https://rpc.sepolia.org
    requests_per_second: 5
contracts:
  - network: sepolia
    address: "0xABCDEF0000000000000000000000000000000001"
    start_block: 5000000
storage:
  kind: sqlite
  path: ./paindex.db
log:
  level: debug
  json: true
"#;

    #[test]
    fn parses_indexer_and_log_sections() {
        let config = CliConfig::parse(YAML).unwrap();
        assert_eq!(config.indexer.networks[0].chain_id, 11_155_111);
        assert_eq!(
            config.indexer.contracts[0].address,
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(
            config.indexer.storage,
            StorageConfig::Sqlite {
                path: "./paindex.db".into()
            }
        );
        assert_eq!(config.indexer.sync.max_block_range, 2_000);
        assert!(config.log.json);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn unknown_network_is_rejected() {
        let yaml = YAML.replace("- network: sepolia", "- network: mainnet");
        let err = CliConfig::parse(&yaml).unwrap_err();
        assert!(format!("{err:#}").contains("unknown network"), "{err:#}");
    }

    #[tokio::test]
    async fn memory_store_by_default() {
        let store = open_store(&StorageConfig::Memory).await.unwrap();
        assert_eq!(store.stats().await.unwrap().transactions, 0);
    }
}
