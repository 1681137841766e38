//! Fluent builder for [`SyncEngine`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use paindex_evm::{JsonRpcEvmClient, SyncEngineBuilder};
//! # fn example(
//! #     client: Arc<JsonRpcEvmClient>,
//! #     store: Arc<dyn paindex_core::EntityStore>,
//! # ) -> Result<(), paindex_core::IndexerError> {
//! let engine = SyncEngineBuilder::new()
//!     .pair("sepolia", "0x0000000000000000000000000000000000000001")
//!     .chain_id(11_155_111)
//!     .start_block(5_000_000)
//!     .max_block_range(500)
//!     .client(client)
//!     .store(store)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use paindex_abi::{CalldataCache, LruCalldataCache, NoopCalldataCache};
use paindex_core::{
    ContractConfig, EntityStore, IndexerError, NetworkConfig, PairKey, SyncConfig,
};
use paindex_graph::BatchDecoder;

use crate::fetcher::{EvmFetcher, EvmRpcClient};
use crate::sync::SyncEngine;

pub struct SyncEngineBuilder {
    pair: Option<PairKey>,
    chain_id: u64,
    start_block: Option<u64>,
    sync: SyncConfig,
    cache: Option<Arc<dyn CalldataCache>>,
    client: Option<Arc<dyn EvmRpcClient>>,
    store: Option<Arc<dyn EntityStore>>,
}

impl Default for SyncEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngineBuilder {
    pub fn new() -> Self {
        Self {
            pair: None,
            chain_id: 1,
            start_block: None,
            sync: SyncConfig::default(),
            cache: None,
            client: None,
            store: None,
        }
    }

    /// Preset everything the configuration file describes for one contract.
    pub fn from_config(network: &NetworkConfig, contract: &ContractConfig, sync: &SyncConfig) -> Self {
        Self {
            pair: Some(contract.key()),
            chain_id: network.chain_id,
            start_block: contract.start_block,
            sync: sync.clone(),
            ..Self::new()
        }
    }

    /// Set the network name and contract address to ingest.
    pub fn pair(mut self, network: impl Into<String>, contract: &str) -> Self {
        self.pair = Some(PairKey::new(network, contract));
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// First block to ingest when no cursor exists (or jump forward to).
    pub fn start_block(mut self, block: u64) -> Self {
        self.start_block = Some(block);
        self
    }

    /// Blocks behind head to start from when neither cursor nor start block exist.
    pub fn backfill_blocks(mut self, blocks: u64) -> Self {
        self.sync.backfill_blocks = blocks;
        self
    }

    /// Maximum blocks per `eth_getLogs` request.
    pub fn max_block_range(mut self, blocks: u64) -> Self {
        self.sync.max_block_range = blocks;
        self
    }

    pub fn decode_calldata(mut self, enabled: bool) -> Self {
        self.sync.decode_calldata = enabled;
        self
    }

    /// Override the calldata cache. Defaults to an LRU cache of
    /// `calldata_cache_capacity` entries.
    pub fn calldata_cache(mut self, cache: Arc<dyn CalldataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn client(mut self, client: Arc<dyn EvmRpcClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<SyncEngine, IndexerError> {
        let pair = self
            .pair
            .ok_or_else(|| IndexerError::Config("sync engine needs a network and contract".into()))?;
        let client = self
            .client
            .ok_or_else(|| IndexerError::Config(format!("{pair}: no RPC client")))?;
        let store = self
            .store
            .ok_or_else(|| IndexerError::Config(format!("{pair}: no entity store")))?;
        if self.sync.max_block_range == 0 {
            return Err(IndexerError::Config(format!("{pair}: max_block_range must be > 0")));
        }

        let cache: Arc<dyn CalldataCache> = match (self.cache, self.sync.decode_calldata) {
            (Some(cache), _) => cache,
            (None, true) => Arc::new(LruCalldataCache::new(self.sync.calldata_cache_capacity)),
            (None, false) => Arc::new(NoopCalldataCache),
        };
        let decoder = BatchDecoder::new(self.chain_id, cache).with_calldata(self.sync.decode_calldata);
        let fetcher = EvmFetcher::new(client, self.sync.max_block_range);

        Ok(SyncEngine::new(
            pair,
            self.start_block,
            self.sync.backfill_blocks,
            fetcher,
            decoder,
            store,
        ))
    }
}
