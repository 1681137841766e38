//! [`EvmRpcClient`] over a JSON-RPC [`RpcTransport`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use paindex_core::types::parse_hex_u64;
use paindex_core::{IndexerError, NetworkConfig, RawLog, SyncConfig};
use paindex_rpc::{call, HttpConfig, HttpTransport, KeyedRateLimiter, RetryConfig, RpcTransport};

use crate::fetcher::EvmRpcClient;

pub struct JsonRpcEvmClient {
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
}

impl JsonRpcEvmClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// An HTTP client for `network`, throttled by `limiter` under the
    /// network's provider key.
    pub fn http(
        network: &NetworkConfig,
        sync: &SyncConfig,
        limiter: Arc<KeyedRateLimiter>,
    ) -> Result<Self, IndexerError> {
        limiter.register(network.limiter_key(), network.requests_per_second);
        let config = HttpConfig {
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff: Duration::from_millis(sync.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(sync.retry_max_backoff_ms),
                multiplier: 2.0,
            },
            ..HttpConfig::default()
        };
        let transport = HttpTransport::new(
            network.rpc_url.clone(),
            limiter,
            network.limiter_key(),
            config,
        )?;
        Ok(Self::new(Arc::new(transport)))
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, IndexerError> {
        Ok(call(self.transport.as_ref(), self.id(), method, params).await?)
    }
}

fn quantity(raw: &str, what: &str) -> Result<u64, IndexerError> {
    parse_hex_u64(raw).ok_or_else(|| IndexerError::Transport(format!("malformed {what}: {raw}")))
}

#[async_trait]
impl EvmRpcClient for JsonRpcEvmClient {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        let raw: String = self.request("eth_blockNumber", vec![]).await?;
        quantity(&raw, "block number")
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
        topics: &[String],
    ) -> Result<Vec<RawLog>, IndexerError> {
        let filter = json!({
            "fromBlock": format!("{from:#x}"),
            "toBlock": format!("{to:#x}"),
            "address": address,
            "topics": [topics],
        });
        self.request("eth_getLogs", vec![filter]).await
    }

    async fn get_transaction_input(&self, tx_hash: &str) -> Result<Option<String>, IndexerError> {
        let tx: Option<Value> = self
            .request("eth_getTransactionByHash", vec![json!(tx_hash)])
            .await?;
        Ok(tx.and_then(|v| v["input"].as_str().map(str::to_string)))
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<i64>, IndexerError> {
        let block: Option<Value> = self
            .request(
                "eth_getBlockByNumber",
                vec![json!(format!("{number:#x}")), json!(false)],
            )
            .await?;
        match block.as_ref().and_then(|b| b["timestamp"].as_str()) {
            Some(raw) => Ok(Some(quantity(raw, "block timestamp")? as i64)),
            None => Ok(None),
        }
    }
}
