//! EVM log fetcher.
//!
//! Uses `eth_getLogs` with range chunking, then enriches the logs with the
//! data decoding needs but `eth_getLogs` does not return: the parent
//! transaction's input and the block timestamp.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use paindex_abi::{EventClassifier, EventKind};
use paindex_core::{normalize_hex, IndexerError, RawLog};

/// Trait for fetching EVM data from a JSON-RPC provider.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, IndexerError>;

    /// Logs emitted by `address` in `[from, to]` whose topic0 is any of
    /// `topics`.
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
        topics: &[String],
    ) -> Result<Vec<RawLog>, IndexerError>;

    /// The `input` of a transaction, `None` if the node does not know it.
    async fn get_transaction_input(&self, tx_hash: &str) -> Result<Option<String>, IndexerError>;

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<i64>, IndexerError>;
}

/// Wraps an [`EvmRpcClient`] and adds chunking and enrichment.
#[derive(Clone)]
pub struct EvmFetcher {
    client: Arc<dyn EvmRpcClient>,
    max_block_range: u64,
    topics: Vec<String>,
}

impl EvmFetcher {
    pub fn new(client: Arc<dyn EvmRpcClient>, max_block_range: u64) -> Self {
        Self {
            client,
            max_block_range: max_block_range.max(1),
            topics: EventClassifier::new().topics(),
        }
    }

    /// Fetch the current chain head block number.
    pub async fn head_block_number(&self) -> Result<u64, IndexerError> {
        self.client.get_block_number().await
    }

    /// Fetch all adapter logs in `[from, to]`, split into requests of at
    /// most `max_block_range` blocks.
    pub async fn logs(&self, from: u64, to: u64, address: &str) -> Result<Vec<RawLog>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }
        let mut all_logs = Vec::new();
        let mut start = from;
        loop {
            let end = start.saturating_add(self.max_block_range - 1).min(to);
            let chunk = self.client.get_logs(start, end, address, &self.topics).await?;
            debug!(from = start, to = end, logs = chunk.len(), "fetched log chunk");
            all_logs.extend(chunk);
            if end >= to {
                break;
            }
            start = end + 1;
        }
        Ok(all_logs)
    }

    /// Fetch `[from, to]` and enrich the result.
    ///
    /// With `with_input`, every log of a transaction that emitted
    /// `ActionExecuted` or `TransactionExecuted` gets the transaction input.
    pub async fn fetch(
        &self,
        from: u64,
        to: u64,
        address: &str,
        with_input: bool,
    ) -> Result<Vec<RawLog>, IndexerError> {
        let mut logs = self.logs(from, to, address).await?;
        self.fill_timestamps(&mut logs).await?;
        if with_input {
            self.fill_inputs(&mut logs).await?;
        }
        Ok(logs)
    }

    async fn fill_timestamps(&self, logs: &mut [RawLog]) -> Result<(), IndexerError> {
        let blocks: BTreeSet<u64> = logs
            .iter()
            .filter(|l| l.block_timestamp.is_none())
            .filter_map(RawLog::block_number_u64)
            .collect();
        if blocks.is_empty() {
            return Ok(());
        }

        let stamps = try_join_all(blocks.iter().map(|&number| async move {
            let ts = self.client.get_block_timestamp(number).await?;
            Ok::<_, IndexerError>((number, ts))
        }))
        .await?;
        let stamps: HashMap<u64, i64> = stamps
            .into_iter()
            .filter_map(|(n, ts)| ts.map(|ts| (n, ts)))
            .collect();

        for log in logs.iter_mut().filter(|l| l.block_timestamp.is_none()) {
            if let Some(ts) = log.block_number_u64().and_then(|n| stamps.get(&n)) {
                log.block_timestamp = Some(format!("{ts:#x}"));
            }
        }
        Ok(())
    }

    async fn fill_inputs(&self, logs: &mut [RawLog]) -> Result<(), IndexerError> {
        let calldata_topics = [
            EventKind::TransactionExecuted.topic0(),
            EventKind::ActionExecuted.topic0(),
        ];
        let wanted: BTreeSet<String> = logs
            .iter()
            .filter(|l| l.tx_input.is_none())
            .filter(|l| {
                l.topic0()
                    .is_some_and(|t| calldata_topics.contains(&normalize_hex(t)))
            })
            .map(|l| normalize_hex(&l.tx_hash))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        let inputs = try_join_all(wanted.iter().map(|hash| async move {
            let input = self.client.get_transaction_input(hash).await?;
            Ok::<_, IndexerError>((hash.clone(), input))
        }))
        .await?;
        let inputs: HashMap<String, String> = inputs
            .into_iter()
            .filter_map(|(h, input)| input.map(|i| (h, i)))
            .collect();
        debug!(
            requested = wanted.len(),
            found = inputs.len(),
            "fetched transaction inputs"
        );

        for log in logs.iter_mut().filter(|l| l.tx_input.is_none()) {
            if let Some(input) = inputs.get(&normalize_hex(&log.tx_hash)) {
                log.tx_input = Some(input.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        ranges: Mutex<Vec<(u64, u64)>>,
        input_lookups: Mutex<Vec<String>>,
        logs: Vec<RawLog>,
    }

    #[async_trait]
    impl EvmRpcClient for Recording {
        async fn get_block_number(&self) -> Result<u64, IndexerError> {
            Ok(100)
        }

        async fn get_logs(
            &self,
            from: u64,
            to: u64,
            _address: &str,
            topics: &[String],
        ) -> Result<Vec<RawLog>, IndexerError> {
            assert_eq!(topics.len(), EventKind::ALL.len());
            self.ranges.lock().unwrap().push((from, to));
            Ok(self
                .logs
                .iter()
                .filter(|l| (from..=to).contains(&l.block_number_u64().unwrap()))
                .cloned()
                .collect())
        }

        async fn get_transaction_input(&self, tx_hash: &str) -> Result<Option<String>, IndexerError> {
            self.input_lookups.lock().unwrap().push(tx_hash.to_string());
            Ok(Some("0xed3cf91f".into()))
        }

        async fn get_block_timestamp(&self, number: u64) -> Result<Option<i64>, IndexerError> {
            Ok(Some(1_700_000_000 + number as i64))
        }
    }

    fn log(kind: EventKind, block: u64, tx: &str, index: u32) -> RawLog {
        RawLog {
            address: "0xadapter".into(),
            topics: vec![kind.topic0()],
            data: "0x".into(),
            block_number: format!("{block:#x}"),
            block_hash: None,
            tx_hash: tx.into(),
            log_index: format!("{index:#x}"),
            removed: None,
            block_timestamp: None,
            tx_input: None,
        }
    }

    #[tokio::test]
    async fn splits_range_into_bounded_chunks() {
        let client = Arc::new(Recording::default());
        let fetcher = EvmFetcher::new(client.clone(), 10);
        fetcher.logs(1, 25, "0xadapter").await.unwrap();
        assert_eq!(
            *client.ranges.lock().unwrap(),
            vec![(1, 10), (11, 20), (21, 25)]
        );
    }

    #[tokio::test]
    async fn single_block_range_is_one_request() {
        let client = Arc::new(Recording::default());
        let fetcher = EvmFetcher::new(client.clone(), 2_000);
        fetcher.logs(7, 7, "0xadapter").await.unwrap();
        assert_eq!(*client.ranges.lock().unwrap(), vec![(7, 7)]);
        assert!(fetcher.logs(8, 7, "0xadapter").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enriches_once_per_transaction_and_block() {
        let client = Arc::new(Recording {
            logs: vec![
                log(EventKind::ActionExecuted, 5, "0xAA", 0),
                log(EventKind::TransactionExecuted, 5, "0xaa", 1),
                log(EventKind::CommitmentTreeRootAdded, 6, "0xbb", 0),
            ],
            ..Recording::default()
        });
        let fetcher = EvmFetcher::new(client.clone(), 100);
        let logs = fetcher.fetch(1, 10, "0xadapter", true).await.unwrap();

        assert_eq!(*client.input_lookups.lock().unwrap(), vec!["0xaa".to_string()]);
        assert_eq!(logs[0].tx_input.as_deref(), Some("0xed3cf91f"));
        assert_eq!(logs[1].tx_input.as_deref(), Some("0xed3cf91f"));
        assert_eq!(logs[2].tx_input, None);
        assert_eq!(logs[2].block_timestamp_i64(), Some(1_700_000_006));
    }

    #[tokio::test]
    async fn no_input_lookup_without_calldata() {
        let client = Arc::new(Recording {
            logs: vec![log(EventKind::TransactionExecuted, 5, "0xaa", 0)],
            ..Recording::default()
        });
        let fetcher = EvmFetcher::new(client.clone(), 100);
        let logs = fetcher.fetch(1, 10, "0xadapter", false).await.unwrap();
        assert!(client.input_lookups.lock().unwrap().is_empty());
        assert_eq!(logs[0].tx_input, None);
    }
}
