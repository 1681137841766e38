//! Batch pipeline: raw logs of one block range → one [`GraphDelta`].
//!
//! Logs are classified, grouped by transaction hash and each group is
//! decoded and built on the rayon pool. Decode failures never abort the
//! batch; they become `DecodeFailure` rows next to the raw input. Only
//! unparsable log metadata (block number, log index) fails the whole batch,
//! since such a log cannot be placed in the graph at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use paindex_abi::{
    decode_log, CalldataCache, CalldataDecoder, CalldataOutcome, DecodedLog, EventClassifier,
    EventKind, LogMeta,
};
use paindex_core::{normalize_hex, DecodeFailure, FailureSource, GraphDelta, IndexerError, RawLog};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::builder::build_transaction;

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Logs handed to the pipeline.
    pub logs: usize,
    /// Logs with an unknown topic or removed by a reorg.
    pub ignored: usize,
    pub decoded: usize,
    pub failed: usize,
    pub transactions: usize,
    /// Transactions whose `execute` calldata decoded.
    pub calldata_decoded: usize,
}

impl BatchStats {
    fn add(&mut self, other: &BatchStats) {
        self.decoded += other.decoded;
        self.failed += other.failed;
        self.calldata_decoded += other.calldata_decoded;
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub delta: GraphDelta,
    pub stats: BatchStats,
    /// Transactions whose `TransactionExecuted` log was in the batch. Their
    /// cache entries are released with [`BatchDecoder::release`] once the
    /// delta is committed.
    pub completed: Vec<String>,
}

/// Decoder for batches of one (network, contract) pair.
pub struct BatchDecoder {
    chain_id: u64,
    classifier: EventClassifier,
    calldata: CalldataDecoder,
    cache: Arc<dyn CalldataCache>,
    decode_calldata: bool,
}

impl BatchDecoder {
    pub fn new(chain_id: u64, cache: Arc<dyn CalldataCache>) -> Self {
        Self {
            chain_id,
            classifier: EventClassifier::new(),
            calldata: CalldataDecoder::new(),
            cache,
            decode_calldata: true,
        }
    }

    /// Skip calldata; actions are stored without compliance units or logic inputs.
    pub fn with_calldata(mut self, enabled: bool) -> Self {
        self.decode_calldata = enabled;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn decodes_calldata(&self) -> bool {
        self.decode_calldata
    }

    pub fn decode(&self, logs: &[RawLog]) -> Result<BatchOutput, IndexerError> {
        let mut stats = BatchStats {
            logs: logs.len(),
            ..BatchStats::default()
        };

        let mut groups: BTreeMap<String, Vec<(EventKind, &RawLog)>> = BTreeMap::new();
        for log in logs {
            let kind = match log.topic0().and_then(|t| self.classifier.classify(t)) {
                Some(kind) if !log.is_removed() => kind,
                _ => {
                    stats.ignored += 1;
                    continue;
                }
            };
            LogMeta::from_log(log).map_err(|e| {
                IndexerError::Decode(format!("log {} in {}: {e}", log.log_index, log.tx_hash))
            })?;
            groups
                .entry(normalize_hex(&log.tx_hash))
                .or_default()
                .push((kind, log));
        }
        stats.transactions = groups.len();
        let completed: Vec<String> = groups
            .iter()
            .filter(|(_, group)| group.iter().any(|(k, _)| *k == EventKind::TransactionExecuted))
            .map(|(tx_hash, _)| tx_hash.clone())
            .collect();

        let results: Vec<(GraphDelta, BatchStats)> = groups
            .par_iter()
            .map(|(tx_hash, group)| self.decode_transaction(tx_hash, group))
            .collect();

        let mut delta = GraphDelta::new();
        for (tx_delta, tx_stats) in results {
            delta.extend(tx_delta);
            stats.add(&tx_stats);
        }

        debug!(
            chain_id = self.chain_id,
            logs = stats.logs,
            transactions = stats.transactions,
            failed = stats.failed,
            upserts = delta.len(),
            "batch decoded"
        );
        Ok(BatchOutput {
            delta,
            stats,
            completed,
        })
    }

    /// Drop cached calldata for transactions that are fully committed.
    pub fn release(&self, completed: &[String]) {
        for tx_hash in completed {
            self.cache.evict(tx_hash);
        }
    }

    fn decode_transaction(
        &self,
        tx_hash: &str,
        group: &[(EventKind, &RawLog)],
    ) -> (GraphDelta, BatchStats) {
        let mut stats = BatchStats::default();
        let mut failures = Vec::new();
        let mut decoded: Vec<DecodedLog> = Vec::with_capacity(group.len());

        for (kind, log) in group {
            match decode_log(*kind, log) {
                Ok(d) => {
                    stats.decoded += 1;
                    decoded.push(d);
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(tx_hash, event = %kind, error = %e, "event decode failed");
                    failures.push(self.failure(
                        tx_hash,
                        log,
                        FailureSource::Event(kind.name().to_string()),
                        e.to_string(),
                        log.data.clone(),
                    ));
                }
            }
        }

        let needs_calldata = decoded.iter().any(|d| {
            matches!(
                d.kind,
                EventKind::ActionExecuted | EventKind::TransactionExecuted
            )
        });
        let outcome = if self.decode_calldata && needs_calldata {
            let input = group.iter().find_map(|(_, log)| log.tx_input.as_deref());
            self.cache.get_or_decode(tx_hash, input, &self.calldata)
        } else {
            CalldataOutcome::Unavailable
        };
        match &outcome {
            CalldataOutcome::Decoded(_) => stats.calldata_decoded += 1,
            CalldataOutcome::Failed(reason) => {
                stats.failed += 1;
                warn!(tx_hash, error = %reason, "execute calldata decode failed");
                if let Some((_, anchor)) = calldata_anchor(group) {
                    let input = anchor.tx_input.clone().unwrap_or_default();
                    failures.push(self.failure(
                        tx_hash,
                        anchor,
                        FailureSource::Calldata,
                        reason.clone(),
                        input,
                    ));
                }
            }
            CalldataOutcome::NotExecute => {
                debug!(tx_hash, "transaction input is not an execute call")
            }
            CalldataOutcome::Unavailable if self.decode_calldata && needs_calldata => {
                debug!(tx_hash, "no transaction input available")
            }
            CalldataOutcome::Unavailable => {}
        }

        let mut delta = build_transaction(self.chain_id, &decoded, outcome.transaction());
        delta.decode_failures.extend(failures);
        (delta, stats)
    }

    fn failure(
        &self,
        tx_hash: &str,
        log: &RawLog,
        source: FailureSource,
        reason: String,
        data: String,
    ) -> DecodeFailure {
        DecodeFailure {
            chain_id: self.chain_id,
            tx_hash: tx_hash.to_string(),
            log_index: log.log_index_u32().unwrap_or_default(),
            block_number: log.block_number_u64().unwrap_or_default(),
            source,
            reason,
            topics: log.topics.clone(),
            data,
        }
    }
}

/// The log a calldata failure is filed under: `TransactionExecuted` if
/// present, else the first `ActionExecuted`.
fn calldata_anchor<'a>(group: &[(EventKind, &'a RawLog)]) -> Option<(EventKind, &'a RawLog)> {
    group
        .iter()
        .find(|(k, _)| *k == EventKind::TransactionExecuted)
        .or_else(|| group.iter().find(|(k, _)| *k == EventKind::ActionExecuted))
        .copied()
}
