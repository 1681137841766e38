//! Per-transaction calldata cache.
//!
//! One transaction emits several `ActionExecuted` events that all need the
//! same decoded `execute` input. The cache keeps the outcome keyed by
//! transaction hash until the batch holding the transaction's
//! `TransactionExecuted` event has been committed, then the entry is
//! evicted. A cycle whose commit fails therefore reuses the decoded input
//! on its retry. Capacity is bounded so a backlog of half-processed
//! transactions cannot grow without limit.
//!
//! The cache is a dependency of the decode step, never ambient state: each
//! (network, contract) pair gets its own instance.

use std::sync::Arc;

use moka::sync::Cache;
use tracing::debug;

use crate::calldata::{CalldataDecoder, DecodedTransaction};

/// Result of decoding one transaction's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalldataOutcome {
    Decoded(Arc<DecodedTransaction>),
    /// The input was not an `execute` call.
    NotExecute,
    /// Decoding failed; the reason is recorded as a decode failure.
    Failed(String),
    /// No input was available for this transaction.
    Unavailable,
}

impl CalldataOutcome {
    pub fn transaction(&self) -> Option<&DecodedTransaction> {
        match self {
            Self::Decoded(tx) => Some(tx),
            _ => None,
        }
    }
}

/// Concurrent cache of decode outcomes keyed by lowercase transaction hash.
pub trait CalldataCache: Send + Sync {
    fn get(&self, tx_hash: &str) -> Option<CalldataOutcome>;
    fn insert(&self, tx_hash: &str, outcome: CalldataOutcome);
    fn evict(&self, tx_hash: &str);
    /// Approximate number of live entries.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached outcome or decode `input` and cache the result.
    ///
    /// `Unavailable` is never cached: a later enrichment pass may supply
    /// the input.
    fn get_or_decode(
        &self,
        tx_hash: &str,
        input: Option<&str>,
        decoder: &CalldataDecoder,
    ) -> CalldataOutcome {
        if let Some(hit) = self.get(tx_hash) {
            return hit;
        }
        let Some(input) = input else {
            return CalldataOutcome::Unavailable;
        };
        let outcome = match decoder.decode_hex(input) {
            Ok(Some(tx)) => CalldataOutcome::Decoded(Arc::new(tx)),
            Ok(None) => CalldataOutcome::NotExecute,
            Err(e) => CalldataOutcome::Failed(e.to_string()),
        };
        self.insert(tx_hash, outcome.clone());
        outcome
    }
}

/// Bounded cache backed by `moka` (TinyLFU admission, LRU eviction).
#[derive(Clone)]
pub struct LruCalldataCache {
    inner: Cache<String, CalldataOutcome>,
}

impl std::fmt::Debug for LruCalldataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCalldataCache")
            .field("entry_count", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}

impl LruCalldataCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(capacity).build(),
        }
    }
}

impl CalldataCache for LruCalldataCache {
    fn get(&self, tx_hash: &str) -> Option<CalldataOutcome> {
        self.inner.get(tx_hash)
    }

    fn insert(&self, tx_hash: &str, outcome: CalldataOutcome) {
        self.inner.insert(tx_hash.to_string(), outcome);
    }

    fn evict(&self, tx_hash: &str) {
        debug!(tx_hash, "evicting decoded calldata");
        self.inner.invalidate(tx_hash);
    }

    fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

/// Cache that stores nothing; every lookup decodes afresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCalldataCache;

impl CalldataCache for NoopCalldataCache {
    fn get(&self, _tx_hash: &str) -> Option<CalldataOutcome> {
        None
    }

    fn insert(&self, _tx_hash: &str, _outcome: CalldataOutcome) {}

    fn evict(&self, _tx_hash: &str) {}

    fn len(&self) -> u64 {
        0
    }
}
