//! Ingestion cursor: tracks how far each (network, contract) pair has been
//! ingested, for crash recovery.
//!
//! The cursor only ever moves as part of an atomic commit together with the
//! entity writes it covers (see [`EntityStore::commit`](crate::store::EntityStore::commit)).
//! On restart, ingestion resumes from `logs_block + 1`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::normalize_hex;

/// Identifies one independently ingested (network, contract) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub network: String,
    /// Lowercase `0x…` contract address.
    pub contract: String,
}

impl PairKey {
    pub fn new(network: impl Into<String>, contract: &str) -> Self {
        Self {
            network: network.into(),
            contract: normalize_hex(contract),
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.network, self.contract)
    }
}

/// Last-synced block numbers for a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCursor {
    pub network: String,
    pub contract: String,
    /// Last block whose logs were committed.
    pub logs_block: Option<u64>,
    /// Last block whose transactions had their calldata decoded.
    pub transactions_block: Option<u64>,
    /// Unix timestamp of the last commit.
    pub updated_at: i64,
}

impl IngestionCursor {
    /// A cursor that has not synced anything yet.
    pub fn new(key: &PairKey) -> Self {
        Self {
            network: key.network.clone(),
            contract: key.contract.clone(),
            logs_block: None,
            transactions_block: None,
            updated_at: 0,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey {
            network: self.network.clone(),
            contract: self.contract.clone(),
        }
    }

    /// Returns the next block to fetch, if anything has been synced.
    pub fn next_block(&self) -> Option<u64> {
        self.logs_block.map(|b| b + 1)
    }

    /// The cursor after successfully committing `to`.
    pub fn advanced(&self, to: u64, with_transactions: bool) -> Self {
        Self {
            network: self.network.clone(),
            contract: self.contract.clone(),
            logs_block: Some(to),
            transactions_block: if with_transactions {
                Some(to)
            } else {
                self.transactions_block
            },
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// `true` if either stream of `self` is behind `stored`.
    pub fn is_behind(&self, stored: &IngestionCursor) -> bool {
        self.logs_block < stored.logs_block || self.transactions_block < stored.transactions_block
    }

    /// The cursor a store keeps when `incoming` is committed over `self`:
    /// each stream takes the later block, so a stale committer can never
    /// move a pair backwards.
    pub fn merged(&self, incoming: &IngestionCursor) -> Self {
        Self {
            network: self.network.clone(),
            contract: self.contract.clone(),
            logs_block: self.logs_block.max(incoming.logs_block),
            transactions_block: self.transactions_block.max(incoming.transactions_block),
            updated_at: incoming.updated_at,
        }
    }
}

/// Trait for reading and administering cursors.
///
/// Cursors are written only through `EntityStore::commit`, which never
/// moves a stored cursor backwards; `delete_cursor` is the only rewind.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the cursor for a pair (returns `None` if the pair never synced).
    async fn load_cursor(&self, key: &PairKey) -> Result<Option<IngestionCursor>, IndexerError>;

    /// All known cursors, ordered by pair.
    async fn list_cursors(&self) -> Result<Vec<IngestionCursor>, IndexerError>;

    /// Delete a cursor so the pair restarts from its configured start.
    async fn delete_cursor(&self, key: &PairKey) -> Result<(), IndexerError>;
}
