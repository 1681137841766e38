//! The persistent store seen by the sync engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::{CursorStore, IngestionCursor};
use crate::delta::GraphDelta;
use crate::entities::{Resource, Transaction};
use crate::error::IndexerError;

/// Row counts per entity table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub transactions: u64,
    pub actions: u64,
    pub compliance_units: u64,
    pub logic_inputs: u64,
    pub resources: u64,
    pub payloads: u64,
    pub commitment_tree_roots: u64,
    pub forwarder_calls: u64,
    pub decode_failures: u64,
}

/// Entity store with natural-key upserts and transactional commit.
///
/// Implementations: `InMemoryStore` and `SqliteStore` in `paindex-storage`.
#[async_trait]
pub trait EntityStore: CursorStore {
    /// Apply `delta` with merge semantics and persist `cursor`, atomically.
    ///
    /// Either every upsert and the cursor update land, or none do.
    async fn commit(&self, delta: &GraphDelta, cursor: &IngestionCursor)
        -> Result<(), IndexerError>;

    async fn resource(&self, chain_id: u64, tag: &str) -> Result<Option<Resource>, IndexerError>;

    async fn transaction(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, IndexerError>;

    async fn stats(&self) -> Result<StoreStats, IndexerError>;
}
