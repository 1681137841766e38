//! In-memory storage backend.
//!
//! Holds the entity graph and the cursors behind one lock, so a commit is
//! atomic with respect to every reader. All data is lost when the process
//! exits.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use paindex_core::{
    CursorStore, EntityGraph, EntityStore, GraphDelta, IndexerError, IngestionCursor, PairKey,
    Resource, StoreStats, Transaction,
};
use tracing::{debug, warn};

#[derive(Default)]
struct State {
    graph: EntityGraph,
    cursors: BTreeMap<PairKey, IngestionCursor>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of every stored entity.
    pub fn snapshot(&self) -> EntityGraph {
        self.lock().graph.clone()
    }

    /// Write a cursor outside a commit (restores and tests).
    pub fn put_cursor(&self, cursor: IngestionCursor) {
        self.lock().cursors.insert(cursor.key(), cursor);
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn load_cursor(&self, key: &PairKey) -> Result<Option<IngestionCursor>, IndexerError> {
        Ok(self.lock().cursors.get(key).cloned())
    }

    async fn list_cursors(&self) -> Result<Vec<IngestionCursor>, IndexerError> {
        Ok(self.lock().cursors.values().cloned().collect())
    }

    async fn delete_cursor(&self, key: &PairKey) -> Result<(), IndexerError> {
        self.lock().cursors.remove(key);
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn commit(&self, delta: &GraphDelta, cursor: &IngestionCursor) -> Result<(), IndexerError> {
        let mut state = self.lock();
        state.graph.apply(delta);
        let key = cursor.key();
        let kept = match state.cursors.get(&key) {
            Some(stored) => {
                if cursor.is_behind(stored) {
                    warn!(
                        pair = %key,
                        stored = ?stored.logs_block,
                        incoming = ?cursor.logs_block,
                        "stale cursor ignored"
                    );
                }
                stored.merged(cursor)
            }
            None => cursor.clone(),
        };
        state.cursors.insert(key, kept);
        debug!(
            pair = %cursor.key(),
            logs_block = ?cursor.logs_block,
            upserts = delta.len(),
            "committed"
        );
        Ok(())
    }

    async fn resource(&self, chain_id: u64, tag: &str) -> Result<Option<Resource>, IndexerError> {
        Ok(self
            .lock()
            .graph
            .resources
            .get(&Resource::key(chain_id, tag))
            .cloned())
    }

    async fn transaction(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, IndexerError> {
        Ok(self
            .lock()
            .graph
            .transactions
            .get(&Transaction::key(chain_id, tx_hash))
            .cloned())
    }

    async fn stats(&self) -> Result<StoreStats, IndexerError> {
        let state = self.lock();
        let g = &state.graph;
        let n = |len: usize| len as u64;
        Ok(StoreStats {
            transactions: n(g.transactions.len()),
            actions: n(g.actions.len()),
            compliance_units: n(g.compliance_units.len()),
            logic_inputs: n(g.logic_inputs.len()),
            resources: n(g.resources.len()),
            payloads: n(g.payloads.len()),
            commitment_tree_roots: n(g.commitment_tree_roots.len()),
            forwarder_calls: n(g.forwarder_calls.len()),
            decode_failures: n(g.decode_failures.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paindex_core::DecodingStatus;

    fn key() -> PairKey {
        PairKey::new("sepolia", "0xAdapter")
    }

    #[tokio::test]
    async fn commit_writes_entities_and_cursor() {
        let store = InMemoryStore::new();
        let mut delta = GraphDelta::new();
        let mut r = Resource::stub(1, "0xt");
        r.index = Some(1);
        r.is_consumed = Some(false);
        delta.resources.push(r);

        let cursor = IngestionCursor::new(&key()).advanced(100, true);
        store.commit(&delta, &cursor).await.unwrap();

        assert_eq!(store.load_cursor(&key()).await.unwrap(), Some(cursor));
        let stored = store.resource(1, "0xt").await.unwrap().unwrap();
        assert_eq!(stored.index, Some(1));
        assert_eq!(store.stats().await.unwrap().resources, 1);
    }

    #[tokio::test]
    async fn later_commits_merge() {
        let store = InMemoryStore::new();
        let cursor = IngestionCursor::new(&key());

        let mut decoded = Resource::stub(1, "0xt");
        decoded.decoding_status = DecodingStatus::Success;
        decoded.label_ref = Some("0xl".into());
        let mut first = GraphDelta::new();
        first.resources.push(decoded);
        store.commit(&first, &cursor.advanced(10, true)).await.unwrap();

        let mut positioned = Resource::stub(1, "0xt");
        positioned.index = Some(3);
        positioned.is_consumed = Some(false);
        let mut second = GraphDelta::new();
        second.resources.push(positioned);
        store.commit(&second, &cursor.advanced(20, true)).await.unwrap();

        let r = store.resource(1, "0xt").await.unwrap().unwrap();
        assert_eq!(r.decoding_status, DecodingStatus::Success);
        assert_eq!(r.label_ref.as_deref(), Some("0xl"));
        assert_eq!(r.index, Some(3));
        assert_eq!(
            store.load_cursor(&key()).await.unwrap().unwrap().logs_block,
            Some(20)
        );
    }

    #[tokio::test]
    async fn stale_commit_never_rewinds_cursor() {
        let store = InMemoryStore::new();
        let cursor = IngestionCursor::new(&key());
        store.commit(&GraphDelta::new(), &cursor.advanced(20, true)).await.unwrap();

        let mut late = GraphDelta::new();
        late.resources.push(Resource::stub(1, "0xlate"));
        store.commit(&late, &cursor.advanced(10, true)).await.unwrap();

        let stored = store.load_cursor(&key()).await.unwrap().unwrap();
        assert_eq!(stored.logs_block, Some(20));
        assert_eq!(stored.transactions_block, Some(20));
        // The stale batch's entities still merge in.
        assert!(store.resource(1, "0xlate").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_and_list_cursors() {
        let store = InMemoryStore::new();
        store.put_cursor(IngestionCursor::new(&key()).advanced(5, false));
        store.put_cursor(IngestionCursor::new(&PairKey::new("mainnet", "0x01")).advanced(9, false));
        let listed = store.list_cursors().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].network, "mainnet");

        store.delete_cursor(&key()).await.unwrap();
        assert_eq!(store.load_cursor(&key()).await.unwrap(), None);
    }
}
