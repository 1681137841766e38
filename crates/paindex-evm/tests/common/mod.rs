//! Shared fixtures: a scripted chain, a store with injectable commit
//! failures, and ABI-encoded adapter logs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{B256, U256};
use async_trait::async_trait;

use paindex_abi::{CalldataDecoder, EventKind};
use paindex_core::{
    CursorStore, EntityGraph, EntityStore, GraphDelta, IndexerError, IngestionCursor, PairKey,
    RawLog, Resource, StoreStats, Transaction,
};
use paindex_evm::{EvmRpcClient, SyncEngine, SyncEngineBuilder};
use paindex_storage::InMemoryStore;

pub const NETWORK: &str = "sepolia";
pub const CONTRACT: &str = "0x00000000000000000000000000000000000000ad";
pub const CHAIN_ID: u64 = 11_155_111;

pub fn pair() -> PairKey {
    PairKey::new(NETWORK, CONTRACT)
}

pub fn word(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 32]))
}

pub fn tx_hash(byte: u8) -> String {
    word(byte)
}

// ─── Chain ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockChain {
    pub head: AtomicU64,
    pub logs: Mutex<Vec<RawLog>>,
    pub inputs: Mutex<HashMap<String, String>>,
    pub fail_logs: AtomicBool,
    pub fail_head: AtomicBool,
    pub get_logs_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(head: u64) -> Arc<Self> {
        let chain = Self::default();
        chain.head.store(head, Ordering::SeqCst);
        Arc::new(chain)
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn set_input(&self, tx: &str, input: &[u8]) {
        self.inputs
            .lock()
            .unwrap()
            .insert(tx.to_string(), format!("0x{}", hex::encode(input)));
    }
}

#[async_trait]
impl EvmRpcClient for MockChain {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(IndexerError::Transport("connection refused".into()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
        topics: &[String],
    ) -> Result<Vec<RawLog>, IndexerError> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(IndexerError::Transport("connection reset".into()));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.address == address)
            .filter(|l| (from..=to).contains(&l.block_number_u64().unwrap()))
            .filter(|l| topics.iter().any(|t| Some(t.as_str()) == l.topic0()))
            .cloned()
            .collect())
    }

    async fn get_transaction_input(&self, tx_hash: &str) -> Result<Option<String>, IndexerError> {
        Ok(self.inputs.lock().unwrap().get(tx_hash).cloned())
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<i64>, IndexerError> {
        Ok(Some(1_700_000_000 + number as i64 * 12))
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// In-memory store whose commits can be made to fail or to stall.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_commit: AtomicBool,
    /// Delay applied inside `commit`, before anything is written.
    pub commit_delay_ms: AtomicU64,
    pub commits_started: AtomicUsize,
}

impl FlakyStore {
    pub fn snapshot(&self) -> EntityGraph {
        self.inner.snapshot()
    }
}

#[async_trait]
impl CursorStore for FlakyStore {
    async fn load_cursor(&self, key: &PairKey) -> Result<Option<IngestionCursor>, IndexerError> {
        self.inner.load_cursor(key).await
    }

    async fn list_cursors(&self) -> Result<Vec<IngestionCursor>, IndexerError> {
        self.inner.list_cursors().await
    }

    async fn delete_cursor(&self, key: &PairKey) -> Result<(), IndexerError> {
        self.inner.delete_cursor(key).await
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn commit(&self, delta: &GraphDelta, cursor: &IngestionCursor) -> Result<(), IndexerError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(IndexerError::Persistence("disk I/O error".into()));
        }
        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        self.commits_started.fetch_add(1, Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.inner.commit(delta, cursor).await
    }

    async fn resource(&self, chain_id: u64, tag: &str) -> Result<Option<Resource>, IndexerError> {
        self.inner.resource(chain_id, tag).await
    }

    async fn transaction(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, IndexerError> {
        self.inner.transaction(chain_id, tx_hash).await
    }

    async fn stats(&self) -> Result<StoreStats, IndexerError> {
        self.inner.stats().await
    }
}

pub fn engine(chain: Arc<MockChain>, store: Arc<FlakyStore>) -> SyncEngine {
    engine_on(chain, store)
}

/// An engine for the test pair writing to any store backend.
pub fn engine_on(chain: Arc<MockChain>, store: Arc<dyn EntityStore>) -> SyncEngine {
    SyncEngineBuilder::new()
        .pair(NETWORK, CONTRACT)
        .chain_id(CHAIN_ID)
        .start_block(1)
        .client(chain)
        .store(store)
        .build()
        .unwrap()
}

// ─── Logs ────────────────────────────────────────────────────────────────────

fn b32(byte: u8) -> DynSolValue {
    DynSolValue::FixedBytes(B256::repeat_byte(byte), 32)
}

fn words(bytes: &[u8]) -> DynSolValue {
    DynSolValue::Array(bytes.iter().map(|b| b32(*b)).collect())
}

fn log(kind: EventKind, block: u64, tx: &str, log_index: u32, extra: &[String], data: Vec<u8>) -> RawLog {
    let mut topics = vec![kind.topic0()];
    topics.extend_from_slice(extra);
    RawLog {
        address: CONTRACT.into(),
        topics,
        data: format!("0x{}", hex::encode(data)),
        block_number: format!("{block:#x}"),
        block_hash: None,
        tx_hash: tx.into(),
        log_index: format!("{log_index:#x}"),
        removed: None,
        block_timestamp: None,
        tx_input: None,
    }
}

pub fn transaction_executed(block: u64, tx: &str, log_index: u32, tags: &[u8]) -> RawLog {
    let refs: Vec<u8> = tags.iter().map(|t| t.wrapping_add(0x80)).collect();
    let data = DynSolValue::Tuple(vec![words(tags), words(&refs)]).abi_encode_params();
    log(EventKind::TransactionExecuted, block, tx, log_index, &[], data)
}

pub fn action_executed(block: u64, tx: &str, log_index: u32, root: u8, tag_count: u64) -> RawLog {
    let data = DynSolValue::Tuple(vec![b32(root), DynSolValue::Uint(U256::from(tag_count), 256)])
        .abi_encode_params();
    log(EventKind::ActionExecuted, block, tx, log_index, &[], data)
}

pub fn resource_blob(quantity: u64) -> Vec<u8> {
    DynSolValue::Tuple(vec![
        b32(0x01),
        b32(0x02),
        DynSolValue::Uint(U256::from(quantity), 128),
        b32(0x03),
        DynSolValue::Bool(false),
        b32(0x04),
        b32(0x05),
        b32(0x06),
    ])
    .abi_encode_params()
}

pub fn resource_payload(block: u64, tx: &str, log_index: u32, tag: u8, blob: Vec<u8>) -> RawLog {
    let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::ZERO, 256), DynSolValue::Bytes(blob)])
        .abi_encode_params();
    log(EventKind::ResourcePayload, block, tx, log_index, &[word(tag)], data)
}

fn expirable(criterion: u8, bytes: &[u8]) -> DynSolValue {
    DynSolValue::Tuple(vec![
        DynSolValue::Uint(U256::from(criterion), 8),
        DynSolValue::Bytes(bytes.to_vec()),
    ])
}

fn logic_input(tag: u8) -> DynSolValue {
    DynSolValue::Tuple(vec![
        b32(tag),
        b32(0x20),
        DynSolValue::Tuple(vec![
            DynSolValue::Array(vec![expirable(0, &[0xaa])]),
            DynSolValue::Array(vec![]),
            DynSolValue::Array(vec![]),
            DynSolValue::Array(vec![]),
        ]),
        DynSolValue::Bytes(vec![0x01]),
    ])
}

fn compliance_input(nullifier: u8, commitment: u8) -> DynSolValue {
    DynSolValue::Tuple(vec![
        DynSolValue::Bytes(vec![0x02]),
        DynSolValue::Tuple(vec![
            DynSolValue::Tuple(vec![b32(nullifier), b32(0x10), b32(0x11)]),
            DynSolValue::Tuple(vec![b32(commitment), b32(0x12)]),
            b32(0x13),
            b32(0x14),
        ]),
    ])
}

/// `execute` calldata with one action consuming `nullifier` and creating
/// `commitment`.
pub fn execute_calldata(nullifier: u8, commitment: u8) -> Vec<u8> {
    let action = DynSolValue::Tuple(vec![
        DynSolValue::Array(vec![logic_input(nullifier), logic_input(commitment)]),
        DynSolValue::Array(vec![compliance_input(nullifier, commitment)]),
    ]);
    let tx = DynSolValue::Tuple(vec![
        DynSolValue::Array(vec![action]),
        DynSolValue::Bytes(vec![0xde, 0x1a]),
        DynSolValue::Bytes(vec![]),
    ]);
    let mut calldata = CalldataDecoder::new().selector().to_vec();
    calldata.extend(DynSolValue::Tuple(vec![tx]).abi_encode_params());
    calldata
}
