//! End-to-end ingestion cycles against a scripted chain and the in-memory
//! store.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use paindex_abi::{CalldataCache, CalldataOutcome, LruCalldataCache};
use paindex_core::{
    Action, CursorStore, DecodingStatus, EntityStore, IndexerError, Resource, Transaction,
};
use paindex_evm::{CycleOutcome, SyncState};

fn committed(outcome: CycleOutcome) -> paindex_evm::CycleReport {
    match outcome {
        CycleOutcome::Committed(report) => report,
        other => panic!("expected a commit, got {other:?}"),
    }
}

/// One `execute` with a single action consuming 0x11 and creating 0x12.
fn seed_execute(chain: &MockChain, block: u64, tx: &str) {
    chain.push(action_executed(block, tx, 0, 0xee, 2));
    chain.push(transaction_executed(block, tx, 1, &[0x11, 0x12]));
    chain.set_input(tx, &execute_calldata(0x11, 0x12));
}

#[tokio::test]
async fn cycle_builds_the_graph_and_advances_cursor() {
    let chain = MockChain::new(20);
    let tx = tx_hash(0xaa);
    seed_execute(&chain, 10, &tx);
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());

    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!((report.from, report.to), (1, 20));
    assert_eq!(report.stats.calldata_decoded, 1);
    assert_eq!(engine.state(), SyncState::Idle);

    let cursor = store.load_cursor(&pair()).await.unwrap().unwrap();
    assert_eq!(cursor.logs_block, Some(20));
    assert_eq!(cursor.transactions_block, Some(20));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.transactions, 1);
    assert_eq!(stats.actions, 1);
    assert_eq!(stats.compliance_units, 1);
    assert_eq!(stats.logic_inputs, 2);
    assert_eq!(stats.resources, 2);
    assert_eq!(stats.decode_failures, 0);

    let t = store.transaction(CHAIN_ID, &tx).await.unwrap().unwrap();
    assert_eq!(t.tags, vec![word(0x11), word(0x12)]);
    assert_eq!(t.delta_proof.as_deref(), Some("0xde1a"));
    assert_eq!(t.timestamp, Some(1_700_000_000 + 10 * 12));

    let consumed = store.resource(CHAIN_ID, &word(0x11)).await.unwrap().unwrap();
    assert_eq!(consumed.index, Some(0));
    assert_eq!(consumed.is_consumed, Some(true));
    assert!(consumed.compliance_unit_id.is_some());
    assert!(consumed.logic_input_id.is_some());
    assert_eq!(consumed.transaction_id, Some(Transaction::key(CHAIN_ID, &tx)));

    let created = store.resource(CHAIN_ID, &word(0x12)).await.unwrap().unwrap();
    assert_eq!(created.index, Some(1));
    assert_eq!(created.is_consumed, Some(false));

    let graph = store.snapshot();
    assert!(graph.actions[&Action::key(CHAIN_ID, &tx, 0)].calldata_matched);
}

#[tokio::test]
async fn reprocessing_a_range_is_idempotent() {
    let chain = MockChain::new(20);
    seed_execute(&chain, 10, &tx_hash(0xaa));
    chain.push(resource_payload(12, &tx_hash(0xbb), 0, 0x11, resource_blob(7)));
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());

    engine.run_cycle().await.unwrap();
    let first = store.snapshot();

    // Roll the cursor back and run the same range again.
    store.delete_cursor(&pair()).await.unwrap();
    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!(report.from, 1);
    assert_eq!(store.snapshot(), first);
}

#[tokio::test]
async fn failed_fetch_leaves_cursor_untouched() {
    let chain = MockChain::new(20);
    seed_execute(&chain, 10, &tx_hash(0xaa));
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());
    engine.run_cycle().await.unwrap();
    let before = store.load_cursor(&pair()).await.unwrap();
    let graph_before = store.snapshot();

    chain.set_head(30);
    seed_execute(&chain, 25, &tx_hash(0xcc));
    chain.fail_logs.store(true, Ordering::SeqCst);

    assert!(engine.run_cycle().await.is_err());
    assert_eq!(engine.state(), SyncState::Failed);
    assert_eq!(store.load_cursor(&pair()).await.unwrap(), before);
    assert_eq!(store.snapshot(), graph_before);

    // The retry starts from the same block.
    chain.fail_logs.store(false, Ordering::SeqCst);
    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!(report.from, 21);
    assert_eq!(
        store.load_cursor(&pair()).await.unwrap().unwrap().logs_block,
        Some(30)
    );
}

#[tokio::test]
async fn failed_decode_leaves_cursor_untouched() {
    let chain = MockChain::new(20);
    seed_execute(&chain, 10, &tx_hash(0xaa));
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());
    engine.run_cycle().await.unwrap();
    let before = store.load_cursor(&pair()).await.unwrap();
    let graph_before = store.snapshot();

    chain.set_head(30);
    seed_execute(&chain, 25, &tx_hash(0xcc));
    let mut unplaceable = resource_payload(26, &tx_hash(0xdd), 0, 0x55, resource_blob(1));
    unplaceable.log_index = "0xzz".into();
    chain.push(unplaceable);

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, IndexerError::Decode(_)), "{err}");
    assert_eq!(engine.state(), SyncState::Failed);
    assert_eq!(store.load_cursor(&pair()).await.unwrap(), before);
    assert_eq!(store.snapshot(), graph_before);
    assert!(store.transaction(CHAIN_ID, &tx_hash(0xcc)).await.unwrap().is_none());

    // With the bad log gone the retry covers the same range.
    chain.logs.lock().unwrap().retain(|l| l.log_index != "0xzz");
    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!((report.from, report.to), (21, 30));
    assert!(store.transaction(CHAIN_ID, &tx_hash(0xcc)).await.unwrap().is_some());
}

#[tokio::test]
async fn retry_after_failed_commit_reuses_decoded_calldata() {
    let chain = MockChain::new(20);
    let tx = tx_hash(0xaa);
    seed_execute(&chain, 10, &tx);
    let store = Arc::new(FlakyStore::default());
    store.fail_commit.store(true, Ordering::SeqCst);
    let cache = Arc::new(LruCalldataCache::new(16));
    let engine = paindex_evm::SyncEngineBuilder::new()
        .pair(NETWORK, CONTRACT)
        .chain_id(CHAIN_ID)
        .start_block(1)
        .calldata_cache(cache.clone())
        .client(chain.clone())
        .store(store.clone())
        .build()
        .unwrap();

    assert!(engine.run_cycle().await.is_err());
    assert!(matches!(cache.get(&tx), Some(CalldataOutcome::Decoded(_))));

    // The input is gone upstream; the retry still decodes from the cache.
    chain.inputs.lock().unwrap().clear();
    store.fail_commit.store(false, Ordering::SeqCst);
    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!(report.stats.calldata_decoded, 1);
    assert_eq!(store.stats().await.unwrap().compliance_units, 1);
    assert_eq!(cache.get(&tx), None);
}

#[tokio::test]
async fn failed_commit_leaves_cursor_untouched() {
    let chain = MockChain::new(20);
    seed_execute(&chain, 10, &tx_hash(0xaa));
    let store = Arc::new(FlakyStore::default());
    store.fail_commit.store(true, Ordering::SeqCst);
    let engine = engine(chain.clone(), store.clone());

    let err = engine.run_cycle().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.load_cursor(&pair()).await.unwrap(), None);
    assert_eq!(store.stats().await.unwrap().transactions, 0);

    store.fail_commit.store(false, Ordering::SeqCst);
    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!(report.from, 1);
}

#[tokio::test]
async fn payload_before_transaction_across_cycles() {
    let chain = MockChain::new(10);
    let tag = 0x44;
    chain.push(resource_payload(10, &tx_hash(0xaa), 0, tag, resource_blob(5)));
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());
    engine.run_cycle().await.unwrap();

    let early = store.resource(CHAIN_ID, &word(tag)).await.unwrap().unwrap();
    assert_eq!(early.decoding_status, DecodingStatus::Success);
    assert_eq!(early.index, None);

    chain.set_head(12);
    chain.push(transaction_executed(12, &tx_hash(0xbb), 0, &[0x41, 0x42, 0x43, tag]));
    engine.run_cycle().await.unwrap();

    let graph = store.snapshot();
    let matching: Vec<&Resource> = graph.resources.values().filter(|r| r.tag == word(tag)).collect();
    assert_eq!(matching.len(), 1);
    let r = matching[0];
    assert_eq!(r.decoding_status, DecodingStatus::Success);
    assert_eq!(r.index, Some(3));
    assert_eq!(r.is_consumed, Some(false));
    assert_eq!(r.quantity.as_deref(), Some("5"));
}

#[tokio::test]
async fn unknown_selector_stores_bare_action() {
    let chain = MockChain::new(20);
    let tx = tx_hash(0xaa);
    chain.push(action_executed(10, &tx, 0, 0xee, 2));
    chain.push(transaction_executed(10, &tx, 1, &[0x11, 0x12]));
    chain.set_input(&tx, &hex::decode("a9059cbb0000000000000000").unwrap());
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());

    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!(report.stats.calldata_decoded, 0);

    let graph = store.snapshot();
    assert_eq!(graph.actions.len(), 1);
    assert!(!graph.actions[&Action::key(CHAIN_ID, &tx, 0)].calldata_matched);
    assert!(graph.compliance_units.is_empty());
    assert!(graph.logic_inputs.is_empty());
    assert!(graph.decode_failures.is_empty());
    assert_eq!(graph.transactions[&Transaction::key(CHAIN_ID, &tx)].delta_proof, None);
}

#[tokio::test]
async fn caught_up_cycle_is_a_no_op() {
    let chain = MockChain::new(20);
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());
    committed(engine.run_cycle().await.unwrap());
    let cursor = store.load_cursor(&pair()).await.unwrap();

    let outcome = engine.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::UpToDate { head: 20 });
    assert_eq!(store.load_cursor(&pair()).await.unwrap(), cursor);
}

#[tokio::test]
async fn long_ranges_are_fetched_in_chunks() {
    let chain = MockChain::new(1_000);
    seed_execute(&chain, 999, &tx_hash(0xaa));
    let store = Arc::new(FlakyStore::default());
    let engine = paindex_evm::SyncEngineBuilder::new()
        .pair(NETWORK, CONTRACT)
        .chain_id(CHAIN_ID)
        .start_block(1)
        .max_block_range(100)
        .client(chain.clone())
        .store(store.clone())
        .build()
        .unwrap();

    let report = committed(engine.run_cycle().await.unwrap());
    assert_eq!(chain.get_logs_calls.load(Ordering::SeqCst), 10);
    assert_eq!(report.logs, 2);
    assert_eq!(store.stats().await.unwrap().transactions, 1);
}

#[tokio::test]
async fn broken_event_is_recorded_not_fatal() {
    let chain = MockChain::new(20);
    let mut broken = transaction_executed(10, &tx_hash(0xaa), 0, &[0x11, 0x12]);
    broken.data = "0x0000".into();
    chain.push(broken);
    chain.push(resource_payload(10, &tx_hash(0xbb), 0, 0x33, vec![0u8; 31]));
    let store = Arc::new(FlakyStore::default());
    let engine = engine(chain.clone(), store.clone());

    committed(engine.run_cycle().await.unwrap());
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.payloads, 1);

    let r = store.resource(CHAIN_ID, &word(0x33)).await.unwrap().unwrap();
    assert_eq!(r.decoding_status, DecodingStatus::Failed);
    assert!(r.decoding_error.is_some());
    assert_eq!(
        store.load_cursor(&pair()).await.unwrap().unwrap().logs_block,
        Some(20)
    );
}
