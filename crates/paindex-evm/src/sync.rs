//! The ingestion cycle for one (network, contract) pair.
//!
//! ```text
//! Idle → Fetching → Decoding → Committing → Idle
//!           └──────────┴───────────┴──→ Failed → Idle (next cycle)
//! ```
//!
//! A cycle reads the cursor, fetches `[from, head]`, decodes the logs into a
//! [`GraphDelta`](paindex_core::GraphDelta) and commits it together with the
//! advanced cursor. The cursor is only ever written by that commit, so a
//! failed cycle leaves it exactly where it was and the next attempt starts
//! from the same block.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use paindex_core::{EntityStore, IndexerError, IngestionCursor, PairKey};
use paindex_graph::{BatchDecoder, BatchStats};

use crate::fetcher::EvmFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Fetching,
    Decoding,
    Committing,
    Failed,
}

/// What a committed cycle covered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub from: u64,
    pub to: u64,
    pub logs: usize,
    pub upserts: usize,
    pub stats: BatchStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CycleOutcome {
    /// `from > head`: nothing to do.
    UpToDate { head: u64 },
    Committed(CycleReport),
}

/// First block of the next cycle.
///
/// Resumes after the cursor; an explicit start block applies when there is
/// no cursor or when it lies beyond the cursor, and never rewinds. Without
/// either, starts `backfill_blocks` behind `head`.
pub fn resolve_from_block(
    next_block: Option<u64>,
    start_block: Option<u64>,
    head: u64,
    backfill_blocks: u64,
) -> u64 {
    match (next_block, start_block) {
        (Some(next), Some(start)) => next.max(start),
        (Some(next), None) => next,
        (None, Some(start)) => start,
        (None, None) => head.saturating_sub(backfill_blocks),
    }
}

pub struct SyncEngine {
    pair: PairKey,
    start_block: Option<u64>,
    backfill_blocks: u64,
    fetcher: EvmFetcher,
    decoder: BatchDecoder,
    store: Arc<dyn EntityStore>,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(
        pair: PairKey,
        start_block: Option<u64>,
        backfill_blocks: u64,
        fetcher: EvmFetcher,
        decoder: BatchDecoder,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        Self {
            pair,
            start_block,
            backfill_blocks,
            fetcher,
            decoder,
            store,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn pair(&self) -> &PairKey {
        &self.pair
    }

    pub fn chain_id(&self) -> u64 {
        self.decoder.chain_id()
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: SyncState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = *state;
        if prev != next {
            debug!(pair = %self.pair, from = ?prev, to = ?next, "sync state");
            *state = next;
        }
    }

    /// Run one cycle. On error the state is `Failed` and the cursor is
    /// unchanged.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, IndexerError> {
        match self.cycle().await {
            Ok(outcome) => {
                self.transition(SyncState::Idle);
                Ok(outcome)
            }
            Err(e) => {
                self.transition(SyncState::Failed);
                warn!(pair = %self.pair, error = %e, "cycle failed");
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome, IndexerError> {
        self.transition(SyncState::Fetching);
        let cursor = self
            .store
            .load_cursor(&self.pair)
            .await?
            .unwrap_or_else(|| IngestionCursor::new(&self.pair));
        let head = self.fetcher.head_block_number().await?;
        let from = resolve_from_block(cursor.next_block(), self.start_block, head, self.backfill_blocks);
        if from > head {
            debug!(pair = %self.pair, from, head, "up to date");
            return Ok(CycleOutcome::UpToDate { head });
        }

        let logs = self
            .fetcher
            .fetch(from, head, &self.pair.contract, self.decoder.decodes_calldata())
            .await?;

        self.transition(SyncState::Decoding);
        let output = self.decoder.decode(&logs)?;

        self.transition(SyncState::Committing);
        let next = cursor.advanced(head, self.decoder.decodes_calldata());
        self.store.commit(&output.delta, &next).await?;
        // A failed commit keeps the entries so the retry skips re-decoding.
        self.decoder.release(&output.completed);

        let report = CycleReport {
            from,
            to: head,
            logs: logs.len(),
            upserts: output.delta.len(),
            stats: output.stats,
        };
        info!(
            pair = %self.pair,
            from,
            to = head,
            logs = report.logs,
            transactions = report.stats.transactions,
            failed = report.stats.failed,
            upserts = report.upserts,
            "cycle committed"
        );
        Ok(CycleOutcome::Committed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumes_after_cursor() {
        assert_eq!(resolve_from_block(Some(501), None, 10_000, 100), 501);
    }

    #[test]
    fn start_block_jumps_forward_but_never_rewinds() {
        assert_eq!(resolve_from_block(Some(501), Some(900), 10_000, 100), 900);
        assert_eq!(resolve_from_block(Some(501), Some(200), 10_000, 100), 501);
    }

    #[test]
    fn fresh_pair_uses_start_block_or_backfill() {
        assert_eq!(resolve_from_block(None, Some(42), 10_000, 100), 42);
        assert_eq!(resolve_from_block(None, None, 10_000, 100), 9_900);
        assert_eq!(resolve_from_block(None, None, 50, 100), 0);
    }
}
