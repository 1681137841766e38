//! paindex-evm — EVM log fetcher, sync engine and job scheduler.
//!
//! One [`SyncEngine`] per (network, contract) pair runs ingestion cycles:
//! fetch logs for `[from, head]`, decode them into a
//! [`GraphDelta`](paindex_core::GraphDelta), and commit the delta together
//! with the advanced cursor. The [`Scheduler`] repeats cycles per pair on
//! its own Tokio task.

pub mod builder;
pub mod fetcher;
pub mod rpc_client;
pub mod scheduler;
pub mod sync;

pub use builder::SyncEngineBuilder;
pub use fetcher::{EvmFetcher, EvmRpcClient};
pub use rpc_client::JsonRpcEvmClient;
pub use scheduler::{JobConfig, JobStatus, Scheduler};
pub use sync::{resolve_from_block, CycleOutcome, CycleReport, SyncEngine, SyncState};
