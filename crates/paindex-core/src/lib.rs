//! paindex-core — foundation for the protocol adapter indexer.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine (paindex-evm)
//!     ├── EvmFetcher         (logs + calldata + timestamps)
//!     ├── BatchDecoder       (paindex-abi + paindex-graph → GraphDelta)
//!     └── EntityStore        (atomic commit of GraphDelta + IngestionCursor)
//! ```
//!
//! This crate holds the pieces every other crate agrees on: the entity
//! model and its merge rules, the cursor, the store traits, configuration,
//! and the shared error type.

pub mod config;
pub mod cursor;
pub mod delta;
pub mod entities;
pub mod error;
pub mod store;
pub mod types;

pub use config::{ContractConfig, IndexerConfig, NetworkConfig, StorageConfig, SyncConfig};
pub use cursor::{CursorStore, IngestionCursor, PairKey};
pub use delta::{EntityGraph, GraphDelta};
pub use entities::{
    Action, CommitmentTreeRoot, ComplianceUnit, DecodeFailure, DecodingStatus, FailureSource,
    ForwarderCall, LogicInput, Merge, Payload, PayloadKind, Resource, Transaction,
};
pub use error::IndexerError;
pub use store::{EntityStore, StoreStats};
pub use types::{normalize_hex, RawLog};
