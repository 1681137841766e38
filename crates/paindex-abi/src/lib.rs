//! # paindex-abi
//!
//! Decoding for the protocol adapter contract on any EVM chain.
//!
//! ## Layers
//! - [`primitives`] — Solidity head/tail ABI words, byte arrays and word arrays
//! - [`classifier`] — topic[0] → [`EventKind`]
//! - [`events`] — one decoder per event kind, raw log → [`EventRecord`]
//! - [`calldata`] — the nested `execute(Transaction)` call, via `alloy-core` dyn-abi
//! - [`resource`] — resource blobs carried by `ResourcePayload`
//! - [`cache`] — bounded per-transaction calldata cache
//!
//! Every identifier leaves this crate as a lowercase `0x…` hex string.

pub mod cache;
pub mod calldata;
pub mod classifier;
pub mod error;
pub mod events;
pub mod primitives;
pub mod resource;

pub use cache::{CalldataCache, CalldataOutcome, LruCalldataCache, NoopCalldataCache};
pub use calldata::{
    AppData, CalldataDecoder, ComplianceVerifierInput, DecodedAction, DecodedTransaction,
    ExpirableBlob, LogicVerifierInput,
};
pub use classifier::{keccak256_signature, EventClassifier, EventKind};
pub use error::DecodeError;
pub use events::{decode_log, DecodedLog, EventRecord, LogMeta};
pub use resource::{decode_resource_blob, ResourceValue};
