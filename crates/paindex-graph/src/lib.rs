//! # paindex-graph
//!
//! Turns decoded adapter events into entity upserts.
//!
//! ```text
//! RawLog[] ──classify──► group by tx hash ──(rayon)──► per transaction:
//!     decode events ─┐
//!     decode calldata (cached) ─┴─► build_transaction ──► GraphDelta
//! ```
//!
//! The builder is pure: the same records always yield the same delta, and
//! deltas are applied with merge semantics, so re-running a batch is a no-op.

pub mod batch;
pub mod builder;
pub mod matching;

pub use batch::{BatchDecoder, BatchOutput, BatchStats};
pub use builder::build_transaction;
pub use matching::match_actions;
