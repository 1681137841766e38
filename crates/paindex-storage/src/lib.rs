//! paindex-storage — entity store backends.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (single-file persistence, `sqlite` feature)
//!
//! Both implement [`EntityStore`](paindex_core::EntityStore): natural-key
//! upserts with the merge rules of `paindex_core::entities`, committed
//! together with the cursor in one atomic unit.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
