//! chaincrawl-storage: pluggable storage backends for ChainCrawl.
//!
//! Each backend is a transactional store, a checkpoint repository and the
//! default event sink, so a crawl engine can run on it without custom code.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::{InMemoryStorage, MemoryTx};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
