//! chaincrawl-core: checkpointed crawler for ledger transaction logs.
//!
//! # Architecture
//!
//! ```text
//! CrawlEngine (one per tracked contract)
//!     ├── LedgerClient      (count / list / detail, own RetryPolicy)
//!     ├── BatchCursor       (fixed-size windows past the checkpoint)
//!     ├── EventExtractor    (tracked log entries → Event)
//!     ├── CheckpointStore   (processed count per ABI name)
//!     └── EventSink         (user storage, same transaction as the checkpoint)
//!
//! SnapshotEngine → SnapshotSink (periodic whole-state writes)
//! codec                        (base64 scalar decode service)
//! ```

pub mod abi;
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod retry;
pub mod snapshot;
pub mod types;

pub use abi::AbiHandle;
pub use checkpoint::{Checkpoint, CheckpointRepository, CheckpointStore, TransactionalStore};
pub use codec::{CodecError, ScalarKind};
pub use config::{ConfigError, CrawlerConfig, LogConfig};
pub use cursor::BatchCursor;
pub use engine::{AddressOutcome, CrawlEngine, CrawlSettings, CrawlState, CycleReport, EventSink};
pub use error::{CrawlError, LedgerError};
pub use extractor::EventExtractor;
pub use ledger::LedgerClient;
pub use retry::{Backoff, RetryPolicy};
pub use snapshot::{SnapshotEngine, SnapshotSink};
pub use types::{Event, TrackedContract, TransactionBatch, TransactionDetail, TransferSummary};

// Consumers implement the async traits above without a direct dependency.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
