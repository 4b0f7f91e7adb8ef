//! SQLite storage backend for ChainCrawl.
//!
//! Persists checkpoints and events to a single SQLite file. Every engine
//! write runs inside an `sqlx` transaction, so a batch's events and its
//! checkpoint advancement are committed or rolled back together.
//!
//! # Usage
//! ```rust,no_run
//! use chaincrawl_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./crawler.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use chaincrawl_core::checkpoint::{Checkpoint, CheckpointRepository, TransactionalStore};
use chaincrawl_core::engine::EventSink;
use chaincrawl_core::error::CrawlError;
use chaincrawl_core::types::Event;

fn storage_err(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Storage(e.to_string())
}

/// SQLite-backed storage for checkpoints and events.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./crawler.db"`) or a full
    /// SQLite URL (`"sqlite://crawler.db"`).
    pub async fn open(path: &str) -> Result<Self, CrawlError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        debug!(url = %url, "sqlite storage opened");
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, CrawlError> {
        // One connection that never recycles: each new connection would be a
        // fresh, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), CrawlError> {
        // One row per tracked contract (ABI name).
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS crawled_transactions (
                abi_name   TEXT    PRIMARY KEY,
                count      INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id          TEXT    PRIMARY KEY,
                tx_hash     TEXT    NOT NULL,
                timestamp   INTEGER NOT NULL,
                address     TEXT    NOT NULL,
                event_name  TEXT    NOT NULL,
                topics_json TEXT    NOT NULL,
                data        BLOB    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_name ON events (event_name);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_tx ON events (tx_hash);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    // ─── Queries ────────────────────────────────────────────────────────────────

    /// Total number of stored events.
    pub async fn event_count(&self) -> Result<u64, CrawlError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    /// Stored events named `event_name`, ordered by timestamp then id.
    pub async fn events_by_name(&self, event_name: &str) -> Result<Vec<Event>, CrawlError> {
        let rows = sqlx::query(
            "SELECT id, tx_hash, timestamp, address, event_name, topics_json, data
             FROM events WHERE event_name = ? ORDER BY timestamp, id",
        )
        .bind(event_name)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(event_from_row).collect()
    }

    /// All checkpoints, sorted by ABI name.
    pub async fn checkpoints(&self) -> Result<Vec<Checkpoint>, CrawlError> {
        let rows = sqlx::query(
            "SELECT abi_name, count, updated_at FROM crawled_transactions ORDER BY abi_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(checkpoint_from_row).collect())
    }
}

fn checkpoint_from_row(row: &SqliteRow) -> Checkpoint {
    Checkpoint {
        entity_key: row.get("abi_name"),
        processed_count: row.get::<i64, _>("count") as u64,
        updated_at: row.get("updated_at"),
    }
}

fn event_from_row(row: &SqliteRow) -> Result<Event, CrawlError> {
    let topics_json: String = row.get("topics_json");
    Ok(Event {
        id: row.get("id"),
        tx_hash: row.get("tx_hash"),
        timestamp: row.get("timestamp"),
        source_address: row.get("address"),
        topics: serde_json::from_str(&topics_json).map_err(storage_err)?,
        data: row.get("data"),
        event_name: row.get("event_name"),
    })
}

// ─── Transactions ────────────────────────────────────────────────────────────

#[async_trait]
impl TransactionalStore for SqliteStorage {
    type Tx = Transaction<'static, Sqlite>;

    async fn begin(&self) -> Result<Self::Tx, CrawlError> {
        self.pool.begin().await.map_err(storage_err)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), CrawlError> {
        tx.commit().await.map_err(storage_err)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), CrawlError> {
        tx.rollback().await.map_err(storage_err)
    }
}

#[async_trait]
impl CheckpointRepository for SqliteStorage {
    async fn find_checkpoint(&self, entity_key: &str) -> Result<Option<Checkpoint>, CrawlError> {
        let row = sqlx::query(
            "SELECT abi_name, count, updated_at FROM crawled_transactions WHERE abi_name = ?",
        )
        .bind(entity_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(checkpoint_from_row))
    }

    async fn find_checkpoint_in(
        &self,
        entity_key: &str,
        tx: &mut Self::Tx,
    ) -> Result<Option<Checkpoint>, CrawlError> {
        let row = sqlx::query(
            "SELECT abi_name, count, updated_at FROM crawled_transactions WHERE abi_name = ?",
        )
        .bind(entity_key)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(checkpoint_from_row))
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        tx: &mut Self::Tx,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "INSERT OR REPLACE INTO crawled_transactions (abi_name, count, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&checkpoint.entity_key)
        .bind(checkpoint.processed_count as i64)
        .bind(checkpoint.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(storage_err)?;

        debug!(
            abi_name = %checkpoint.entity_key,
            count = checkpoint.processed_count,
            "checkpoint staged"
        );
        Ok(())
    }
}

#[async_trait]
impl EventSink<Transaction<'static, Sqlite>> for SqliteStorage {
    async fn save_events(
        &self,
        events: &[Event],
        tx: &mut Transaction<'static, Sqlite>,
    ) -> Result<(), CrawlError> {
        for event in events {
            let topics = serde_json::to_string(&event.topics).map_err(storage_err)?;
            sqlx::query(
                "INSERT OR REPLACE INTO events
                 (id, tx_hash, timestamp, address, event_name, topics_json, data)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.id)
            .bind(&event.tx_hash)
            .bind(event.timestamp)
            .bind(&event.source_address)
            .bind(&event.event_name)
            .bind(&topics)
            .bind(&event.data)
            .execute(&mut **tx)
            .await
            .map_err(|e| CrawlError::sink(e.to_string()))?;
        }
        debug!(events = events.len(), "events staged");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
