//! Checkpoints: how many ledger entries have been processed per tracked
//! contract.
//!
//! A checkpoint only moves inside the storage transaction that also writes the
//! batch's events, so the two are committed or discarded together. On restart
//! the engine resumes from the last committed count.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

/// A persisted checkpoint for a tracked contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// ABI name of the tracked contract.
    pub entity_key: String,
    /// Number of ledger entries processed so far.
    pub processed_count: u64,
    /// Unix timestamp of the last advancement.
    pub updated_at: i64,
}

/// A store that can group writes into one atomic transaction.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Open transaction handle. Dropping it without `commit` discards its writes.
    type Tx: Send + 'static;

    async fn begin(&self) -> Result<Self::Tx, CrawlError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), CrawlError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), CrawlError>;
}

/// Storage of checkpoint rows.
///
/// Writes take an externally opened transaction so they commit together with
/// the event writes of the same batch.
///
/// Two crawler processes advancing the same key concurrently are not guarded
/// against here: implementations must rely on their transaction isolation to
/// reject or serialize the second writer, otherwise an increment can be lost.
#[async_trait]
pub trait CheckpointRepository: TransactionalStore {
    /// Load the committed checkpoint for `entity_key`.
    async fn find_checkpoint(&self, entity_key: &str) -> Result<Option<Checkpoint>, CrawlError>;

    /// Load the checkpoint as seen from inside `tx`.
    async fn find_checkpoint_in(
        &self,
        entity_key: &str,
        tx: &mut Self::Tx,
    ) -> Result<Option<Checkpoint>, CrawlError>;

    /// Insert or replace the checkpoint row within `tx`.
    async fn save_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        tx: &mut Self::Tx,
    ) -> Result<(), CrawlError>;
}

/// Reads and advances checkpoint counters on top of a repository.
pub struct CheckpointStore<R> {
    repository: Arc<R>,
}

impl<R> Clone for CheckpointStore<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R: CheckpointRepository> CheckpointStore<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Processed count for `entity_key`; `0` when no checkpoint exists yet.
    pub async fn read(&self, entity_key: &str) -> Result<u64, CrawlError> {
        match self.repository.find_checkpoint(entity_key).await? {
            Some(cp) => {
                tracing::debug!(entity_key, processed = cp.processed_count, "checkpoint loaded");
                Ok(cp.processed_count)
            }
            None => {
                tracing::debug!(entity_key, "no checkpoint yet");
                Ok(0)
            }
        }
    }

    /// Add `delta` to the checkpoint of `entity_key` inside `tx`, creating the
    /// row on first use.
    pub async fn advance(
        &self,
        entity_key: &str,
        delta: u64,
        tx: &mut R::Tx,
    ) -> Result<Checkpoint, CrawlError> {
        let now = chrono::Utc::now().timestamp();
        let checkpoint = match self.repository.find_checkpoint_in(entity_key, tx).await? {
            Some(mut existing) => {
                existing.processed_count = existing.processed_count.saturating_add(delta);
                existing.updated_at = now;
                existing
            }
            None => Checkpoint {
                entity_key: entity_key.to_string(),
                processed_count: delta,
                updated_at: now,
            },
        };
        self.repository.save_checkpoint(&checkpoint, tx).await?;
        tracing::debug!(
            entity_key,
            delta,
            processed = checkpoint.processed_count,
            "checkpoint staged"
        );
        Ok(checkpoint)
    }
}
