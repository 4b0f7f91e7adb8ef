//! Snapshot engine: periodically persists a whole-state snapshot inside one
//! storage transaction. Has no checkpoint coupling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::TransactionalStore;
use crate::engine::until_cancelled;
use crate::error::CrawlError;

/// Writes one snapshot through the given open transaction.
#[async_trait]
pub trait SnapshotSink<Tx: Send + 'static>: Send + Sync {
    async fn save_snapshot(&self, tx: &mut Tx) -> Result<(), CrawlError>;
}

/// Runs a [`SnapshotSink`] on a fixed interval.
pub struct SnapshotEngine<R, S> {
    name: String,
    store: Arc<R>,
    sink: Arc<S>,
    interval: Duration,
    cancel: CancellationToken,
}

impl<R, S> SnapshotEngine<R, S>
where
    R: TransactionalStore,
    S: SnapshotSink<R::Tx>,
{
    pub fn new(name: impl Into<String>, store: Arc<R>, sink: Arc<S>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            store,
            sink,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take one snapshot. Rolled back on failure or when cancelled before commit.
    pub async fn run_once(&self) -> Result<(), CrawlError> {
        let mut tx = until_cancelled(&self.cancel, self.store.begin()).await??;

        let result = match self.sink.save_snapshot(&mut tx).await {
            Ok(()) if self.cancel.is_cancelled() => Err(CrawlError::Cancelled),
            other => other,
        };

        match result {
            Ok(()) => {
                self.store.commit(tx).await?;
                tracing::debug!(snapshot = %self.name, "snapshot committed");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::error!(snapshot = %self.name, error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Snapshot every `interval` until cancelled. Failed snapshots are logged
    /// and retried on the next tick.
    pub async fn run(&self) -> Result<(), CrawlError> {
        tracing::info!(
            snapshot = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "snapshot engine started"
        );
        loop {
            match self.run_once().await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    tracing::warn!(snapshot = %self.name, error = %e, "snapshot rolled back");
                }
            }
            if until_cancelled(&self.cancel, tokio::time::sleep(self.interval))
                .await
                .is_err()
            {
                break;
            }
        }
        tracing::info!(snapshot = %self.name, "snapshot engine stopped");
        Ok(())
    }
}
