//! In-memory storage backend.
//!
//! Keeps checkpoints and events in RAM. Writes are staged in a [`MemoryTx`]
//! and applied under one lock on commit, so a dropped or rolled back
//! transaction leaves no trace. Useful for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use chaincrawl_core::checkpoint::{Checkpoint, CheckpointRepository, TransactionalStore};
use chaincrawl_core::engine::EventSink;
use chaincrawl_core::error::CrawlError;
use chaincrawl_core::types::Event;

/// Staged writes of one in-memory transaction.
#[derive(Debug, Default)]
pub struct MemoryTx {
    checkpoints: HashMap<String, Checkpoint>,
    events: Vec<Event>,
}

impl MemoryTx {
    /// Number of events staged so far.
    pub fn staged_events(&self) -> usize {
        self.events.len()
    }
}

#[derive(Default)]
struct Committed {
    checkpoints: HashMap<String, Checkpoint>,
    events: Vec<Event>,
}

/// In-memory crawler storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Committed>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed events named `event_name`, in commit order.
    pub fn events_by_name(&self, event_name: &str) -> Vec<Event> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.event_name == event_name)
            .cloned()
            .collect()
    }

    /// All committed events, in commit order.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    /// All committed checkpoints, sorted by key.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        let mut all: Vec<_> = self.inner.lock().unwrap().checkpoints.values().cloned().collect();
        all.sort_by(|a, b| a.entity_key.cmp(&b.entity_key));
        all
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStorage {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, CrawlError> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), CrawlError> {
        let mut inner = self.inner.lock().unwrap();
        inner.checkpoints.extend(tx.checkpoints);
        for event in tx.events {
            // Re-committed ids replace the earlier row.
            match inner.events.iter().position(|e| e.id == event.id) {
                Some(pos) => inner.events[pos] = event,
                None => inner.events.push(event),
            }
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), CrawlError> {
        tracing::debug!(
            events = tx.events.len(),
            checkpoints = tx.checkpoints.len(),
            "in-memory transaction discarded"
        );
        Ok(())
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryStorage {
    async fn find_checkpoint(&self, entity_key: &str) -> Result<Option<Checkpoint>, CrawlError> {
        Ok(self.inner.lock().unwrap().checkpoints.get(entity_key).cloned())
    }

    async fn find_checkpoint_in(
        &self,
        entity_key: &str,
        tx: &mut MemoryTx,
    ) -> Result<Option<Checkpoint>, CrawlError> {
        if let Some(staged) = tx.checkpoints.get(entity_key) {
            return Ok(Some(staged.clone()));
        }
        self.find_checkpoint(entity_key).await
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        tx: &mut MemoryTx,
    ) -> Result<(), CrawlError> {
        tx.checkpoints
            .insert(checkpoint.entity_key.clone(), checkpoint.clone());
        Ok(())
    }
}

#[async_trait]
impl EventSink<MemoryTx> for InMemoryStorage {
    async fn save_events(&self, events: &[Event], tx: &mut MemoryTx) -> Result<(), CrawlError> {
        tx.events.extend_from_slice(events);
        Ok(())
    }
}
