//! The crawl engine: walks every address of a tracked contract, fetches the
//! transactions past the checkpoint, extracts tracked events and commits them
//! together with the checkpoint advancement.
//!
//! # Per address
//! 1. Count the address's transactions.
//! 2. Read the contract's checkpoint.
//! 3. Caught up (`count <= checkpoint`): sleep, move on to the next address.
//! 4. Otherwise walk `[checkpoint, count)` batch by batch:
//!    fetch details concurrently → extract → stage events + checkpoint
//!    advance in one transaction → commit.
//!
//! A failed batch is rolled back and the address is left for the next cycle,
//! which recomputes the window from the unchanged checkpoint.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointRepository, CheckpointStore};
use crate::cursor::BatchCursor;
use crate::error::CrawlError;
use crate::extractor::EventExtractor;
use crate::ledger::LedgerClient;
use crate::types::{Event, TrackedContract, TransactionBatch};

/// Persists extracted events.
///
/// Always called with an open, uncommitted transaction, and never
/// concurrently for the same transaction. Writes must go through `tx` so
/// they commit or roll back together with the checkpoint.
#[async_trait]
pub trait EventSink<Tx: Send + 'static>: Send + Sync {
    async fn save_events(&self, events: &[Event], tx: &mut Tx) -> Result<(), CrawlError>;
}

/// Runtime settings of a crawl engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Listing window size.
    pub batch_size: u64,
    /// Sleep after an address is caught up.
    pub poll_interval: Duration,
    /// Pause before the next cycle when an address failed.
    pub error_backoff: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_millis(6_000),
            error_backoff: Duration::from_millis(6_000),
        }
    }
}

/// Where the engine currently is in its crawl cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlState {
    Idle,
    Counting,
    CheckpointRead,
    BatchLoop,
    Fetching,
    Extracting,
    Committing,
    Sleeping,
    /// Cancelled; `run` has returned.
    Stopped,
}

impl std::fmt::Display for CrawlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Counting => write!(f, "counting"),
            Self::CheckpointRead => write!(f, "checkpoint-read"),
            Self::BatchLoop => write!(f, "batch-loop"),
            Self::Fetching => write!(f, "fetching"),
            Self::Extracting => write!(f, "extracting"),
            Self::Committing => write!(f, "committing"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of crawling one address once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressOutcome {
    /// Nothing past the checkpoint, or nothing the listing serves yet.
    CaughtUp,
    /// Every batch in the window was committed.
    Advanced {
        batches: u64,
        scanned: u64,
        events: usize,
    },
    /// A batch failed and was rolled back; earlier batches stay committed.
    RolledBack,
}

/// Summary of one pass over all addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub caught_up: usize,
    pub advanced: usize,
    /// Addresses that rolled back or could not be counted / read.
    pub failed: usize,
    pub scanned: u64,
    pub events: usize,
}

/// Crawls the addresses of one tracked contract.
pub struct CrawlEngine<L: ?Sized, R, S> {
    contract: TrackedContract,
    settings: CrawlSettings,
    client: Arc<L>,
    checkpoints: CheckpointStore<R>,
    sink: Arc<S>,
    extractor: EventExtractor,
    cancel: CancellationToken,
    state: CrawlState,
}

impl<L, R, S> CrawlEngine<L, R, S>
where
    L: LedgerClient + ?Sized,
    R: CheckpointRepository,
    S: EventSink<R::Tx>,
{
    /// Build an engine, rejecting configurations that could never crawl.
    pub fn new(
        contract: TrackedContract,
        settings: CrawlSettings,
        client: Arc<L>,
        repository: Arc<R>,
        sink: Arc<S>,
    ) -> Result<Self, CrawlError> {
        if contract.addresses.is_empty() {
            return Err(CrawlError::Config(format!(
                "contract {} has no addresses",
                contract.name
            )));
        }
        if contract.entity_key().is_empty() {
            return Err(CrawlError::Config(format!(
                "contract {} has an unnamed ABI",
                contract.name
            )));
        }
        if contract.tracked_events.is_empty() {
            return Err(CrawlError::Config(format!(
                "contract {} tracks no events",
                contract.name
            )));
        }
        if settings.batch_size == 0 {
            return Err(CrawlError::Config("batch size must be at least 1".into()));
        }

        let extractor = EventExtractor::new(contract.tracked_events.iter().cloned());
        Ok(Self {
            contract,
            settings,
            client,
            checkpoints: CheckpointStore::new(repository),
            sink,
            extractor,
            cancel: CancellationToken::new(),
            state: CrawlState::Idle,
        })
    }

    /// Use `token` to stop the engine instead of its own token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn contract(&self) -> &TrackedContract {
        &self.contract
    }

    pub fn checkpoints(&self) -> &CheckpointStore<R> {
        &self.checkpoints
    }

    fn set_state(&mut self, state: CrawlState) {
        tracing::trace!(contract = %self.contract.name, from = %self.state, to = %state, "state");
        self.state = state;
    }

    /// Crawl until the cancellation token fires.
    pub async fn run(&mut self) -> Result<(), CrawlError> {
        tracing::info!(
            contract = %self.contract.name,
            addresses = self.contract.addresses.len(),
            batch_size = self.settings.batch_size,
            "crawl engine started"
        );

        while !self.cancel.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) if report.failed > 0 => {
                    self.set_state(CrawlState::Sleeping);
                    if self.sleep(self.settings.error_backoff).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    self.set_state(CrawlState::Stopped);
                    return Err(e);
                }
            }
        }

        self.set_state(CrawlState::Stopped);
        tracing::info!(contract = %self.contract.name, "crawl engine stopped");
        Ok(())
    }

    /// Crawl every address once, in order.
    ///
    /// Per-address failures are logged and counted; only cancellation
    /// aborts the cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CrawlError> {
        let mut report = CycleReport::default();
        let addresses = self.contract.addresses.clone();

        for address in &addresses {
            self.set_state(CrawlState::Idle);
            match self.crawl_address(address).await {
                Ok(AddressOutcome::CaughtUp) => {
                    report.caught_up += 1;
                    self.set_state(CrawlState::Sleeping);
                    self.sleep(self.settings.poll_interval).await?;
                }
                Ok(AddressOutcome::Advanced {
                    scanned, events, ..
                }) => {
                    report.advanced += 1;
                    report.scanned += scanned;
                    report.events += events;
                }
                Ok(AddressOutcome::RolledBack) => report.failed += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        contract = %self.contract.name,
                        address = %address,
                        error = %e,
                        "address crawl failed"
                    );
                    report.failed += 1;
                }
            }
        }

        self.set_state(CrawlState::Idle);
        Ok(report)
    }

    /// Crawl one address from its checkpoint up to its current count.
    pub async fn crawl_address(&mut self, address: &str) -> Result<AddressOutcome, CrawlError> {
        let key = self.contract.entity_key().to_string();

        self.set_state(CrawlState::Counting);
        let count = until_cancelled(&self.cancel, self.client.transaction_count(address)).await??;

        self.set_state(CrawlState::CheckpointRead);
        let checkpoint = until_cancelled(&self.cancel, self.checkpoints.read(&key)).await??;

        if count <= checkpoint {
            tracing::info!(
                contract = %self.contract.name,
                address,
                count,
                checkpoint,
                "address caught up"
            );
            return Ok(AddressOutcome::CaughtUp);
        }

        tracing::info!(
            contract = %self.contract.name,
            address,
            from = checkpoint,
            count,
            "crawling address"
        );

        let client = self.client.clone();
        let mut cursor =
            BatchCursor::new(&*client, address, checkpoint, count, self.settings.batch_size);
        let (mut batches, mut scanned, mut events) = (0u64, 0u64, 0usize);

        loop {
            self.set_state(CrawlState::BatchLoop);
            let Some(window) = cursor.next_window() else {
                break;
            };
            let from = window.start;
            let Some(listing) = until_cancelled(&self.cancel, cursor.next()).await? else {
                break;
            };
            let batch = listing?;

            // The listing lags the count: nothing to commit until it catches up.
            if batch.scanned == 0 {
                tracing::info!(
                    contract = %self.contract.name,
                    address,
                    from,
                    count,
                    "listing behind count"
                );
                break;
            }

            match self.process_batch(&batch).await {
                Ok(saved) => {
                    batches += 1;
                    scanned += batch.scanned;
                    events += saved;
                    tracing::info!(
                        contract = %self.contract.name,
                        address,
                        from,
                        scanned = batch.scanned,
                        events = saved,
                        "batch committed"
                    );
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        contract = %self.contract.name,
                        address,
                        from,
                        error = %e,
                        "batch rolled back"
                    );
                    return Ok(AddressOutcome::RolledBack);
                }
            }

            // Short page: later windows would start past the checkpoint.
            if batch.scanned < window.end - window.start {
                break;
            }
        }

        if batches == 0 {
            return Ok(AddressOutcome::CaughtUp);
        }
        Ok(AddressOutcome::Advanced {
            batches,
            scanned,
            events,
        })
    }

    /// Fetch, extract and commit one batch. Returns the number of events saved.
    ///
    /// Nothing is persisted unless every step succeeds.
    pub async fn process_batch(&mut self, batch: &TransactionBatch) -> Result<usize, CrawlError> {
        self.set_state(CrawlState::Fetching);
        let client = self.client.clone();
        let details = until_cancelled(
            &self.cancel,
            try_join_all(batch.hashes.iter().map(|hash| client.transaction_detail(hash))),
        )
        .await??;

        self.set_state(CrawlState::Extracting);
        let events: Vec<Event> = details
            .iter()
            .filter_map(|detail| self.extractor.extract(detail))
            .flatten()
            .collect();

        self.set_state(CrawlState::Committing);
        let repository = self.checkpoints.repository().clone();
        let mut tx = until_cancelled(&self.cancel, repository.begin()).await??;

        let staged = self.stage(&events, batch.scanned, &mut tx).await;
        let staged = match staged {
            Ok(()) if self.cancel.is_cancelled() => Err(CrawlError::Cancelled),
            other => other,
        };
        if let Err(e) = staged {
            if let Err(rollback_err) = repository.rollback(tx).await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            return Err(e);
        }

        repository.commit(tx).await?;
        Ok(events.len())
    }

    async fn stage(&self, events: &[Event], scanned: u64, tx: &mut R::Tx) -> Result<(), CrawlError> {
        self.sink.save_events(events, tx).await?;
        self.checkpoints
            .advance(self.contract.entity_key(), scanned, tx)
            .await?;
        Ok(())
    }

    async fn sleep(&self, duration: Duration) -> Result<(), CrawlError> {
        until_cancelled(&self.cancel, tokio::time::sleep(duration)).await
    }
}

/// Await `fut` unless `token` is cancelled first.
pub(crate) async fn until_cancelled<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, CrawlError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CrawlError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::AbiHandle;
    use crate::checkpoint::{Checkpoint, TransactionalStore};
    use crate::error::LedgerError;
    use crate::types::{LogEvent, TransactionDetail, TransactionLogs, TransferSummary};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    // ─── Mock ledger ─────────────────────────────────────────────────────────

    /// Every third transaction failed; every successful one emits a `swap`.
    #[derive(Default)]
    struct MockLedger {
        counts: HashMap<String, u64>,
        /// Entries the listing serves, when it lags the count.
        listed: HashMap<String, u64>,
        broken_count: HashSet<String>,
        broken_detail: Mutex<HashSet<String>>,
        count_calls: AtomicU32,
        transfer_calls: AtomicU32,
        detail_calls: AtomicU32,
    }

    impl MockLedger {
        fn with_count(mut self, address: &str, count: u64) -> Self {
            self.counts.insert(address.into(), count);
            self
        }

        fn with_listed(mut self, address: &str, listed: u64) -> Self {
            self.listed.insert(address.into(), listed);
            self
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn transaction_count(&self, address: &str) -> Result<u64, LedgerError> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_count.contains(address) {
                return Err(LedgerError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            Ok(self.counts.get(address).copied().unwrap_or(0))
        }

        async fn transfers(
            &self,
            address: &str,
            from: u64,
            size: u64,
        ) -> Result<Vec<TransferSummary>, LedgerError> {
            self.transfer_calls.fetch_add(1, Ordering::SeqCst);
            let total = self
                .listed
                .get(address)
                .or_else(|| self.counts.get(address))
                .copied()
                .unwrap_or(0);
            Ok((from..(from + size).min(total))
                .map(|i| TransferSummary {
                    tx_hash: format!("{address}-tx{i}"),
                    original_tx_hash: None,
                    status: if i % 3 == 2 { "fail".into() } else { "success".into() },
                    kind: None,
                })
                .collect())
        }

        async fn transaction_detail(&self, hash: &str) -> Result<TransactionDetail, LedgerError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_detail.lock().unwrap().contains(hash) {
                return Err(LedgerError::Timeout { ms: 10 });
            }
            Ok(TransactionDetail {
                tx_hash: hash.into(),
                timestamp: 1_700_000_000,
                logs: Some(TransactionLogs {
                    address: None,
                    events: Some(vec![LogEvent {
                        address: "erd1pair".into(),
                        identifier: None,
                        topics: vec![BASE64.encode("swap")],
                        data: Some(BASE64.encode(hash)),
                        order: Some(0),
                    }]),
                }),
            })
        }
    }

    // ─── Mock store + sink ───────────────────────────────────────────────────

    #[derive(Default)]
    struct MockStore {
        checkpoints: Mutex<HashMap<String, Checkpoint>>,
        events: Mutex<Vec<Event>>,
        fail_sink: AtomicBool,
        /// Cancelled from inside `save_events`.
        cancel_in_sink: Mutex<Option<CancellationToken>>,
        commits: AtomicU32,
        rollbacks: AtomicU32,
    }

    #[derive(Default)]
    struct MockTx {
        checkpoints: HashMap<String, Checkpoint>,
        events: Vec<Event>,
    }

    impl MockStore {
        fn processed(&self, key: &str) -> u64 {
            self.checkpoints
                .lock()
                .unwrap()
                .get(key)
                .map(|c| c.processed_count)
                .unwrap_or(0)
        }

        fn seed(&self, key: &str, processed_count: u64) {
            self.checkpoints.lock().unwrap().insert(
                key.into(),
                Checkpoint {
                    entity_key: key.into(),
                    processed_count,
                    updated_at: 0,
                },
            );
        }
    }

    #[async_trait]
    impl TransactionalStore for MockStore {
        type Tx = MockTx;

        async fn begin(&self) -> Result<MockTx, CrawlError> {
            Ok(MockTx::default())
        }

        async fn commit(&self, tx: MockTx) -> Result<(), CrawlError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.checkpoints.lock().unwrap().extend(tx.checkpoints);
            self.events.lock().unwrap().extend(tx.events);
            Ok(())
        }

        async fn rollback(&self, _tx: MockTx) -> Result<(), CrawlError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl CheckpointRepository for MockStore {
        async fn find_checkpoint(&self, key: &str) -> Result<Option<Checkpoint>, CrawlError> {
            Ok(self.checkpoints.lock().unwrap().get(key).cloned())
        }

        async fn find_checkpoint_in(
            &self,
            key: &str,
            tx: &mut MockTx,
        ) -> Result<Option<Checkpoint>, CrawlError> {
            match tx.checkpoints.get(key) {
                Some(cp) => Ok(Some(cp.clone())),
                None => self.find_checkpoint(key).await,
            }
        }

        async fn save_checkpoint(&self, cp: &Checkpoint, tx: &mut MockTx) -> Result<(), CrawlError> {
            tx.checkpoints.insert(cp.entity_key.clone(), cp.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl EventSink<MockTx> for MockStore {
        async fn save_events(&self, events: &[Event], tx: &mut MockTx) -> Result<(), CrawlError> {
            tx.events.extend_from_slice(events);
            if let Some(token) = self.cancel_in_sink.lock().unwrap().as_ref() {
                token.cancel();
            }
            if self.fail_sink.load(Ordering::SeqCst) {
                return Err(CrawlError::sink("disk full"));
            }
            Ok(())
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────────────────

    fn contract(addresses: &[&str]) -> TrackedContract {
        TrackedContract::new(
            "pair",
            AbiHandle::named("Pair"),
            addresses.iter().map(|a| a.to_string()).collect(),
            vec!["swap".into()],
        )
    }

    fn settings(batch_size: u64) -> CrawlSettings {
        CrawlSettings {
            batch_size,
            poll_interval: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
        }
    }

    fn engine(
        addresses: &[&str],
        batch_size: u64,
        ledger: Arc<MockLedger>,
        store: Arc<MockStore>,
    ) -> CrawlEngine<MockLedger, MockStore, MockStore> {
        CrawlEngine::new(
            contract(addresses),
            settings(batch_size),
            ledger,
            store.clone(),
            store,
        )
        .unwrap()
    }

    // ─── Tests ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn caught_up_address_makes_no_listing_calls() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 50));
        let store = Arc::new(MockStore::default());
        store.seed("Pair", 50);

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        let outcome = engine.crawl_address("erd1a").await.unwrap();

        assert_eq!(outcome, AddressOutcome::CaughtUp);
        assert_eq!(ledger.transfer_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.detail_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.processed("Pair"), 50);
    }

    #[tokio::test]
    async fn advances_by_scanned_count() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 25));
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        let outcome = engine.crawl_address("erd1a").await.unwrap();

        // 25 transfers, indices 2, 5, .., 23 failed (8 of them).
        assert_eq!(
            outcome,
            AddressOutcome::Advanced {
                batches: 3,
                scanned: 25,
                events: 17
            }
        );
        assert_eq!(store.processed("Pair"), 25);
        assert_eq!(store.events.lock().unwrap().len(), 17);
        assert_eq!(ledger.transfer_calls.load(Ordering::SeqCst), 3);

        let events = store.events.lock().unwrap();
        assert_eq!(events[0].id, "erd1a-tx0_0");
        assert_eq!(events[0].event_name, "swap");
        assert_eq!(events[0].data, b"erd1a-tx0");
    }

    #[tokio::test]
    async fn resumes_from_checkpoint() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 30));
        let store = Arc::new(MockStore::default());
        store.seed("Pair", 20);

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        engine.crawl_address("erd1a").await.unwrap();

        assert_eq!(store.processed("Pair"), 30);
        assert_eq!(ledger.transfer_calls.load(Ordering::SeqCst), 1);
        assert!(store
            .events
            .lock()
            .unwrap()
            .iter()
            .all(|e| e.tx_hash.as_str() >= "erd1a-tx20"));
    }

    #[tokio::test]
    async fn sink_failure_leaves_no_partial_state() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 10));
        let store = Arc::new(MockStore::default());
        store.fail_sink.store(true, Ordering::SeqCst);

        let mut engine = engine(&["erd1a"], 10, ledger, store.clone());
        let outcome = engine.crawl_address("erd1a").await.unwrap();

        assert_eq!(outcome, AddressOutcome::RolledBack);
        assert_eq!(store.processed("Pair"), 0);
        assert!(store.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn detail_failure_rolls_back_batch_only() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 20));
        ledger
            .broken_detail
            .lock()
            .unwrap()
            .insert("erd1a-tx13".into());
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        let outcome = engine.crawl_address("erd1a").await.unwrap();

        // First batch committed, second rolled back.
        assert_eq!(outcome, AddressOutcome::RolledBack);
        assert_eq!(store.processed("Pair"), 10);

        // The next attempt recomputes the window from the checkpoint.
        ledger.broken_detail.lock().unwrap().clear();
        let outcome = engine.crawl_address("erd1a").await.unwrap();
        assert!(matches!(outcome, AddressOutcome::Advanced { scanned: 10, .. }));
        assert_eq!(store.processed("Pair"), 20);

        let events = store.events.lock().unwrap();
        let ids: HashSet<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), events.len(), "no event stored twice");
    }

    #[tokio::test]
    async fn count_failure_is_isolated_per_address() {
        let mut ledger = MockLedger::default()
            .with_count("erd1a", 5)
            .with_count("erd1b", 5);
        ledger.broken_count.insert("erd1a".into());
        let ledger = Arc::new(ledger);
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a", "erd1b"], 10, ledger, store.clone());
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.scanned, 5);
        assert_eq!(store.processed("Pair"), 5);
        assert_eq!(engine.state(), CrawlState::Idle);
    }

    #[tokio::test]
    async fn caught_up_cycle_sleeps_and_moves_on() {
        let ledger = Arc::new(
            MockLedger::default()
                .with_count("erd1a", 0)
                .with_count("erd1b", 3),
        );
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a", "erd1b"], 10, ledger, store);
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.caught_up, 1);
        assert_eq!(report.advanced, 1);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 0));
        let store = Arc::new(MockStore::default());
        let token = CancellationToken::new();

        let mut engine =
            engine(&["erd1a"], 10, ledger, store).with_cancellation(token.clone());
        let handle = tokio::spawn(async move {
            engine.run().await.map(|_| engine.state())
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let state = handle.await.unwrap().unwrap();
        assert_eq!(state, CrawlState::Stopped);
    }

    #[tokio::test]
    async fn cancelled_engine_does_not_crawl() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 10));
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        engine.cancellation_token().cancel();

        let err = engine.crawl_address("erd1a").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(ledger.transfer_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.processed("Pair"), 0);
    }

    #[tokio::test]
    async fn empty_listing_counts_as_caught_up() {
        let ledger = Arc::new(
            MockLedger::default()
                .with_count("erd1a", 5)
                .with_listed("erd1a", 0),
        );
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        let outcome = engine.crawl_address("erd1a").await.unwrap();

        assert_eq!(outcome, AddressOutcome::CaughtUp);
        assert_eq!(ledger.transfer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
        assert_eq!(store.processed("Pair"), 0);
    }

    #[tokio::test]
    async fn short_page_stops_at_listed_entries() {
        let ledger = Arc::new(
            MockLedger::default()
                .with_count("erd1a", 25)
                .with_listed("erd1a", 13),
        );
        let store = Arc::new(MockStore::default());

        let mut engine = engine(&["erd1a"], 10, ledger.clone(), store.clone());
        let outcome = engine.crawl_address("erd1a").await.unwrap();
        assert!(matches!(
            outcome,
            AddressOutcome::Advanced { batches: 2, scanned: 13, .. }
        ));
        assert_eq!(ledger.transfer_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.processed("Pair"), 13);

        // Still lagging: one listing call, nothing committed.
        let outcome = engine.crawl_address("erd1a").await.unwrap();
        assert_eq!(outcome, AddressOutcome::CaughtUp);
        assert_eq!(store.commits.load(Ordering::SeqCst), 2);
        assert_eq!(store.processed("Pair"), 13);
    }

    #[tokio::test]
    async fn lagging_listing_sleeps_between_cycles() {
        let ledger = Arc::new(
            MockLedger::default()
                .with_count("erd1a", 5)
                .with_listed("erd1a", 0),
        );
        let store = Arc::new(MockStore::default());
        let settings = CrawlSettings {
            batch_size: 10,
            poll_interval: Duration::from_secs(6),
            error_backoff: Duration::from_secs(6),
        };
        let mut engine = CrawlEngine::new(
            contract(&["erd1a"]),
            settings,
            ledger.clone(),
            store.clone(),
            store.clone(),
        )
        .unwrap();
        let token = engine.cancellation_token();

        let handle = tokio::spawn(async move { engine.run().await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(ledger.count_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_before_commit_rolls_back() {
        let ledger = Arc::new(MockLedger::default().with_count("erd1a", 10));
        let store = Arc::new(MockStore::default());
        let mut engine = engine(&["erd1a"], 10, ledger, store.clone());
        *store.cancel_in_sink.lock().unwrap() = Some(engine.cancellation_token());

        let batch = TransactionBatch {
            hashes: vec!["erd1a-tx0".into(), "erd1a-tx1".into()],
            scanned: 2,
        };
        let err = engine.process_batch(&batch).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
        assert_eq!(store.processed("Pair"), 0);
        assert!(store.events.lock().unwrap().is_empty());
    }

    #[test]
    fn rejects_unusable_configuration() {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MockStore::default());

        let no_addresses = CrawlEngine::new(
            contract(&[]),
            settings(10),
            ledger.clone(),
            store.clone(),
            store.clone(),
        );
        assert!(matches!(no_addresses, Err(CrawlError::Config(_))));

        let zero_batch = CrawlEngine::new(
            contract(&["erd1a"]),
            settings(0),
            ledger.clone(),
            store.clone(),
            store.clone(),
        );
        assert!(matches!(zero_batch, Err(CrawlError::Config(_))));

        let mut untracked = contract(&["erd1a"]);
        untracked.tracked_events.clear();
        let result = CrawlEngine::new(untracked, settings(10), ledger, store.clone(), store);
        assert!(matches!(result, Err(CrawlError::Config(_))));
    }
}
