//! Ledger API client trait.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{TransactionBatch, TransactionDetail, TransferSummary};

/// Read access to the remote ledger API.
///
/// Implementations are expected to apply their own retry policy to every
/// call; the engine never retries a single call itself.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Number of transfers recorded for `address`.
    async fn transaction_count(&self, address: &str) -> Result<u64, LedgerError>;

    /// Up to `size` transfers of `address`, oldest first, starting at `from`.
    async fn transfers(
        &self,
        address: &str,
        from: u64,
        size: u64,
    ) -> Result<Vec<TransferSummary>, LedgerError>;

    /// Full detail (including logs) of one transaction.
    async fn transaction_detail(&self, hash: &str) -> Result<TransactionDetail, LedgerError>;

    /// Hashes of the successful transactions in one listing window, plus the
    /// number of entries the window scanned.
    async fn list_hashes(
        &self,
        address: &str,
        from: u64,
        size: u64,
    ) -> Result<TransactionBatch, LedgerError> {
        let transfers = self.transfers(address, from, size).await?;
        let batch = TransactionBatch::from_transfers(&transfers);
        tracing::debug!(
            address,
            from,
            size,
            hashes = batch.hashes.len(),
            scanned = batch.scanned,
            "listed transaction hashes"
        );
        Ok(batch)
    }
}
