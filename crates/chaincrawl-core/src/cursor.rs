//! Batch cursor: walks the unprocessed transaction range of one address in
//! fixed-size windows.
//!
//! The cursor is lazy: each `next()` issues one listing call. It cannot be
//! resumed once dropped; after a crash or rollback the engine builds a fresh
//! cursor starting at the persisted checkpoint.

use std::ops::Range;

use crate::error::LedgerError;
use crate::ledger::LedgerClient;
use crate::types::TransactionBatch;

/// Window ranges `[start, min(start + size, to))` covering `[from, to)`.
///
/// `size` must be at least 1.
pub fn windows(from: u64, to: u64, size: u64) -> impl Iterator<Item = Range<u64>> {
    debug_assert!(size >= 1, "batch size must be positive");
    (from..to)
        .step_by(size.max(1) as usize)
        .map(move |start| start..start.saturating_add(size).min(to))
}

/// Lazy, ordered sequence of listing windows over `[from, to)`.
pub struct BatchCursor<'a, C: ?Sized> {
    client: &'a C,
    address: &'a str,
    next_from: u64,
    to: u64,
    size: u64,
}

impl<'a, C: LedgerClient + ?Sized> BatchCursor<'a, C> {
    pub fn new(client: &'a C, address: &'a str, from: u64, to: u64, size: u64) -> Self {
        debug_assert!(size >= 1, "batch size must be positive");
        Self {
            client,
            address,
            next_from: from,
            to,
            size,
        }
    }

    /// The window the next call to `next()` will fetch, if any remain.
    pub fn next_window(&self) -> Option<Range<u64>> {
        windows(self.next_from, self.to, self.size).next()
    }

    /// Fetch the next window, or `None` once `[from, to)` is covered.
    pub async fn next(&mut self) -> Option<Result<TransactionBatch, LedgerError>> {
        let window = self.next_window()?;
        self.next_from = window.end;
        Some(self.client.list_hashes(self.address, window.start, self.size).await)
    }
}
