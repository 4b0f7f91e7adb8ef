//! chaincrawl-http: HTTP client for the ledger API.
//!
//! Every call goes through the client's [`RetryPolicy`](chaincrawl_core::RetryPolicy):
//! timeouts are retried with linear backoff, anything else propagates at once.

pub mod client;

pub use client::{HttpClientConfig, HttpLedgerClient};
