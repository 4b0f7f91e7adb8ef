//! Ledger API client backed by `reqwest`.
//!
//! Endpoints:
//! - `GET {base}/accounts/{address}/transfers/count`
//! - `GET {base}/accounts/{address}/transfers?from&size&order=asc`
//! - `GET {base}/transactions/{hash}`

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use chaincrawl_core::error::LedgerError;
use chaincrawl_core::ledger::LedgerClient;
use chaincrawl_core::retry::RetryPolicy;
use chaincrawl_core::types::{TransactionDetail, TransferSummary};

/// Configuration for `HttpLedgerClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP ledger API client. Stateless apart from its connection pool.
pub struct HttpLedgerClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl HttpLedgerClient {
    /// Create a client for the API at `base_url`.
    pub fn new(base_url: impl Into<String>, config: HttpClientConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            retry: config.retry,
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        label: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();
        self.retry
            .run(label, move || self.get_once(url, query))
            .await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, LedgerError> {
        tracing::debug!(url, ?query, "GET");
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_err(e))?;
        if !status.is_success() {
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| LedgerError::Decode(format!("{url}: {e}")))
    }

    fn map_err(&self, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            LedgerError::Decode(e.to_string())
        } else {
            LedgerError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn transaction_count(&self, address: &str) -> Result<u64, LedgerError> {
        self.get_json(
            "transfers/count",
            &format!("/accounts/{address}/transfers/count"),
            &[],
        )
        .await
    }

    async fn transfers(
        &self,
        address: &str,
        from: u64,
        size: u64,
    ) -> Result<Vec<TransferSummary>, LedgerError> {
        self.get_json(
            "transfers",
            &format!("/accounts/{address}/transfers"),
            &[
                ("from", from.to_string()),
                ("size", size.to_string()),
                ("order", "asc".to_string()),
            ],
        )
        .await
    }

    async fn transaction_detail(&self, hash: &str) -> Result<TransactionDetail, LedgerError> {
        let mut detail: TransactionDetail = self
            .get_json("transaction", &format!("/transactions/{hash}"), &[])
            .await?;
        if detail.tx_hash.is_empty() {
            detail.tx_hash = hash.to_string();
        }
        Ok(detail)
    }
}
