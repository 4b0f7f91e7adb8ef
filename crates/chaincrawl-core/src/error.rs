//! Error types for the crawl pipeline.

use thiserror::Error;

/// Errors returned by a ledger API call.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The request timed out before the API answered.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The API answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection or protocol failure other than a timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Returns `true` for the transient timeout class.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the default retry policy would retry this error.
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }
}

/// Errors that can occur while crawling.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Event sink error: {reason}")]
    Sink { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    /// Returns `true` if the error was raised by cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(LedgerError::Timeout { ms: 30_000 }.is_retryable());
        assert!(!LedgerError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!LedgerError::Transport("connection refused".into()).is_retryable());
        assert!(!LedgerError::Decode("expected integer".into()).is_retryable());
    }

    #[test]
    fn ledger_error_converts_into_crawl_error() {
        let err: CrawlError = LedgerError::Timeout { ms: 10 }.into();
        assert!(matches!(err, CrawlError::Ledger(LedgerError::Timeout { ms: 10 })));
        assert!(!err.is_cancelled());
        assert!(CrawlError::Cancelled.is_cancelled());
    }
}
