//! Retry policy for ledger API calls.
//!
//! Each client carries its own policy, so engines crawling different chains
//! or contracts can retry differently.

use std::future::Future;
use std::time::Duration;

use crate::error::LedgerError;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry `n` waits `n * unit`.
    Linear { unit: Duration },
    /// Retry `n` waits `initial * multiplier^(n-1)`, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
    /// Every retry waits the same delay.
    Fixed(Duration),
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Linear { unit } => unit.saturating_mul(attempt),
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let base_ms = initial.as_millis() as f64 * multiplier.powi((attempt - 1) as i32);
                Duration::from_millis(base_ms.min(max.as_millis() as f64) as u64)
            }
            Self::Fixed(delay) => delay,
        }
    }
}

/// Retry policy: how many retries, how long between them, and which errors
/// qualify.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the first try).
    pub max_retries: u32,
    pub backoff: Backoff,
    retryable: fn(&LedgerError) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    /// Three retries on timeouts, one second more per attempt.
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff, retryable: fn(&LedgerError) -> bool) -> Self {
        Self {
            max_retries,
            backoff,
            retryable,
        }
    }

    /// Retry timeouts up to `max_retries` times with linear backoff.
    pub fn linear(max_retries: u32, unit: Duration) -> Self {
        Self::new(max_retries, Backoff::Linear { unit }, LedgerError::is_timeout)
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Backoff::Fixed(Duration::ZERO), |_| false)
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        Some(self.backoff.delay(attempt))
    }

    pub fn is_retryable(&self, err: &LedgerError) -> bool {
        (self.retryable)(err)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retries are exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if self.is_retryable(&e) => {
                    attempt += 1;
                    match self.next_delay(attempt) {
                        Some(delay) => {
                            tracing::info!(
                                call = label,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "retrying ledger call"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(call = label, attempt, error = %e, "max retries exceeded");
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
