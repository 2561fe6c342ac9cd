// src/retry.rs
//! Transport error classification and the bounded exponential retry loop
//! shared by the feed client and the webhook notifier.

use std::future::Future;
use std::time::Duration;

use metrics::counter;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Timeouts, connection failures, HTTP 5xx and 429. Safe to retry.
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("request failed: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            TransportError::Transient(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status)
        } else {
            TransportError::Permanent(e.to_string())
        }
    }

    pub fn from_status(status: reqwest::StatusCode) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            TransportError::Transient(format!("HTTP {}", status.as_u16()))
        } else {
            TransportError::Permanent(format!("HTTP {}", status.as_u16()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt:
    /// `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < max => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        what,
                        "transient failure, retrying"
                    );
                    counter!("digest_transport_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
