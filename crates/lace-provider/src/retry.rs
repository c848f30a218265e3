//! `RetryPolicy` (§4.G): classifies transient provider errors and applies
//! capped exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::error::{ErrorClass, ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Before each retry attempt the Agent emits one of these, consumed by the
/// UI (§4.G).
#[derive(Debug, Clone)]
pub struct RetryStatus {
    pub is_retrying: bool,
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub error_type: String,
    pub retry_start_time_ms: u64,
}

pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Capped exponential backoff with full jitter: `rand(0, base * 2^n)`,
    /// capped at `max_delay_ms`.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.config.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.config.max_delay_ms);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }

    /// Runs `attempt_fn` with retry. `on_retry` is invoked just before each
    /// sleep so the caller can persist/emit a `RetryStatus`. `auth_error`
    /// (and any other non-transient class) is never retried.
    #[instrument(skip_all)]
    pub async fn run<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut on_retry: impl FnMut(RetryStatus),
        mut attempt_fn: F,
    ) -> ProviderResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = err.is_retryable();
                    if !retryable || attempt >= self.config.max_attempts {
                        warn!(attempt, retryable, "provider call exhausted retries or hit a fatal error");
                        return Err(err);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    on_retry(RetryStatus {
                        is_retrying: true,
                        attempt,
                        max_attempts: self.config.max_attempts,
                        delay_ms: delay.as_millis() as u64,
                        error_type: classify_name(&err),
                        retry_start_time_ms: now_ms(),
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    }
                }
            }
        }
    }
}

fn classify_name(err: &ProviderError) -> String {
    match err.classify() {
        ErrorClass::Timeout => "timeout",
        ErrorClass::RateLimit => "rate_limit",
        ErrorClass::ServerError => "server_error",
        ErrorClass::AuthError => "auth_error",
        ErrorClass::ConnectionError => "connection_error",
        ErrorClass::NetworkError => "network_error",
        ErrorClass::Fatal => "fatal",
    }
    .to_string()
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_cap() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        });
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let mut statuses = Vec::new();

        let result: ProviderResult<()> = policy
            .run(
                &cancel,
                |status| statuses.push(status.attempt),
                |_attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ProviderError::ServerError("boom".into())) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(statuses, vec![1, 2]);
    }

    #[tokio::test]
    async fn auth_error_is_never_retried() {
        let policy = RetryPolicy::new(RetryConfig::default());
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: ProviderResult<()> = policy
            .run(
                &cancel,
                |_| panic!("auth errors must not trigger a retry callback"),
                |_attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ProviderError::AuthError("bad key".into())) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1,
            max_delay_ms: 2,
        });
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = policy
            .run(
                &cancel,
                |_| {},
                |_attempt| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(ProviderError::Timeout)
                        } else {
                            Ok(42)
                        }
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
