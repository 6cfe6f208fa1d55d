//! Retry policy wrapped around one full page walk.
//!
//! The policy owns the attempt count and delegates inter-attempt delays to a
//! [`Backoff`], so fixed and growing delays share one execution loop.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Delay strategy between attempts.
pub trait Backoff: Debug + Send + Sync {
    /// Delay before the attempt following `attempt` (zero-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Constant delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Doubling delay capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    attempts: u32,
    backoff: Arc<dyn Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(7, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    /// Fixed number of attempts with a constant delay.
    #[must_use]
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self::with_backoff(attempts, FixedBackoff(delay))
    }

    /// Fixed number of attempts with a custom backoff.
    #[must_use]
    pub fn with_backoff(attempts: u32, backoff: impl Backoff + 'static) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    /// Single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Total number of attempts.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay after the given zero-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Execute an async operation with retry.
    ///
    /// Retries only errors classified as retryable by
    /// [`SyncError::is_retryable`]. When every attempt fails, the last error
    /// is returned unchanged. Cancellation interrupts the inter-attempt sleep.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = SyncResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    if attempt + 1 >= self.attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %error,
                            "Retry attempts exhausted"
                        );
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => return Err(SyncError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 7);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(5), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).attempts(), 1);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::with_backoff(
            5,
            ExponentialBackoff {
                base: Duration::from_millis(100),
                max: Duration::from_millis(500),
            },
        );
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_execute_succeeds_after_transient_errors() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = policy
            .execute("fetch", &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(SyncError::event_api(503, "unavailable"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_returns_last_error_when_exhausted() {
        let policy = RetryPolicy::fixed(4, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: SyncResult<()> = policy
            .execute("fetch", &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::event_api(500, format!("attempt {n}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(SyncError::EventApi { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "attempt 3");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_does_not_retry_consistency_violation() {
        let policy = RetryPolicy::fixed(5, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: SyncResult<()> = policy
            .execute("walk", &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::TotalChanged {
                        expected: 10,
                        actual: 11,
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SyncError::TotalChanged { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_waits_fixed_delay_between_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(10));
        let started = tokio::time::Instant::now();

        let result: SyncResult<()> = policy
            .execute("fetch", &CancellationToken::new(), || async {
                Err(SyncError::event_api(502, "bad gateway"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_execute_stops_when_cancelled() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: SyncResult<()> = policy
            .execute("fetch", &cancel, || {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Err(SyncError::event_api(503, "unavailable"))
                }
            })
            .await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
