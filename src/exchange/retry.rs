//! Fixed-interval retry for exchange calls

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How many times to try a call and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Price reads: 20 attempts, 500ms apart
    pub const fn prices() -> Self {
        Self::new(20, Duration::from_millis(500))
    }

    /// Balance and order calls: 50 attempts, 200ms apart
    pub const fn account() -> Self {
        Self::new(50, Duration::from_millis(200))
    }

    /// Same attempt count, no waiting. Used by tests.
    pub const fn immediate(self) -> Self {
        Self::new(self.attempts, Duration::ZERO)
    }

    fn backoff(&self) -> FixedAttempts {
        FixedAttempts::new(self.attempts, self.interval)
    }
}

/// Constant-delay backoff that gives up after a fixed number of attempts
#[derive(Debug, Clone)]
struct FixedAttempts {
    retries: u32,
    remaining: u32,
    interval: Duration,
}

impl FixedAttempts {
    fn new(attempts: u32, interval: Duration) -> Self {
        let retries = attempts.saturating_sub(1);
        Self {
            retries,
            remaining: retries,
            interval,
        }
    }
}

impl Backoff for FixedAttempts {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }

    fn reset(&mut self) {
        self.remaining = self.retries;
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Interruptions and non-transient errors stop immediately. When attempts
/// run out the last error is returned.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    backoff::future::retry(policy.backoff(), || {
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    debug!("Retryable error on {}: {}", what, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    if e.is_interrupt() {
                        warn!("{} interrupted: {}", what, e);
                    }
                    Err(backoff::Error::permanent(e))
                }
            }
        }
    })
    .await
    .map_err(|e: Error| {
        debug!("Giving up on {}: {}", what, e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_exhausts_exact_attempt_count() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let calls_ref = &calls;
        let res: Result<()> = with_retry(policy, "ping", move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(Error::Http("connection reset".to_string()))
        })
        .await;

        assert!(matches!(res, Err(Error::Http(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_after_one_call() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::account().immediate();

        let calls_ref = &calls;
        let res: Result<()> = with_retry(policy, "order", move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(Error::Exchange {
                status: 400,
                message: "INTERRUPT".to_string(),
            })
        })
        .await;

        assert!(res.unwrap_err().is_interrupt());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::prices().immediate();

        let calls_ref = &calls;
        let res = with_retry(policy, "price", move || async move {
            let n = calls_ref.fetch_add(1, Ordering::SeqCst);
            if n < 4 {
                Err(Error::RateLimited("429".to_string()))
            } else {
                Ok(42.0)
            }
        })
        .await;

        assert_eq!(res.unwrap(), 42.0);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(RetryPolicy::prices().attempts, 20);
        assert_eq!(RetryPolicy::prices().interval, Duration::from_millis(500));
        assert_eq!(RetryPolicy::account().attempts, 50);
        assert_eq!(RetryPolicy::account().interval, Duration::from_millis(200));
    }
}
