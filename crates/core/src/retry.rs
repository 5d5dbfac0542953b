//! Exponential-backoff retry for transient failures.
//!
//! Expressed as a higher-order helper over a thunk plus a retryable
//! predicate; non-retryable errors propagate on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff contract: attempts, initial delay, growth factor, delay cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay that follows `current`, capped at `max_delay`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = current.as_secs_f64() * self.factor;
        Duration::from_secs_f64(next.min(self.max_delay.as_secs_f64()))
    }
}

/// Runs `op` until it succeeds, the error is not retryable, or
/// `max_attempts` is exhausted.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-retryable error immediately.
pub async fn retry<T, E, F, Fut, P>(policy: RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                tracing::warn!(
                    "attempt {}/{} failed: {}. Retrying in {:.1}s...",
                    attempt,
                    policy.max_attempts,
                    err,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
            Err(err) => {
                if is_retryable(&err) {
                    tracing::error!("failed after {} attempts: {}", policy.max_attempts, err);
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            factor: 2.0,
        }
    }

    #[tokio::test]
    async fn success_does_not_retry() {
        let calls = AtomicU32::new(0);

        let result: Result<&str, String> = retry(fast_policy(), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("success") }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);

        let result: Result<&str, String> = retry(fast_policy(), |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("connection failed".to_string())
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry(fast_policy(), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always fails".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "always fails");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry(
            fast_policy(),
            |e: &String| e.starts_with("transient"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal: bad request".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy::default();

        let d1 = policy.next_delay(Duration::from_secs(1));
        assert_eq!(d1, Duration::from_secs(2));

        let capped = policy.next_delay(Duration::from_secs(25));
        assert_eq!(capped, Duration::from_secs(30));
    }
}
