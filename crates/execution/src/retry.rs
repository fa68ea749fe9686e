// In crates/execution/src/retry.rs

use crate::types::RetryPolicy;
use crate::{Error, Result};
use std::future::Future;
use tokio::time::{sleep, timeout};

/// Runs `call` until it succeeds, fails definitively, or the policy gives up.
///
/// Each attempt gets its own deadline. A missed deadline counts as a
/// transient failure. Rejections are returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &'static str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = Error::ExchangeTimeout { operation, attempts };

    for attempt in 1..=attempts {
        match timeout(policy.attempt_timeout(), call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => {
                tracing::warn!(operation, attempt, error = %e, "Exchange call failed, will retry.");
                last_error = e;
            }
            Err(_) => {
                tracing::warn!(operation, attempt, "Exchange call timed out.");
                last_error = Error::ExchangeTimeout { operation, attempts };
            }
        }

        if attempt < attempts {
            sleep(policy.delay_after(attempt)).await;
        }
    }

    tracing::error!(operation, attempts, error = %last_error, "Giving up on exchange call.");
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, base_delay_ms: 10, max_delay_ms: 40, attempt_timeout_ms: 50 }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(40));
        assert_eq!(policy.delay_after(10), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retry(&fast_policy(), "place_order", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Transient { operation: "place_order", reason: "502".into() })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = with_retry(&fast_policy(), "place_order", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::ExchangeRejected { operation: "place_order", reason: "margin".into() })
            }
        })
        .await;
        assert!(matches!(result, Err(Error::ExchangeRejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let result: Result<()> = with_retry(&fast_policy(), "query_fill", || async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(Error::ExchangeTimeout { operation: "query_fill", attempts: 3 }));
    }
}
