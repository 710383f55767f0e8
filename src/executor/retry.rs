use std::future::Future;
use std::time::Duration;
use tracing;

/// Upper bound on a single backoff sleep.
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based): `base_delay_ms * 2^(attempt - 1)`,
/// saturating and capped at [`MAX_RETRY_DELAY_MS`].
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_delay_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS))
}

/// Retry a fallible async operation with exponential backoff.
///
/// Only errors for which `is_retryable` returns true are retried; anything
/// else is returned on the first occurrence.
pub async fn with_retry<F, Fut, T, E, P>(
    max_retries: u32,
    base_delay_ms: u64,
    operation_name: &str,
    is_retryable: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                attempt = attempt.saturating_add(1);
                if attempt > max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        "All retry attempts exhausted"
                    );
                    return Err(e);
                }

                let delay = backoff_delay(base_delay_ms, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(500, 4), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(500, 20), Duration::from_millis(MAX_RETRY_DELAY_MS));
        assert_eq!(backoff_delay(500, 64), Duration::from_millis(MAX_RETRY_DELAY_MS));
        assert_eq!(backoff_delay(500, 65), Duration::from_millis(MAX_RETRY_DELAY_MS));
        assert_eq!(backoff_delay(u64::MAX, u32::MAX), Duration::from_millis(MAX_RETRY_DELAY_MS));
        assert_eq!(backoff_delay(0, 100), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry(3, 1, "flaky", |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("Throttling".to_string())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            5,
            1,
            "broken",
            |e: &String| e.contains("Throttling"),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("ValidationError".to_string())
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(2, 1, "throttled", |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("Rate exceeded".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
