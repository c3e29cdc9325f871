//! Retry logic for provider calls: bounded exponential backoff, applied to
//! transient failures only (network, timeout, 408/429, 5xx). Everything
//! else propagates immediately without consuming an attempt.

use super::ProviderError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for one logical provider call (request shaping, signing,
/// send, and parse all count as a single attempt).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts beyond the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }

    /// Backoff before re-running attempt `attempt` (0-based):
    /// `min(base * 2^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// True if retrying plausibly helps: transport errors, timeouts, and the
/// 408/429/5xx status family.
pub fn is_transient(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http { status, .. } => {
            *status == 408 || *status == 429 || *status >= 500
        }
        ProviderError::Network { .. } | ProviderError::RequestTimeout { .. } => true,
        _ => false,
    }
}

/// Run `op` under `policy`.
///
/// Non-transient errors propagate unchanged. Exhausting the budget wraps
/// the last transient error in [`ProviderError::RetriesExhausted`] with the
/// total attempt count.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_transient(&err) => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::warn!(attempts = attempt + 1, error = %err, "retry budget spent");
                    return Err(ProviderError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(err),
                    });
                }
                let wait = policy.delay_for(attempt);
                tracing::debug!(attempt, ?wait, error = %err, "transient provider error, backing off");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http_err(status: u16) -> ProviderError {
        ProviderError::Http {
            provider: "test".into(),
            status,
            body: String::new(),
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(&http_err(408)));
        assert!(is_transient(&http_err(429)));
        assert!(is_transient(&http_err(500)));
        assert!(is_transient(&http_err(503)));
    }

    #[test]
    fn non_transient_statuses_and_errors() {
        assert!(!is_transient(&http_err(400)));
        assert!(!is_transient(&http_err(404)));
        assert!(!is_transient(&ProviderError::Auth {
            provider: "test".into(),
            message: "401".into(),
        }));
        assert!(!is_transient(&ProviderError::JsonDecodeFailure {
            provider: "test".into(),
            raw: "nope".into(),
        }));
        assert!(!is_transient(&ProviderError::MalformedResponse {
            provider: "test".into(),
            message: "missing choices".into(),
        }));
    }

    #[test]
    fn timeout_is_transient() {
        assert!(is_transient(&ProviderError::RequestTimeout {
            provider: "test".into(),
            timeout: Duration::from_secs(30),
        }));
    }

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        let mut previous = Duration::ZERO;
        for attempt in 0..10 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(9), Duration::from_secs(2));
    }

    #[test]
    fn delay_shift_saturates_on_large_attempts() {
        let policy = fast_policy(3);
        assert_eq!(policy.delay_for(40), policy.max_delay);
    }

    #[tokio::test]
    async fn transient_failure_consumes_full_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(http_err(500)) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            ProviderError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, ProviderError::Http { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_transient_failure_attempts_exactly_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(http_err(400)) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), ProviderError::Http { status: 400, .. }));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = run(&fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 { Err(http_err(429)) } else { Ok(n) }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn immediate_success_does_not_sleep() {
        let result = run(&fast_policy(3), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
