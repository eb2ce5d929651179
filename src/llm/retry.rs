//! Transient-failure retry with exponential backoff and jitter.
//!
//! Wraps a single outbound generation call; a transient error is re-attempted
//! within the same job attempt. This layer is distinct from explicit job-level
//! retry (`Job::retry`), which re-enters a settled job into dispatch.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::GenerationError;

/// Retry policy for outbound generation calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base backoff; doubled per attempt.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff before re-attempt number `attempt` (1-based): base × 2^attempt
    /// plus random jitter, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = if self.jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter.as_millis() as u64)
        };
        (exp + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Run `op`, re-attempting transient failures per `policy`.
///
/// Non-retryable errors short-circuit immediately, consuming no retries.
/// Exhausting the budget surfaces the final error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                tracing::debug!(error = %e, "non-retryable generation error");
                return Err(e);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt,
                        "generation retries exhausted"
                    );
                    return Err(e);
                }
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient generation error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GenerationError::RequestFailed {
                        provider: "test".into(),
                        reason: "503".into(),
                    })
                } else {
                    Ok("output")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "output");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GenerationError::AuthFailed {
                    provider: "test".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(GenerationError::AuthFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_final_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GenerationError::RateLimited {
                    provider: "test".into(),
                    retry_after: None,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(GenerationError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(8), Duration::from_secs(30));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }
}
