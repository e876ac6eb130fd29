//! Exponential-backoff retry for LLM/embed calls (§4.2, §5): "exponential
//! backoff with jitter, base 1s, cap 60s, max 5 attempts." A `RateLimited`
//! error honors the provider's `retry_after` hint instead of the computed
//! backoff when one is given (§4.2: "sleeps for the provider's retry-after
//! hint (or exponential backoff with jitter...)"); `retry_after = 0` is an
//! immediate retry, still bounded by `max_attempts` (§8).

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::ports::ProviderError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let base = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);
        let jittered = if self.jitter {
            rand::thread_rng().gen_range(0.5..1.5) * capped
        } else {
            capped
        };
        Duration::from_millis(jittered as u64)
    }

    /// Retries `f` according to §4.2/§5: `RateLimited` sleeps for the
    /// provider's hint (or falls back to the computed backoff when no hint
    /// is given); `Transient` uses the computed backoff; `Permanent` and
    /// `SchemaViolation` are never retried.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "provider call succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        debug!(%err, "provider error is not retryable, stopping");
                        return Err(err);
                    }

                    let remaining = self.max_attempts - attempt - 1;
                    if remaining == 0 {
                        warn!(%err, attempt = attempt + 1, "retries exhausted");
                        last_error = Some(err);
                        break;
                    }

                    let wait = match &err {
                        ProviderError::RateLimited { retry_after: Some(hint) } => *hint,
                        _ => self.calculate_backoff(attempt),
                    };
                    warn!(%err, attempt = attempt + 1, wait_ms = wait.as_millis() as u64, "retrying provider call");
                    tokio::time::sleep(wait).await;
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Transient("retries exhausted".to_string())))
    }
}

pub async fn with_retry<F, Fut, T>(max_attempts: usize, f: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    RetryPolicy::new(max_attempts).execute(f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(5).with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_sleeping() {
        let policy = fast_policy();
        let attempts = Arc::new(AtomicUsize::new(0));
        let result = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProviderError>(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let policy = RetryPolicy::new(3).with_backoff(Duration::from_millis(1), Duration::from_millis(2));
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<i32, _> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Transient("boom".to_string()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_never_retried() {
        let policy = fast_policy();
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<i32, _> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Permanent("bad key".to_string()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn schema_violation_is_never_retried() {
        let policy = fast_policy();
        let result: Result<i32, _> = policy.execute(|| async { Err(ProviderError::SchemaViolation("bad json".to_string())) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_retry_after_is_an_immediate_retry_bounded_by_max_attempts() {
        let policy = RetryPolicy::new(2);
        let attempts = Arc::new(AtomicUsize::new(0));
        let start = std::time::Instant::now();
        let result: Result<i32, _> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::RateLimited { retry_after: Some(Duration::from_secs(0)) })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(false);
        assert_eq!(policy.calculate_backoff(0).as_millis(), 100);
        assert_eq!(policy.calculate_backoff(1).as_millis(), 200);
        assert_eq!(policy.calculate_backoff(2).as_millis(), 400);
    }
}
