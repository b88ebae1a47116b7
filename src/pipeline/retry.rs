//! Rate-limit-aware retry policy for speech synthesis.
//!
//! The policy is a value injected into the synthesiser rather than a loop
//! baked into the HTTP client, so attempt count, backoff and the clock can be
//! swapped out in tests.
//!
//! ## Schedule
//!
//! With `max_attempts = 5` and `base_delay = 10 s`, a call that keeps hitting
//! the rate limit is tried at t = 0, 10, 30, 60 and 100 s. The fifth attempt
//! is issued unconditionally and whatever it returns is final.

use crate::error::SynthesisError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Suspends the current task. Abstracted so tests never actually wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How many times to try, how long to wait, and which errors are worth waiting for.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always ≥ 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub retryable: fn(&SynthesisError) -> bool,
    pub sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

impl RetryPolicy {
    /// Retry rate-limit errors only, sleeping on the tokio clock.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            retryable: SynthesisError::is_rate_limited,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retryable(mut self, retryable: fn(&SynthesisError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wait after the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` under this policy.
    ///
    /// `op` receives the 1-based attempt number. Attempts before the last
    /// swallow retryable errors and sleep; non-retryable errors return at
    /// once. The last attempt's result is returned as-is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, SynthesisError>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, SynthesisError>> + Send,
    {
        let max = self.max_attempts.max(1);
        for attempt in 1..max {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if (self.retryable)(&e) => {
                    let wait = self.backoff(attempt);
                    warn!(
                        "Attempt {}/{} hit '{}'; waiting {:?} before retrying",
                        attempt, max, e, wait
                    );
                    self.sleeper.sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
        op(max).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn policy(max: u32, sleeper: Arc<RecordingSleeper>) -> RetryPolicy {
        RetryPolicy::new(max, Duration::from_secs(10)).with_sleeper(sleeper)
    }

    fn rate_limited() -> SynthesisError {
        SynthesisError::RateLimited {
            retry_after_secs: None,
        }
    }

    #[tokio::test]
    async fn recovers_after_k_rate_limits_with_growing_waits() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result = policy(5, sleeper.clone())
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt <= 3 {
                        Err(rate_limited())
                    } else {
                        Ok("pcm")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("pcm"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let waits = sleeper.0.lock().unwrap().clone();
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
        assert!(waits.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn non_retryable_error_returns_without_sleeping() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy(5, sleeper.clone())
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SynthesisError::Auth("invalid key".into())) }
            })
            .await;

        assert!(matches!(result, Err(SynthesisError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn final_attempt_error_propagates_as_is() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy(3, sleeper.clone())
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert_eq!(result, Err(rate_limited()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No wait after the last attempt.
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn single_attempt_never_sleeps() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let result: Result<(), _> = policy(1, sleeper.clone())
            .run(|_| async { Err(rate_limited()) })
            .await;
        assert!(result.is_err());
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_predicate_widens_retries() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);
        let result = policy(3, sleeper.clone())
            .with_retryable(|e| matches!(e, SynthesisError::Transport(_)))
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(SynthesisError::Transport("reset".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_secs(10)]);
    }

    #[test]
    fn backoff_is_linear_in_attempt() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(10));
        assert_eq!(p.backoff(4), Duration::from_secs(40));
    }
}
