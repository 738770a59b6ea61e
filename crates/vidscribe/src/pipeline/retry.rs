//! Bounded exponential-backoff retry for backend calls.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::BackendError;
use crate::config::RetryConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// A non-retryable failure ended the run, possibly after transient ones.
    #[error("{source}")]
    Fatal { attempts: u32, source: BackendError },

    /// Every attempt failed with a retryable error.
    #[error("{source} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, source: BackendError },
}

impl RetryError {
    /// How many attempts were made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Retry schedule: `max_attempts` tries, waiting `base_delay * 2^(n-1)` after
/// the n-th failure, capped at `max_delay`.
///
/// Only wrap idempotent calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails fatally, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", name, attempt);
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    if attempt > 1 {
                        warn!("{} failed fatally on attempt {}: {}", name, attempt, err);
                    }
                    return Err(RetryError::Fatal {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) if attempt >= max_attempts => {
                    warn!("{} failed after {} attempts: {}", name, attempt, err);
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed ({}, attempt {}/{}): {}. Retrying in {:?}",
                        name, err.kind, attempt, max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
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

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = policy(10);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_secs(1));
        assert_eq!(policy.delay_for(40), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(BackendError::transient("connection reset"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("fatal", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::fatal("invalid api key"))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Fatal { .. }));
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.to_string(), "invalid api key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_after_transient_counts_every_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run("flaky then fatal", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BackendError::transient("connection reset"))
                } else {
                    Err(BackendError::fatal("model refused"))
                }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            RetryError::Fatal {
                attempts: 2,
                source: BackendError::fatal("model refused"),
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempt_count() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<(), _> = policy(3)
            .run("rate limited", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::rate_limited("429"))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(
            err,
            RetryError::Exhausted {
                attempts: 3,
                source: BackendError::rate_limited("429"),
            }
        );
        assert_eq!(err.to_string(), "429 (gave up after 3 attempts)");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff between the three attempts.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(0)
            .run("once", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::timeout("timed out"))
            })
            .await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
