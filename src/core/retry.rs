//! Bounded retry with exponential backoff
//!
//! Every remote call made by the aggregator, router and gas sentinel goes
//! through `RetryPolicy::run`. Each attempt is bounded by a per-call
//! timeout; a timed-out attempt counts as a retryable failure. Non-retryable
//! errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::errors::VenueError;

/// Error classification used by `RetryPolicy`
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Error to report when an attempt exceeds the per-call timeout
    fn timed_out(after_ms: u64) -> Self;
}

impl Retryable for VenueError {
    fn is_retryable(&self) -> bool {
        VenueError::is_retryable(self)
    }

    fn timed_out(after_ms: u64) -> Self {
        VenueError::NetworkTimeout(after_ms)
    }
}

/// Retry parameters, shared by all remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry (doubles each retry)
    pub initial_delay_ms: u64,
    /// Backoff cap
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay
    pub jitter_ms: u64,
    /// Per-attempt timeout
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            jitter_ms: 200,
            call_timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Base delay before retry number `retry` (1-based), without jitter
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let shift = retry.saturating_sub(1).min(32);
        self.initial_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is exhausted. Returns the last error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(Duration::from_millis(self.call_timeout_ms), op()).await
                {
                    Ok(result) => result,
                    Err(_) => Err(E::timed_out(self.call_timeout_ms)),
                };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::warn!(call = %label, attempt, error = %err, "[RETRY] Non-retryable failure");
                return Err(err);
            }
            if attempt >= attempts {
                tracing::warn!(
                    call = %label,
                    attempts,
                    error = %err,
                    "[RETRY] Attempts exhausted"
                );
                return Err(err);
            }

            let jitter = if self.jitter_ms > 0 {
                rand::random::<u64>() % self.jitter_ms
            } else {
                0
            };
            let delay_ms = self.backoff_ms(attempt) + jitter;
            tracing::debug!(
                call = %label,
                attempt,
                max_attempts = attempts,
                delay_ms,
                error = %err,
                "[RETRY] Retrying"
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            jitter_ms: 0,
            call_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<u32, VenueError> = fast_policy(3)
            .run("test", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_second_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), VenueError> = fast_policy(3)
            .run("test", || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(VenueError::ConnectionFailed("first try".into()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), VenueError> = fast_policy(3)
            .run("test", || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Err(VenueError::Rpc(format!("fail {}", n)))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.unwrap_err().to_string().contains("fail 2"));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), VenueError> = fast_policy(5)
            .run("test", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(VenueError::Rejected("insufficient margin".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(VenueError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_retryable_failure() {
        let policy = RetryPolicy {
            call_timeout_ms: 20,
            ..fast_policy(2)
        };
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), VenueError> = policy
            .run("slow", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(VenueError::NetworkTimeout(20))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_delay_ms: 10,
            max_delay_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_ms(1), 10);
        assert_eq!(policy.backoff_ms(2), 20);
        assert_eq!(policy.backoff_ms(4), 80);
        assert_eq!(policy.backoff_ms(5), 100);
        assert_eq!(policy.backoff_ms(60), 100);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 500);
        assert_eq!(policy.max_delay_ms, 5000);
    }
}
