//! Bounded retry around a single upstream call.
//!
//! Each attempt ends in one of:
//! - success: the value is returned,
//! - fatal error: abort at once with [`Error::InvalidRequest`],
//! - rate limited: wait `rate_limit_wait`, try again,
//! - transient error: wait `error_wait`, try again.
//!
//! When `max_attempts` is used up, a rate-limit failure escalates to
//! [`Error::PersistentRateLimit`]; any other failure is handed back as
//! [`CallOutcome::Exhausted`] so the caller can degrade instead of aborting.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::config::EngineConfig;
use crate::error::Error;
use crate::transport::UpstreamError;
use crate::Result;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { delay: Duration },
    Abort,
}

#[derive(Debug)]
pub enum CallOutcome<T> {
    Completed { value: T, attempts: u32 },
    /// Every attempt failed with a transient error; `last_error` is the final one.
    Exhausted { last_error: UpstreamError, attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_wait: Duration,
    pub error_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, rate_limit_wait: Duration, error_wait: Duration) -> Self {
        Self {
            max_attempts,
            rate_limit_wait,
            error_wait,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_attempts, config.rate_limit_wait, config.error_wait)
    }

    pub(crate) fn decide(&self, err: &UpstreamError) -> Decision {
        match err {
            UpstreamError::InvalidRequest { .. } => Decision::Abort,
            UpstreamError::RateLimited { .. } => Decision::Retry {
                delay: self.rate_limit_wait,
            },
            UpstreamError::Transient { .. } => Decision::Retry {
                delay: self.error_wait,
            },
        }
    }

    /// Run `call` until it succeeds, fails fatally, or attempts run out.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<CallOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, UpstreamError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let err = match call().await {
                Ok(value) => {
                    return Ok(CallOutcome::Completed {
                        value,
                        attempts: attempt,
                    })
                }
                Err(err) => err,
            };

            match self.decide(&err) {
                Decision::Abort => {
                    return Err(Error::InvalidRequest {
                        message: err.message().to_string(),
                    })
                }
                Decision::Retry { delay } => {
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "upstream call failed"
                    );
                    // No point sleeping once the last attempt is spent.
                    if attempt < max_attempts && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(UpstreamError::RateLimited { message }) => {
                tracing::error!(attempts = max_attempts, "persistent rate limiting");
                Err(Error::PersistentRateLimit {
                    attempts: max_attempts,
                    message,
                })
            }
            Some(last_error) => Ok(CallOutcome::Exhausted {
                last_error,
                attempts: max_attempts,
            }),
            // The loop runs at least once and every non-returning path records an error.
            None => Err(Error::malformed("retry loop finished without an outcome")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let outcome = policy(5)
            .execute(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(UpstreamError::transient("flaky"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();
        match outcome {
            CallOutcome::Completed { value, attempts } => {
                assert_eq!(value, 3);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_request_aborts_without_retry() {
        let calls = &AtomicU32::new(0);
        let err = policy(5)
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::invalid_request("bad param"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { ref message } if message == "bad param"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_exhaustion_is_not_an_error() {
        let calls = &AtomicU32::new(0);
        let outcome = policy(3)
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::transient("502"))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            outcome,
            CallOutcome::Exhausted { attempts: 3, last_error: UpstreamError::Transient { .. } }
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_escalates() {
        let calls = &AtomicU32::new(0);
        let err = policy(3)
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::rate_limited("429"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, Error::PersistentRateLimit { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_only_last_failure_decides_exhaustion() {
        let calls = &AtomicU32::new(0);
        let outcome = policy(2)
            .execute(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err::<(), _>(UpstreamError::rate_limited("429"))
                } else {
                    Err(UpstreamError::transient("500"))
                }
            })
            .await
            .unwrap();
        assert!(matches!(outcome, CallOutcome::Exhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_use_class_specific_delay() {
        let policy = RetryPolicy::new(2, Duration::from_secs(30), Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let _ = policy
            .execute(|| async { Err::<(), _>(UpstreamError::transient("boom")) })
            .await;
        // One wait between the two attempts, none after the last.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1) && waited < Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        let _ = policy
            .execute(|| async { Err::<(), _>(UpstreamError::rate_limited("slow")) })
            .await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));
    }
}
