//! Bounded exponential backoff for remote requests

use std::time::Duration;

use glossa_core::{GlossaError, GlossaResult, RetryConfig, SourceError};

/// Outcome of one failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Connection errors, timeouts, 429 and 5xx responses.
    Transient(String),
    /// Anything a retry cannot fix.
    Permanent(GlossaError),
}

/// Whether an HTTP status is worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), capped at `max_backoff`.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor).min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or the retries run out.
    /// `sleep` is called with each backoff delay.
    pub fn run<T>(
        &self,
        endpoint: &str,
        mut op: impl FnMut() -> Result<T, Failure>,
        mut sleep: impl FnMut(Duration),
    ) -> GlossaResult<T> {
        let mut retry = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(Failure::Permanent(err)) => return Err(err),
                Err(Failure::Transient(reason)) if retry < self.max_retries => {
                    let delay = self.delay(retry);
                    tracing::warn!(
                        endpoint,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "request failed, retrying"
                    );
                    sleep(delay);
                    retry += 1;
                }
                Err(Failure::Transient(reason)) => {
                    return Err(SourceError::RetriesExhausted {
                        endpoint: endpoint.to_string(),
                        attempts: retry + 1,
                        last: reason,
                    }
                    .into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(3_000),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_millis(500));
        assert_eq!(p.delay(1), Duration::from_millis(1_000));
        assert_eq!(p.delay(2), Duration::from_millis(2_000));
        assert_eq!(p.delay(3), Duration::from_millis(3_000));
        assert_eq!(p.delay(30), Duration::from_millis(3_000));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn test_transient_failures_are_retried_then_succeed() {
        let mut calls = 0;
        let mut slept = Vec::new();
        let result = policy().run(
            "api",
            || {
                calls += 1;
                if calls < 3 {
                    Err(Failure::Transient("timeout".into()))
                } else {
                    Ok(calls)
                }
            },
            |d| slept.push(d),
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(slept, vec![Duration::from_millis(500), Duration::from_millis(1_000)]);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let mut calls = 0;
        let err = policy()
            .run::<()>(
                "api",
                || {
                    calls += 1;
                    Err(Failure::Transient("503".into()))
                },
                |_| {},
            )
            .unwrap_err();
        assert_eq!(calls, 4);
        match err {
            GlossaError::Source(SourceError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "503");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let mut calls = 0;
        let err = policy()
            .run::<()>(
                "api",
                || {
                    calls += 1;
                    Err(Failure::Permanent(
                        SourceError::RequestFailed {
                            endpoint: "api".into(),
                            status: 404,
                            message: "not found".into(),
                        }
                        .into(),
                    ))
                },
                |_| panic!("must not sleep"),
            )
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, GlossaError::Source(SourceError::RequestFailed { status: 404, .. })));
    }
}
