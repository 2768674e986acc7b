//! Bounded retry for transient write contention.
//!
//! Only failures classified as [`ErrorClass::TransientContention`] are
//! retried; every other error is returned on the first attempt. The loop
//! sleeps on the calling thread, so it must not run where blocking for up to
//! `max_attempts × backoff_ms` is unacceptable.
//!
//! [`ErrorClass::TransientContention`]: crate::store::ErrorClass::TransientContention

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::store::StoreError;

/// Fixed-backoff retry policy for lock-wait timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentionRetry {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}

impl Default for ContentionRetry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// The last error of a retried operation, with the number of attempts made.
#[derive(Debug, Error)]
#[error("{source} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}

impl ContentionRetry {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Check if we should retry based on attempt count (1-indexed)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. `op` receives the 1-indexed attempt number.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Result<T, StoreError>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && self.should_retry(attempt) => {
                    warn!(
                        operation,
                        attempt,
                        delay_ms = self.backoff_ms,
                        error = %err,
                        "Write contended, retrying"
                    );
                    thread::sleep(self.backoff());
                }
                Err(err) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> ContentionRetry {
        ContentionRetry {
            max_attempts: 3,
            backoff_ms: 1,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = ContentionRetry::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(), Duration::from_millis(500));
    }

    #[test]
    fn test_retries_transient_then_succeeds() {
        let result = quick().run("test", |attempt| {
            if attempt < 3 {
                Err(StoreError::Contention("database is locked".to_string()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_exhaustion_reports_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = quick().run("test", |_| {
            calls += 1;
            Err(StoreError::Contention("database is locked".to_string()))
        });

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(failure.source.is_transient());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_other_errors_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = quick().run("test", |_| {
            calls += 1;
            Err(StoreError::ReferentialIntegrity("FOREIGN KEY constraint failed".to_string()))
        });

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
    }
}
