//! Retry and backoff helpers for pipeline producers
//!
//! Scrapers wrap their flaky fetches in [`retry_with_backoff`] before handing
//! the result to the guarded writer. The writer itself never retries.

use std::thread;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Common retry error types
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        operation: &'static str,
        attempts: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Transient error in '{operation}': {source}")]
    Transient {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Permanent error in '{operation}': {source}")]
    Permanent {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RetryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RetryError::Transient { .. })
    }
}

/// Result type for retry operations
pub type RetryResult<T> = std::result::Result<T, RetryError>;

/// How many times to retry and how long to wait between attempts
///
/// The wait before retry `n` (0-based) is `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Deterministic doubling backoff; the attempt budget is enforced by the caller.
    pub fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build();
        backoff.reset();
        backoff
    }
}

/// Execute `f` with exponential backoff, sleeping on the current thread
///
/// `f` receives the 1-based attempt number. Transient errors are retried up
/// to `policy.max_retries` times; a permanent error is returned immediately.
pub fn retry_with_backoff<F, T>(op_name: &'static str, policy: &RetryPolicy, f: F) -> RetryResult<T>
where
    F: FnMut(usize) -> RetryResult<T>,
{
    retry_with_sleeper(op_name, policy, f, thread::sleep)
}

/// [`retry_with_backoff`] with a custom sleep function
pub fn retry_with_sleeper<F, S, T>(
    op_name: &'static str,
    policy: &RetryPolicy,
    mut f: F,
    mut sleep: S,
) -> RetryResult<T>
where
    F: FnMut(usize) -> RetryResult<T>,
    S: FnMut(Duration),
{
    let mut backoff = policy.backoff();
    let total_attempts = policy.max_retries + 1;
    let mut attempt = 1;

    loop {
        debug!("Attempting operation '{}' (attempt {})", op_name, attempt);

        match f(attempt) {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        op_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(err @ RetryError::Permanent { .. }) => {
                warn!(
                    "Operation '{}' failed permanently on attempt {}: {}",
                    op_name, attempt, err
                );
                return Err(err);
            }
            Err(err) => {
                if attempt >= total_attempts {
                    error!(
                        "Operation '{}' failed on all {} attempts: {}",
                        op_name, total_attempts, err
                    );
                    return Err(RetryError::MaxRetriesExceeded {
                        operation: op_name,
                        attempts: attempt,
                        source: into_source(err),
                    });
                }

                let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
                warn!(
                    "Attempt {}/{} of '{}' failed: {}. Retrying in {:.1}s",
                    attempt,
                    total_attempts,
                    op_name,
                    err,
                    delay.as_secs_f64()
                );
                sleep(delay);
                attempt += 1;
            }
        }
    }
}

fn into_source(err: RetryError) -> Box<dyn std::error::Error + Send + Sync> {
    match err {
        RetryError::Transient { source, .. }
        | RetryError::Permanent { source, .. }
        | RetryError::MaxRetriesExceeded { source, .. } => source,
    }
}

/// Trait for categorizing errors as transient or permanent
pub trait RetryableError {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl RetryableError for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::Interrupted
                | ErrorKind::TimedOut
                | ErrorKind::WouldBlock
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        )
    }
}

/// Wrap `err` as transient or permanent according to its classification
pub fn classify<E>(operation: &'static str, err: E) -> RetryError
where
    E: RetryableError + std::error::Error + Send + Sync + 'static,
{
    if err.is_transient() {
        transient_error!(operation, err)
    } else {
        permanent_error!(operation, err)
    }
}

/// Helper macro for creating transient errors
#[macro_export]
macro_rules! transient_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Transient {
            operation: $op,
            source: Box::new($err),
        }
    };
}

/// Helper macro for creating permanent errors
#[macro_export]
macro_rules! permanent_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Permanent {
            operation: $op,
            source: Box::new($err),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
    }

    fn no_wait(_: Duration) {}

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_successful_operation() {
        let result = retry_with_sleeper(
            "fetch_offers",
            &RetryPolicy::default(),
            |_attempt| Ok("success"),
            no_wait,
        );
        assert_eq!(result.unwrap(), "success");
    }

    #[test]
    fn test_transient_failure_then_success() {
        let mut calls = 0;
        let mut waits = Vec::new();

        let result = retry_with_sleeper(
            "fetch_offers",
            &RetryPolicy::default(),
            |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(transient_error!("fetch_offers", refused()))
                } else {
                    Ok(attempt)
                }
            },
            |d| waits.push(d.as_millis()),
        );

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
        assert_eq!(waits, vec![1000, 2000]);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let mut calls = 0;
        let mut waits = Vec::new();

        let result: RetryResult<()> = retry_with_sleeper(
            "fetch_offers",
            &RetryPolicy::default(),
            |_| {
                calls += 1;
                Err(transient_error!("fetch_offers", refused()))
            },
            |d| waits.push(d.as_millis()),
        );

        assert_eq!(calls, 4);
        assert_eq!(waits, vec![1000, 2000, 4000]);
        match result {
            Err(RetryError::MaxRetriesExceeded { attempts, source, .. }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(30));
        let mut waits = Vec::new();

        let _: RetryResult<()> = retry_with_sleeper(
            "fetch_trains",
            &policy,
            |_| Err(transient_error!("fetch_trains", refused())),
            |d| waits.push(d.as_secs()),
        );

        assert_eq!(waits, vec![10, 20, 30, 30, 30]);
    }

    #[test]
    fn test_permanent_failure_stops_immediately() {
        let mut calls = 0;
        let result: RetryResult<&str> = retry_with_sleeper(
            "fetch_offers",
            &RetryPolicy::default(),
            |_| {
                calls += 1;
                Err(permanent_error!(
                    "fetch_offers",
                    io::Error::new(io::ErrorKind::PermissionDenied, "permission denied")
                ))
            },
            |_| panic!("permanent errors must not wait"),
        );

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Permanent { .. })));
    }

    #[test]
    fn test_zero_retries_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        let mut calls = 0;
        let result: RetryResult<()> = retry_with_sleeper(
            "fetch",
            &policy,
            |_| {
                calls += 1;
                Err(transient_error!("fetch", refused()))
            },
            no_wait,
        );
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::MaxRetriesExceeded { attempts: 1, .. })));
    }

    #[test]
    fn test_classify_io_errors() {
        assert!(classify("op", refused()).is_transient());
        assert!(!classify("op", io::Error::new(io::ErrorKind::NotFound, "gone")).is_transient());
    }
}
