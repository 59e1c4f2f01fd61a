//! Bounded retry for on-chain confirmation polling
//!
//! After a bridge or swap operation is submitted, the artifact proving it
//! landed (a nonce, a mirrored transaction) appears on-chain only
//! eventually. [`retry`] polls with a fixed delay and a hard attempt
//! budget; [`wait_for`] reports exhaustion as an explicit
//! [`Confirmation::TimedOut`] so callers decide whether a timeout is fatal.

use crate::error::{ErrorCode, WalletError};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry configuration: fixed delay, hard attempt ceiling
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Number of attempts before giving up
    pub retries: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 50,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryOptions {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

/// Outcome of a bounded confirmation wait
#[derive(Debug, Clone)]
pub enum Confirmation<T> {
    /// The artifact appeared within the retry budget
    Confirmed(T),
    /// The retry budget was exhausted; the last attempt's failure is kept
    TimedOut {
        attempts: u32,
        last_error: WalletError,
    },
}

impl<T> Confirmation<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed(_))
    }

    pub fn confirmed(self) -> Option<T> {
        match self {
            Confirmation::Confirmed(value) => Some(value),
            Confirmation::TimedOut { .. } => None,
        }
    }

    /// Collapse into a `Result` for callers that treat a timeout as fatal
    pub fn into_result(self) -> Result<T, WalletError> {
        match self {
            Confirmation::Confirmed(value) => Ok(value),
            Confirmation::TimedOut { last_error, .. } => Err(last_error),
        }
    }
}

/// Invoke `operation` up to `retries` times, sleeping `delay` between
/// attempts. The first success wins; otherwise the final attempt's own
/// error is surfaced, normalized.
pub async fn retry<T, F, Fut>(options: &RetryOptions, mut operation: F) -> Result<T, WalletError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = eyre::Result<T>>,
{
    let mut last_error: Option<WalletError> = None;

    for attempt in 0..options.retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(report) => {
                let error = WalletError::normalize(report);
                debug!(attempt, code = %error.code(), "retry attempt failed");
                last_error = Some(error);
            }
        }

        if attempt + 1 < options.retries {
            tokio::time::sleep(options.delay).await;
        }
    }

    Err(last_error
        .unwrap_or_else(|| WalletError::new(ErrorCode::Timeout, "retry budget was empty")))
}

/// Like [`retry`], but exhaustion becomes [`Confirmation::TimedOut`]
/// instead of an error
pub async fn wait_for<T, F, Fut>(options: &RetryOptions, operation: F) -> Confirmation<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = eyre::Result<T>>,
{
    match retry(options, operation).await {
        Ok(value) => Confirmation::Confirmed(value),
        Err(last_error) => Confirmation::TimedOut {
            attempts: options.retries,
            last_error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_performs_exactly_the_budgeted_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), WalletError> =
            retry(&RetryOptions::new(4, Duration::from_millis(10)), move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    Err(eyre!("attempt {n} failed"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_failure_is_surfaced() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), WalletError> =
            retry(&RetryOptions::new(3, Duration::from_millis(10)), move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    Err(eyre!("failure number {n}"))
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.code(), ErrorCode::Unexpected);
        assert!(error.cause().unwrap().to_string().contains("failure number 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_separated_by_the_delay() {
        let delay = Duration::from_millis(250);
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&stamps);

        let _: Result<(), WalletError> = retry(&RetryOptions::new(3, delay), move || {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(Instant::now());
                Err(eyre!("still pending"))
            }
        })
        .await;

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 3);
        assert_eq!(stamps[1] - stamps[0], delay);
        assert_eq!(stamps[2] - stamps[1], delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_short_circuits() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = retry(&RetryOptions::new(10, Duration::from_millis(10)), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(eyre!("not yet"))
                } else {
                    Ok("0xdeadbeef".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "0xdeadbeef");
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_errors_survive_normalization() {
        let result: Result<(), WalletError> =
            retry(&RetryOptions::new(2, Duration::from_millis(1)), || async {
                Err(eyre::Report::new(WalletError::new(
                    ErrorCode::PairTokenNotFound,
                    "pair token not found",
                )))
            })
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::PairTokenNotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reports_timeout_explicitly() {
        let outcome: Confirmation<String> =
            wait_for(&RetryOptions::new(2, Duration::from_millis(5)), || async {
                Err(eyre!("no nonce yet"))
            })
            .await;

        match outcome {
            Confirmation::TimedOut {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error.code(), ErrorCode::Unexpected);
            }
            Confirmation::Confirmed(_) => panic!("expected a timeout"),
        }
    }
}
