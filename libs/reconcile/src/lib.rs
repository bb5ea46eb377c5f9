//! Convergence primitives.
//!
//! Every node operation that waits for a remote machine to reach some state
//! is expressed as a sequence of attempts driven by [`retry`]. Key concepts:
//!
//! - **Attempt**: one bounded try, reported as [`Attempt::Success`],
//!   [`Attempt::Retry`] (expected, try again) or [`Attempt::Fatal`] (stop now).
//! - **Budget**: total wall time, constant pause between attempts, and an
//!   optional per-attempt deadline ([`RetryBudget`]).
//! - **Cancellation**: a run-wide `watch` channel; once it flips to `true` the
//!   driver stops at the next attempt boundary.
//!
//! # Invariants
//!
//! - A `Fatal` outcome is never retried
//! - A `Retry` outcome is never surfaced unless the budget is exhausted
//! - No attempt starts after cancellation has been observed

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Error returned by [`retry`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The budget ran out while attempts kept asking for a retry.
    #[error("timeout after {elapsed:?}: {last}")]
    Exhausted {
        /// Time spent across all attempts.
        elapsed: Duration,
        /// Reason reported by the last attempt.
        last: String,
    },

    /// An attempt reported a non-retryable failure.
    #[error("{0}")]
    Fatal(E),

    /// The run was cancelled before the operation converged.
    #[error("operation cancelled")]
    Cancelled,
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation converged.
    Success(T),

    /// Expected failure; the driver waits one interval and tries again.
    Retry(String),

    /// Non-retryable failure; the driver returns immediately.
    Fatal(E),
}

impl<T, E> Attempt<T, E> {
    /// Build a retryable outcome from anything printable.
    pub fn retry(reason: impl fmt::Display) -> Self {
        Self::Retry(reason.to_string())
    }
}

/// Bounded constant-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Total time after which no new attempt is started.
    pub total: Duration,

    /// Pause between two attempts.
    pub interval: Duration,

    /// Upper bound for a single attempt (expiry counts as a retry).
    pub attempt_timeout: Option<Duration>,
}

impl RetryBudget {
    /// Constant-interval budget without a per-attempt deadline.
    pub const fn constant(total: Duration, interval: Duration) -> Self {
        Self {
            total,
            interval,
            attempt_timeout: None,
        }
    }

    /// Bound every attempt to `timeout`.
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }
}

/// Run `attempt` until it succeeds, fails fatally, the budget runs out, or the
/// shutdown signal fires.
pub async fn retry<T, E, F, Fut>(
    budget: RetryBudget,
    mut shutdown: watch::Receiver<bool>,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if is_cancelled(&shutdown) {
            return Err(RetryError::Cancelled);
        }

        attempts += 1;
        let outcome = match budget.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt()).await {
                Ok(outcome) => outcome,
                Err(_) => Attempt::retry(format!("attempt timed out after {limit:?}")),
            },
            None => attempt().await,
        };

        let reason = match outcome {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(RetryError::Fatal(err)),
            Attempt::Retry(reason) => reason,
        };

        let elapsed = started.elapsed();
        if elapsed + budget.interval >= budget.total {
            return Err(RetryError::Exhausted {
                elapsed,
                last: reason,
            });
        }

        debug!(attempt = attempts, reason = %reason, "attempt failed, retrying");

        tokio::select! {
            _ = tokio::time::sleep(budget.interval) => {}
            _ = cancelled(&mut shutdown) => return Err(RetryError::Cancelled),
        }
    }
}

/// Returns true once the shutdown signal has been raised.
pub fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves when the shutdown signal is raised.
///
/// Never resolves if the sending half is dropped without raising it.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A shutdown receiver that never fires.
pub fn never_cancelled() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Default pause between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn budget() -> RetryBudget {
        RetryBudget::constant(Duration::from_secs(10), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<u32, RetryError<String>> =
            retry(budget(), never_cancelled(), move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Attempt::retry(format!("not yet ({n})"))
                } else {
                    Attempt::Success(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), RetryError<String>> =
            retry(budget(), never_cancelled(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::Fatal("bad image".to_string())
            })
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(ref e)) if e == "bad image"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_last_reason() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();

        let result: Result<(), RetryError<String>> =
            retry(budget(), never_cancelled(), move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Attempt::retry(format!("still booting ({n})"))
            })
            .await;

        let Err(RetryError::Exhausted { last, .. }) = result else {
            panic!("expected exhausted budget");
        };
        let n = calls.load(Ordering::SeqCst);
        assert_eq!(last, format!("still booting ({n})"));
        assert!(started.elapsed() <= Duration::from_secs(10));
        assert!(n >= 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_retry() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let budget = budget().with_attempt_timeout(Duration::from_secs(2));

        let result: Result<(), RetryError<String>> = retry(budget, never_cancelled(), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Attempt::Success(())
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_interval_stops_attempts() {
        let (tx, rx) = watch::channel(false);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = tx.send(true);
        });

        let result: Result<(), RetryError<String>> = retry(budget(), rx, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Attempt::retry("waiting")
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result: Result<(), RetryError<String>> =
            retry(budget(), rx, || async { Attempt::Success(()) }).await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
