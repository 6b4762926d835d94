//! Bounded retry with per-attempt deadlines.
//!
//! Every remote call goes through [`RetryPolicy::run`]. Each attempt runs
//! under a deadline; an elapsed deadline counts as a transient failure. The
//! loop stops as soon as the predicate classifies an error as terminal, the
//! attempts run out, or the caller cancels.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kubelink_core::{KubelinkError, Result};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::SessionConfig;

/// Classifies an error as retryable (`true`) or terminal (`false`).
pub type RetryPredicate = Arc<dyn Fn(&KubelinkError) -> bool + Send + Sync>;

/// The default predicate: retry everything except not-found conditions and
/// terminal kinds.
#[must_use]
pub fn default_is_retryable(err: &KubelinkError) -> bool {
    !err.is_terminal() && !err.is_not_found()
}

/// Attempt limit, backoff schedule and retry predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Vec<Duration>,
    is_retryable: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy with the default predicate.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            is_retryable: Arc::new(default_is_retryable),
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Vec::new())
    }

    /// Build the policy described by a session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_attempts, config.backoff())
    }

    /// Replace the retry predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&KubelinkError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    /// Maximum attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry following attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }

    /// Returns true if `err` should be retried. Cancellation never is.
    #[must_use]
    pub fn is_retryable(&self, err: &KubelinkError) -> bool {
        !err.is_cancelled() && (self.is_retryable)(err)
    }

    /// Run `call` until it succeeds, fails terminally, exhausts the attempt
    /// limit, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// - the terminal error as returned by `call`
    /// - [`KubelinkError::RetriesExhausted`] carrying the last cause
    /// - [`KubelinkError::Cancelled`] if the caller cancelled, even mid-attempt
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        deadline: Duration,
        cancel: &CancelToken,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cancelled = || KubelinkError::Cancelled {
            operation: operation.to_string(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                outcome = tokio::time::timeout(deadline, call()) => outcome,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => KubelinkError::transient(format!(
                    "{operation} timed out after {}s",
                    deadline.as_secs()
                )),
            };

            if !self.is_retryable(&err) {
                debug!(operation, attempt, error = %err, "Operation failed terminally");
                return Err(err);
            }

            if attempt >= self.max_attempts {
                warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
                return Err(KubelinkError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let delay = self.backoff_for(attempt);
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying after transient failure"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
