//! Bounded retry around whole transfer attempts.
//!
//! Every attempt targets the same destination, so later attempts pick up
//! the partial file left by earlier ones instead of starting over.

use crate::error::{Error, Result};

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often and how patiently to retry a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same policy with a different attempt budget.
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }
}

/// Runs `op` until it succeeds, fails definitively, is canceled, or the
/// attempt budget is spent.
///
/// `op` receives the 1-based attempt number. Cancellation, observed either
/// as [`Error::Canceled`] or through `cancel` during the pause between
/// attempts, returns immediately. Errors for which
/// [`Error::is_retryable`] is false are returned without another attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if err.is_cancellation() {
            return Err(err);
        }
        if !err.is_retryable() {
            debug!("Attempt {} failed permanently: {}", attempt, err);
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!("Giving up after {} attempts: {}", attempt, err);
            return Err(err);
        }

        warn!(
            "Attempt {}/{} failed: {}; retrying in {:?}",
            attempt, max_attempts, err, policy.delay
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}
