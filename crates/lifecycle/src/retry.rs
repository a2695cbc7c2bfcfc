//! Retry logic with exponential backoff for transient provider errors.
//!
//! A failed create is cleaned up (deleted) before it is retried. The cleanup
//! has its own attempt counter and is retried with the same backoff and the
//! same limit. Only errors whose category is retryable (`ResourceInError`)
//! are retried; anything else is final immediately.
//!
//! When every attempt is exhausted the *first* failure is returned, since
//! that is the one that explains why the resource could not be created.

use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Backoff
// ============================================================================

/// Delay before retry number `attempt` (1-indexed).
pub trait BackoffStrategy: Send + Sync {
    fn delay(&self, attempt: u32, jitter_max: f64) -> Duration;
}

/// `2^attempt * scale + uniform(0, jitter_max)` seconds
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub scale: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32, jitter_max: f64) -> Duration {
        let exp = 2f64.powi(attempt.min(30) as i32) * self.scale;
        let jitter = if jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_max)
        } else {
            0.0
        };
        Duration::from_secs_f64((exp + jitter).max(0.0))
    }
}

/// Same delay before every retry
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl BackoffStrategy for FixedDelay {
    fn delay(&self, _attempt: u32, _jitter_max: f64) -> Duration {
        self.0
    }
}

/// Retry without waiting
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl BackoffStrategy for NoDelay {
    fn delay(&self, _attempt: u32, _jitter_max: f64) -> Duration {
        Duration::ZERO
    }
}

// ============================================================================
// Policy and Callbacks
// ============================================================================

/// Bounds of a retry run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed per phase after the first failure (0 = none)
    pub retry_limit: u32,
    pub jitter_max: f64,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, jitter_max: f64) -> Self {
        Self {
            retry_limit,
            jitter_max,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(0, 0.0)
    }
}

/// Which half of a create-with-cleanup cycle is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The action itself
    Primary,
    /// Deleting what a failed primary attempt left behind
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called when a retryable attempt failed.
    ///
    /// # Arguments
    /// * `phase` - Phase of the failed attempt
    /// * `failures` - Failures of this phase so far (1-indexed)
    /// * `retry_limit` - Retries allowed per phase
    /// * `error` - The error that triggered the retry
    fn on_retry(&self, phase: Phase, failures: u32, retry_limit: u32, error: &Error);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _phase: Phase, _failures: u32, _retry_limit: u32, _error: &Error) {}
}

/// Callback that reports retries through the log.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, phase: Phase, failures: u32, retry_limit: u32, error: &Error) {
        log::warn!("{phase} attempt failed ({failures}/{}): {error}", retry_limit + 1);
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Something that can be attempted repeatedly.
#[async_trait]
pub trait RetryTarget: Send {
    /// Run one attempt of `phase`.
    async fn attempt(&mut self, phase: Phase) -> Result<()>;
}

/// Execute `target` with retry logic.
///
/// With `cleanup` set, every retryable primary failure is followed by
/// cleanup attempts until one succeeds, then the primary is retried. Each
/// phase sleeps `backoff.delay(n, jitter_max)` before its n-th retry.
///
/// # Returns
/// `Ok` once a primary attempt succeeds; the first non-retryable error
/// as soon as it occurs; otherwise the first failure once a phase has used
/// up its retries.
pub async fn run_with_retry(
    policy: &RetryPolicy,
    backoff: &dyn BackoffStrategy,
    callback: &dyn RetryCallback,
    cleanup: bool,
    target: &mut dyn RetryTarget,
) -> Result<()> {
    let mut primary_failures = 0u32;
    let mut cleanup_failures = 0u32;
    let mut phase = Phase::Primary;
    let mut first_failure: Option<Error> = None;

    while primary_failures <= policy.retry_limit && cleanup_failures <= policy.retry_limit {
        let count = match phase {
            Phase::Primary => primary_failures,
            Phase::Cleanup => cleanup_failures,
        };
        if count > 0 {
            let delay = backoff.delay(count, policy.jitter_max);
            log::debug!("Waiting {delay:?} before {phase} retry {count}");
            tokio::time::sleep(delay).await;
        }

        match target.attempt(phase).await {
            Ok(()) => match phase {
                Phase::Primary => return Ok(()),
                Phase::Cleanup => phase = Phase::Primary,
            },
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                match phase {
                    Phase::Primary => {
                        primary_failures += 1;
                        callback.on_retry(phase, primary_failures, policy.retry_limit, &e);
                        if cleanup {
                            phase = Phase::Cleanup;
                            cleanup_failures = 0;
                        }
                    }
                    Phase::Cleanup => {
                        cleanup_failures += 1;
                        callback.on_retry(phase, cleanup_failures, policy.retry_limit, &e);
                    }
                }
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
    }

    Err(first_failure.unwrap_or_else(|| Error::provider("retry exhausted")))
}
