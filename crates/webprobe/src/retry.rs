//! Retry engine: bounded polling for eventually-consistent UI state.
//!
//! The loop checks immediately, then sleeps and re-checks until the resolver
//! reports success or the deadline passes:
//!
//! ```text
//!   PENDING ──► attempt ──ready──► RESOLVED
//!                 │  ▲
//!          pending│  │ sleep(min(interval, remaining))
//!                 ▼  │
//!          elapsed >= timeout ──► FAILED (Timeout)
//! ```
//!
//! Stale references are absorbed as failed attempts. Every other error ends
//! the loop at once.

use crate::clock::Clock;
use crate::result::{Observation, WebprobeError, WebprobeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for a terminal operation (10 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Shortest pause between attempts; keeps a zero interval from spinning a
/// clock that only moves when slept on
const MIN_PAUSE: Duration = Duration::from_millis(1);

/// How the pause between attempts evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Always wait `poll_interval`
    #[default]
    Fixed,
    /// Multiply the pause by `factor` after each failed attempt, up to
    /// `max_interval_ms`
    Exponential {
        /// Growth factor
        factor: u32,
        /// Upper bound on a single pause
        max_interval_ms: u64,
    },
}

/// Timeout and polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total time budget
    pub timeout: Duration,
    /// Pause after the first failed attempt
    pub poll_interval: Duration,
    /// Growth of the pause
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given timeout and the default interval
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff: Backoff::Fixed,
        }
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the backoff
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Short timeout, fast polling
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            backoff: Backoff::Fixed,
        }
    }

    /// Long timeout, slower polling
    #[must_use]
    pub const fn slow() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            backoff: Backoff::Fixed,
        }
    }

    /// Pause to take after `failed` consecutive failed attempts (1-based)
    #[must_use]
    pub fn interval_after(&self, failed: usize) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.poll_interval,
            Backoff::Exponential {
                factor,
                max_interval_ms,
            } => {
                let max = Duration::from_millis(max_interval_ms);
                let exp = u32::try_from(failed.saturating_sub(1)).unwrap_or(u32::MAX);
                factor
                    .checked_pow(exp)
                    .and_then(|m| self.poll_interval.checked_mul(m))
                    .map_or(max, |d| d.min(max))
            }
        }
    }
}

/// Outcome of one resolution attempt
#[derive(Debug)]
pub enum Attempt<T> {
    /// Expectation holds; carry the resolved value out of the loop
    Ready(T),
    /// Not yet; remember what was seen for the timeout diagnostic
    Pending(Observation),
}

/// A successful run of the engine
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    /// Value produced by the satisfying attempt
    pub value: T,
    /// Number of attempts, including the satisfying one
    pub attempts: usize,
    /// Time spent, measured on the engine's clock
    pub elapsed: Duration,
}

/// Bounded polling loop over an injectable clock
#[derive(Debug, Clone, Copy)]
pub struct RetryEngine<'c> {
    policy: RetryPolicy,
    clock: &'c dyn Clock,
}

impl<'c> RetryEngine<'c> {
    /// Create an engine
    #[must_use]
    pub fn new(policy: RetryPolicy, clock: &'c dyn Clock) -> Self {
        Self { policy, clock }
    }

    /// The engine's policy
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Re-run `resolve` until it is ready or the deadline passes.
    ///
    /// The first attempt happens before any sleep. The loop only gives up
    /// once `timeout` has elapsed, and the last pause is clamped to the
    /// remaining budget, so it never blocks longer than `timeout` plus the
    /// duration of the final attempt.
    ///
    /// # Errors
    ///
    /// [`WebprobeError::Timeout`] when the deadline passes, or any
    /// non-transient error returned by `resolve`.
    pub fn run<T, F>(&self, description: &str, mut resolve: F) -> WebprobeResult<Resolved<T>>
    where
        F: FnMut() -> WebprobeResult<Attempt<T>>,
    {
        let start = self.clock.now();
        let mut attempts = 0;
        let mut last = Observation::empty();

        loop {
            attempts += 1;

            match resolve() {
                Ok(Attempt::Ready(value)) => {
                    let elapsed = self.clock.now().saturating_sub(start);
                    debug!(target: "webprobe::retry", %description, attempts, ?elapsed, "resolved");
                    return Ok(Resolved {
                        value,
                        attempts,
                        elapsed,
                    });
                }
                Ok(Attempt::Pending(observed)) => {
                    debug!(target: "webprobe::retry", %description, attempts, %observed, "not yet");
                    last = observed;
                }
                Err(err) if err.is_transient() => {
                    debug!(target: "webprobe::retry", %description, attempts, %err, "transient fault absorbed");
                    last = last.with_stale(err.to_string());
                }
                Err(err) => return Err(err),
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= self.policy.timeout {
                warn!(target: "webprobe::retry", %description, attempts, ?elapsed, %last, "timed out");
                return Err(WebprobeError::Timeout {
                    locator: description.to_string(),
                    elapsed,
                    attempts,
                    observed: last,
                });
            }

            let remaining = self.policy.timeout - elapsed;
            let pause = self
                .policy
                .interval_after(attempts)
                .max(MIN_PAUSE)
                .min(remaining);
            self.clock.sleep(pause);
        }
    }
}
