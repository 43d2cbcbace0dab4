//! Clock abstraction for the retry loop.
//!
//! The retry engine never calls `Instant::now` or `thread::sleep` directly;
//! it goes through a [`Clock`] so tests can drive time with a [`FakeClock`]
//! and never wait on the wall clock.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time plus a way to block for a while
pub trait Clock: Send + Sync + Debug {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fake clock for deterministic testing.
///
/// Time only moves when something sleeps on the clock or when a test calls
/// [`FakeClock::advance`]. Share it through an `Arc` so the page and the fake
/// DOM see the same time.
#[derive(Debug, Default)]
pub struct FakeClock {
    /// Current time in nanoseconds since the clock's origin
    current_nanos: AtomicU64,
    /// Number of `sleep` calls
    sleeps: AtomicUsize,
    /// Sum of all `sleep` durations in nanoseconds
    slept_nanos: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock at time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        let _ = self
            .current_nanos
            .fetch_add(duration_nanos(duration), Ordering::SeqCst);
    }

    /// Fast-forward time by milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Number of times anything slept on this clock
    #[must_use]
    pub fn sleep_count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }

    /// Total time spent sleeping on this clock
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        Duration::from_nanos(self.slept_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.current_nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        let nanos = duration_nanos(duration);
        let _ = self.sleeps.fetch_add(1, Ordering::SeqCst);
        let _ = self.slept_nanos.fetch_add(nanos, Ordering::SeqCst);
        let _ = self.current_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
