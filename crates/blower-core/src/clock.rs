//! Monotonic tick source and absolute-deadline delays
//!
//! The acquisition loop and the metrics store never read wall-clock time.
//! Everything time-based (init backoff, the calibration window, the sample
//! period) is measured against a [`Clock`], so the same code runs on the
//! embassy time driver in firmware and on a hand-stepped clock in tests.

use core::future::Future;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_time::{Instant, Timer};

/// Source of monotonic time plus a "sleep until" primitive.
pub trait Clock {
    /// Current monotonic tick.
    fn now(&self) -> Instant;

    /// Resolve once `deadline` has been reached. Returns immediately if the
    /// deadline is already in the past.
    fn delay_until(&self, deadline: Instant) -> impl Future<Output = ()>;
}

/// Clock backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    async fn delay_until(&self, deadline: Instant) {
        Timer::at(deadline).await
    }
}

/// Manually stepped clock with millisecond resolution.
///
/// `delay_until` never waits; it jumps the clock forward to the deadline.
/// Useful for tests and for replaying a run faster than real time.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU32,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            millis: AtomicU32::new(0),
        }
    }

    pub fn set_millis(&self, millis: u32) {
        self.millis.store(millis, Ordering::Release);
    }

    pub fn advance_millis(&self, millis: u32) {
        self.millis.fetch_add(millis, Ordering::AcqRel);
    }

    pub fn millis(&self) -> u32 {
        self.millis.load(Ordering::Acquire)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_millis(u64::from(self.millis()))
    }

    async fn delay_until(&self, deadline: Instant) {
        let target = u32::try_from(deadline.as_millis()).unwrap_or(u32::MAX);
        self.millis.fetch_max(target, Ordering::AcqRel);
    }
}
