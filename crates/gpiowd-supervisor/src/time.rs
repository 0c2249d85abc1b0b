//! Time sources used by the supervisor.
//!
//! Elapsed time is tracked at whole-second granularity. Waits are plain
//! blocking delays executed on the caller's thread.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic seconds counter.
pub trait MonotonicClock: Send + Sync {
    /// Seconds since an arbitrary, fixed epoch. Never decreases.
    fn now_secs(&self) -> u64;
}

/// Blocking delay.
pub trait Delay: Send + Sync {
    /// Block the calling thread for `duration`.
    fn delay(&self, duration: Duration);
}

/// Monotonic clock backed by [`Instant`], with its epoch at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose epoch is now.
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

impl MonotonicClock for SystemClock {
    fn now_secs(&self) -> u64 {
        self.origin.elapsed().as_secs()
    }
}

/// Delay implemented with [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock and delay pair handed to the supervisor at activation.
#[derive(Clone)]
pub struct Timebase {
    clock: Arc<dyn MonotonicClock>,
    delay: Arc<dyn Delay>,
}

impl Timebase {
    /// Build a timebase from explicit parts.
    #[must_use]
    pub fn new(clock: Arc<dyn MonotonicClock>, delay: Arc<dyn Delay>) -> Self {
        Self { clock, delay }
    }

    /// Wall-time timebase: [`SystemClock`] and [`ThreadDelay`].
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock::new()), Arc::new(ThreadDelay))
    }

    /// Current clock reading in seconds.
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.clock.now_secs()
    }

    /// Block for `duration`.
    pub fn delay(&self, duration: Duration) {
        self.delay.delay(duration);
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timebase")
            .field("now_secs", &self.clock.now_secs())
            .finish_non_exhaustive()
    }
}
