//! Millisecond monotonic time.

/// A point in time, in milliseconds since some arbitrary start.
pub type Instant = fugit::TimerInstantU64<1000>;

/// A span of time, in milliseconds.
pub type Duration = fugit::TimerDurationU64<1000>;

/// A monotonic millisecond clock.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C> Clock for &C
where
    C: Clock + ?Sized,
{
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Time elapsed from `earlier` to `now`, or zero if the clock went
/// backwards.
pub fn since(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier)
        .unwrap_or(Duration::from_ticks(0))
}

/// A [Clock] running off [std::time::Instant], which also sleeps the
/// current thread for [embedded_hal::delay::DelayNs].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StdClock {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.start.elapsed().as_millis() as u64)
    }
}

#[cfg(feature = "std")]
impl embedded_hal::delay::DelayNs for StdClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms.into()));
    }
}
