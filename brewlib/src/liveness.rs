//! Is the peer still talking to us?

use crate::time::{self, Duration, Instant};

/// Tracks when the last valid packet arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Liveness {
    timeout: Duration,
    last_received: Option<Instant>,
}

impl Liveness {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_ticks(2000);

    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_received: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_received(&self) -> Option<Instant> {
        self.last_received
    }

    /// A valid packet arrived at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_received = Some(now);
    }

    /// Forget the last packet, so the peer reads as disconnected until
    /// it speaks again.
    pub fn clear(&mut self) {
        self.last_received = None;
    }

    pub fn is_connected(&self, now: Instant) -> bool {
        self.last_received
            .is_some_and(|last| time::since(now, last) < self.timeout)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_ticks(ms)
    }

    #[test]
    fn never_heard_from() {
        let liveness = Liveness::default();
        assert!(!liveness.is_connected(at(0)));
        assert!(!liveness.is_connected(at(1_000_000)));
    }

    #[test]
    fn times_out() {
        let mut liveness = Liveness::default();
        liveness.record(at(0));
        assert!(liveness.is_connected(at(0)));
        assert!(liveness.is_connected(at(1999)));
        assert!(!liveness.is_connected(at(2000)));

        liveness.record(at(2500));
        assert!(liveness.is_connected(at(3000)));
    }

    #[test]
    fn clear_disconnects() {
        let mut liveness = Liveness::new(Duration::millis(500));
        liveness.record(at(10));
        liveness.clear();
        assert!(!liveness.is_connected(at(11)));
        assert_eq!(liveness.last_received(), None);
    }
}
