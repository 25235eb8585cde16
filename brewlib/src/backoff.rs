//! NACK-driven backpressure.
//!
//! Every NACK from the peer pushes back the earliest time the next
//! gated command may go out. Bursts of NACKs back off further, up to
//! a cap. This is purely statistical: which command was refused does
//! not matter, and nothing is retried.

use crate::time::{self, Duration, Instant};

/// Tuning for [Backoff].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BackoffConfig {
    /// NACKs closer together than this count as one burst.
    pub window: Duration,
    /// A burst longer than this is reported as an overload.
    pub overload_threshold: u32,
    /// Backoff added per NACK in the current burst.
    pub step: Duration,
    /// Longest single backoff.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            window: Duration::millis(5000),
            overload_threshold: 10,
            step: Duration::millis(100),
            max: Duration::millis(500),
        }
    }
}

/// What a single NACK did to the backoff state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NackUpdate {
    /// How long gated sends are now held off.
    pub backoff: Duration,
    /// The burst went over the threshold. The count starts over after
    /// this, so it is reported once per overrun.
    pub overloaded: bool,
}

/// Backpressure state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Backoff {
    config: BackoffConfig,
    nack_count: u32,
    last_nack: Option<Instant>,
    backoff_until: Option<Instant>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            nack_count: 0,
            last_nack: None,
            backoff_until: None,
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    pub fn nack_count(&self) -> u32 {
        self.nack_count
    }

    pub fn last_nack(&self) -> Option<Instant> {
        self.last_nack
    }

    pub fn backoff_until(&self) -> Option<Instant> {
        self.backoff_until
    }

    /// Record a NACK received at `now`.
    pub fn on_nack(&mut self, now: Instant) -> NackUpdate {
        let mut overloaded = false;

        match self.last_nack {
            Some(last) if time::since(now, last) < self.config.window => {
                self.nack_count = self.nack_count.saturating_add(1);
                if self.nack_count > self.config.overload_threshold {
                    overloaded = true;
                    self.nack_count = 0;
                }
            }
            // first ever, or the burst has gone quiet
            _ => self.nack_count = 1,
        }
        self.last_nack = Some(now);

        let backoff = Duration::from_ticks(
            self.config
                .step
                .ticks()
                .saturating_mul(u64::from(self.nack_count)),
        )
        .min(self.config.max);
        self.backoff_until = Some(now + backoff);

        NackUpdate {
            backoff,
            overloaded,
        }
    }

    /// How much longer gated sends must wait, if at all. Clears the
    /// deadline once it has passed.
    pub fn remaining(&mut self, now: Instant) -> Option<Duration> {
        let until = self.backoff_until?;
        if now < until {
            return Some(time::since(until, now));
        }
        self.backoff_until = None;
        None
    }

    /// Forget all NACK history.
    pub fn reset(&mut self) {
        self.nack_count = 0;
        self.last_nack = None;
        self.backoff_until = None;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
