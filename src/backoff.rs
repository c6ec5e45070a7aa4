//! Delays for contended retry loops.
//!
//! All delays are measured in microseconds.
//! A [`Backoff`] never fails and is purely local to the calling unit.

use core::hint;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Backoff
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A bounded delay generator.
///
/// Each `delay_*` method first clamps the current delay to the maximum,
/// sleeps, then grows the current delay as long as the result stays within
/// the maximum.
/// The returned value is the delay that was actually used.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: u64,
    max: u64,
}

/********** impl inherent *************************************************************************/

impl Backoff {
    /// Creates a new `Backoff` starting at `initial` microseconds, never
    /// exceeding `max` microseconds.
    #[inline]
    pub fn new(initial: u64, max: u64) -> Self {
        Self { current: initial, max }
    }

    #[inline]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max)
    }

    /// Returns the current delay in microseconds.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Sleeps for a uniformly random duration in `[0, current]`, then doubles
    /// the current delay.
    #[inline]
    pub fn delay_exponential(&mut self) -> u64 {
        self.clamp();
        let delay = rand::thread_rng().gen_range(0..=self.current);
        sleep_micros(delay);
        self.double();
        delay
    }

    /// Sleeps for exactly the current delay, then doubles it.
    #[inline]
    pub fn delay_linear(&mut self) -> u64 {
        self.clamp();
        let delay = self.current;
        sleep_micros(delay);
        self.double();
        delay
    }

    /// Sleeps for exactly the current delay, then increments it by one.
    #[inline]
    pub fn delay_increment(&mut self) -> u64 {
        self.clamp();
        let delay = self.current;
        sleep_micros(delay);
        if self.current < self.max {
            self.current += 1;
        }
        delay
    }

    #[inline]
    fn clamp(&mut self) {
        if self.current > self.max {
            self.current = self.max;
        }
    }

    #[inline]
    fn double(&mut self) {
        match self.current.checked_mul(2) {
            Some(doubled) if doubled <= self.max => self.current = doubled,
            _ => {}
        }
    }
}

impl Default for Backoff {
    #[inline]
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Spin
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Busy-polling helper for loops waiting on a remote flag.
///
/// Spins for a bounded number of iterations before it starts yielding the
/// thread, so that units which share a core still make progress.
#[derive(Debug, Default)]
pub(crate) struct Spin {
    step: u32,
}

impl Spin {
    const SPIN_LIMIT: u32 = 6;

    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    pub fn spin(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1 << self.step) {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }
}

#[inline]
pub(crate) fn sleep_micros(micros: u64) {
    if micros == 0 {
        hint::spin_loop();
    } else {
        thread::sleep(Duration::from_micros(micros));
    }
}

#[cfg(test)]
mod tests {
    use super::Backoff;

    #[test]
    fn linear_doubles_until_max() {
        let mut backoff = Backoff::new(1, 6);
        assert_eq!(backoff.delay_linear(), 1);
        assert_eq!(backoff.delay_linear(), 2);
        assert_eq!(backoff.delay_linear(), 4);
        // 8 would exceed the maximum
        assert_eq!(backoff.delay_linear(), 4);
        assert_eq!(backoff.current(), 4);
    }

    #[test]
    fn increment_stops_at_max() {
        let mut backoff = Backoff::new(2, 3);
        assert_eq!(backoff.delay_increment(), 2);
        assert_eq!(backoff.delay_increment(), 3);
        assert_eq!(backoff.delay_increment(), 3);
    }

    #[test]
    fn initial_above_max_is_clamped() {
        let mut backoff = Backoff::new(100, 8);
        assert_eq!(backoff.delay_linear(), 8);
        assert_eq!(backoff.current(), 8);
    }

    #[test]
    fn exponential_stays_in_range() {
        let mut backoff = Backoff::new(1, 16);
        for _ in 0..8 {
            let bound = backoff.current();
            let delay = backoff.delay_exponential();
            assert!(delay <= bound);
        }
        assert_eq!(backoff.current(), 16);
    }

    #[test]
    fn zero_delay() {
        let mut backoff = Backoff::new(0, 0);
        assert_eq!(backoff.delay_linear(), 0);
        assert_eq!(backoff.delay_exponential(), 0);
        assert_eq!(backoff.delay_increment(), 0);
    }
}
