//! Retry delay policy with exponential backoff
//!
//! Pure arithmetic: the delay starts at [`MIN_RETRY`], doubles on each
//! consecutive failure and saturates at [`MAX_RETRY`]. A successful
//! connection resets it to [`MIN_RETRY`].

use std::time::Duration;

/// First retry delay after a failure
pub const MIN_RETRY: Duration = Duration::from_millis(1000);

/// Upper bound for the retry delay
pub const MAX_RETRY: Duration = Duration::from_millis(60_000);

/// Growth factor applied on each consecutive failure
pub const MULTIPLIER: u32 = 2;

/// Exponential backoff state
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { current: MIN_RETRY }
    }

    /// Return the delay to apply before the next attempt and advance
    /// the policy: `next = min(MAX_RETRY, current * MULTIPLIER)`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (delay * MULTIPLIER).min(MAX_RETRY);
        delay
    }

    /// Reset to [`MIN_RETRY`] after a successful connection
    pub fn reset(&mut self) {
        self.current = MIN_RETRY;
    }

    /// Current delay without advancing
    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_cap() {
        let mut backoff = Backoff::new();
        let mut expected = 1000u64;
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(expected));
            expected = (expected * 2).min(60_000);
        }
        // Saturated: stays at the cap forever
        assert_eq!(backoff.next_delay(), MAX_RETRY);
        assert_eq!(backoff.next_delay(), MAX_RETRY);
    }

    #[test]
    fn test_sequence_matches_min_times_power_of_two() {
        let mut backoff = Backoff::new();
        for i in 0..20u32 {
            let expected = MIN_RETRY
                .saturating_mul(MULTIPLIER.saturating_pow(i).min(60))
                .min(MAX_RETRY);
            assert_eq!(backoff.next_delay(), expected, "attempt {i}");
        }
    }

    #[test]
    fn test_reset_returns_to_min() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.current() > MIN_RETRY);
        backoff.reset();
        assert_eq!(backoff.current(), MIN_RETRY);
        assert_eq!(backoff.next_delay(), MIN_RETRY);
    }

    #[test]
    fn test_delay_always_within_bounds() {
        let mut backoff = Backoff::new();
        for _ in 0..100 {
            let d = backoff.next_delay();
            assert!(d >= MIN_RETRY && d <= MAX_RETRY);
        }
    }
}
