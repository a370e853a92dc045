//! Reconnect delay policy for the stream monitor
//!
//! Delays double from `initial` up to `max`. A successful subscription
//! resets the sequence.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next connect attempt; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Delay the next call to `next_delay` will return
    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut ReconnectBackoff, n: usize) -> Vec<u64> {
        (0..n).map(|_| backoff.next_delay().as_secs()).collect()
    }

    #[test]
    fn test_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::default();
        assert_eq!(secs(&mut backoff, 7), vec![5, 10, 20, 40, 60, 60, 60]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = ReconnectBackoff::default();
        secs(&mut backoff, 4);
        backoff.reset();
        assert_eq!(backoff.peek(), Duration::from_secs(5));
        assert_eq!(secs(&mut backoff, 2), vec![5, 10]);
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(90), Duration::from_secs(60));
        assert_eq!(secs(&mut backoff, 2), vec![60, 60]);
    }
}
