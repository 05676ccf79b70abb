//! Artificial per-direction delay.
//!
//! The throttle filter sits between the socket and the framing layer and
//! holds every chunk for a configured delay before passing it onward,
//! simulating a slow device. Each direction gets its own filter; order
//! within a direction is preserved and chunks are never coalesced.

use std::time::Duration;

use tokio::time::Instant;

/// Delay filter for one pipeline direction.
///
/// A zero delay is a pass-through that never touches the timer.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    /// Create a filter with the given delay
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Whether this filter passes chunks through untouched
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.delay.is_zero()
    }

    /// Hold the current chunk for the configured delay.
    pub async fn hold(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Release a chunk that arrived at `arrival` once the delay has
    /// elapsed since then.
    ///
    /// Consecutive chunks processed by a single task pipeline correctly:
    /// each is released `delay` after its own arrival, and releases stay
    /// in arrival order.
    pub async fn hold_since(&self, arrival: Instant) {
        if !self.delay.is_zero() {
            tokio::time::sleep_until(arrival + self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hold_waits_delay() {
        let throttle = Throttle::new(Duration::from_millis(250));
        let start = Instant::now();
        throttle.hold().await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_passthrough_is_immediate() {
        let throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.is_passthrough());

        let start = Instant::now();
        throttle.hold().await;
        throttle.hold_since(Instant::now()).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_since_counts_from_arrival() {
        let throttle = Throttle::new(Duration::from_millis(100));

        let arrival = Instant::now();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // 60ms already elapsed, so only 40ms remain
        let before = Instant::now();
        throttle.hold_since(arrival).await;
        assert_eq!(before.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_chunk_released_immediately() {
        let throttle = Throttle::new(Duration::from_millis(10));

        let arrival = Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let before = Instant::now();
        throttle.hold_since(arrival).await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
