//! Schedulable time source for the polling engine

use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;

/// Monotonic clock with a suspending sleep
///
/// `now` is measured from an arbitrary origin fixed at construction.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);

    /// Sleep for a random duration in `[min_ms, max_ms]`
    async fn pause_between(&self, min_ms: u64, max_ms: u64) {
        let ms = if max_ms > min_ms {
            rand::rng().random_range(min_ms..=max_ms)
        } else {
            min_ms
        };
        self.sleep(Duration::from_millis(ms)).await;
    }
}

/// Wall-clock time through tokio
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for tests: `sleep` returns immediately after advancing time
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.sleep(Duration::from_secs(2)).await;
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.now(), Duration::from_millis(2500));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_pause_between_stays_in_bounds() {
        let clock = ManualClock::new();
        for _ in 0..20 {
            clock.pause_between(300, 500).await;
        }
        for slept in clock.sleeps() {
            assert!(slept >= Duration::from_millis(300));
            assert!(slept <= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_pause_between_degenerate_range() {
        let clock = ManualClock::new();
        clock.pause_between(700, 100).await;
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(700)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_measures_sleep() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_secs(5)).await;
        assert!(clock.now() >= Duration::from_secs(5));
    }
}
