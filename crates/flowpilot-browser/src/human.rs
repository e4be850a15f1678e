//! Randomized timing that makes page interaction look less scripted

use flowpilot_core::HumanDelay;
use rand::Rng;
use std::time::Duration;

/// Random integer in `[min, max]`; `min` when the range is empty
pub fn rand_between(min: u64, max: u64) -> u64 {
    if max > min {
        rand::rng().random_range(min..=max)
    } else {
        min
    }
}

/// Pause and keystroke timing drawn from the configured bounds
#[derive(Debug, Clone)]
pub struct Human {
    delay: HumanDelay,
}

impl Human {
    pub fn new(delay: HumanDelay) -> Self {
        Self { delay }
    }

    /// Sleep for a random duration in `[min_ms, max_ms]`
    pub async fn pause(&self, min_ms: u64, max_ms: u64) {
        tokio::time::sleep(Duration::from_millis(rand_between(min_ms, max_ms))).await;
    }

    /// The default short pause between actions
    pub async fn beat(&self) {
        tokio::time::sleep(self.beat_delay()).await;
    }

    /// Length of the next [`Human::beat`], within the configured bounds
    pub fn beat_delay(&self) -> Duration {
        Duration::from_millis(rand_between(
            self.delay.min_delay_ms,
            self.delay.max_delay_ms,
        ))
    }

    /// Hesitation before pressing the mouse button
    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(rand_between(80, 160))
    }

    /// Gap after one typed character
    pub fn keystroke_delay(&self) -> Duration {
        let max = self.delay.type_delay_ms.max(1);
        Duration::from_millis(rand_between(max.min(40), max))
    }
}

impl Default for Human {
    fn default() -> Self {
        Self::new(HumanDelay::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_between_bounds() {
        for _ in 0..100 {
            let v = rand_between(300, 600);
            assert!((300..=600).contains(&v));
        }
        assert_eq!(rand_between(500, 500), 500);
        assert_eq!(rand_between(900, 100), 900);
    }

    #[test]
    fn test_keystroke_delay_respects_config() {
        let human = Human::new(HumanDelay {
            type_delay_ms: 60,
            ..HumanDelay::default()
        });
        for _ in 0..50 {
            let d = human.keystroke_delay();
            assert!(d >= Duration::from_millis(40) && d <= Duration::from_millis(60));
        }

        let fast = Human::new(HumanDelay {
            type_delay_ms: 10,
            ..HumanDelay::default()
        });
        assert_eq!(fast.keystroke_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_beat_uses_configured_bounds() {
        let human = Human::new(HumanDelay {
            min_delay_ms: 120,
            max_delay_ms: 320,
            ..HumanDelay::default()
        });
        for _ in 0..50 {
            let d = human.beat_delay();
            assert!(d >= Duration::from_millis(120) && d <= Duration::from_millis(320));
        }

        let fixed = Human::new(HumanDelay {
            min_delay_ms: 200,
            max_delay_ms: 200,
            ..HumanDelay::default()
        });
        assert_eq!(fixed.beat_delay(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_beat_sleeps() {
        let human = Human::new(HumanDelay {
            min_delay_ms: 5,
            max_delay_ms: 10,
            ..HumanDelay::default()
        });
        let start = std::time::Instant::now();
        human.beat().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_click_delay_range() {
        let d = Human::default().click_delay();
        assert!(d >= Duration::from_millis(80) && d <= Duration::from_millis(160));
    }
}
