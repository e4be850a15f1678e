//! Polling loop: runs the poll state machine against a live page driver

use flowpilot_core::fail_open::fail_open;
use flowpilot_core::{FlowError, GenerationConfig, GenerationDriver, GenerationResult, Result};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::state_machine::{transition, Action, Event, Phase, PollMachine, PollParams};

/// Executes state machine actions one at a time and feeds back the outcomes
///
/// Driver calls are awaited sequentially; a probe in flight always completes
/// before the timeout is re-evaluated at the top of the next tick.
pub struct Poller<'a, D: GenerationDriver + ?Sized, C: Clock + ?Sized> {
    driver: &'a D,
    clock: &'a C,
    popup_max_attempts: usize,
}

impl<'a, D: GenerationDriver + ?Sized, C: Clock + ?Sized> Poller<'a, D, C> {
    pub fn new(driver: &'a D, clock: &'a C, config: &GenerationConfig) -> Self {
        Self {
            driver,
            clock,
            popup_max_attempts: config.popup_max_attempts,
        }
    }

    /// Wait for the submission described by `params` to produce its results
    pub async fn run(&self, params: &PollParams) -> Result<GenerationResult> {
        let start = self.clock.now();
        let (mut machine, first) = PollMachine::start();
        let mut action = Some(first);
        let mut last_logged: Option<usize> = None;

        while let Some(current) = action {
            let event = match current {
                Action::NextTick { delay } => {
                    if !delay.is_zero() {
                        self.clock.sleep(delay).await;
                    }
                    Event::TickStarted {
                        elapsed: self.clock.now().saturating_sub(start),
                    }
                }
                Action::DismissPopups => {
                    let count = fail_open("dismiss_popups", || {
                        self.driver.dismiss_popups(self.popup_max_attempts)
                    })
                    .await
                    .unwrap_or(0);
                    if count > 0 {
                        info!("Dismissed {} popup(s) while polling", count);
                    }
                    Event::PopupsDismissed { count }
                }
                Action::CheckBackendBroken => Event::BrokenChecked {
                    label: self.driver.detect_backend_error().await?,
                },
                Action::CheckGenerationFailed => {
                    let failed = match self.driver.is_generation_failed().await {
                        Ok(failed) => failed,
                        Err(e) => {
                            debug!("Failed-generation probe errored, treating as absent: {}", e);
                            false
                        }
                    };
                    Event::FailedChecked { failed }
                }
                Action::ReadSnapshot => {
                    let snapshot = self.driver.read_snapshot().await?;
                    if last_logged != Some(snapshot.len()) {
                        let elapsed = self.clock.now().saturating_sub(start);
                        info!(
                            "Waiting for generation: {}/{} results ({}s)",
                            snapshot.len(),
                            params.expected_count,
                            elapsed.as_secs()
                        );
                        last_logged = Some(snapshot.len());
                    }
                    Event::SnapshotRead { snapshot }
                }
                Action::Cooldown(duration) => {
                    self.clock.sleep(duration).await;
                    Event::CooldownElapsed
                }
                Action::RetryGeneration => {
                    let dispatched = self.driver.retry_generation().await?;
                    if dispatched {
                        info!("Retry dispatched, waiting for generation");
                        last_logged = None;
                    } else {
                        warn!("Retry could not be dispatched, continuing to poll");
                    }
                    Event::RetryDispatched { dispatched }
                }
            };

            let (next, next_action) = transition(params, machine, event);
            machine = next;
            action = next_action;

            if let Some(Action::Cooldown(duration)) = &action {
                warn!(
                    "Generation failed, retrying in {:?} ({}/{})",
                    duration, machine.state.retry_count, params.max_retries
                );
            }
        }

        self.finish(machine.phase).await
    }

    async fn finish(&self, phase: Phase) -> Result<GenerationResult> {
        match &phase {
            Phase::Success { urls } => info!("Generation complete: {} results", urls.len()),
            Phase::Timeout { urls } => {
                warn!("Timed out waiting for generation, keeping {} results", urls.len());
                if urls.is_empty() {
                    self.save_empty_result_screenshot().await;
                }
            }
            Phase::RetryExhausted { urls } => {
                warn!(
                    "Generation kept failing, giving up with {} results",
                    urls.len()
                );
                if urls.is_empty() {
                    self.save_empty_result_screenshot().await;
                }
            }
            Phase::NeedsOuterRetry { label } => warn!("Backend looks broken: {}", label),
            Phase::Invalid { reason } => {
                return Err(FlowError::InvalidTransition(reason.clone()));
            }
            Phase::Polling(stage) => debug!("Poll loop stopped while in {:?}", stage),
        }

        phase.into_result().ok_or_else(|| {
            FlowError::InvalidTransition("poll loop ended without a terminal phase".to_string())
        })
    }

    async fn save_empty_result_screenshot(&self) {
        if let Some(Some(path)) = fail_open("debug_screenshot", || {
            self.driver.capture_debug_screenshot("debug_timeout")
        })
        .await
        {
            info!("Saved debug screenshot: {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scripted::ScriptedDriver;
    use flowpilot_core::{CompletionReason, Snapshot};
    use std::time::Duration;

    fn config() -> GenerationConfig {
        GenerationConfig {
            stable_checks: 3,
            max_retries: 2,
            ..GenerationConfig::default()
        }
    }

    fn params(expected: usize, baseline: Snapshot, timeout_secs: u64) -> PollParams {
        PollParams::new(
            &config(),
            expected,
            baseline,
            Duration::from_secs(timeout_secs),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_stable_success() {
        let driver = ScriptedDriver::new().with_snapshots(vec![
            vec![],
            vec![],
            vec!["a"],
            vec!["a", "b"],
            vec!["a", "b", "c", "d"],
            vec!["a", "b", "c", "d"],
            vec!["a", "b", "c", "d"],
            vec!["late"],
        ]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(4, Snapshot::empty(), 300)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::from(vec!["a", "b", "c", "d"]),
                reason: CompletionReason::Stable,
            }
        );
        // Success on the third identical read; no later read is taken.
        assert_eq!(driver.calls().snapshot_reads, 7);
    }

    #[tokio::test]
    async fn test_timeout_returns_last_non_baseline() {
        // Tick every second, budget of 6s: reads at t=0..=5.
        let driver = ScriptedDriver::new().with_snapshots(vec![
            vec![],
            vec![],
            vec!["a"],
            vec!["a", "b"],
            vec!["a", "b", "c", "d"],
            vec!["a", "b", "c", "d"],
        ]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(4, Snapshot::empty(), 6)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::from(vec!["a", "b", "c", "d"]),
                reason: CompletionReason::TimedOut,
            }
        );
        assert_eq!(driver.calls().snapshot_reads, 6);
        assert_eq!(driver.calls().screenshots, 0);
    }

    #[tokio::test]
    async fn test_baseline_only_times_out_empty() {
        let baseline = Snapshot::from(vec!["o1", "o2", "o3", "o4"]);
        let driver = ScriptedDriver::new().with_snapshots(vec![baseline.clone()]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(4, baseline, 20)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::empty(),
                reason: CompletionReason::TimedOut,
            }
        );
        assert_eq!(driver.calls().snapshot_reads, 20);
        assert_eq!(driver.calls().screenshots, 1);
    }

    #[tokio::test]
    async fn test_broken_takes_priority_over_failed() {
        let driver = ScriptedDriver::new()
            .with_broken(vec![Some("Something went wrong")])
            .with_failed(vec![true]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(1, Snapshot::empty(), 60)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Retry {
                error: "Something went wrong".to_string()
            }
        );
        let calls = driver.calls();
        assert_eq!(calls.failed_checks, 0);
        assert_eq!(calls.retries, 0);
        assert_eq!(calls.snapshot_reads, 0);
    }

    #[tokio::test]
    async fn test_broken_probe_cadence() {
        // Broken probe at t=0 and t=2 only; detected on the second probe.
        let driver = ScriptedDriver::new().with_broken(vec![None, Some("An error occurred")]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(1, Snapshot::empty(), 60)).await.unwrap();

        assert!(result.needs_retry());
        let calls = driver.calls();
        assert_eq!(calls.broken_checks, 2);
        assert_eq!(calls.snapshot_reads, 2);
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_generation_retries_then_succeeds() {
        let driver = ScriptedDriver::new()
            .with_failed(vec![false, true])
            .with_snapshots(vec![vec!["x"], vec!["a"], vec!["a"], vec!["a"]]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(1, Snapshot::empty(), 600)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::from(vec!["a"]),
                reason: CompletionReason::Stable,
            }
        );
        assert_eq!(driver.calls().retries, 1);
        assert!(clock.sleeps().contains(&Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_partial() {
        let driver = ScriptedDriver::new()
            .with_failed(vec![false, true, true, true])
            .with_snapshots(vec![vec!["a"]]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(4, Snapshot::empty(), 3600)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::from(vec!["a"]),
                reason: CompletionReason::RetriesExhausted,
            }
        );
        // max_retries = 2: the third banner gives up without a third retry.
        assert_eq!(driver.calls().retries, 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_without_results_saves_screenshot() {
        let driver = ScriptedDriver::new().with_failed(vec![true, true, true]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(4, Snapshot::empty(), 3600)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::empty(),
                reason: CompletionReason::RetriesExhausted,
            }
        );
        assert_eq!(driver.calls().screenshots, 1);
    }

    #[tokio::test]
    async fn test_failed_probe_error_keeps_polling() {
        let driver = ScriptedDriver::new()
            .with_failed(vec![false])
            .with_failed_probe_error("JavaScript evaluation failed: timeout")
            .with_snapshots(vec![vec!["a"]]);
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        let result = poller.run(&params(1, Snapshot::empty(), 300)).await.unwrap();

        assert_eq!(
            result,
            GenerationResult::Finished {
                urls: Snapshot::from(vec!["a"]),
                reason: CompletionReason::Stable,
            }
        );
        assert_eq!(driver.calls().retries, 0);
    }

    #[tokio::test]
    async fn test_popups_swept_every_thirty_seconds() {
        let driver = ScriptedDriver::new();
        let clock = ManualClock::new();
        let poller = Poller::new(&driver, &clock, &config());

        poller.run(&params(1, Snapshot::empty(), 61)).await.unwrap();

        // t = 0, 30, 60
        assert_eq!(driver.calls().popup_sweeps, 3);
    }
}
