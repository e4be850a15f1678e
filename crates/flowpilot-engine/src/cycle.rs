//! Outer retry wrapper: submit, poll, and restart after a broken backend
//!
//! The in-loop retry counter lives in each poll loop's own state and dies
//! with it. The attempt counter here is the only state that survives across
//! submissions, and it is the only budget that guards the destructive
//! cache-clear-and-reload.

use flowpilot_core::fail_open::fail_open;
use flowpilot_core::{
    BackendErrorMatcher, CompletionReason, FlowError, GenerationConfig, GenerationDriver,
    GenerationResult, Result, Snapshot,
};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::poller::Poller;
use crate::state_machine::PollParams;

/// Final output of one logical "generate" call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub urls: Snapshot,
    pub reason: CompletionReason,
    /// Full submissions made, the successful one included
    pub attempts: u32,
}

/// Runs whole generation cycles against a page driver
pub struct GenerationCycle<'a, D: GenerationDriver + ?Sized, C: Clock + ?Sized> {
    driver: &'a D,
    clock: &'a C,
    config: &'a GenerationConfig,
    matcher: BackendErrorMatcher,
}

impl<'a, D: GenerationDriver + ?Sized, C: Clock + ?Sized> GenerationCycle<'a, D, C> {
    pub fn new(driver: &'a D, clock: &'a C, config: &'a GenerationConfig) -> Result<Self> {
        Ok(Self {
            driver,
            clock,
            config,
            matcher: config.error_matcher()?,
        })
    }

    /// Submit and wait for `expected_count` new results
    ///
    /// Soft failures (timeout, exhausted in-place retries) return whatever
    /// new results were seen. A backend that stays broken for
    /// `max_cache_retries` submissions is a fatal [`FlowError::BackendBroken`].
    pub async fn run(&self, expected_count: usize, timeout: Duration) -> Result<GenerationOutput> {
        let mut attempts: u32 = 0;

        loop {
            let label = match self.attempt(expected_count, timeout).await? {
                GenerationResult::Finished { urls, reason } => {
                    return Ok(GenerationOutput {
                        urls,
                        reason,
                        attempts: attempts + 1,
                    });
                }
                GenerationResult::Retry { error } => error,
            };

            attempts += 1;
            if attempts >= self.config.max_cache_retries {
                error!(
                    "Backend still broken after {} attempts: {}",
                    attempts, label
                );
                return Err(FlowError::BackendBroken { label, attempts });
            }

            warn!(
                "Backend reports '{}', clearing cache and retrying ({}/{})",
                label, attempts, self.config.max_cache_retries
            );
            self.recover().await?;
            info!("Restarting generation");
        }
    }

    /// One submission plus its polling loop, with fresh baseline and poll state
    async fn attempt(&self, expected_count: usize, timeout: Duration) -> Result<GenerationResult> {
        self.sweep_popups().await;

        let baseline = self.driver.take_baseline().await?;
        self.driver.submit_generation().await?;
        self.clock.pause_between(500, 800).await;

        if let Some(text) = self.driver.check_error_banner().await? {
            if self.matcher.is_match(&text) {
                warn!("Error shown right after submitting: {}", text);
                return Ok(GenerationResult::Retry {
                    error: text.trim().to_string(),
                });
            }
            warn!("Page shows an error message: {}", text);
        }

        info!("Submitted, waiting for {} results", expected_count);
        let params = PollParams::new(self.config, expected_count, baseline, timeout);
        Poller::new(self.driver, self.clock, self.config)
            .run(&params)
            .await
    }

    async fn recover(&self) -> Result<()> {
        self.driver.clear_cache_and_reload().await?;
        self.driver.wait_until_settled().await?;
        self.clock.pause_between(1500, 2000).await;
        self.sweep_popups().await;
        Ok(())
    }

    async fn sweep_popups(&self) {
        let attempts = self.config.popup_max_attempts;
        if let Some(count) = fail_open("dismiss_popups", || self.driver.dismiss_popups(attempts)).await {
            if count > 0 {
                info!("Dismissed {} popup(s)", count);
            }
        }
    }
}
