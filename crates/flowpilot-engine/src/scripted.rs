//! Scripted page driver for exercising the engine without a browser

use async_trait::async_trait;
use flowpilot_core::{FlowError, GenerationDriver, Result, Snapshot};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// How often each driver operation was invoked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverCalls {
    pub submits: usize,
    pub baselines: usize,
    pub snapshot_reads: usize,
    pub popup_sweeps: usize,
    pub failed_checks: usize,
    pub broken_checks: usize,
    pub banner_checks: usize,
    pub retries: usize,
    pub cache_clears: usize,
    pub settles: usize,
    pub screenshots: usize,
}

#[derive(Debug, Default)]
struct Script {
    baseline: Snapshot,
    snapshots: VecDeque<Snapshot>,
    /// Repeated once the queue runs dry
    last_snapshot: Snapshot,
    /// `Err` entries make the probe fail with that message
    failed: VecDeque<std::result::Result<bool, String>>,
    broken: VecDeque<Option<String>>,
    broken_always: Option<String>,
    banners: VecDeque<Option<String>>,
    retry_results: VecDeque<bool>,
    submit_error: Option<String>,
}

/// Driver whose observations come from queues set up by the test
///
/// Exhausted queues fall back to quiet defaults: the last snapshot repeats,
/// detectors report nothing, retries dispatch.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    script: Mutex<Script>,
    calls: Mutex<DriverCalls>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(self, baseline: impl Into<Snapshot>) -> Self {
        self.script_mut().baseline = baseline.into();
        self
    }

    /// Snapshots returned by successive reads
    pub fn with_snapshots<S: Into<Snapshot>>(self, snapshots: Vec<S>) -> Self {
        self.script_mut()
            .snapshots
            .extend(snapshots.into_iter().map(Into::into));
        self
    }

    /// Results of successive "generation failed" probes
    pub fn with_failed(self, failed: Vec<bool>) -> Self {
        self.script_mut().failed.extend(failed.into_iter().map(Ok));
        self
    }

    /// Queue a "generation failed" probe that errors instead of answering
    pub fn with_failed_probe_error(self, message: &str) -> Self {
        self.script_mut().failed.push_back(Err(message.to_string()));
        self
    }

    /// Results of successive backend-broken probes
    pub fn with_broken(self, broken: Vec<Option<&str>>) -> Self {
        self.script_mut()
            .broken
            .extend(broken.into_iter().map(|b| b.map(str::to_string)));
        self
    }

    /// Every backend-broken probe reports `label` once the queue is empty
    pub fn always_broken(self, label: &str) -> Self {
        self.script_mut().broken_always = Some(label.to_string());
        self
    }

    /// Results of successive error banner checks
    pub fn with_banners(self, banners: Vec<Option<&str>>) -> Self {
        self.script_mut()
            .banners
            .extend(banners.into_iter().map(|b| b.map(str::to_string)));
        self
    }

    pub fn with_retry_results(self, results: Vec<bool>) -> Self {
        self.script_mut().retry_results.extend(results);
        self
    }

    /// Make every submission fail as if the submit control never enabled
    pub fn failing_submit(self, message: &str) -> Self {
        self.script_mut().submit_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> DriverCalls {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn script_mut(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, f: impl FnOnce(&mut DriverCalls)) {
        f(&mut self.calls.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

#[async_trait]
impl GenerationDriver for ScriptedDriver {
    async fn submit_generation(&self) -> Result<()> {
        self.record(|c| c.submits += 1);
        match &self.script_mut().submit_error {
            Some(msg) => Err(FlowError::Browser(msg.clone())),
            None => Ok(()),
        }
    }

    async fn read_snapshot(&self) -> Result<Snapshot> {
        self.record(|c| c.snapshot_reads += 1);
        let mut script = self.script_mut();
        if let Some(next) = script.snapshots.pop_front() {
            script.last_snapshot = next;
        }
        Ok(script.last_snapshot.clone())
    }

    async fn take_baseline(&self) -> Result<Snapshot> {
        self.record(|c| c.baselines += 1);
        Ok(self.script_mut().baseline.clone())
    }

    async fn dismiss_popups(&self, _max_attempts: usize) -> Result<usize> {
        self.record(|c| c.popup_sweeps += 1);
        Ok(0)
    }

    async fn is_generation_failed(&self) -> Result<bool> {
        self.record(|c| c.failed_checks += 1);
        match self.script_mut().failed.pop_front() {
            Some(Ok(failed)) => Ok(failed),
            Some(Err(msg)) => Err(FlowError::Browser(msg)),
            None => Ok(false),
        }
    }

    async fn detect_backend_error(&self) -> Result<Option<String>> {
        self.record(|c| c.broken_checks += 1);
        let mut script = self.script_mut();
        match script.broken.pop_front() {
            Some(next) => Ok(next),
            None => Ok(script.broken_always.clone()),
        }
    }

    async fn check_error_banner(&self) -> Result<Option<String>> {
        self.record(|c| c.banner_checks += 1);
        Ok(self.script_mut().banners.pop_front().flatten())
    }

    async fn retry_generation(&self) -> Result<bool> {
        self.record(|c| c.retries += 1);
        Ok(self.script_mut().retry_results.pop_front().unwrap_or(true))
    }

    async fn clear_cache_and_reload(&self) -> Result<()> {
        self.record(|c| c.cache_clears += 1);
        Ok(())
    }

    async fn wait_until_settled(&self) -> Result<()> {
        self.record(|c| c.settles += 1);
        Ok(())
    }

    async fn capture_debug_screenshot(&self, name: &str) -> Result<Option<PathBuf>> {
        self.record(|c| c.screenshots += 1);
        Ok(Some(PathBuf::from(format!("{}.png", name))))
    }
}
