//! Pure state machine for the generation polling loop
//!
//! No I/O, no clock, no async. The poller performs each [`Action`] and feeds
//! the outcome back as an [`Event`]:
//! - `transition(params, machine, event) -> (machine, next action)`
//! - one action is outstanding at a time, so probes within a tick run in a
//!   fixed order: popups (when due), backend-broken (when due),
//!   generation-failed, snapshot
//! - invalid transitions go to [`Phase::Invalid`] (never panic)

use flowpilot_core::{CompletionReason, GenerationConfig, GenerationResult, Snapshot};
use std::time::Duration;

/// Inputs fixed for one polling loop invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollParams {
    /// Number of new results the submission should produce
    pub expected_count: usize,
    /// Snapshot taken right before the submission
    pub baseline: Snapshot,
    pub timeout: Duration,
    pub stable_checks: u32,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub popup_interval: Duration,
    pub broken_interval: Duration,
    pub failure_cooldown: Duration,
}

impl PollParams {
    pub fn new(
        config: &GenerationConfig,
        expected_count: usize,
        baseline: Snapshot,
        timeout: Duration,
    ) -> Self {
        Self {
            expected_count,
            baseline,
            timeout,
            stable_checks: config.stable_checks,
            max_retries: config.max_retries,
            poll_interval: config.poll_interval(),
            popup_interval: config.popup_check_interval(),
            broken_interval: config.broken_check_interval(),
            failure_cooldown: config.failure_cooldown(),
        }
    }
}

/// Bookkeeping carried from tick to tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    /// Previous tick's read
    pub last_snapshot: Snapshot,
    /// Consecutive identical non-empty reads, the current one included
    pub stable_count: u32,
    /// Most recent non-empty read that differed from the baseline
    pub last_non_baseline: Snapshot,
    /// "Failed generation" banners seen during this loop
    pub retry_count: u32,
    /// Elapsed time of the last popup sweep
    pub last_popup_check: Option<Duration>,
    /// Elapsed time of the last backend-broken probe
    pub last_broken_check: Option<Duration>,
}

/// Position inside a polling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BetweenTicks,
    DismissingPopups,
    CheckingBroken,
    CheckingFailed,
    ReadingSnapshot,
    CoolingDown,
    Retrying,
}

/// Loop phase; everything except `Polling` is terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Polling(Stage),
    Success { urls: Snapshot },
    Timeout { urls: Snapshot },
    RetryExhausted { urls: Snapshot },
    NeedsOuterRetry { label: String },
    /// An event arrived that the current stage cannot accept
    Invalid { reason: String },
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Phase::Polling(_))
    }

    /// Convert a terminal phase into the loop's result
    pub fn into_result(self) -> Option<GenerationResult> {
        match self {
            Phase::Success { urls } => Some(GenerationResult::Finished {
                urls,
                reason: CompletionReason::Stable,
            }),
            Phase::Timeout { urls } => Some(GenerationResult::Finished {
                urls,
                reason: CompletionReason::TimedOut,
            }),
            Phase::RetryExhausted { urls } => Some(GenerationResult::Finished {
                urls,
                reason: CompletionReason::RetriesExhausted,
            }),
            Phase::NeedsOuterRetry { label } => Some(GenerationResult::Retry { error: label }),
            Phase::Polling(_) | Phase::Invalid { .. } => None,
        }
    }
}

/// Observations reported by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new tick begins; `elapsed` is measured from loop start
    TickStarted { elapsed: Duration },
    PopupsDismissed { count: usize },
    BrokenChecked { label: Option<String> },
    FailedChecked { failed: bool },
    SnapshotRead { snapshot: Snapshot },
    CooldownElapsed,
    RetryDispatched { dispatched: bool },
}

/// Side effects requested from the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Wait `delay`, then report `TickStarted`
    NextTick { delay: Duration },
    DismissPopups,
    CheckBackendBroken,
    CheckGenerationFailed,
    ReadSnapshot,
    /// Wait for the backend to recover, then report `CooldownElapsed`
    Cooldown(Duration),
    RetryGeneration,
}

/// Complete machine state: phase plus tick bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollMachine {
    pub phase: Phase,
    pub state: PollState,
    /// Elapsed time at the start of the current tick
    pub tick_elapsed: Duration,
}

impl PollMachine {
    /// Fresh machine plus the action that starts the first tick
    pub fn start() -> (Self, Action) {
        (
            Self {
                phase: Phase::Polling(Stage::BetweenTicks),
                state: PollState::default(),
                tick_elapsed: Duration::ZERO,
            },
            Action::NextTick {
                delay: Duration::ZERO,
            },
        )
    }

    fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }
}

/// Pure state transition function
///
/// Returns the next machine and the action to perform, or `None` once the
/// machine is terminal.
pub fn transition(
    params: &PollParams,
    machine: PollMachine,
    event: Event,
) -> (PollMachine, Option<Action>) {
    let stage = match &machine.phase {
        Phase::Polling(stage) => *stage,
        terminal => {
            let reason = format!("event {:?} after terminal phase {:?}", event, terminal);
            return (machine.with_phase(Phase::Invalid { reason }), None);
        }
    };

    match (stage, event) {
        (Stage::BetweenTicks, Event::TickStarted { elapsed }) => {
            let mut machine = machine;
            machine.tick_elapsed = elapsed;

            if elapsed >= params.timeout {
                let urls = machine.state.last_non_baseline.clone();
                return (machine.with_phase(Phase::Timeout { urls }), None);
            }

            if is_due(machine.state.last_popup_check, elapsed, params.popup_interval) {
                machine.state.last_popup_check = Some(elapsed);
                return (
                    machine.with_phase(Phase::Polling(Stage::DismissingPopups)),
                    Some(Action::DismissPopups),
                );
            }

            after_popups(params, machine)
        }

        // Popup sweeps are maintenance only; the count does not affect state.
        (Stage::DismissingPopups, Event::PopupsDismissed { .. }) => after_popups(params, machine),

        (Stage::CheckingBroken, Event::BrokenChecked { label: Some(label) }) => {
            (machine.with_phase(Phase::NeedsOuterRetry { label }), None)
        }

        (Stage::CheckingBroken, Event::BrokenChecked { label: None }) => (
            machine.with_phase(Phase::Polling(Stage::CheckingFailed)),
            Some(Action::CheckGenerationFailed),
        ),

        (Stage::CheckingFailed, Event::FailedChecked { failed: true }) => {
            let mut machine = machine;
            machine.state.retry_count += 1;

            if machine.state.retry_count > params.max_retries {
                let urls = machine.state.last_non_baseline.clone();
                return (machine.with_phase(Phase::RetryExhausted { urls }), None);
            }

            (
                machine.with_phase(Phase::Polling(Stage::CoolingDown)),
                Some(Action::Cooldown(params.failure_cooldown)),
            )
        }

        (Stage::CheckingFailed, Event::FailedChecked { failed: false }) => (
            machine.with_phase(Phase::Polling(Stage::ReadingSnapshot)),
            Some(Action::ReadSnapshot),
        ),

        (Stage::CoolingDown, Event::CooldownElapsed) => (
            machine.with_phase(Phase::Polling(Stage::Retrying)),
            Some(Action::RetryGeneration),
        ),

        (Stage::Retrying, Event::RetryDispatched { dispatched }) => {
            let mut machine = machine;
            if dispatched {
                machine.state.last_snapshot = Snapshot::empty();
                machine.state.stable_count = 0;
            }
            // Straight into the next tick; the retry already waited out the cooldown.
            (
                machine.with_phase(Phase::Polling(Stage::BetweenTicks)),
                Some(Action::NextTick {
                    delay: Duration::ZERO,
                }),
            )
        }

        (Stage::ReadingSnapshot, Event::SnapshotRead { snapshot }) => {
            let mut machine = machine;
            let fresh = observe(&mut machine.state, &params.baseline, &snapshot);

            if fresh
                && snapshot.len() >= params.expected_count
                && machine.state.stable_count >= params.stable_checks
            {
                return (machine.with_phase(Phase::Success { urls: snapshot }), None);
            }

            (
                machine.with_phase(Phase::Polling(Stage::BetweenTicks)),
                Some(Action::NextTick {
                    delay: params.poll_interval,
                }),
            )
        }

        (stage, event) => {
            let reason = format!("stage {:?} cannot handle event {:?}", stage, event);
            (machine.with_phase(Phase::Invalid { reason }), None)
        }
    }
}

/// Route to the backend-broken probe when due, else to the failed probe
fn after_popups(params: &PollParams, mut machine: PollMachine) -> (PollMachine, Option<Action>) {
    let elapsed = machine.tick_elapsed;
    if is_due(machine.state.last_broken_check, elapsed, params.broken_interval) {
        machine.state.last_broken_check = Some(elapsed);
        return (
            machine.with_phase(Phase::Polling(Stage::CheckingBroken)),
            Some(Action::CheckBackendBroken),
        );
    }

    (
        machine.with_phase(Phase::Polling(Stage::CheckingFailed)),
        Some(Action::CheckGenerationFailed),
    )
}

fn is_due(last: Option<Duration>, now: Duration, interval: Duration) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_sub(last) >= interval,
    }
}

/// Fold one read into the tick bookkeeping; returns whether it differs from the baseline
fn observe(state: &mut PollState, baseline: &Snapshot, snapshot: &Snapshot) -> bool {
    if *snapshot == state.last_snapshot && !snapshot.is_empty() {
        state.stable_count += 1;
    } else {
        state.stable_count = if snapshot.is_empty() { 0 } else { 1 };
        state.last_snapshot = snapshot.clone();
    }

    let fresh = snapshot != baseline;
    if fresh && !snapshot.is_empty() {
        state.last_non_baseline = snapshot.clone();
    }
    fresh
}
