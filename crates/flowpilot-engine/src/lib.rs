//! # flowpilot-engine
//!
//! The part of Flowpilot that decides things:
//! - a pure poll state machine (`transition(params, machine, event) -> (machine, action)`)
//! - the polling loop that feeds it page observations
//! - the outer retry wrapper that restarts a submission after a broken backend
//! - an injectable clock, so all of the above runs against virtual time in tests

mod clock;
mod cycle;
mod poller;
mod scripted;
mod state_machine;

pub use clock::{Clock, ManualClock, TokioClock};
pub use cycle::{GenerationCycle, GenerationOutput};
pub use poller::Poller;
pub use scripted::{DriverCalls, ScriptedDriver};
pub use state_machine::{transition, Action, Event, Phase, PollMachine, PollParams, PollState, Stage};
