//! # flowpilot-core
//!
//! Shared building blocks for driving the Flow video generator through a
//! browser:
//!
//! - [`Snapshot`] and [`GenerationResult`], the data the polling loop works on
//! - [`GenerationDriver`], the seam between the polling engine and the page
//! - [`FlowError`], the unified error type
//! - [`FlowConfig`], loaded from `.flowpilot/config.toml`
//! - [`BackendErrorMatcher`], the phrase scanner behind the backend-broken detector

pub mod config;
mod driver;
mod error;
pub mod fail_open;
mod patterns;
mod types;

pub use config::{
    BrowserSettings, FlowConfig, GenerationConfig, HumanDelay, Selectors, Settings,
};
pub use driver::GenerationDriver;
pub use error::{FlowError, Result};
pub use patterns::BackendErrorMatcher;
pub use types::*;
