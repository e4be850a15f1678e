//! Chrome DevTools driver for the Flow video generator
//!
//! This crate implements [`flowpilot_core::GenerationDriver`] against a real
//! browser tab, plus the workflow steps that surround a generation.
//!
//! # Features
//!
//! - **Browser Management**: connect to a running Chrome over its DevTools
//!   port (reusing an open Flow tab) or launch a fresh one
//! - **Locators**: role, text, placeholder and label lookups evaluated in the
//!   page, clicked with real pointer events
//! - **Probes**: result snapshot, failure banner, backend error text
//! - **Popups**: prioritized overlay dismissal with an Escape fallback
//! - **Downloads**: result videos saved as `<prefix>_<unix-ms>_<index>.mp4`
//!
//! # Example
//!
//! ```no_run
//! use flowpilot_browser::{BrowserSession, FlowPage};
//! use flowpilot_core::FlowConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlowConfig::default();
//!     let session = BrowserSession::open(&config.browser, &config.url).await?;
//!
//!     let mut page = FlowPage::new(session, config)?;
//!     page.set_prompt("a paper boat drifting down a rainy street");
//!     page.open_flow().await?;
//!     page.open_new_project().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium installed
//! - To reuse a logged-in profile: `chrome --remote-debugging-port=9222`

pub mod browser;
pub mod detect;
pub mod download;
pub mod error;
pub mod human;
pub mod locator;
pub mod page;
pub mod popups;
pub mod screenshot;

// Re-export commonly used types
pub use browser::{BrowserConfig, BrowserSession};
pub use download::{artifact_file_name, Downloader};
pub use error::{FlowError, Result};
pub use human::Human;
pub use locator::{ElementState, Locator};
pub use page::FlowPage;
pub use popups::{dismiss_popups, OverlaySurface};
