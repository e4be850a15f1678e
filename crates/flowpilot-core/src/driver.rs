//! Page-level operations the generation engine drives

use async_trait::async_trait;
use std::path::PathBuf;

use crate::{Result, Snapshot};

/// Operations on the controlled Flow page (allows scripting in tests)
///
/// Probes (`read_snapshot`, `is_generation_failed`, `detect_backend_error`,
/// `check_error_banner`) are read-only and report absence as `Ok`, never as
/// an error. `Err` is reserved for protocol faults and bounded waits on
/// required elements.
#[async_trait]
pub trait GenerationDriver: Send + Sync {
    /// Fill the prompt and activate the submit control
    ///
    /// Fails if the submit control never becomes enabled within its own wait.
    async fn submit_generation(&self) -> Result<()>;

    /// Identifiers in the first row of the result list that holds media elements
    async fn read_snapshot(&self) -> Result<Snapshot>;

    /// Snapshot taken right before a submission
    async fn take_baseline(&self) -> Result<Snapshot> {
        self.read_snapshot().await
    }

    /// Close transient overlays, at most `max_attempts` passes; returns dismissals
    async fn dismiss_popups(&self, max_attempts: usize) -> Result<usize>;

    /// Explicit "failed" status shown for the in-progress item
    async fn is_generation_failed(&self) -> Result<bool>;

    /// Full-page scan for generic error phrases; returns the matched text
    async fn detect_backend_error(&self) -> Result<Option<String>>;

    async fn is_backend_broken(&self) -> Result<bool> {
        Ok(self.detect_backend_error().await?.is_some())
    }

    /// Text of a visible alert/error element, if any
    async fn check_error_banner(&self) -> Result<Option<String>>;

    /// Reuse the prompt and resubmit; returns whether the retry was dispatched
    async fn retry_generation(&self) -> Result<bool>;

    /// Purge local/session storage and the network cache (cookies kept), then reload
    async fn clear_cache_and_reload(&self) -> Result<()>;

    /// Wait until the page has stopped loading resources
    async fn wait_until_settled(&self) -> Result<()>;

    /// Save a full-page screenshot for post-mortem debugging
    async fn capture_debug_screenshot(&self, _name: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}
