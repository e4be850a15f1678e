//! Fail-open helpers for best-effort page maintenance
//!
//! Popup sweeps inside the polling loop and debug screenshots must never abort
//! a generation. Wrap them here: failures are logged and turned into `None`.
//!
//! Do not use this for detectors, submissions or recovery actions; their
//! errors are real faults and must propagate.

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// ```no_run
/// use flowpilot_core::fail_open::fail_open;
/// use flowpilot_core::Result;
///
/// async fn sweep() -> Result<usize> {
///     Ok(0)
/// }
///
/// async fn example() {
///     let dismissed = fail_open("dismiss_popups", || sweep()).await.unwrap_or(0);
///     assert_eq!(dismissed, 0);
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlowError;

    #[tokio::test]
    async fn test_popup_count_passes_through() {
        let dismissed = fail_open("dismiss_popups", || async { Ok::<usize, FlowError>(2) }).await;
        assert_eq!(dismissed, Some(2));
    }

    #[tokio::test]
    async fn test_screenshot_failure_is_swallowed() {
        let saved = fail_open("debug_screenshot", || async {
            Err::<std::path::PathBuf, _>(FlowError::Browser("tab crashed".to_string()))
        })
        .await;
        assert!(saved.is_none());
    }
}
