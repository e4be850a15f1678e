//! Closing the overlays Flow throws over the workspace
//!
//! Explicit close controls are tried first, in priority order. A dialog with
//! no recognizable control gets an Escape key press as the last resort.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::locator::Locator;

/// The page operations popup dismissal needs
#[async_trait]
pub trait OverlaySurface: Send + Sync {
    /// Read-only visibility probe
    async fn is_visible(&self, target: &Locator) -> Result<bool>;

    async fn click(&self, target: &Locator) -> Result<()>;

    async fn press_escape(&self) -> Result<()>;

    async fn pause(&self, min_ms: u64, max_ms: u64);
}

/// Known closeable overlay controls, highest priority first
pub fn dismiss_targets() -> Vec<Locator> {
    let aria = |label: &str| Locator::css(format!(r#"button[aria-label="{}"]"#, label));
    let dialog_button = |text: &str| Locator::css(r#"[role="dialog"] button"#).with_text(text);
    let button = |text: &str| Locator::css("button").with_text(text);

    vec![
        aria("Close"),
        aria("Dismiss"),
        aria("关闭"),
        Locator::css(r#"[role="dialog"] button[aria-label*="close" i]"#),
        Locator::css(r#"[role="dialog"] button[aria-label*="dismiss" i]"#),
        dialog_button("Got it"),
        dialog_button("OK"),
        dialog_button("Close"),
        dialog_button("Dismiss"),
        dialog_button("Skip"),
        dialog_button("Not now"),
        Locator::css(r#"[role="dialog"] button.close-button"#),
        Locator::css(r#"[role="dialog"] [class*="close"]"#),
        Locator::css(r#"[role="dialog"] [class*="dismiss"]"#),
        button("Dismiss"),
        button("Got it"),
        button("OK"),
        button("I understand"),
        button("Continue"),
        Locator::css(r#"[class*="snackbar"] button"#),
        Locator::css(r#"[class*="toast"] button"#),
        Locator::css(r#"[class*="notification"] button"#),
        Locator::css(r#"[class*="banner"] button"#).with_text("Dismiss"),
        Locator::css(r#"[class*="banner"] button"#).with_text("Close"),
    ]
}

/// Generic dialog used for the Escape fallback
pub fn any_dialog() -> Locator {
    Locator::css(r#"[role="dialog"]"#)
}

/// Dismiss up to `max_attempts` overlays, returning how many were closed
///
/// Stops at the first pass that finds nothing. Probe and click failures are
/// treated as "not there".
pub async fn dismiss_popups<S: OverlaySurface + ?Sized>(
    surface: &S,
    targets: &[Locator],
    max_attempts: usize,
) -> usize {
    let mut total = 0;

    for _ in 0..max_attempts {
        let mut dismissed = false;

        for target in targets {
            match surface.is_visible(target).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("Popup probe {} failed: {}", target.describe(), e);
                    continue;
                }
            }
            match surface.click(target).await {
                Ok(()) => {
                    debug!("Dismissed popup via {}", target.describe());
                    dismissed = true;
                    total += 1;
                    surface.pause(300, 500).await;
                    break;
                }
                Err(e) => debug!("Popup click {} failed: {}", target.describe(), e),
            }
        }

        if !dismissed && matches!(surface.is_visible(&any_dialog()).await, Ok(true)) {
            match surface.press_escape().await {
                Ok(()) => {
                    debug!("Dismissed dialog with Escape");
                    dismissed = true;
                    total += 1;
                    surface.pause(300, 500).await;
                }
                Err(e) => debug!("Escape failed: {}", e),
            }
        }

        if !dismissed {
            break;
        }
    }

    total
}
