//! Debug screenshots using Chrome DevTools Protocol

use crate::browser::BrowserSession;
use crate::error::{cdp, Result};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<dir>/<name>.png`, keeping an existing `.png` suffix
pub fn screenshot_path(dir: &Path, name: &str) -> PathBuf {
    if name.ends_with(".png") {
        dir.join(name)
    } else {
        dir.join(format!("{}.png", name))
    }
}

/// Capture the full page as PNG bytes
pub async fn capture_full_page(session: &BrowserSession) -> Result<Vec<u8>> {
    session
        .tab()
        .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        .map_err(cdp("CDP capture failed"))
}

/// Save a full-page screenshot into `dir` and return its path
pub async fn save_screenshot(session: &BrowserSession, dir: &Path, name: &str) -> Result<PathBuf> {
    let data = capture_full_page(session).await?;
    let path = screenshot_path(dir, name);
    tokio::fs::write(&path, &data).await?;

    info!("Screenshot saved: {} ({} bytes)", path.display(), data.len());
    Ok(path)
}

/// Save a screenshot named `name` into the working directory
pub async fn save_debug_screenshot(session: &BrowserSession, name: &str) -> Result<PathBuf> {
    let dir = std::env::current_dir()?;
    save_screenshot(session, &dir, name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_path_adds_extension() {
        let dir = Path::new("/tmp/run");
        assert_eq!(
            screenshot_path(dir, "debug_timeout"),
            PathBuf::from("/tmp/run/debug_timeout.png")
        );
    }

    #[test]
    fn test_screenshot_path_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            screenshot_path(dir.path(), "debug_create_disabled.png"),
            dir.path().join("debug_create_disabled.png")
        );
    }
}
