//! Browser lifecycle management using Chrome DevTools Protocol

use crate::error::{cdp, FlowError, Result};
use flowpilot_core::BrowserSettings;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// DevTools port of an already running Chrome
    pub debug_port: u16,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1440,
            window_height: 900,
            debug_port: 9222,
        }
    }
}

impl From<&BrowserSettings> for BrowserConfig {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            window_width: settings.window_width,
            window_height: settings.window_height,
            debug_port: settings.debug_port,
        }
    }
}

/// Response of Chrome's `/json/version` endpoint
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Which tab of an existing browser to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabChoice {
    Existing(usize),
    New,
}

/// Prefer a tab already on Flow, then a blank tab, then a new one
pub fn choose_tab(tab_urls: &[String], flow_url: &str) -> TabChoice {
    let marker = url_marker(flow_url);
    if let Some(i) = tab_urls.iter().position(|u| u.contains(marker)) {
        return TabChoice::Existing(i);
    }
    if let Some(i) = tab_urls
        .iter()
        .position(|u| u == "about:blank" || u == "chrome://newtab/")
    {
        return TabChoice::Existing(i);
    }
    TabChoice::New
}

/// Host and path of a URL, without scheme or trailing slash
fn url_marker(url: &str) -> &str {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped.trim_end_matches('/')
}

/// Active browser session with Chrome DevTools Protocol
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    /// Current active tab
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Launch a new browser instance
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(3600))
            .build()
            .map_err(cdp("Failed to launch browser"))?;

        let browser = Browser::new(launch_options).map_err(cdp("Failed to launch browser"))?;
        let tab = browser.new_tab().map_err(cdp("Failed to create tab"))?;

        info!("Browser launched successfully");
        Ok(Self { browser, tab })
    }

    /// Connect to a running Chrome started with `--remote-debugging-port`
    ///
    /// Reuses a tab that already shows `flow_url` so an existing login and
    /// project stay in place.
    pub async fn connect(port: u16, flow_url: &str) -> Result<Self> {
        info!("Connecting to existing browser on port {}", port);

        let endpoint = format!("http://127.0.0.1:{}/json/version", port);
        let version: VersionInfo = reqwest::get(&endpoint)
            .await
            .map_err(cdp("Failed to reach DevTools endpoint"))?
            .json()
            .await
            .map_err(cdp("Unexpected DevTools version response"))?;
        debug!("DevTools WebSocket: {}", version.web_socket_debugger_url);

        let browser = Browser::connect(version.web_socket_debugger_url)
            .map_err(cdp("Failed to connect to browser"))?;

        let existing = {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(|_| FlowError::Browser("Tab list lock poisoned".to_string()))?;
            let urls: Vec<String> = tabs.iter().map(|t| t.get_url()).collect();
            match choose_tab(&urls, flow_url) {
                TabChoice::Existing(i) => tabs.get(i).cloned(),
                TabChoice::New => None,
            }
        };

        let tab = match existing {
            Some(tab) => {
                info!("Reusing tab at {}", tab.get_url());
                tab
            }
            None => browser.new_tab().map_err(cdp("Failed to create tab"))?,
        };
        tab.activate().map_err(cdp("Failed to activate tab"))?;

        info!("Connected to browser successfully");
        Ok(Self { browser, tab })
    }

    /// Launch or connect, as configured
    pub async fn open(settings: &BrowserSettings, flow_url: &str) -> Result<Self> {
        if settings.launch {
            Self::launch(&BrowserConfig::from(settings)).await
        } else {
            Self::connect(settings.debug_port, flow_url).await
        }
    }

    /// Navigate to a URL
    #[instrument(skip(self))]
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| FlowError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| FlowError::Browser(format!("Navigation timeout for {}: {}", url, e)))?;

        info!("Navigated to {}", url);
        Ok(())
    }

    /// Execute JavaScript in the page context
    pub async fn evaluate_script(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(cdp("JavaScript evaluation failed"))?;

        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Evaluate a script that returns `JSON.stringify(..)` and decode it
    pub async fn evaluate_json<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        match self.evaluate_script(script).await? {
            serde_json::Value::String(json) => Ok(serde_json::from_str(&json)?),
            other => Ok(serde_json::from_value(other)?),
        }
    }

    /// Poll the URL until it contains `fragment`
    pub async fn wait_for_url_containing(&self, fragment: &str, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        loop {
            let url = self.tab.get_url();
            if url.contains(fragment) {
                return Ok(url);
            }
            if start.elapsed() >= timeout {
                return Err(FlowError::WaitTimeout {
                    what: format!("URL containing '{}'", fragment),
                    waited: timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Wait until the document is loaded and no new resources arrive for ~1s
    ///
    /// Gives up quietly after `timeout`; a page that keeps streaming is still
    /// usable.
    pub async fn wait_for_quiescence(&self, timeout: Duration) -> Result<()> {
        const SCRIPT: &str = "JSON.stringify([document.readyState, performance.getEntriesByType('resource').length])";

        let start = Instant::now();
        let mut last_count: Option<u64> = None;
        let mut quiet_polls = 0u32;

        while start.elapsed() < timeout {
            let (state, count): (String, u64) = self.evaluate_json(SCRIPT).await?;
            if state == "complete" && last_count == Some(count) {
                quiet_polls += 1;
                if quiet_polls >= 2 {
                    debug!("Page quiet after {:?}", start.elapsed());
                    return Ok(());
                }
            } else {
                quiet_polls = 0;
            }
            last_count = Some(count);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        warn!("Page still busy after {:?}, continuing", timeout);
        Ok(())
    }

    /// Clear the HTTP cache and local/session storage, keeping cookies
    pub async fn clear_cache_and_storage(&self) -> Result<()> {
        self.tab
            .call_method(Network::ClearBrowserCache(None))
            .map_err(cdp("Failed to clear browser cache"))?;
        self.evaluate_script("try { localStorage.clear(); sessionStorage.clear(); } catch (e) {}")
            .await?;
        Ok(())
    }

    /// Reload bypassing the cache
    pub async fn hard_reload(&self) -> Result<()> {
        self.tab
            .reload(true, None)
            .map_err(cdp("Failed to reload"))?;
        self.tab
            .wait_until_navigated()
            .map_err(cdp("Reload did not finish"))?;
        Ok(())
    }

    /// Click the element matching a CSS selector with real pointer events
    pub async fn click_selector(&self, selector: &str) -> Result<()> {
        self.tab
            .find_element(selector)
            .map_err(|_| FlowError::ElementNotFound {
                selector: selector.to_string(),
            })?
            .click()
            .map_err(cdp("Click failed"))?;
        Ok(())
    }

    /// Type text as keyboard input into the focused element
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.tab.type_str(text).map_err(cdp("Typing failed"))?;
        Ok(())
    }

    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.tab.press_key(key).map_err(cdp("Key press failed"))?;
        Ok(())
    }

    /// Get reference to the active tab
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    const FLOW: &str = "https://labs.google/fx/tools/flow";

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(!config.headless);
        assert_eq!(config.window_width, 1440);
        assert_eq!(config.window_height, 900);
        assert_eq!(config.debug_port, 9222);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = BrowserSettings {
            headless: true,
            debug_port: 9333,
            ..BrowserSettings::default()
        };
        let config = BrowserConfig::from(&settings);
        assert!(config.headless);
        assert_eq!(config.debug_port, 9333);
    }

    #[test]
    fn test_choose_tab_prefers_flow() {
        let tabs = urls(&[
            "about:blank",
            "https://mail.example.com/",
            "https://labs.google/fx/tools/flow/project/abc",
        ]);
        assert_eq!(choose_tab(&tabs, FLOW), TabChoice::Existing(2));
    }

    #[test]
    fn test_choose_tab_falls_back_to_blank() {
        let tabs = urls(&["https://mail.example.com/", "chrome://newtab/"]);
        assert_eq!(choose_tab(&tabs, FLOW), TabChoice::Existing(1));
    }

    #[test]
    fn test_choose_tab_new() {
        let tabs = urls(&["https://mail.example.com/"]);
        assert_eq!(choose_tab(&tabs, FLOW), TabChoice::New);
        assert_eq!(choose_tab(&[], FLOW), TabChoice::New);
    }

    #[test]
    fn test_url_marker() {
        assert_eq!(url_marker("https://labs.google/fx/tools/flow/"), "labs.google/fx/tools/flow");
        assert_eq!(url_marker("http://localhost:3000"), "localhost:3000");
        assert_eq!(url_marker("labs.google"), "labs.google");
    }

    #[test]
    fn test_version_info_parse() {
        let body = r#"{"Browser":"Chrome/120","webSocketDebuggerUrl":"ws://127.0.0.1:9222/devtools/browser/x"}"#;
        let info: VersionInfo = serde_json::from_str(body).unwrap();
        assert!(info.web_socket_debugger_url.starts_with("ws://"));
    }
}
