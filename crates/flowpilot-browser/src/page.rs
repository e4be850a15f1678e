//! The Flow page: workflow steps and the generation driver
//!
//! [`FlowPage`] owns the browser session for one run. The engine talks to it
//! through [`GenerationDriver`]; the CLI calls the workflow steps around that
//! (open a project, apply settings, pick the mode).

use async_trait::async_trait;
use flowpilot_core::fail_open::fail_open;
use flowpilot_core::{BackendErrorMatcher, FlowConfig, GenerationDriver, Snapshot};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::browser::BrowserSession;
use crate::detect::{
    classify_alert, error_banner_script, parse_snapshot, snapshot_script, visible_text_script,
    BODY_TEXT_SCRIPT,
};
use crate::error::{FlowError, Result};
use crate::human::Human;
use crate::locator::{js_str, ElementState, Locator, MARKED_SELECTOR};
use crate::popups::{dismiss_popups, dismiss_targets, OverlaySurface};
use crate::screenshot::save_debug_screenshot;

const DEFAULT_WAIT: Duration = Duration::from_secs(30);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const CREATE_ENABLE_TIMEOUT: Duration = Duration::from_secs(120);
const PROJECT_URL_TIMEOUT: Duration = Duration::from_secs(60);
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Title text that identifies the settings dialog
const SETTINGS_DIALOG_TEXT: &str = "Aspect Ratio";

/// Driver for one Flow tab
pub struct FlowPage {
    session: BrowserSession,
    config: FlowConfig,
    human: Human,
    matcher: BackendErrorMatcher,
    prompt: String,
}

impl FlowPage {
    pub fn new(session: BrowserSession, config: FlowConfig) -> Result<Self> {
        let matcher = config.generation.error_matcher()?;
        let human = Human::new(config.human.clone());
        Ok(Self {
            session,
            config,
            human,
            matcher,
            prompt: String::new(),
        })
    }

    /// Prompt typed by every submission
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn human(&self) -> &Human {
        &self.human
    }

    async fn inspect(&self, locator: &Locator, mark: bool) -> Result<ElementState> {
        self.session.evaluate_json(&locator.script(mark)).await
    }

    /// Wait until `locator` resolves to a visible element
    pub async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<ElementState> {
        let start = Instant::now();
        loop {
            let state = self.inspect(locator, false).await?;
            if state.found && state.visible {
                return Ok(state);
            }
            if start.elapsed() >= timeout {
                return Err(FlowError::ElementNotFound {
                    selector: locator.describe(),
                });
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    /// Wait for a visible element, then click it with a pointer event
    pub async fn click(&self, locator: &Locator) -> Result<()> {
        self.wait_for(locator, DEFAULT_WAIT).await?;
        self.click_now(locator).await
    }

    async fn click_now(&self, locator: &Locator) -> Result<()> {
        let state = self.inspect(locator, true).await?;
        if !state.found {
            return Err(FlowError::ElementNotFound {
                selector: locator.describe(),
            });
        }
        tokio::time::sleep(self.human.click_delay()).await;
        debug!("Clicking {}", locator.describe());
        self.session.click_selector(MARKED_SELECTOR).await
    }

    /// The first candidate that exists on the page at all
    async fn first_present(&self, candidates: &[Locator]) -> Result<Option<Locator>> {
        for candidate in candidates {
            if self.inspect(candidate, false).await?.found {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    /// Menu entry named `name`, whichever menu role the page uses
    fn menu_option(name: &str) -> [Locator; 3] {
        [
            Locator::role("menuitem", Some(name.to_string())),
            Locator::role("menuitemradio", Some(name.to_string())),
            Locator::role("option", Some(name.to_string())),
        ]
    }

    async fn pick_option(&self, name: &str) -> Result<()> {
        let candidates = Self::menu_option(name);
        let option = self
            .first_present(&candidates)
            .await?
            .unwrap_or_else(|| candidates[2].clone());
        self.click(&option).await
    }

    async fn debug_screenshot(&self, name: &str) {
        if let Some(path) = fail_open("debug_screenshot", || save_debug_screenshot(&self.session, name)).await {
            info!("Saved debug screenshot: {}", path.display());
        }
    }

    async fn sweep_popups(&self, max_attempts: usize) -> usize {
        dismiss_popups(self, &dismiss_targets(), max_attempts).await
    }

    /// Load the Flow landing page
    #[instrument(skip(self))]
    pub async fn open_flow(&self) -> Result<()> {
        self.session.navigate(&self.config.url).await?;
        self.session.wait_for_quiescence(SETTLE_TIMEOUT).await?;
        self.human.pause(500, 900).await;
        Ok(())
    }

    /// Load an existing project and scroll its result list to the top
    #[instrument(skip(self))]
    pub async fn open_project(&self, url: &str) -> Result<()> {
        self.session.navigate(url).await?;
        self.session.wait_for_quiescence(SETTLE_TIMEOUT).await?;
        self.human.pause(500, 900).await;
        self.session.evaluate_script("window.scrollTo(0, 0)").await?;
        Ok(())
    }

    /// Create a project and wait for its page; returns popups dismissed on arrival
    #[instrument(skip(self))]
    pub async fn open_new_project(&self) -> Result<usize> {
        self.click(&Locator::button(&self.config.selectors.new_project_button))
            .await?;
        let url = self
            .session
            .wait_for_url_containing("/project/", PROJECT_URL_TIMEOUT)
            .await?;
        self.session.wait_for_quiescence(SETTLE_TIMEOUT).await?;
        self.human.pause(1000, 1500).await;
        info!("Project page: {}", url);

        let dismissed = self.sweep_popups(self.config.generation.popup_max_attempts).await;
        self.human.pause(500, 800).await;
        Ok(dismissed)
    }

    /// Open the settings dialog and pick aspect ratio, output count and model
    #[instrument(skip(self))]
    pub async fn configure_settings(&self) -> Result<()> {
        let settings_button = Locator::button(&self.config.selectors.settings_button);
        if let Err(e) = self.wait_for(&settings_button, SETTINGS_TIMEOUT).await {
            self.debug_screenshot("debug_settings_btn").await;
            return Err(e);
        }
        self.click_now(&settings_button).await?;
        self.human.pause(800, 1200).await;

        // Some builds render the dialog without role="dialog".
        if self
            .wait_for(&Locator::role("dialog", None), Duration::from_secs(5))
            .await
            .is_err()
        {
            debug!("No dialog role after opening settings");
        }
        self.human.pause(300, 500).await;

        let heading = Locator::text(SETTINGS_DIALOG_TEXT).in_dialog_with(SETTINGS_DIALOG_TEXT);
        if let Err(e) = self.wait_for(&heading, SETTINGS_TIMEOUT).await {
            self.debug_screenshot("debug_settings_dialog").await;
            return Err(e);
        }

        let settings = &self.config.settings;
        for (label, value) in [
            ("Aspect Ratio", &settings.aspect_ratio),
            ("Outputs per prompt", &settings.outputs_per_prompt),
            ("Model", &settings.model),
        ] {
            if value.is_empty() {
                continue;
            }
            let dropdown = Locator::labelled_dropdown(label).in_dialog_with(SETTINGS_DIALOG_TEXT);
            self.click(&dropdown).await?;
            self.pick_option(value).await?;
            self.human.beat().await;
            debug!("{} set to {}", label, value);
        }
        Ok(())
    }

    /// Choose the generation mode; a page without a mode control is left alone
    #[instrument(skip(self))]
    pub async fn select_mode(&self) -> Result<()> {
        let label = &self.config.mode_option_label;
        if label.is_empty() {
            return Ok(());
        }

        let candidates = [
            Locator::button(&self.config.selectors.mode_button),
            Locator::role("combobox", None),
        ];
        let Some(mode_button) = self.first_present(&candidates).await? else {
            warn!("No mode control found, keeping the current mode");
            return Ok(());
        };

        self.click(&mode_button).await?;
        self.pick_option(label).await?;
        self.human.beat().await;
        Ok(())
    }

    /// Replace the prompt box contents by typing `prompt`
    #[instrument(skip(self, prompt))]
    pub async fn fill_prompt(&self, prompt: &str) -> Result<()> {
        let selectors = &self.config.selectors;
        let by_id = Locator::css(&selectors.prompt_textarea_id);
        let prompt_box = if self.inspect(&by_id, false).await?.found {
            by_id
        } else {
            Locator::placeholder(&selectors.prompt_placeholder)
        };

        self.click(&prompt_box).await?;
        self.session
            .evaluate_script(&format!(
                "(() => {{ const el = document.querySelector({}); if (el) {{ el.focus(); if (el.select) el.select(); }} }})()",
                js_str(MARKED_SELECTOR)
            ))
            .await?;
        self.session.press_key("Backspace").await?;

        for ch in prompt.chars() {
            self.session.type_text(ch.encode_utf8(&mut [0u8; 4])).await?;
            tokio::time::sleep(self.human.keystroke_delay()).await;
        }
        self.human.beat().await;
        debug!("Typed {} characters", prompt.chars().count());
        Ok(())
    }

    /// Click Create once it enables
    ///
    /// Fails with [`FlowError::SubmitDisabled`] if it stays disabled.
    #[instrument(skip(self))]
    pub async fn click_create(&self) -> Result<()> {
        let label = &self.config.selectors.create_button;
        let create = Locator::button(label);
        self.wait_for(&create, DEFAULT_WAIT).await?;

        let start = Instant::now();
        let mut last_log: Option<Instant> = None;
        loop {
            if self.inspect(&create, false).await?.enabled {
                break;
            }
            if start.elapsed() >= CREATE_ENABLE_TIMEOUT {
                self.debug_screenshot("debug_create_disabled").await;
                return Err(FlowError::SubmitDisabled {
                    label: label.clone(),
                    waited: CREATE_ENABLE_TIMEOUT,
                });
            }
            if last_log.map_or(true, |t| t.elapsed() >= Duration::from_secs(10)) {
                info!(
                    "Waiting for '{}' to enable ({}s)",
                    label,
                    start.elapsed().as_secs()
                );
                last_log = Some(Instant::now());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        self.click_now(&create).await
    }

    /// Wait for result tiles, then for the first row to carry media URLs
    pub async fn wait_for_top_row(&self, tiles_timeout: Duration, urls_timeout: Duration) -> Result<Snapshot> {
        let tiles = Locator::css(&self.config.selectors.tile_container);
        let start = Instant::now();
        while !self.inspect(&tiles, false).await?.found {
            if start.elapsed() >= tiles_timeout {
                return Err(FlowError::ElementNotFound {
                    selector: tiles.describe(),
                });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let start = Instant::now();
        loop {
            let snapshot = self.read_snapshot().await?;
            if !snapshot.is_empty() || start.elapsed() >= urls_timeout {
                return Ok(snapshot);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn try_retry(&self) -> Result<bool> {
        let reuse = Locator::button(&self.config.selectors.reuse_prompt_button);
        self.wait_for(&reuse, Duration::from_secs(5)).await?;
        self.click_now(&reuse).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let create = Locator::button(&self.config.selectors.create_button);
        let state = self.wait_for(&create, Duration::from_secs(5)).await?;
        if !state.enabled {
            return Ok(false);
        }
        self.click_now(&create).await?;
        Ok(true)
    }
}

#[async_trait]
impl OverlaySurface for FlowPage {
    async fn is_visible(&self, target: &Locator) -> Result<bool> {
        let state = self.inspect(target, false).await?;
        Ok(state.found && state.visible)
    }

    async fn click(&self, target: &Locator) -> Result<()> {
        self.click_now(target).await
    }

    async fn press_escape(&self) -> Result<()> {
        self.session.press_key("Escape").await
    }

    async fn pause(&self, min_ms: u64, max_ms: u64) {
        self.human.pause(min_ms, max_ms).await;
    }
}

#[async_trait]
impl GenerationDriver for FlowPage {
    #[instrument(skip(self))]
    async fn submit_generation(&self) -> Result<()> {
        self.fill_prompt(&self.prompt).await?;
        info!("Prompt entered");
        self.click_create().await
    }

    async fn read_snapshot(&self) -> Result<Snapshot> {
        let value = self
            .session
            .evaluate_script(&snapshot_script(&self.config.selectors.tile_container))
            .await?;
        Ok(parse_snapshot(&value))
    }

    async fn dismiss_popups(&self, max_attempts: usize) -> Result<usize> {
        Ok(self.sweep_popups(max_attempts).await)
    }

    async fn is_generation_failed(&self) -> Result<bool> {
        let value = self
            .session
            .evaluate_script(&visible_text_script(
                &self.config.selectors.failed_generation_text,
            ))
            .await;
        match value {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(e) => {
                debug!("Failed-generation probe errored: {}", e);
                Ok(false)
            }
        }
    }

    async fn detect_backend_error(&self) -> Result<Option<String>> {
        let value = self.session.evaluate_script(BODY_TEXT_SCRIPT).await?;
        Ok(value.as_str().and_then(|text| self.matcher.find(text)))
    }

    async fn check_error_banner(&self) -> Result<Option<String>> {
        let value = self
            .session
            .evaluate_script(&error_banner_script(&self.config.selectors.error_banner))
            .await?;
        Ok(value.as_str().and_then(classify_alert))
    }

    #[instrument(skip(self))]
    async fn retry_generation(&self) -> Result<bool> {
        match self.try_retry().await {
            Ok(dispatched) => Ok(dispatched),
            Err(e) => {
                warn!("Retry action failed: {}", e);
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    async fn clear_cache_and_reload(&self) -> Result<()> {
        self.session.clear_cache_and_storage().await?;
        info!("Cache and storage cleared, reloading");
        self.session.hard_reload().await?;
        self.session.wait_for_quiescence(SETTLE_TIMEOUT).await
    }

    async fn wait_until_settled(&self) -> Result<()> {
        self.session.wait_for_quiescence(SETTLE_TIMEOUT).await
    }

    async fn capture_debug_screenshot(&self, name: &str) -> Result<Option<PathBuf>> {
        Ok(Some(save_debug_screenshot(&self.session, name).await?))
    }
}
