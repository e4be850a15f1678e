//! Configuration management for Flowpilot
//!
//! Every field has a default, so a partial `.flowpilot/config.toml` only needs
//! to name what it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{BackendErrorMatcher, FlowError, Result};

/// Top-level Flowpilot configuration
///
/// Loaded from `.flowpilot/config.toml` under the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Flow landing page
    #[serde(default = "default_url")]
    pub url: String,

    /// Generation mode to pick from the mode menu (empty to skip)
    #[serde(default = "default_mode_option_label")]
    pub mode_option_label: String,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub selectors: Selectors,

    #[serde(default)]
    pub human: HumanDelay,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub browser: BrowserSettings,
}

/// Values picked in the project settings dialog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    #[serde(default = "default_outputs_per_prompt")]
    pub outputs_per_prompt: String,

    #[serde(default = "default_model")]
    pub model: String,
}

/// Labels and CSS selectors of the controls Flowpilot touches
///
/// Label fields are matched as case-insensitive substrings of the element's
/// text or `aria-label`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selectors {
    #[serde(default = "default_new_project_button")]
    pub new_project_button: String,

    #[serde(default = "default_settings_button")]
    pub settings_button: String,

    #[serde(default = "default_prompt_textarea_id")]
    pub prompt_textarea_id: String,

    #[serde(default = "default_prompt_placeholder")]
    pub prompt_placeholder: String,

    #[serde(default = "default_mode_button")]
    pub mode_button: String,

    #[serde(default = "default_create_button")]
    pub create_button: String,

    #[serde(default = "default_tile_container")]
    pub tile_container: String,

    #[serde(default = "default_failed_generation_text")]
    pub failed_generation_text: String,

    #[serde(default = "default_reuse_prompt_button")]
    pub reuse_prompt_button: String,

    #[serde(default = "default_error_banner")]
    pub error_banner: String,
}

/// Bounds for randomized pauses and typing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanDelay {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the per-keystroke delay
    #[serde(default = "default_type_delay_ms")]
    pub type_delay_ms: u64,
}

/// Polling loop and retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Wall-clock budget of one polling loop
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Consecutive identical reads required before a result is trusted
    #[serde(default = "default_stable_checks")]
    pub stable_checks: u32,

    /// In-place retries after a "failed generation" banner
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Full submissions allowed while the backend looks broken
    #[serde(default = "default_max_cache_retries")]
    pub max_cache_retries: u32,

    /// Fewer final results than this is fatal
    #[serde(default = "default_min_outputs")]
    pub min_outputs: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_popup_check_interval_ms")]
    pub popup_check_interval_ms: u64,

    #[serde(default = "default_broken_check_interval_ms")]
    pub broken_check_interval_ms: u64,

    /// Pause before retrying a failed generation
    #[serde(default = "default_failure_cooldown_ms")]
    pub failure_cooldown_ms: u64,

    #[serde(default = "default_popup_max_attempts")]
    pub popup_max_attempts: usize,

    /// Phrases (regex, case-insensitive) that mark the page as broken
    #[serde(default = "default_backend_error_patterns")]
    pub backend_error_patterns: Vec<String>,
}

/// How to reach the browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// DevTools port of an already running Chrome
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    /// Launch a fresh browser instead of connecting
    #[serde(default)]
    pub launch: bool,

    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    #[serde(default = "default_download_dir")]
    pub download_dir: String,
}

// Default value providers
fn default_url() -> String {
    "https://labs.google/fx/tools/flow".to_string()
}

fn default_mode_option_label() -> String {
    "Text to Video".to_string()
}

fn default_aspect_ratio() -> String {
    "Portrait (9:16)".to_string()
}

fn default_outputs_per_prompt() -> String {
    "4".to_string()
}

fn default_model() -> String {
    "Veo 3.1 - Fast".to_string()
}

fn default_new_project_button() -> String {
    "New project".to_string()
}

fn default_settings_button() -> String {
    "Settings".to_string()
}

fn default_prompt_textarea_id() -> String {
    "#PINHOLE_TEXT_AREA_ELEMENT_ID".to_string()
}

fn default_prompt_placeholder() -> String {
    "Generate a video with text".to_string()
}

fn default_mode_button() -> String {
    "Text to Video".to_string()
}

fn default_create_button() -> String {
    "Create".to_string()
}

fn default_tile_container() -> String {
    "[data-virtuoso-scroller] [data-index]".to_string()
}

fn default_failed_generation_text() -> String {
    "Failed Generation".to_string()
}

fn default_reuse_prompt_button() -> String {
    "Reuse prompt".to_string()
}

fn default_error_banner() -> String {
    r#"[role="alert"], .error-message"#.to_string()
}

fn default_min_delay_ms() -> u64 {
    120
}

fn default_max_delay_ms() -> u64 {
    320
}

fn default_type_delay_ms() -> u64 {
    60
}

fn default_max_wait_ms() -> u64 {
    300_000
}

fn default_stable_checks() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_cache_retries() -> u32 {
    3
}

fn default_min_outputs() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_popup_check_interval_ms() -> u64 {
    30_000
}

fn default_broken_check_interval_ms() -> u64 {
    2_000
}

fn default_failure_cooldown_ms() -> u64 {
    60_000
}

fn default_popup_max_attempts() -> usize {
    3
}

fn default_backend_error_patterns() -> Vec<String> {
    vec![
        "something went wrong".to_string(),
        r"an error (has )?occurred".to_string(),
        "please try again later".to_string(),
        "internal error".to_string(),
        "出错了".to_string(),
        "发生错误".to_string(),
        "请稍后重试".to_string(),
    ]
}

fn default_debug_port() -> u16 {
    9222
}

fn default_window_width() -> u32 {
    1440
}

fn default_window_height() -> u32 {
    900
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

impl FlowConfig {
    /// Load configuration from `.flowpilot/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".flowpilot/config.toml");

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            FlowError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.flowpilot/config.toml`
    pub fn write_default(root: &Path) -> Result<std::path::PathBuf> {
        let config_dir = root.join(".flowpilot");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject budgets the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let g = &self.generation;
        if g.stable_checks == 0 {
            return Err(FlowError::Config("stable_checks must be at least 1".to_string()));
        }
        if g.max_cache_retries == 0 {
            return Err(FlowError::Config(
                "max_cache_retries must be at least 1".to_string(),
            ));
        }
        if g.poll_interval_ms == 0 {
            return Err(FlowError::Config("poll_interval_ms must be positive".to_string()));
        }
        if g.backend_error_patterns.is_empty() {
            return Err(FlowError::Config(
                "backend_error_patterns must not be empty".to_string(),
            ));
        }
        BackendErrorMatcher::new(&g.backend_error_patterns)?;
        if self.human.min_delay_ms > self.human.max_delay_ms {
            return Err(FlowError::Config(
                "human.min_delay_ms exceeds human.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of results one submission is expected to produce
    pub fn expected_outputs(&self) -> usize {
        self.settings
            .outputs_per_prompt
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }
}

impl GenerationConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn popup_check_interval(&self) -> Duration {
        Duration::from_millis(self.popup_check_interval_ms)
    }

    pub fn broken_check_interval(&self) -> Duration {
        Duration::from_millis(self.broken_check_interval_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }

    pub fn error_matcher(&self) -> Result<BackendErrorMatcher> {
        BackendErrorMatcher::new(&self.backend_error_patterns)
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            mode_option_label: default_mode_option_label(),
            settings: Settings::default(),
            selectors: Selectors::default(),
            human: HumanDelay::default(),
            generation: GenerationConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aspect_ratio: default_aspect_ratio(),
            outputs_per_prompt: default_outputs_per_prompt(),
            model: default_model(),
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            new_project_button: default_new_project_button(),
            settings_button: default_settings_button(),
            prompt_textarea_id: default_prompt_textarea_id(),
            prompt_placeholder: default_prompt_placeholder(),
            mode_button: default_mode_button(),
            create_button: default_create_button(),
            tile_container: default_tile_container(),
            failed_generation_text: default_failed_generation_text(),
            reuse_prompt_button: default_reuse_prompt_button(),
            error_banner: default_error_banner(),
        }
    }
}

impl Default for HumanDelay {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            type_delay_ms: default_type_delay_ms(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            stable_checks: default_stable_checks(),
            max_retries: default_max_retries(),
            max_cache_retries: default_max_cache_retries(),
            min_outputs: default_min_outputs(),
            poll_interval_ms: default_poll_interval_ms(),
            popup_check_interval_ms: default_popup_check_interval_ms(),
            broken_check_interval_ms: default_broken_check_interval_ms(),
            failure_cooldown_ms: default_failure_cooldown_ms(),
            popup_max_attempts: default_popup_max_attempts(),
            backend_error_patterns: default_backend_error_patterns(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            launch: false,
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            download_dir: default_download_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.generation.stable_checks, 3);
        assert_eq!(config.generation.max_retries, 5);
        assert_eq!(config.generation.max_cache_retries, 3);
        assert_eq!(config.generation.max_wait(), Duration::from_secs(300));
        assert_eq!(config.browser.debug_port, 9222);
        assert_eq!(config.expected_outputs(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [generation]
            stable_checks = 5

            [settings]
            outputs_per_prompt = "2"
        "#;
        let config: FlowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation.stable_checks, 5);
        assert_eq!(config.generation.max_retries, 5);
        assert_eq!(config.settings.model, "Veo 3.1 - Fast");
        assert_eq!(config.expected_outputs(), 2);
    }

    #[test]
    fn test_expected_outputs_falls_back_to_one() {
        let mut config = FlowConfig::default();
        config.settings.outputs_per_prompt = "many".to_string();
        assert_eq!(config.expected_outputs(), 1);
        config.settings.outputs_per_prompt = "0".to_string();
        assert_eq!(config.expected_outputs(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_stability() {
        let mut config = FlowConfig::default();
        config.generation.stable_checks = 0;
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = FlowConfig::default();
        config.generation.backend_error_patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let config = FlowConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.url, "https://labs.google/fx/tools/flow");
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = TempDir::new().unwrap();
        let path = FlowConfig::write_default(dir.path()).unwrap();
        assert!(path.ends_with(".flowpilot/config.toml"));

        let config = FlowConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.selectors.create_button, "Create");
        assert_eq!(
            config.generation.backend_error_patterns,
            default_backend_error_patterns()
        );
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "generation = 5").unwrap();
        assert!(matches!(FlowConfig::load(&path), Err(FlowError::Config(_))));
    }
}
