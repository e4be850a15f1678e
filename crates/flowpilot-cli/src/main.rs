//! Flowpilot CLI - drive Flow video generation from the terminal
//!
//! Usage:
//!   flowpilot init                 Write .flowpilot/config.toml with defaults
//!   flowpilot login                Open Flow so you can sign in
//!   flowpilot run <prompt>         Generate videos for a prompt and download them
//!   flowpilot download [url]       Download the newest row of an existing project

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowpilot_browser::{BrowserSession, Downloader, FlowPage};
use flowpilot_core::{FlowConfig, FlowError, Snapshot};
use flowpilot_engine::{GenerationCycle, TokioClock};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// How long `download` waits for the top row to show media
const TOP_ROW_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "flowpilot")]
#[command(author, version, about = "Drive Flow video generation through Chrome")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: .flowpilot/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// DevTools port of a running Chrome
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Launch a new browser instead of connecting
    #[arg(long, global = true)]
    launch: bool,

    /// Run the launched browser headless
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Open Flow in the browser and wait while you sign in
    Login,

    /// Create a project, generate videos for a prompt and download them
    Run {
        /// Prompt text (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Give up waiting for results after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Outputs per prompt (overrides settings.outputs_per_prompt)
        #[arg(long)]
        outputs: Option<String>,
    },

    /// Download the newest row of videos from a project
    Download {
        /// Project URL (default: the page already open)
        url: Option<String>,
    },
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Default, Clone)]
struct Overrides {
    port: Option<u16>,
    launch: bool,
    headless: bool,
    timeout_secs: Option<u64>,
    outputs: Option<String>,
}

impl Overrides {
    fn apply(&self, config: &mut FlowConfig) {
        if let Some(port) = self.port {
            config.browser.debug_port = port;
        }
        if self.launch {
            config.browser.launch = true;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(secs) = self.timeout_secs {
            config.generation.max_wait_ms = secs.saturating_mul(1000);
        }
        if let Some(outputs) = &self.outputs {
            config.settings.outputs_per_prompt = outputs.clone();
        }
    }
}

/// Numbers the workflow steps in the log
#[derive(Debug, Default)]
struct StepLog {
    current: usize,
}

impl StepLog {
    fn step(&mut self, message: &str) -> usize {
        self.current += 1;
        info!("[step {}] {}", self.current, message);
        self.current
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut overrides = Overrides {
        port: cli.port,
        launch: cli.launch,
        headless: cli.headless,
        ..Overrides::default()
    };

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Login => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_login(config).await
        }
        Commands::Run {
            prompt,
            timeout_secs,
            outputs,
        } => {
            overrides.timeout_secs = timeout_secs;
            overrides.outputs = outputs;
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_run(config, prompt.join(" ").trim().to_string()).await
        }
        Commands::Download { url } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_download(config, url).await
        }
    }
}

fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<FlowConfig> {
    let mut config = match path {
        Some(path) => FlowConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("No working directory")?;
            FlowConfig::load_or_default(&cwd).context("Failed to load .flowpilot/config.toml")?
        }
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn cmd_init(path: &Path) -> Result<()> {
    let written = FlowConfig::write_default(path).context("Failed to write config")?;

    println!("Initialized Flowpilot in {:?}", path);
    println!("Created:");
    println!("  {}", written.display());
    println!();
    println!("Start Chrome with --remote-debugging-port=9222, then run `flowpilot login`.");
    Ok(())
}

async fn open_page(config: FlowConfig) -> Result<FlowPage> {
    let session = BrowserSession::open(&config.browser, &config.url)
        .await
        .context("Failed to open browser")?;
    Ok(FlowPage::new(session, config)?)
}

async fn cmd_login(config: FlowConfig) -> Result<()> {
    let launched = config.browser.launch;
    let page = open_page(config).await?;
    page.open_flow().await?;

    println!("Flow is open. Sign in in the browser window.");
    if launched {
        println!("Note: a launched browser uses a throwaway profile; connect to your own Chrome to keep the login.");
    }
    println!("Press Enter when you are done...");

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;

    info!("Login finished");
    Ok(())
}

async fn cmd_run(config: FlowConfig, prompt: String) -> Result<()> {
    if prompt.is_empty() {
        anyhow::bail!("Prompt must not be empty");
    }

    let mut steps = StepLog::default();
    info!("Prompt: {}", prompt);

    steps.step("Open browser");
    let expected = config.expected_outputs();
    let min_outputs = config.generation.min_outputs;
    let timeout = config.generation.max_wait();
    let generation = config.generation.clone();
    let download_dir = PathBuf::from(&config.browser.download_dir);
    let settings = config.settings.clone();
    let mode = config.mode_option_label.clone();

    let mut page = open_page(config).await?;
    page.set_prompt(prompt);

    steps.step("Open Flow");
    page.open_flow().await?;

    steps.step("Create project");
    let dismissed = page.open_new_project().await?;
    if dismissed > 0 {
        info!("Closed {} popup(s)", dismissed);
    }

    steps.step("Configure settings");
    page.configure_settings().await?;
    info!("Aspect ratio: {}", settings.aspect_ratio);
    info!("Outputs per prompt: {}", settings.outputs_per_prompt);
    info!("Model: {}", settings.model);

    steps.step("Select mode");
    page.select_mode().await?;
    info!("Mode: {}", mode);

    steps.step("Generate");
    let clock = TokioClock::new();
    let cycle = GenerationCycle::new(&page, &clock, &generation)?;
    let output = cycle.run(expected, timeout).await?;
    if output.reason.is_partial() {
        warn!(
            "Generation ended early ({:?}) with {} of {} results",
            output.reason,
            output.urls.len(),
            expected
        );
    }
    ensure_min_outputs(&output.urls, min_outputs)?;

    steps.step("Download videos");
    let downloader = Downloader::new(download_dir, page.human().clone());
    let saved = downloader.download_all(&output.urls, "flow").await?;

    info!(
        "Done: {} video(s) in {} after {} attempt(s)",
        saved.len(),
        downloader.dir().display(),
        output.attempts
    );
    Ok(())
}

async fn cmd_download(config: FlowConfig, url: Option<String>) -> Result<()> {
    let mut steps = StepLog::default();
    let tiles_timeout = config.generation.max_wait();
    let download_dir = PathBuf::from(&config.browser.download_dir);

    steps.step("Open browser");
    let page = open_page(config).await?;

    steps.step("Open project");
    match &url {
        Some(url) => page.open_project(url).await?,
        None => info!("Using the page already open"),
    }

    steps.step("Find videos");
    let urls = page.wait_for_top_row(tiles_timeout, TOP_ROW_TIMEOUT).await?;
    if urls.is_empty() {
        anyhow::bail!("No videos found in the top row");
    }
    info!("Found {} video(s)", urls.len());

    steps.step("Download videos");
    let downloader = Downloader::new(download_dir, page.human().clone());
    let saved = downloader.download_all(&urls, "flow").await?;

    info!("Done: {} video(s) in {}", saved.len(), downloader.dir().display());
    Ok(())
}

/// Undersized final results are fatal above the engine
fn ensure_min_outputs(urls: &Snapshot, min_outputs: usize) -> std::result::Result<(), FlowError> {
    if urls.len() < min_outputs {
        return Err(FlowError::NoResults {
            expected: min_outputs,
            found: urls.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_joins_prompt() {
        let cli = Cli::try_parse_from([
            "flowpilot",
            "--port",
            "9333",
            "run",
            "a",
            "paper",
            "boat",
            "--timeout-secs",
            "90",
            "--outputs",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(9333));
        match cli.command {
            Commands::Run {
                prompt,
                timeout_secs,
                outputs,
            } => {
                assert_eq!(prompt.join(" "), "a paper boat");
                assert_eq!(timeout_secs, Some(90));
                assert_eq!(outputs.as_deref(), Some("2"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_prompt() {
        assert!(Cli::try_parse_from(["flowpilot", "run"]).is_err());
    }

    #[test]
    fn test_parse_download_optional_url() {
        let cli = Cli::try_parse_from(["flowpilot", "download", "--launch"]).unwrap();
        assert!(cli.launch);
        assert!(matches!(cli.command, Commands::Download { url: None }));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = FlowConfig::default();
        Overrides {
            port: Some(9333),
            launch: true,
            headless: true,
            timeout_secs: Some(90),
            outputs: Some("2".to_string()),
        }
        .apply(&mut config);

        assert_eq!(config.browser.debug_port, 9333);
        assert!(config.browser.launch);
        assert!(config.browser.headless);
        assert_eq!(config.generation.max_wait(), Duration::from_secs(90));
        assert_eq!(config.expected_outputs(), 2);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = FlowConfig::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config.browser.debug_port, 9222);
        assert!(!config.browser.launch);
        assert_eq!(config.expected_outputs(), 4);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("flow.toml");
        std::fs::write(&path, "[generation]\nmax_retries = 1\n").unwrap();

        let config = load_config(Some(&path), &Overrides::default()).unwrap();
        assert_eq!(config.generation.max_retries, 1);
    }

    #[test]
    fn test_step_log_counts() {
        let mut steps = StepLog::default();
        assert_eq!(steps.step("Open browser"), 1);
        assert_eq!(steps.step("Open Flow"), 2);
    }

    #[test]
    fn test_min_outputs() {
        let urls = Snapshot::from(vec!["a"]);
        assert!(ensure_min_outputs(&urls, 1).is_ok());
        assert!(matches!(
            ensure_min_outputs(&Snapshot::empty(), 1),
            Err(FlowError::NoResults { expected: 1, found: 0 })
        ));
    }
}
