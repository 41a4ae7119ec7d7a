//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/runscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/runscope/` (~/.config/runscope/)
//! - State/Logs: `$XDG_STATE_HOME/runscope/` (~/.local/state/runscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Trace server connection
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Viewer behaviour
    #[serde(default)]
    pub viewer: ViewerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Frame recording (optional)
    #[serde(default)]
    pub recording: RecordingConfig,
}

/// Trace server connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint. A `#<run id>` fragment selects that run on start.
    #[serde(default = "default_url")]
    pub url: String,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Random spread applied to each delay, as a fraction of it
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Consecutive failed connects before giving up (unlimited when unset)
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter_ratio: default_jitter_ratio(),
            max_retries: None,
        }
    }
}

impl ConnectionConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url).map_err(|e| {
            Error::Config(format!("connection.url {:?} is not a URL: {}", self.url, e))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "connection.url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        if self.initial_backoff_ms == 0 {
            return Err(Error::Config(
                "connection.initial_backoff_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(Error::Config(
                "connection.max_backoff_ms must not be less than initial_backoff_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(Error::Config(
                "connection.jitter_ratio must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:4444/client".to_string()
}

fn default_initial_backoff() -> u64 {
    250
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

/// Viewer behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct ViewerConfig {
    /// Quiet period before a run selection takes effect, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Reopen the last viewed run when no run is given on the command line
    #[serde(default = "default_restore_last_run")]
    pub restore_last_run: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            restore_last_run: default_restore_last_run(),
        }
    }
}

impl ViewerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_restore_last_run() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Frame recording
///
/// When a directory is set, every applied frame is appended to
/// `<directory>/<run id>.jsonl`.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RecordingConfig {
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Check every section that has constraints
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/runscope/config.toml` (~/.config/runscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("runscope").join("config.toml")
    }

    /// Returns the state directory path (for logs and preferences)
    ///
    /// `$XDG_STATE_HOME/runscope/` (~/.local/state/runscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("runscope")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/runscope/runscope.log` (~/.local/state/runscope/runscope.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("runscope.log")
    }

    /// Returns the preferences file path
    ///
    /// `$XDG_STATE_HOME/runscope/preferences.toml`
    pub fn preferences_path() -> PathBuf {
        Self::state_dir().join("preferences.toml")
    }
}
