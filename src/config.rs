//! Configuration for fxgen, read from `.fxgen/fxgen.toml`.
//!
//! Layered: file → environment → CLI flags. Environment variables are read
//! after `dotenvy` has loaded any `.env` file in the project directory.
//!
//! # Configuration File Format
//!
//! ```toml
//! [scheduler]
//! max_concurrent = 5
//! tick_interval_ms = 2000
//! progress_step_delay_ms = 500
//! progress_checkpoints = [10, 25, 40, 60, 80, 95]
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! db_path = ".fxgen/fxgen.db"
//!
//! [logging]
//! filter = "fxgen=info,tower_http=info"
//! json = false
//! directory = ".fxgen/logs"
//! ```

use anyhow::{Context, Result};
use fxgen_common::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".fxgen";
pub const CONFIG_FILE: &str = "fxgen.toml";

pub const ENV_MAX_CONCURRENT: &str = "FXGEN_MAX_CONCURRENT";
pub const ENV_PORT: &str = "FXGEN_PORT";
pub const ENV_DB_PATH: &str = "FXGEN_DB_PATH";
pub const ENV_LOG: &str = "FXGEN_LOG";

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Ceiling on jobs processed at once (clamped to 1..=10 at runtime)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Period of the admission tick
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Delay between progress checkpoints
    #[serde(default = "default_progress_step_delay_ms")]
    pub progress_step_delay_ms: u64,
    /// Progress values written while a job is processing
    #[serde(default = "default_progress_checkpoints")]
    pub progress_checkpoints: Vec<u8>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            tick_interval_ms: default_tick_interval_ms(),
            progress_step_delay_ms: default_progress_step_delay_ms(),
            progress_checkpoints: default_progress_checkpoints(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn progress_step_delay(&self) -> Duration {
        Duration::from_millis(self.progress_step_delay_ms)
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_tick_interval_ms() -> u64 {
    2000
}

fn default_progress_step_delay_ms() -> u64 {
    500
}

fn default_progress_checkpoints() -> Vec<u8> {
    vec![10, 25, 40, 60, 80, 95]
}

/// HTTP server and storage location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database path; relative paths resolve against the project directory
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("fxgen.db")
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rotated log files here
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            directory: None,
        }
    }
}

fn default_log_filter() -> String {
    "fxgen=info,tower_http=info".to_string()
}

/// Contents of `fxgen.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FxgenToml {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FxgenToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse fxgen.toml")
    }

    /// Load `fxgen.toml` from the config directory, or defaults if absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize fxgen.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Vec<String> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Returns warnings for values that could not be parsed; those are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();

        if let Some(raw) = lookup(ENV_MAX_CONCURRENT) {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.scheduler.max_concurrent = n,
                Err(_) => warnings.push(format!("Ignoring {}='{}': not a number", ENV_MAX_CONCURRENT, raw)),
            }
        }
        if let Some(raw) = lookup(ENV_PORT) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warnings.push(format!("Ignoring {}='{}': not a port", ENV_PORT, raw)),
            }
        }
        if let Some(raw) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.server.db_path = PathBuf::from(raw.trim());
        }
        if let Some(raw) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.logging.filter = raw.trim().to_string();
        }

        warnings
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let sched = &self.scheduler;

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&sched.max_concurrent) {
            warnings.push(format!(
                "max_concurrent = {} is outside {}..={}; it will be clamped",
                sched.max_concurrent, MIN_CONCURRENCY, MAX_CONCURRENCY
            ));
        }
        if sched.tick_interval_ms == 0 {
            warnings.push("tick_interval_ms must be greater than 0".to_string());
        }
        if sched.progress_checkpoints.windows(2).any(|w| w[0] >= w[1]) {
            warnings.push(format!(
                "progress_checkpoints {:?} must be strictly increasing",
                sched.progress_checkpoints
            ));
        }
        if sched.progress_checkpoints.iter().any(|&p| p >= 100) {
            warnings.push("progress_checkpoints must all be below 100".to_string());
        }
        if self.server.port == 0 {
            warnings.push("server.port = 0 binds a random port".to_string());
        }
        if let Err(e) = self.logging.filter.parse::<tracing_subscriber::EnvFilter>() {
            warnings.push(format!("Invalid logging.filter '{}': {}", self.logging.filter, e));
        }

        warnings
    }
}

/// Resolved configuration for one project directory.
///
/// Merges:
/// 1. fxgen.toml file
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct FxgenConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .fxgen directory
    pub config_dir: PathBuf,
    /// Parsed fxgen.toml with env overrides applied
    pub toml: FxgenToml,
    /// Warnings produced while applying env overrides
    pub env_warnings: Vec<String>,
}

impl FxgenConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        // A missing .env is the common case.
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = FxgenToml::load_or_default(&config_dir)?;
        let env_warnings = toml.apply_env();

        Ok(Self {
            project_dir,
            config_dir,
            toml,
            env_warnings,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Database path resolved against the project directory.
    pub fn db_path(&self) -> PathBuf {
        let path = &self.toml.server.db_path;
        if path.is_absolute() {
            path.clone()
        } else {
            self.project_dir.join(path)
        }
    }

    /// Log directory resolved against the project directory, if configured.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.toml.logging.directory.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.project_dir.join(dir)
            }
        })
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.env_warnings.clone();
        warnings.extend(self.toml.validate());
        warnings
    }
}
