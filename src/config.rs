//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reviewgate.toml` files.

use crate::analyzer::{OllamaConfig, RegistrationOptions};
use crate::decision::Thresholds;
use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".reviewgate.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Decision thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Analyzer dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// AI reviewer settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// External tools used by the quality and coverage analyzers.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Scanner settings for local change sets.
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "review_report.md".to_string()
}

/// How analyzers are scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Time budget per analyzer, in seconds.
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_seconds: u64,

    /// Per-analyzer overrides of `timeout_seconds`.
    #[serde(default)]
    pub analyzer_timeouts: BTreeMap<String, u64>,

    /// Analyzers the join does not wait for; cancelled if still running.
    #[serde(default)]
    pub non_blocking: Vec<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_analyzer_timeout(),
            analyzer_timeouts: BTreeMap::new(),
            non_blocking: Vec::new(),
        }
    }
}

fn default_analyzer_timeout() -> u64 {
    300
}

/// Notification delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Bound on a single delivery, in seconds.
    #[serde(default = "default_notify_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_notify_timeout(),
        }
    }
}

fn default_notify_timeout() -> u64 {
    30
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// pylint executable.
    #[serde(default = "default_pylint")]
    pub pylint: String,

    /// Extra arguments passed to pylint.
    #[serde(default)]
    pub pylint_args: Vec<String>,

    /// Python interpreter used to run pytest with coverage.
    #[serde(default = "default_python")]
    pub python: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pylint: default_pylint(),
            pylint_args: Vec::new(),
            python: default_python(),
        }
    }
}

fn default_pylint() -> String {
    "pylint".to_string()
}

fn default_python() -> String {
    "python".to_string()
}

/// File scanner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files in a change set.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Names to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    200
}

fn default_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_excludes() -> Vec<String> {
    crate::scanner::ScanConfig::default().excludes
}

fn default_max_file_size() -> u64 {
    1024 * 1024 // 1MB
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Log level for the run: `--quiet` wins, then `general.verbose`
    /// (set by the file or by `--verbose`).
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or through their environment
    /// variables) override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(timeout) = args.timeout {
            self.dispatch.timeout_seconds = timeout;
        }

        if let Some(ref model) = args.model {
            self.ollama.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.ollama.url = url.clone();
        }

        if let Some(value) = args.pylint_threshold {
            self.thresholds.pylint_min = value;
        }
        if let Some(value) = args.coverage_threshold {
            self.thresholds.coverage_min_pct = value;
        }
        if let Some(value) = args.ai_confidence_threshold {
            self.thresholds.ai_confidence_min = value;
        }
        if let Some(value) = args.security_threshold {
            self.thresholds.security_min = value;
        }
        if let Some(value) = args.documentation_threshold {
            self.thresholds.documentation_min_pct = value;
        }
    }

    /// Range-check thresholds and require every timeout to be at least one second.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        let mut timeouts = vec![
            ("dispatch.timeout_seconds".to_string(), self.dispatch.timeout_seconds),
            ("notify.timeout_seconds".to_string(), self.notify.timeout_seconds),
            ("ollama.timeout_seconds".to_string(), self.ollama.timeout_seconds),
        ];
        timeouts.extend(
            self.dispatch
                .analyzer_timeouts
                .iter()
                .map(|(name, secs)| (format!("dispatch.analyzer_timeouts.{}", name), *secs)),
        );

        match timeouts.into_iter().find(|(_, secs)| *secs == 0) {
            Some((field, _)) => Err(ConfigError::ZeroTimeout { field }),
            None => Ok(()),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            default_timeout: Duration::from_secs(self.dispatch.timeout_seconds),
        }
    }

    /// Registration options for the analyzer called `name`.
    pub fn registration_options(&self, name: &str) -> RegistrationOptions {
        let mut options = RegistrationOptions::default();
        if self.dispatch.non_blocking.iter().any(|n| n == name) {
            options = options.non_blocking();
        }
        if let Some(secs) = self.dispatch.analyzer_timeouts.get(name) {
            options = options.with_timeout(Duration::from_secs(*secs));
        }
        options
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_seconds)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
