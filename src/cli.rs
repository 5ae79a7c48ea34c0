//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::RepoId;
use clap::Parser;
use std::path::PathBuf;

/// ReviewGate - concurrent multi-analyzer review gate for Python changes
///
/// Runs security, quality, coverage, documentation and AI review
/// analyzers concurrently over a change set and routes it to APPROVE,
/// DOCUMENTATION_REVIEW, HUMAN_REVIEW or CRITICAL_ESCALATION.
///
/// Examples:
///   reviewgate --local ./my-change
///   reviewgate --local ./my-change --repo acme/shop --change 42 --format json
///   reviewgate --local ./my-change --pylint-threshold 8 --coverage-threshold 90
///   reviewgate --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory holding the change set to review
    #[arg(short, long, value_name = "DIR", required_unless_present = "init_config")]
    pub local: Option<PathBuf>,

    /// Repository the change belongs to (owner/repo or GitHub URL)
    ///
    /// Only used to label the review. Defaults to local/<directory name>.
    #[arg(short, long, value_name = "REPO")]
    pub repo: Option<String>,

    /// Change identifier (PR number, commit SHA or any label)
    #[arg(long, default_value = "local", value_name = "ID")]
    pub change: String,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reviewgate.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Per-analyzer timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Ollama model used by the AI reviewer
    #[arg(short, long, env = "REVIEWGATE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Minimum pylint score (0-10)
    #[arg(long, env = "PYLINT_THRESHOLD", value_name = "SCORE")]
    pub pylint_threshold: Option<f64>,

    /// Minimum test coverage percentage (0-100)
    #[arg(long, env = "COVERAGE_THRESHOLD", value_name = "PCT")]
    pub coverage_threshold: Option<f64>,

    /// Minimum AI reviewer confidence (0-1)
    #[arg(long, env = "AI_CONFIDENCE_THRESHOLD", value_name = "CONFIDENCE")]
    pub ai_confidence_threshold: Option<f64>,

    /// Minimum security score (0-10)
    #[arg(long, env = "SECURITY_THRESHOLD", value_name = "SCORE")]
    pub security_threshold: Option<f64>,

    /// Minimum documentation coverage percentage (0-100)
    #[arg(long, env = "DOCUMENTATION_THRESHOLD", value_name = "PCT")]
    pub documentation_threshold: Option<f64>,

    /// Generate a default .reviewgate.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref repo) = self.repo {
            RepoId::parse(repo).map_err(|e| e.to_string())?;
        }

        if self.change.trim().is_empty() {
            return Err("Change identifier must not be empty".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate local directory if provided
        if let Some(ref local_path) = self.local {
            if !local_path.exists() {
                return Err(format!(
                    "Local directory does not exist: {}",
                    local_path.display()
                ));
            }
            if !local_path.is_dir() {
                return Err(format!(
                    "Local path is not a directory: {}",
                    local_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Repository identity for the review label.
    pub fn repo_id(&self) -> RepoId {
        if let Some(repo) = self.repo.as_deref().and_then(|r| RepoId::parse(r).ok()) {
            return repo;
        }

        let name = self
            .local
            .as_ref()
            .and_then(|p| p.canonicalize().ok())
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "change".to_string());
        RepoId::new("local", name)
    }
}
