//! ReviewGate - concurrent multi-analyzer review gate
//!
//! Reviews a local change set with security, quality, coverage,
//! documentation and AI analyzers and routes it to a decision.
//!
//! Exit codes:
//!   0 - Change approved
//!   1 - Runtime error (bad config, unreadable input, etc.)
//!   2 - Change not approved (review routing or review error)

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reviewgate::analyzer::{
    AnalyzerRegistry, CoverageAnalyzer, DocumentationAnalyzer, OllamaReviewAnalyzer,
    PatternSecurityAnalyzer, PylintAnalyzer,
};
use reviewgate::cli::{Args, OutputFormat};
use reviewgate::config::{Config, CONFIG_FILE};
use reviewgate::decision::DecisionEngine;
use reviewgate::models::{ChangeId, Outcome};
use reviewgate::notify::LogNotifier;
use reviewgate::report;
use reviewgate::scanner::ScanConfig;
use reviewgate::source::LocalDirectoryProvider;
use reviewgate::workflow::{ReviewState, ReviewWorkflow};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // `general.verbose` feeds the log level, so config loads first
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(args.quiet));

    info!("ReviewGate v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);
    debug!("Arguments: {:?}", args);

    match run_review(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Review failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default configuration file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize thresholds, timeouts, tools and the AI model.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one review end to end. Returns the exit code (0 or 2).
async fn run_review(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.validate().context("Invalid configuration")?;

    let Some(local) = args.local.clone() else {
        anyhow::bail!("--local is required");
    };
    let repo = args.repo_id();
    let change = ChangeId::from(args.change.clone());

    println!("🔍 Reviewing {} change {}", repo, change);
    println!("   Source: {}", local.display());
    println!("   AI model: {} at {}", config.ollama.model, config.ollama.url);
    println!("   Analyzer timeout: {}s", config.dispatch.timeout_seconds);

    let registry = build_registry(&config)?;
    let engine = DecisionEngine::new(config.thresholds).context("Invalid thresholds")?;
    let workflow = ReviewWorkflow::new(registry, engine, Arc::new(LogNotifier::new()))
        .context("Analyzers do not cover every threshold")?
        .with_dispatch_config(config.dispatch_config())
        .with_notify_timeout(config.notify_timeout());

    let provider =
        LocalDirectoryProvider::new(local).with_scan_config(ScanConfig::from(&config.scanner));

    let spinner = review_spinner(args.quiet, workflow.registry().len());
    let state = workflow
        .review_change(&provider, &repo, &change)
        .await
        .context("Review workflow broke a stage rule")?;
    spinner.finish_and_clear();

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&state)?,
        OutputFormat::Markdown => report::generate_markdown_report(&state),
    };

    let output_path = &config.general.output;
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path))?;

    print_summary(&state, start_time.elapsed());
    println!("\n📝 Report saved to: {}", output_path);

    Ok(exit_code(&state))
}

fn build_registry(config: &Config) -> Result<AnalyzerRegistry> {
    let ai_review =
        OllamaReviewAnalyzer::new(config.ollama.clone()).context("Failed to build HTTP client")?;

    let mut registry = AnalyzerRegistry::new();
    registry
        .register_with(
            Arc::new(PatternSecurityAnalyzer::new()),
            config.registration_options("security"),
        )?
        .register_with(
            Arc::new(
                PylintAnalyzer::new(config.tools.pylint.clone())
                    .with_args(config.tools.pylint_args.clone()),
            ),
            config.registration_options("quality"),
        )?
        .register_with(
            Arc::new(CoverageAnalyzer::new(config.tools.python.clone())),
            config.registration_options("coverage"),
        )?
        .register_with(Arc::new(ai_review), config.registration_options("ai_review"))?
        .register_with(
            Arc::new(DocumentationAnalyzer::new()),
            config.registration_options("documentation"),
        )?;

    for name in &config.dispatch.non_blocking {
        if registry.get(name).is_none() {
            warn!("dispatch.non_blocking names unknown analyzer '{}'", name);
        }
    }

    Ok(registry)
}

fn review_spinner(quiet: bool, analyzers: usize) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        Ok(style) => pb.set_style(style),
        Err(e) => debug!("Spinner template rejected: {}", e),
    }
    pb.set_message(format!("Running {} analyzers...", analyzers));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary(state: &ReviewState, elapsed: Duration) {
    println!("\n📊 Review Summary:");
    println!("   Review: {}", state.id());
    println!("   Stage: {}", state.stage());

    if let Some(snapshot) = state.snapshot() {
        println!(
            "   Analyzers: {} succeeded, {} failed",
            snapshot.success_count(),
            snapshot.failure_count()
        );
    }

    match state.decision() {
        Some(decision) => {
            println!("   Decision: {} {}", decision.outcome.emoji(), decision.outcome);
            for reason in &decision.reasons {
                println!("     - {}", reason);
            }
        }
        None => println!("   Decision: none"),
    }

    let failed = state
        .notifications()
        .iter()
        .filter(|n| !n.outcome.is_delivered())
        .count();
    if failed > 0 {
        println!("   ⚠️  {} notifications could not be delivered", failed);
    }
    println!("   Duration: {:.1}s", elapsed.as_secs_f64());
}

fn exit_code(state: &ReviewState) -> i32 {
    match state.decision().map(|d| d.outcome) {
        Some(Outcome::Approve) => 0,
        _ => 2,
    }
}

/// Load configuration from file or use defaults. Runs before logging is
/// set up, so it returns a description of where the config came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    match Config::load_default()? {
        Some(config) => Ok((config, CONFIG_FILE.to_string())),
        None => Ok((Config::default(), "defaults".to_string())),
    }
}
