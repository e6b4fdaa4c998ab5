//! Solaudit - Security Analysis and Auto-Fix for Solidity Contracts
//!
//! A CLI tool that runs static-analysis tools in a sandbox, merges their
//! findings into one model, and can drive an iterative LLM fix loop.
//!
//! Exit codes:
//!   0 - Success (no critical or high severity issues remain)
//!   1 - Runtime error (config, IO, fixer endpoint, analysis failure)
//!   2 - Critical or high severity issues remain

mod analysis;
mod cli;
mod config;
mod fixer;
mod models;
mod normalize;
mod orchestrator;
mod registry;
mod report;
mod sandbox;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::{AnalysisResult, Severity};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
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

    // Initialize logging
    init_logging(&args);

    info!("Solaudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .solaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".solaudit.toml");

    if path.exists() {
        eprintln!("⚠️  .solaudit.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .solaudit.toml")?;

    println!("✅ Created .solaudit.toml with default settings.");
    println!("   Edit it to customize tools, sandbox backend, and the fixer.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete workflow. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let contract_path = args
        .contract
        .clone()
        .context("No contract path provided")?;
    let artifact = std::fs::read_to_string(&contract_path)
        .with_context(|| format!("Failed to read contract: {}", contract_path.display()))?;
    let artifact_id = contract_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("contract")
        .to_string();

    // Wire the analysis pipeline
    let registry = Arc::new(registry::ToolRegistry::builtin());
    if config.analysis.tools.is_empty() {
        config.analysis.tools = registry.ids();
    }
    let sandbox_env = sandbox::SandboxEnv {
        solc_version: config.sandbox.solc_version.clone(),
        offline: config.sandbox.offline,
    };
    let sandbox = sandbox::create_sandbox(config.sandbox.backend, sandbox_env);
    let analyzer: Arc<dyn analysis::Analyzer> = Arc::new(analysis::Aggregator::new(
        registry,
        sandbox,
        config.analysis.concurrency,
    ));

    // Ctrl-C cancels all in-flight tool runs.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling tool runs");
            ctrl_c_cancel.cancel();
        }
    });

    let timeout = config.analysis.timeout_seconds.map(Duration::from_secs);

    println!("🔬 Analyzing {} with: {}", artifact_id, config.analysis.tools.join(", "));

    let spinner = make_spinner(&args, "Running analysis tools...");
    let (output, exit_code) = if args.fix {
        let fixer_config = fixer::FixerConfig {
            endpoint: config.fixer.endpoint.clone(),
            model_name: config.fixer.model.clone(),
            temperature: config.fixer.temperature,
            timeout_seconds: config.fixer.timeout_seconds,
        };
        let llm_fixer: Arc<dyn fixer::Fixer> = Arc::new(fixer::LlmFixer::new(fixer_config)?);

        let orchestrator = orchestrator::FixOrchestrator::new(
            analyzer,
            llm_fixer,
            orchestrator::OrchestratorConfig {
                tools: config.analysis.tools.clone(),
                timeout,
                max_iterations: config.fixer.max_iterations,
            },
        );

        let run_result = orchestrator
            .run(&artifact, &artifact_id, &args.metadata(), &cancel)
            .await?;
        spinner.finish_and_clear();

        print_run_summary(&run_result);

        let exit_code = exit_code_for(&run_result.final_analysis);
        let output = match args.format {
            OutputFormat::Json => report::generate_run_json(&run_result)?,
            OutputFormat::Markdown => report::generate_run_markdown(&run_result),
        };
        (output, exit_code)
    } else {
        let result = analyzer
            .analyze(&artifact, &artifact_id, &config.analysis.tools, timeout, &cancel)
            .await;
        spinner.finish_and_clear();

        if !result.success {
            anyhow::bail!(
                "analysis produced no usable results: {}",
                result.warnings.join("; ")
            );
        }

        print_analysis_summary(&result);

        let exit_code = exit_code_for(&result);
        let output = match args.format {
            OutputFormat::Json => report::generate_analysis_json(&result)?,
            OutputFormat::Markdown => report::generate_analysis_markdown(&result),
        };
        (output, exit_code)
    };

    let output_path = std::path::PathBuf::from(&config.general.output);
    report::write_report(&output, &output_path)?;
    println!("\n✅ Report saved to: {}", output_path.display());

    Ok(exit_code)
}

fn make_spinner(args: &Args, message: &'static str) -> ProgressBar {
    if args.quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Print a severity summary to stdout.
fn print_analysis_summary(result: &AnalysisResult) {
    println!("\n📊 Analysis Summary:");
    println!(
        "   Tools succeeded: {}/{}",
        result.tools_succeeded.len(),
        result.tools_requested.len()
    );
    println!("   Total issues: {}", result.issues.len());
    println!(
        "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {} | ⚪ Info: {}",
        result.count_by_severity(Severity::Critical),
        result.count_by_severity(Severity::High),
        result.count_by_severity(Severity::Medium),
        result.count_by_severity(Severity::Low),
        result.count_by_severity(Severity::Info),
    );
    for warning in &result.warnings {
        println!("   ⚠️  {}", warning);
    }
}

fn print_run_summary(run: &models::RunResult) {
    println!("\n🔧 Fix Loop: {}", run.termination_state);
    println!("   Iterations: {}", run.iterations.len());
    println!("   Issues resolved: {}", run.issues_resolved);
    print_analysis_summary(&run.final_analysis);
}

/// Exit code 2 when critical or high severity issues remain.
fn exit_code_for(result: &AnalysisResult) -> i32 {
    if result.critical_high().is_empty() {
        0
    } else {
        eprintln!("\n⛔ Critical or high severity issues remain (exit code 2).");
        2
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .solaudit.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
