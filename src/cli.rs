//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

use crate::sandbox::SandboxKind;

/// Solaudit - security analysis and auto-fix for Solidity contracts
///
/// Runs static-analysis tools (slither, mythril, semgrep, solhint) against
/// a contract in a sandbox, merges their findings into one report, and can
/// drive an iterative LLM fix loop until no critical or high severity
/// issues remain.
///
/// Examples:
///   solaudit contract.sol
///   solaudit contract.sol --tools slither,solhint --timeout 60
///   solaudit contract.sol --fix --max-iterations 5
///   solaudit contract.sol --sandbox docker --format json -o report.json
///   solaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the Solidity contract to analyze
    ///
    /// Not required when using --init-config.
    #[arg(value_name = "CONTRACT", required_unless_present = "init_config")]
    pub contract: Option<PathBuf>,

    /// Tools to run (comma-separated)
    ///
    /// Example: --tools slither,solhint. Defaults to all registered tools.
    #[arg(long, value_name = "TOOLS", value_delimiter = ',')]
    pub tools: Option<Vec<String>>,

    /// Per-tool timeout in seconds
    ///
    /// Overrides each tool's registry default.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of tools run concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Sandbox backend (subprocess, docker)
    #[arg(long, value_name = "BACKEND")]
    pub sandbox: Option<SandboxKind>,

    /// Solc version pinned into the tool environment
    #[arg(long, value_name = "VERSION")]
    pub solc_version: Option<String>,

    /// Run the fix loop after the initial analysis
    #[arg(long, conflicts_with = "analyze_only")]
    pub fix: bool,

    /// Analyze and report only, never fix (the default)
    #[arg(long, conflicts_with = "fix")]
    pub analyze_only: bool,

    /// Fix iteration budget
    #[arg(long, value_name = "COUNT")]
    pub max_iterations: Option<usize>,

    /// Chat API endpoint for the fixer
    #[arg(long, default_value = "http://localhost:11434", env = "SOLAUDIT_ENDPOINT")]
    pub endpoint: String,

    /// Model used by the fixer
    ///
    /// Can also be set via SOLAUDIT_MODEL env var or .solaudit.toml config.
    #[arg(short, long, default_value = "llama3.2:latest", env = "SOLAUDIT_MODEL")]
    pub model: String,

    /// Temperature for fixer responses (0.0 - 1.0)
    ///
    /// Lower values produce more consistent/deterministic output
    #[arg(long, default_value = "0.1")]
    pub temperature: f32,

    /// Context metadata passed through to the fixer (key=value, repeatable)
    ///
    /// Example: --context network=mainnet --context standard=erc20
    #[arg(long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .solaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .solaudit.toml configuration file
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

        if let Some(ref contract) = self.contract {
            if !contract.exists() {
                return Err(format!("Contract file does not exist: {}", contract.display()));
            }
            if !contract.is_file() {
                return Err(format!("Contract path is not a file: {}", contract.display()));
            }
        }

        if self.fix && !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://")
        {
            return Err("Fixer endpoint must start with 'http://' or 'https://'".to_string());
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.max_iterations == Some(0) {
            return Err("Max iterations must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for entry in &self.context {
            if !entry.contains('=') {
                return Err(format!("Context entries must be key=value, got: {}", entry));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Parses the repeated --context flags into a metadata map.
    pub fn metadata(&self) -> std::collections::BTreeMap<String, String> {
        self.context
            .iter()
            .filter_map(|entry| {
                entry
                    .split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            })
            .collect()
    }
}
