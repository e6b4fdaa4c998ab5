//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.solaudit.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::sandbox::SandboxKind;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Sandbox settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Fixer settings.
    #[serde(default)]
    pub fixer: FixerSection,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
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
    "solaudit_report.md".to_string()
}

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Tool ids to run, in registry order.
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,

    /// Per-tool timeout override in seconds. When unset, each tool's
    /// registry default applies.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Number of tools run concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tools: default_tools(),
            timeout_seconds: None,
            concurrency: default_concurrency(),
        }
    }
}

fn default_tools() -> Vec<String> {
    vec!["slither", "mythril", "semgrep", "solhint"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_concurrency() -> usize {
    4
}

/// Sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Execution backend for tool runs.
    #[serde(default)]
    pub backend: SandboxKind,

    /// Solc version pinned into the tool environment.
    #[serde(default = "default_solc_version")]
    pub solc_version: String,

    /// Disable the tools' network auto-configuration.
    #[serde(default = "default_true")]
    pub offline: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxKind::default(),
            solc_version: default_solc_version(),
            offline: true,
        }
    }
}

fn default_solc_version() -> String {
    "0.8.20".to_string()
}

fn default_true() -> bool {
    true
}

/// LLM fixer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixerSection {
    /// Chat API endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_fixer_timeout")]
    pub timeout_seconds: u64,

    /// Fix iteration budget.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for FixerSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_seconds: default_fixer_timeout(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_fixer_timeout() -> u64 {
    300
}

fn default_max_iterations() -> usize {
    3
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
        let default_path = Path::new(".solaudit.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref tools) = args.tools {
            self.analysis.tools = tools.clone();
        }
        if let Some(timeout) = args.timeout {
            self.analysis.timeout_seconds = Some(timeout);
        }
        if let Some(concurrency) = args.concurrency {
            self.analysis.concurrency = concurrency;
        }

        if let Some(backend) = args.sandbox {
            self.sandbox.backend = backend;
        }
        if let Some(ref solc) = args.solc_version {
            self.sandbox.solc_version = solc.clone();
        }

        // Fixer settings have CLI defaults; explicit values always win.
        self.fixer.endpoint = args.endpoint.clone();
        self.fixer.model = args.model.clone();
        self.fixer.temperature = args.temperature;
        if let Some(max_iterations) = args.max_iterations {
            self.fixer.max_iterations = max_iterations;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
