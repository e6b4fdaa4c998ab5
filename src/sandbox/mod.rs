//! Sandboxed, time-bounded execution of analysis tools.
//!
//! The sandbox is a capability interface with two interchangeable
//! backends - plain subprocess isolation and docker containers - selected
//! by configuration, so the aggregator never depends on a specific
//! isolation mechanism.
//!
//! Tool misbehavior (crash, nonzero exit, hang) is returned as data in an
//! [`ExecutionResult`]; only the sandbox's own infrastructure failures
//! (workspace setup, spawn) surface as [`SandboxError`], which the
//! aggregator records as a per-tool warning.

mod docker;
mod subprocess;

pub use docker::DockerSandbox;
pub use subprocess::SubprocessSandbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::ExecutionResult;
use crate::registry::{OutputMode, ToolDescriptor};

/// Isolation backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    /// Run tools as local subprocesses in a throwaway working directory.
    #[default]
    Subprocess,
    /// Run tools in one-shot docker containers.
    Docker,
}

/// Immutable environment policy threaded into the sandbox at construction.
///
/// Replaces process-wide environment mutation: each invocation receives
/// exactly these variables, so concurrent workers cannot observe each
/// other's configuration.
#[derive(Debug, Clone)]
pub struct SandboxEnv {
    /// Solc version pinned for the tools.
    pub solc_version: String,
    /// When true, the tools' network-dependent auto-configuration
    /// (solc downloads) is disabled to keep runs hermetic.
    pub offline: bool,
}

impl Default for SandboxEnv {
    fn default() -> Self {
        Self {
            solc_version: "0.8.20".to_string(),
            offline: true,
        }
    }
}

impl SandboxEnv {
    /// Environment variables applied to every tool invocation.
    pub fn variables(&self) -> Vec<(String, String)> {
        let mut vars = vec![("SOLC_VERSION".to_string(), self.solc_version.clone())];
        if self.offline {
            vars.push(("SOLC_SELECT_DISABLED".to_string(), "1".to_string()));
            vars.push(("MYTHRIL_DISABLE_SOLC_DOWNLOAD".to_string(), "1".to_string()));
        }
        vars
    }
}

/// Infrastructure failures of the sandbox itself.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to prepare sandbox workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tool {0} has no docker image configured")]
    MissingImage(String),
}

/// An isolated, time-bounded execution context for one analysis tool.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs the tool against the artifact.
    ///
    /// On timeout or cancellation the underlying process is forcibly
    /// terminated and `exit_code` is `None`; the working area is removed
    /// on every exit path.
    async fn execute(
        &self,
        tool: &ToolDescriptor,
        artifact: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError>;
}

/// Builds the configured sandbox backend.
pub fn create_sandbox(kind: SandboxKind, env: SandboxEnv) -> Arc<dyn Sandbox> {
    match kind {
        SandboxKind::Subprocess => Arc::new(SubprocessSandbox::new(env)),
        SandboxKind::Docker => Arc::new(DockerSandbox::new(env)),
    }
}

/// Splits captured process output into log lines.
pub(crate) fn split_log_lines(stdout: &[u8], stderr: &[u8]) -> Vec<String> {
    let mut lines: Vec<String> = String::from_utf8_lossy(stdout)
        .lines()
        .map(String::from)
        .collect();
    lines.extend(String::from_utf8_lossy(stderr).lines().map(String::from));
    lines
}

/// Retrieves the descriptor's output file from the working area.
///
/// A missing or empty file is recorded on the result as a retrieval
/// failure, not masked.
pub(crate) async fn collect_output_file(
    tool: &ToolDescriptor,
    workdir: &Path,
    result: &mut ExecutionResult,
) {
    if tool.output_mode != OutputMode::File {
        return;
    }
    let Some(rel) = &tool.output_path else {
        result.retrieval_failure = Some("descriptor has no output path".to_string());
        return;
    };

    match tokio::fs::read(workdir.join(rel)).await {
        Ok(bytes) if bytes.is_empty() => {
            result.retrieval_failure = Some(format!("output file {} is empty", rel));
        }
        Ok(bytes) => result.output_blob = Some(bytes),
        Err(_) => {
            result.retrieval_failure = Some(format!("output file {} is missing", rel));
        }
    }
}

/// Exit code of a completed process, folding unix signal termination into
/// the conventional `128 + signal` range so it is never confused with the
/// `None` reserved for timeouts.
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    Some(-1)
}
