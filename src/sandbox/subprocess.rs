//! Subprocess isolation backend.
//!
//! Each invocation gets a fresh temporary working directory that is
//! removed on every exit path (the `TempDir` guard handles success,
//! timeout, cancellation, and error returns alike). The environment is
//! scoped per invocation via [`SandboxEnv`].

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::ExecutionResult;
use crate::registry::ToolDescriptor;
use crate::sandbox::{
    collect_output_file, exit_code_of, split_log_lines, Sandbox, SandboxEnv, SandboxError,
};

const ARTIFACT_FILENAME: &str = "contract.sol";

/// Runs tools as local subprocesses in throwaway working directories.
pub struct SubprocessSandbox {
    env: SandboxEnv,
}

impl SubprocessSandbox {
    pub fn new(env: SandboxEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Sandbox for SubprocessSandbox {
    async fn execute(
        &self,
        tool: &ToolDescriptor,
        artifact: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let workdir = tempfile::Builder::new().prefix("solaudit-").tempdir()?;
        tokio::fs::write(workdir.path().join(ARTIFACT_FILENAME), artifact).await?;

        let command = tool.render_command(ARTIFACT_FILENAME, timeout, ".");
        debug!(tool = %tool.id, %command, "spawning tool subprocess");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in self.env.variables() {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            tool: tool.id.clone(),
            source,
        })?;

        // Dropping the wait future kills the child (kill_on_drop), so both
        // the timeout and the cancellation arm tear the process down.
        let output = tokio::select! {
            res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
                Ok(Ok(output)) => output,
                Ok(Err(source)) => {
                    return Err(SandboxError::Spawn { tool: tool.id.clone(), source });
                }
                Err(_) => {
                    warn!(tool = %tool.id, timeout_secs = timeout.as_secs(), "tool timed out");
                    return Ok(ExecutionResult::timed_out(Vec::new()));
                }
            },
            _ = cancel.cancelled() => {
                debug!(tool = %tool.id, "tool cancelled");
                return Ok(ExecutionResult::timed_out(Vec::new()));
            }
        };

        let mut result = ExecutionResult {
            exit_code: exit_code_of(output.status),
            log_lines: split_log_lines(&output.stdout, &output.stderr),
            output_blob: None,
            retrieval_failure: None,
        };
        collect_output_file(tool, workdir.path(), &mut result).await;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{OutputMode, ResourceLimits};

    fn descriptor(command_template: &str, output_mode: OutputMode) -> ToolDescriptor {
        ToolDescriptor {
            id: "fake".to_string(),
            display_name: "Fake".to_string(),
            version: "1.0".to_string(),
            image: None,
            command_template: command_template.to_string(),
            output_mode,
            output_path: match output_mode {
                OutputMode::File => Some("output.json".to_string()),
                OutputMode::Stream => None,
            },
            default_timeout_secs: 5,
            limits: ResourceLimits::default(),
        }
    }

    fn sandbox() -> SubprocessSandbox {
        SubprocessSandbox::new(SandboxEnv::default())
    }

    #[tokio::test]
    async fn test_stream_mode_captures_logs_and_exit_code() {
        let tool = descriptor("echo finding-one && echo finding-two >&2", OutputMode::Stream);
        let result = sandbox()
            .execute(&tool, "contract X {}", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(0));
        assert!(result.log_lines.contains(&"finding-one".to_string()));
        assert!(result.log_lines.contains(&"finding-two".to_string()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_data() {
        let tool = descriptor("exit 3", OutputMode::Stream);
        let result = sandbox()
            .execute(&tool, "", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_command_not_found_is_127() {
        let tool = descriptor("definitely-not-a-real-binary-xyz", OutputMode::Stream);
        let result = sandbox()
            .execute(&tool, "", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(127));
    }

    #[tokio::test]
    async fn test_timeout_yields_null_exit_code() {
        let tool = descriptor("sleep 30", OutputMode::Stream);
        let started = std::time::Instant::now();
        let result = sandbox()
            .execute(&tool, "", Duration::from_millis(200), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.exit_code, None);
        // Must return promptly after the deadline, not after the sleep.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let tool = descriptor("sleep 30", OutputMode::Stream);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = std::time::Instant::now();
        let result = sandbox()
            .execute(&tool, "", Duration::from_secs(30), &cancel)
            .await
            .unwrap();

        assert_eq!(result.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_file_mode_reads_output_back() {
        let tool = descriptor("echo '{\"ok\":true}' > output.json", OutputMode::File);
        let result = sandbox()
            .execute(&tool, "", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.retrieval_failure.is_none());
        assert_eq!(result.output_text().unwrap().trim(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_file_mode_missing_output_is_recorded() {
        let tool = descriptor("true", OutputMode::File);
        let result = sandbox()
            .execute(&tool, "", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.output_blob.is_none());
        assert!(result
            .retrieval_failure
            .as_deref()
            .unwrap()
            .contains("missing"));
    }

    #[tokio::test]
    async fn test_artifact_written_into_workspace() {
        let tool = descriptor("cat contract.sol", OutputMode::Stream);
        let result = sandbox()
            .execute(&tool, "contract Vault {}", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.log_lines, vec!["contract Vault {}"]);
    }

    #[tokio::test]
    async fn test_scoped_environment_applied() {
        let tool = descriptor("printenv SOLC_VERSION", OutputMode::Stream);
        let result = sandbox()
            .execute(&tool, "", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.log_lines, vec!["0.8.20"]);
    }
}
