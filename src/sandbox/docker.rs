//! Docker isolation backend.
//!
//! Each invocation runs a one-shot container with the working directory
//! bind-mounted at `/sb`. The container shares the lifetime of the
//! invocation: on timeout or cancellation it is killed by name and the
//! working directory is removed by the `TempDir` guard.

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
const MOUNT_POINT: &str = "/sb";

/// Runs tools in one-shot docker containers.
pub struct DockerSandbox {
    env: SandboxEnv,
    docker_bin: String,
}

impl DockerSandbox {
    pub fn new(env: SandboxEnv) -> Self {
        Self {
            env,
            docker_bin: "docker".to_string(),
        }
    }

    fn run_args(
        &self,
        tool: &ToolDescriptor,
        image: &str,
        container: &str,
        workdir: &str,
        command: &str,
    ) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container.to_string(),
            "-v".to_string(),
            format!("{}:{}", workdir, MOUNT_POINT),
            "-w".to_string(),
            MOUNT_POINT.to_string(),
            "--network".to_string(),
            "bridge".to_string(),
        ];
        if let Some(memory_mb) = tool.limits.memory_mb {
            args.push("--memory".to_string());
            args.push(format!("{}m", memory_mb));
        }
        if let Some(cpus) = tool.limits.cpus {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }
        for (key, value) in self.env.variables() {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(image.to_string());
        args.push("/bin/sh".to_string());
        args.push("-c".to_string());
        args.push(command.to_string());
        args
    }

    async fn kill_container(&self, container: &str) {
        let _ = Command::new(&self.docker_bin)
            .args(["kill", container])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn execute(
        &self,
        tool: &ToolDescriptor,
        artifact: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        let image = tool
            .image
            .as_deref()
            .ok_or_else(|| SandboxError::MissingImage(tool.id.clone()))?;

        let workdir = tempfile::Builder::new().prefix("solaudit-").tempdir()?;
        tokio::fs::write(workdir.path().join(ARTIFACT_FILENAME), artifact).await?;

        // The tempdir's unique suffix doubles as the container name.
        let container = workdir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "solaudit-run".to_string());

        let command = tool.render_command(ARTIFACT_FILENAME, timeout, &format!("{}/bin", MOUNT_POINT));
        let workdir_str = workdir.path().to_string_lossy().into_owned();
        let args = self.run_args(tool, image, &container, &workdir_str, &command);
        debug!(tool = %tool.id, %container, %command, "starting tool container");

        let child = Command::new(&self.docker_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                tool: tool.id.clone(),
                source,
            })?;

        let output = tokio::select! {
            res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
                Ok(Ok(output)) => output,
                Ok(Err(source)) => {
                    self.kill_container(&container).await;
                    return Err(SandboxError::Spawn { tool: tool.id.clone(), source });
                }
                Err(_) => {
                    warn!(tool = %tool.id, timeout_secs = timeout.as_secs(), "container timed out");
                    self.kill_container(&container).await;
                    return Ok(ExecutionResult::timed_out(Vec::new()));
                }
            },
            _ = cancel.cancelled() => {
                debug!(tool = %tool.id, "container cancelled");
                self.kill_container(&container).await;
                return Ok(ExecutionResult::timed_out(Vec::new()));
            }
        };

        let mut result = ExecutionResult {
            exit_code: exit_code_of(output.status),
            log_lines: split_log_lines(&output.stdout, &output.stderr),
            output_blob: None,
            retrieval_failure: None,
        };
        // The output file lands in the bind mount, readable from the host.
        collect_output_file(tool, workdir.path(), &mut result).await;

        Ok(result)
    }
}
