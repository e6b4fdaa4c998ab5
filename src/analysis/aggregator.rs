//! The aggregator: fans requested tools out to the sandbox, normalizes
//! their output, and merges everything into one `AnalysisResult`.
//!
//! Tool runs are independent; each tool's issues are appended as one
//! atomic batch. The final issue list is ordered by tool registration
//! order, then by the order the normalizer emitted them, regardless of
//! which worker finished first.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::Analyzer;
use crate::models::{AnalysisResult, Issue};
use crate::normalize::normalizer_for;
use crate::registry::ToolRegistry;
use crate::sandbox::Sandbox;

/// One tool's contribution to the merged result.
struct ToolRun {
    rank: usize,
    id: String,
    issues: Vec<Issue>,
    failed: bool,
    warnings: Vec<String>,
}

/// Concurrent multi-tool analyzer.
pub struct Aggregator {
    registry: Arc<ToolRegistry>,
    sandbox: Arc<dyn Sandbox>,
    concurrency: usize,
}

impl Aggregator {
    /// Creates an aggregator over the given registry and sandbox backend.
    pub fn new(registry: Arc<ToolRegistry>, sandbox: Arc<dyn Sandbox>, concurrency: usize) -> Self {
        Self {
            registry,
            sandbox,
            concurrency: concurrency.max(1),
        }
    }

    async fn run_tool(
        &self,
        rank: usize,
        id: String,
        artifact: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ToolRun {
        // Unknown ids and missing normalizers are configuration problems,
        // surfaced as warnings rather than aborting the batch.
        let Some(descriptor) = self.registry.get(&id) else {
            return ToolRun {
                rank,
                id: id.clone(),
                issues: Vec::new(),
                failed: true,
                warnings: vec![format!("{}: not present in the tool registry", id)],
            };
        };
        let Some(normalizer) = normalizer_for(&id) else {
            return ToolRun {
                rank,
                id: id.clone(),
                issues: Vec::new(),
                failed: true,
                warnings: vec![format!("{}: no normalizer registered", id)],
            };
        };

        let timeout = timeout.unwrap_or_else(|| descriptor.default_timeout());
        debug!(
            tool = %descriptor.display_name,
            version = %descriptor.version,
            timeout_secs = timeout.as_secs(),
            "running tool"
        );

        let exec = match self.sandbox.execute(descriptor, artifact, timeout, cancel).await {
            Ok(exec) => exec,
            Err(err) => {
                warn!(tool = %id, error = %err, "sandbox failure");
                return ToolRun {
                    rank,
                    id: id.clone(),
                    issues: Vec::new(),
                    failed: true,
                    warnings: vec![format!("{}: sandbox failure: {}", id, err)],
                };
            }
        };

        let outcome = normalizer.parse(&exec);
        let mut warnings = Vec::new();
        // Parser quirks that were handled (not dropped) still get surfaced.
        for note in &outcome.notes {
            warnings.push(format!("{}: {}", id, note));
        }
        // Self-reported tool errors degrade the run without failing it.
        for error in &outcome.errors {
            warnings.push(format!("{}: reported {}", id, error));
        }
        if !outcome.fails.is_empty() {
            let fails: Vec<&str> = outcome.fails.iter().map(String::as_str).collect();
            warnings.push(format!("{}: {}", id, fails.join(", ")));
        }

        info!(
            tool = %id,
            issues = outcome.issues.len(),
            failed = !outcome.succeeded(),
            "tool finished"
        );

        ToolRun {
            rank,
            id,
            failed: !outcome.succeeded(),
            issues: outcome.issues,
            warnings,
        }
    }
}

#[async_trait]
impl Analyzer for Aggregator {
    async fn analyze(
        &self,
        artifact: &str,
        artifact_id: &str,
        tools: &[String],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        let jobs: Vec<(usize, String)> = tools
            .iter()
            .map(|id| (self.registry.rank(id).unwrap_or(usize::MAX), id.clone()))
            .collect();

        let mut runs: Vec<ToolRun> = stream::iter(jobs)
            .map(|(rank, id)| self.run_tool(rank, id, artifact, timeout, cancel))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Completion order is nondeterministic; registration order is the
        // ordering contract.
        runs.sort_by_key(|run| run.rank);

        let mut issues = Vec::new();
        let mut tools_succeeded = Vec::new();
        let mut warnings = Vec::new();

        for run in runs {
            issues.extend(run.issues);
            warnings.extend(run.warnings);
            if !run.failed {
                tools_succeeded.push(run.id);
            }
        }

        let success = !tools_succeeded.is_empty();
        if !success {
            warnings.push("no tool produced a parseable result".to_string());
        }

        AnalysisResult {
            artifact_id: artifact_id.to_string(),
            tools_requested: tools.to_vec(),
            tools_succeeded,
            issues,
            success,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionResult;
    use crate::registry::ToolDescriptor;
    use crate::sandbox::SandboxError;
    use std::collections::HashMap;

    /// Sandbox double returning scripted results per tool id, with an
    /// optional per-tool delay to shuffle completion order.
    struct FakeSandbox {
        scripted: HashMap<String, ExecutionResult>,
        delays: HashMap<String, Duration>,
    }

    impl FakeSandbox {
        fn new() -> Self {
            Self {
                scripted: HashMap::new(),
                delays: HashMap::new(),
            }
        }

        fn script(mut self, id: &str, result: ExecutionResult) -> Self {
            self.scripted.insert(id.to_string(), result);
            self
        }

        fn delay(mut self, id: &str, delay: Duration) -> Self {
            self.delays.insert(id.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        async fn execute(
            &self,
            tool: &ToolDescriptor,
            _artifact: &str,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<ExecutionResult, SandboxError> {
            if let Some(delay) = self.delays.get(&tool.id) {
                tokio::time::sleep(*delay).await;
            }
            Ok(self
                .scripted
                .get(&tool.id)
                .cloned()
                .unwrap_or_else(|| ExecutionResult::timed_out(Vec::new())))
        }
    }

    fn slither_exec() -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(255),
            log_lines: vec![],
            output_blob: Some(include_bytes!("../../fixtures/slither_output.json").to_vec()),
            retrieval_failure: None,
        }
    }

    fn solhint_exec() -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(1),
            log_lines: vec![
                "contract.sol:7:5: Avoid to use tx.origin [error/avoid-tx-origin]".to_string(),
            ],
            output_blob: None,
            retrieval_failure: None,
        }
    }

    fn aggregator(sandbox: FakeSandbox) -> Aggregator {
        Aggregator::new(Arc::new(ToolRegistry::builtin()), Arc::new(sandbox), 4)
    }

    fn tools(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_issue_ordering_follows_registration_not_completion() {
        // solhint finishes first; slither issues must still come first.
        let sandbox = FakeSandbox::new()
            .script("slither", slither_exec())
            .script("solhint", solhint_exec())
            .delay("slither", Duration::from_millis(50));

        let result = aggregator(sandbox)
            .analyze("contract Vault {}", "Vault", &tools(&["slither", "solhint"]), None, &CancellationToken::new())
            .await;

        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].tool, "slither");
        assert_eq!(result.issues[1].tool, "solhint");
        assert_eq!(result.tools_succeeded, vec!["slither", "solhint"]);
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_partial_degradation_keeps_success() {
        // mythril times out; the other two still make the run a success.
        let sandbox = FakeSandbox::new()
            .script("slither", slither_exec())
            .script("mythril", ExecutionResult::timed_out(Vec::new()))
            .script("solhint", solhint_exec());

        let result = aggregator(sandbox)
            .analyze(
                "contract Vault {}",
                "Vault",
                &tools(&["slither", "mythril", "solhint"]),
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.tools_succeeded.len(), 2);
        assert!(!result.tools_succeeded.contains(&"mythril".to_string()));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("mythril:") && w.contains("TIMEOUT")));
    }

    #[tokio::test]
    async fn test_all_tools_failed_is_well_formed() {
        let sandbox = FakeSandbox::new()
            .script("slither", ExecutionResult::timed_out(Vec::new()))
            .script("mythril", ExecutionResult::timed_out(Vec::new()));

        let result = aggregator(sandbox)
            .analyze("x", "X", &tools(&["slither", "mythril"]), None, &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert!(result.tools_succeeded.is_empty());
        assert!(result.issues.is_empty());
        assert_eq!(result.tools_requested.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_warning() {
        let sandbox = FakeSandbox::new().script("solhint", solhint_exec());

        let result = aggregator(sandbox)
            .analyze("x", "X", &tools(&["solhint", "oyente"]), None, &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.tools_succeeded, vec!["solhint"]);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("oyente") && w.contains("registry")));
    }

    #[tokio::test]
    async fn test_analyze_is_deterministic() {
        let build = || {
            FakeSandbox::new()
                .script("slither", slither_exec())
                .script("solhint", solhint_exec())
        };

        let first = aggregator(build())
            .analyze("x", "X", &tools(&["slither", "solhint"]), None, &CancellationToken::new())
            .await;
        let second = aggregator(build())
            .analyze("x", "X", &tools(&["slither", "solhint"]), None, &CancellationToken::new())
            .await;

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_retrieval_failure_surfaces_as_warning() {
        let exec = ExecutionResult {
            exit_code: Some(255),
            log_lines: vec![],
            output_blob: None,
            retrieval_failure: Some("output.json missing".to_string()),
        };
        let sandbox = FakeSandbox::new().script("slither", exec);

        let result = aggregator(sandbox)
            .analyze("x", "X", &tools(&["slither"]), None, &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("slither") && w.contains("output.json missing")));
    }
}
