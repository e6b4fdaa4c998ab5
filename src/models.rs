//! Data models for the security analysis pipeline.
//!
//! This module contains the core data structures shared across the
//! sandbox executor, normalizers, aggregator, and fix orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a security issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational findings - style, gas, optimization hints
    Info,
    /// Low severity - minor concerns, unlikely to be exploitable
    Low,
    /// Medium severity - potential vulnerabilities, situational impact
    Medium,
    /// High severity - exploitable vulnerabilities
    High,
    /// Critical severity - direct loss of funds or contract takeover
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Critical => "🔴",
            Severity::High => "🟠",
            Severity::Medium => "🟡",
            Severity::Low => "🟢",
            Severity::Info => "⚪",
        }
    }

    /// Maps a tool-native severity label to a canonical level.
    ///
    /// The mapping is total: labels that match no known vocabulary fall
    /// back to `Info` rather than being dropped.
    pub fn from_label(label: &str) -> Self {
        let upper = label.to_uppercase();
        match upper.as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            "INFO" | "INFORMATIONAL" => Severity::Info,
            _ => {
                if upper.contains("CRITICAL") || upper.contains("HIGH") {
                    Severity::High
                } else if upper.contains("MEDIUM") {
                    Severity::Medium
                } else if upper.contains("LOW") {
                    Severity::Low
                } else {
                    Severity::Info
                }
            }
        }
    }
}

/// A single normalized finding from an analysis tool.
///
/// Issues are created by a normalizer and owned by the `AnalysisResult`
/// of the iteration that produced them; they are never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Id of the tool that reported the issue.
    pub tool: String,
    /// Canonical severity.
    pub severity: Severity,
    /// Short identifier of the finding (check name, rule id, SWC title).
    pub title: String,
    /// Detailed description from the tool.
    pub description: String,
    /// Starting line number (1-indexed), if the tool located the finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Ending line number for multi-line findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
    /// Source file the finding refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Contract the finding refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Function the finding refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Suggested remediation.
    pub recommendation: String,
}

impl Issue {
    /// Returns the line range as a formatted string.
    pub fn line_range(&self) -> String {
        match (self.line, self.line_end) {
            (Some(start), Some(end)) if end != start => format!("{}-{}", start, end),
            (Some(start), _) => start.to_string(),
            _ => "unknown".to_string(),
        }
    }
}

/// Raw result of one sandboxed tool invocation.
///
/// Transient: produced per invocation, consumed by exactly one normalizer,
/// then discarded. Tool misbehavior (crash, hang, missing output) is data
/// here, never a propagated error.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Process exit code. `None` means the tool was forcibly terminated
    /// (timeout or cancellation), distinct from any numeric failure code.
    pub exit_code: Option<i32>,
    /// Captured stdout/stderr lines.
    pub log_lines: Vec<String>,
    /// Contents of the tool's output file, for `file` output mode.
    pub output_blob: Option<Vec<u8>>,
    /// Set when the descriptor's output file was missing or empty.
    pub retrieval_failure: Option<String>,
}

impl ExecutionResult {
    /// Result of a timed-out or cancelled invocation.
    pub fn timed_out(log_lines: Vec<String>) -> Self {
        Self {
            exit_code: None,
            log_lines,
            ..Default::default()
        }
    }

    /// Log lines joined into a single string.
    pub fn log_text(&self) -> String {
        self.log_lines.join("\n")
    }

    /// Output blob decoded as UTF-8, with invalid sequences replaced.
    pub fn output_text(&self) -> Option<String> {
        self.output_blob
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Aggregated analysis result across all requested tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Identifier of the analyzed artifact (contract name).
    pub artifact_id: String,
    /// Tools requested for this run.
    pub tools_requested: Vec<String>,
    /// Subset of `tools_requested` whose output parsed without failures.
    pub tools_succeeded: Vec<String>,
    /// All normalized issues, ordered by tool registration order then
    /// per-tool emission order.
    pub issues: Vec<Issue>,
    /// True iff at least one requested tool produced a parseable issue list.
    pub success: bool,
    /// Human-readable notes about degraded coverage or parser quirks.
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Issues with severity CRITICAL or HIGH - the fix-loop filter set.
    pub fn critical_high(&self) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| matches!(i.severity, Severity::Critical | Severity::High))
            .collect()
    }

    /// Number of issues at the given severity.
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    }
}

/// Record of one completed fix iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixIteration {
    /// 1-based iteration index.
    pub index: usize,
    /// CRITICAL/HIGH issues fed into the fixer.
    pub issues_before: usize,
    /// CRITICAL/HIGH issues remaining after reanalysis.
    pub issues_after: usize,
    /// Whether the fixer produced a changed artifact.
    pub code_changed: bool,
}

/// Terminal state of the fix loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationState {
    /// No CRITICAL/HIGH issues remain.
    Converged,
    /// The fixer returned an empty or unchanged artifact.
    Stalled,
    /// Reanalysis of a candidate failed entirely; prior artifact restored.
    RolledBack,
    /// Iteration budget spent with CRITICAL/HIGH issues remaining.
    Exhausted,
}

impl fmt::Display for TerminationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationState::Converged => write!(f, "CONVERGED"),
            TerminationState::Stalled => write!(f, "STALLED"),
            TerminationState::RolledBack => write!(f, "ROLLED_BACK"),
            TerminationState::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Full audit trail and outcome of one detect-fix-reverify session.
///
/// Assembled once at loop exit; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Artifact as supplied by the caller.
    pub original_artifact: String,
    /// Artifact after the last committed iteration.
    pub final_artifact: String,
    /// Append-only iteration log.
    pub iterations: Vec<FixIteration>,
    /// Analysis of the original artifact.
    pub initial_analysis: AnalysisResult,
    /// Analysis of the final artifact.
    pub final_analysis: AnalysisResult,
    /// Total issue count delta between initial and final analysis.
    pub issues_resolved: i64,
    /// Why the loop stopped.
    pub termination_state: TerminationState,
    /// When the run finished.
    pub completed_at: DateTime<Utc>,
}

impl RunResult {
    /// True when the final artifact differs from the original.
    pub fn artifact_changed(&self) -> bool {
        self.original_artifact != self.final_artifact
    }
}
