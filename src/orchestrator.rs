//! The detect, fix, reverify loop.
//!
//! Drives an explicit state machine over an [`Analyzer`] and a [`Fixer`]:
//! analyze the artifact, filter to CRITICAL/HIGH issues, ask the fixer for
//! a candidate, reanalyze, repeat until convergence or a terminal
//! condition. Candidate validation happens before any reanalysis: an
//! empty or unchanged candidate stalls the loop without spending a tool
//! run.

use anyhow::{bail, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analysis::Analyzer;
use crate::fixer::Fixer;
use crate::models::{AnalysisResult, FixIteration, RunResult, TerminationState};

/// Loop parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Tool ids passed to every analysis call.
    pub tools: Vec<String>,
    /// Per-tool timeout override; `None` uses each descriptor's default.
    pub timeout: Option<Duration>,
    /// Fix iteration budget.
    pub max_iterations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            timeout: None,
            max_iterations: 3,
        }
    }
}

/// Runs the fix loop to a terminal state and assembles the [`RunResult`].
pub struct FixOrchestrator {
    analyzer: Arc<dyn Analyzer>,
    fixer: Arc<dyn Fixer>,
    config: OrchestratorConfig,
}

impl FixOrchestrator {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        fixer: Arc<dyn Fixer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            analyzer,
            fixer,
            config,
        }
    }

    /// Runs the loop on one artifact.
    ///
    /// Errors only when the initial analysis yields no usable tool output
    /// at all; everything after that point is folded into the returned
    /// [`RunResult`] as iteration data and a termination state.
    pub async fn run(
        &self,
        artifact: &str,
        artifact_id: &str,
        metadata: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let initial = self.analyze(artifact, artifact_id, cancel).await;
        if !initial.success {
            bail!(
                "initial analysis of {} produced no usable results: {}",
                artifact_id,
                initial.warnings.join("; ")
            );
        }

        let mut current = artifact.to_string();
        let mut current_analysis = initial.clone();
        let mut iterations = Vec::new();
        let mut state = None;

        for index in 1..=self.config.max_iterations {
            let targets: Vec<_> = current_analysis
                .critical_high()
                .into_iter()
                .cloned()
                .collect();
            if targets.is_empty() {
                state = Some(TerminationState::Converged);
                break;
            }

            info!(
                iteration = index,
                targets = targets.len(),
                "requesting fix candidate"
            );

            let candidate = match self
                .fixer
                .fix(&current, &targets, index - 1, metadata)
                .await
            {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!(iteration = index, error = %err, "fixer unavailable");
                    state = Some(TerminationState::Stalled);
                    break;
                }
            };

            // Validation gate: an unusable candidate ends the loop before
            // any reanalysis call is made.
            if candidate.trim().is_empty() || candidate == current {
                info!(iteration = index, "candidate empty or unchanged");
                state = Some(TerminationState::Stalled);
                break;
            }

            let reanalysis = self.analyze(&candidate, artifact_id, cancel).await;
            if !reanalysis.success {
                // The candidate cannot be assessed; keep the pre-iteration
                // artifact and stop.
                warn!(iteration = index, "reanalysis failed, rolling back");
                state = Some(TerminationState::RolledBack);
                break;
            }

            let remaining = reanalysis.critical_high().len();
            iterations.push(FixIteration {
                index,
                issues_before: targets.len(),
                issues_after: remaining,
                code_changed: true,
            });

            current = candidate;
            current_analysis = reanalysis;

            if remaining == 0 {
                state = Some(TerminationState::Converged);
                break;
            }
        }

        let state = state.unwrap_or_else(|| {
            if current_analysis.critical_high().is_empty() {
                TerminationState::Converged
            } else {
                TerminationState::Exhausted
            }
        });
        let issues_resolved =
            initial.issues.len() as i64 - current_analysis.issues.len() as i64;

        info!(
            %state,
            iterations = iterations.len(),
            issues_resolved,
            "fix loop finished"
        );

        Ok(RunResult {
            original_artifact: artifact.to_string(),
            final_artifact: current,
            iterations,
            initial_analysis: initial,
            final_analysis: current_analysis,
            issues_resolved,
            termination_state: state,
            completed_at: Utc::now(),
        })
    }

    async fn analyze(
        &self,
        artifact: &str,
        artifact_id: &str,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        self.analyzer
            .analyze(
                artifact,
                artifact_id,
                &self.config.tools,
                self.config.timeout,
                cancel,
            )
            .await
    }
}
