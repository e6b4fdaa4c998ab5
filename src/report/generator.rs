//! Markdown and JSON rendering of analysis and fix-loop results.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::Path;

use crate::models::{AnalysisResult, Issue, RunResult, Severity};

/// Generate a Markdown report for an analysis-only run.
pub fn generate_analysis_markdown(result: &AnalysisResult) -> String {
    let mut output = String::new();

    output.push_str("# Solaudit Report\n\n");
    output.push_str(&generate_analysis_metadata(result));
    output.push_str(&generate_severity_table(result));
    output.push_str(&generate_issues_section(&result.issues));
    output.push_str(&generate_warnings_section(&result.warnings));
    output.push_str(&generate_footer());

    output
}

/// Generate a Markdown report for a full fix run.
pub fn generate_run_markdown(run: &RunResult) -> String {
    let mut output = String::new();

    output.push_str("# Solaudit Fix Report\n\n");

    output.push_str("## Run\n\n");
    output.push_str(&format!(
        "- **Artifact:** {}\n",
        run.initial_analysis.artifact_id
    ));
    output.push_str(&format!(
        "- **Completed:** {}\n",
        run.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Outcome:** `{}`\n", run.termination_state));
    output.push_str(&format!("- **Iterations:** {}\n", run.iterations.len()));
    output.push_str(&format!("- **Issues Resolved:** {}\n", run.issues_resolved));
    output.push_str(&format!(
        "- **Code Changed:** {}\n\n",
        if run.artifact_changed() { "yes" } else { "no" }
    ));

    if !run.iterations.is_empty() {
        output.push_str("## Iterations\n\n");
        output.push_str("| # | Issues Before | Issues After |\n");
        output.push_str("|:---:|:---:|:---:|\n");
        for iteration in &run.iterations {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                iteration.index, iteration.issues_before, iteration.issues_after
            ));
        }
        output.push('\n');
    }

    output.push_str("## Initial Analysis\n\n");
    output.push_str(&generate_severity_table(&run.initial_analysis));
    output.push_str(&generate_issues_section(&run.initial_analysis.issues));

    output.push_str("## Final Analysis\n\n");
    output.push_str(&generate_severity_table(&run.final_analysis));
    output.push_str(&generate_issues_section(&run.final_analysis.issues));
    output.push_str(&generate_warnings_section(&run.final_analysis.warnings));

    output.push_str(&generate_footer());

    output
}

fn generate_analysis_metadata(result: &AnalysisResult) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Artifact:** {}\n", result.artifact_id));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Tools Requested:** {}\n",
        result.tools_requested.join(", ")
    ));
    section.push_str(&format!(
        "- **Tools Succeeded:** {}\n",
        if result.tools_succeeded.is_empty() {
            "none".to_string()
        } else {
            result.tools_succeeded.join(", ")
        }
    ));
    section.push_str(&format!("- **Total Issues:** {}\n\n", result.issues.len()));

    section
}

fn generate_severity_table(result: &AnalysisResult) -> String {
    let mut section = String::new();

    section.push_str("### Severity Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | {} Info | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
        Severity::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | **{}** |\n\n",
        result.count_by_severity(Severity::Critical),
        result.count_by_severity(Severity::High),
        result.count_by_severity(Severity::Medium),
        result.count_by_severity(Severity::Low),
        result.count_by_severity(Severity::Info),
        result.issues.len(),
    ));

    section
}

fn generate_issues_section(issues: &[Issue]) -> String {
    let mut section = String::new();

    section.push_str("### Issues\n\n");

    if issues.is_empty() {
        section.push_str("No issues were found.\n\n");
        return section;
    }

    // Severity first, then tool order as delivered.
    let mut sorted: Vec<&Issue> = issues.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));

    for issue in sorted {
        section.push_str(&generate_issue_block(issue));
    }

    section
}

fn generate_issue_block(issue: &Issue) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "#### {} **{}** - {} (`{}`)\n\n",
        issue.severity.emoji(),
        issue.severity.to_string().to_uppercase(),
        issue.title,
        issue.tool
    ));

    let mut location = String::new();
    if let Some(file) = &issue.source_file {
        location.push_str(file);
    }
    if issue.line.is_some() {
        location.push_str(&format!("#{}", issue.line_range()));
    }
    if !location.is_empty() {
        block.push_str(&format!("**Location:** `{}`\n\n", location));
    }
    if let (Some(contract), Some(function)) = (&issue.contract, &issue.function) {
        block.push_str(&format!("**In:** `{}.{}`\n\n", contract, function));
    }

    if !issue.description.is_empty() {
        block.push_str(&format!("{}\n\n", issue.description.trim()));
    }

    if !issue.recommendation.is_empty() {
        block.push_str(&format!("> **Recommendation:** {}\n\n", issue.recommendation));
    }

    block.push_str("---\n\n");

    block
}

fn generate_warnings_section(warnings: &[String]) -> String {
    if warnings.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("### Warnings\n\n");
    for warning in warnings {
        section.push_str(&format!("- {}\n", warning));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by solaudit*\n".to_string()
}

/// Generate a JSON report for an analysis-only run.
pub fn generate_analysis_json(result: &AnalysisResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(Into::into)
}

/// Generate a JSON report for a full fix run.
pub fn generate_run_json(run: &RunResult) -> Result<String> {
    serde_json::to_string_pretty(run).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FixIteration, TerminationState};

    fn sample_issue(severity: Severity, title: &str) -> Issue {
        Issue {
            tool: "slither".to_string(),
            severity,
            title: title.to_string(),
            description: format!("{} detected in contract", title),
            line: Some(12),
            line_end: Some(18),
            source_file: Some("contract.sol".to_string()),
            contract: Some("Vault".to_string()),
            function: Some("withdraw".to_string()),
            recommendation: "Use ReentrancyGuard".to_string(),
        }
    }

    fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            artifact_id: "Vault".to_string(),
            tools_requested: vec!["slither".to_string(), "mythril".to_string()],
            tools_succeeded: vec!["slither".to_string()],
            issues: vec![
                sample_issue(Severity::Medium, "timestamp"),
                sample_issue(Severity::High, "reentrancy-eth"),
            ],
            success: true,
            warnings: vec!["mythril: TIMEOUT".to_string()],
        }
    }

    #[test]
    fn test_analysis_markdown_sections() {
        let markdown = generate_analysis_markdown(&sample_analysis());

        assert!(markdown.contains("# Solaudit Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("### Severity Breakdown"));
        assert!(markdown.contains("reentrancy-eth"));
        assert!(markdown.contains("mythril: TIMEOUT"));
        assert!(markdown.contains("`contract.sol#12-18`"));
    }

    #[test]
    fn test_issues_ordered_by_severity() {
        let markdown = generate_analysis_markdown(&sample_analysis());
        let high = markdown.find("reentrancy-eth").unwrap();
        let medium = markdown.find("timestamp").unwrap();
        assert!(high < medium);
    }

    #[test]
    fn test_run_markdown_sections() {
        let run = RunResult {
            original_artifact: "bad".to_string(),
            final_artifact: "good".to_string(),
            iterations: vec![FixIteration {
                index: 1,
                issues_before: 2,
                issues_after: 0,
                code_changed: true,
            }],
            initial_analysis: sample_analysis(),
            final_analysis: AnalysisResult {
                issues: vec![],
                warnings: vec![],
                ..sample_analysis()
            },
            issues_resolved: 2,
            termination_state: TerminationState::Converged,
            completed_at: Utc::now(),
        };

        let markdown = generate_run_markdown(&run);

        assert!(markdown.contains("`CONVERGED`"));
        assert!(markdown.contains("## Iterations"));
        assert!(markdown.contains("| 1 | 2 | 0 |"));
        assert!(markdown.contains("## Initial Analysis"));
        assert!(markdown.contains("## Final Analysis"));
        assert!(markdown.contains("**Code Changed:** yes"));
    }

    #[test]
    fn test_json_report_shape() {
        let json = generate_analysis_json(&sample_analysis()).unwrap();
        assert!(json.contains("\"artifact_id\""));
        assert!(json.contains("\"tools_succeeded\""));
        assert!(json.contains("\"HIGH\""));
    }

    #[test]
    fn test_empty_issue_list() {
        let result = AnalysisResult {
            issues: vec![],
            ..sample_analysis()
        };
        let markdown = generate_analysis_markdown(&result);
        assert!(markdown.contains("No issues were found."));
    }
}
