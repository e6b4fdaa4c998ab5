//! Normalizer for Semgrep JSON output.

use serde_json::Value;

use crate::models::{ExecutionResult, Issue, Severity};
use crate::normalize::support::{errors_fails, extract_json_object};
use crate::normalize::{Normalizer, ParseOutcome};

/// Parses `semgrep --json` output.
///
/// Exit code 1 signals findings, not failure. Semgrep may print metric
/// notices around the JSON document, so extraction tolerates noise.
pub struct SemgrepNormalizer;

impl Normalizer for SemgrepNormalizer {
    fn tool_id(&self) -> &'static str {
        "semgrep"
    }

    fn parse(&self, exec: &ExecutionResult) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        let (errors, fails) = errors_fails(exec.exit_code, &exec.log_lines);
        outcome.errors = errors;
        outcome.fails = fails;
        outcome.errors.remove("EXIT_CODE_1");

        let text = exec.log_text();
        let document: Option<Value> = serde_json::from_str(text.trim())
            .ok()
            .or_else(|| extract_json_object(&text).and_then(|s| serde_json::from_str(s).ok()));

        let document = match document {
            Some(doc) => doc,
            None => {
                // A clean exit with no findings legitimately produces no
                // JSON worth extracting.
                if exec.exit_code != Some(0) && exec.exit_code.is_some() {
                    outcome.fails.insert("MALFORMED_OUTPUT".to_string());
                }
                return outcome;
            }
        };

        for result in document["results"].as_array().into_iter().flatten() {
            outcome.issues.push(parse_result(result));
        }

        outcome
    }
}

fn parse_result(result: &Value) -> Issue {
    let check_id = result["check_id"].as_str().unwrap_or("");
    let check_name = check_id.rsplit('.').next().unwrap_or(check_id).to_string();
    let message = result["extra"]["message"]
        .as_str()
        .or_else(|| result["message"].as_str())
        .unwrap_or("")
        .to_string();

    let severity = match result["extra"]["severity"]
        .as_str()
        .or_else(|| result["severity"].as_str())
        .unwrap_or("INFO")
    {
        "ERROR" => Severity::High,
        "WARNING" => Severity::Medium,
        "INFO" => Severity::Info,
        other => Severity::from_label(other),
    };

    let line = result["start"]["line"].as_u64().map(|n| n as usize);
    let end_line = result["end"]["line"].as_u64().map(|n| n as usize);
    let line_end = match (line, end_line) {
        (Some(start), Some(end)) if end != start => Some(end),
        _ => None,
    };

    Issue {
        tool: "semgrep".to_string(),
        severity,
        description: if message.is_empty() {
            format!("{} detected", check_name)
        } else {
            message
        },
        recommendation: recommendation_for(&check_name).to_string(),
        title: check_name,
        line,
        line_end,
        source_file: result["path"].as_str().map(String::from),
        contract: None,
        function: None,
    }
}

fn recommendation_for(check_name: &str) -> &'static str {
    let lower = check_name.to_lowercase();
    if lower.contains("reentrancy") {
        "Use ReentrancyGuard and checks-effects-interactions pattern"
    } else if lower.contains("unchecked") {
        "Check return values or use SafeERC20"
    } else if lower.contains("tx-origin") || lower.contains("txorigin") {
        "Replace tx.origin with msg.sender"
    } else if lower.contains("access-control") {
        "Add proper access control modifiers"
    } else if lower.contains("timestamp") {
        "Avoid using block.timestamp for critical logic"
    } else {
        "Review and apply security best practices"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_with_logs(lines: &[&str], exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(exit_code),
            log_lines: lines.iter().map(|s| s.to_string()).collect(),
            output_blob: None,
            retrieval_failure: None,
        }
    }

    #[test]
    fn test_error_severity_maps_to_high() {
        let json = r#"{"results": [{"check_id": "solidity.security.compound-borrowfresh-reentrancy", "path": "contract.sol", "start": {"line": 12}, "end": {"line": 18}, "extra": {"message": "Reentrancy risk in borrow", "severity": "ERROR"}}], "errors": []}"#;
        let exec = exec_with_logs(&["METRICS: ...", json], 1);

        let outcome = SemgrepNormalizer.parse(&exec);
        assert_eq!(outcome.issues.len(), 1);
        let issue = &outcome.issues[0];
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.title, "compound-borrowfresh-reentrancy");
        assert_eq!(issue.line, Some(12));
        assert_eq!(issue.line_end, Some(18));
        assert_eq!(issue.source_file.as_deref(), Some("contract.sol"));
    }

    #[test]
    fn test_clean_run_without_json_is_ok() {
        let exec = exec_with_logs(&["Nothing to scan"], 0);
        let outcome = SemgrepNormalizer.parse(&exec);
        assert!(outcome.issues.is_empty());
        assert!(outcome.succeeded());
    }

    #[test]
    fn test_unknown_severity_becomes_info() {
        let json = r#"{"results": [{"check_id": "rule", "start": {"line": 1}, "end": {"line": 1}, "extra": {"message": "m", "severity": "EXPERIMENT"}}]}"#;
        let exec = exec_with_logs(&[json], 1);
        let outcome = SemgrepNormalizer.parse(&exec);
        assert_eq!(outcome.issues[0].severity, Severity::Info);
    }

    #[test]
    fn test_nonzero_exit_without_json_fails() {
        let exec = exec_with_logs(&["fatal: config error"], 2);
        let outcome = SemgrepNormalizer.parse(&exec);
        assert!(outcome.fails.contains("MALFORMED_OUTPUT"));
    }
}
