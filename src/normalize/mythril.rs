//! Normalizer for Mythril JSON output.

use serde_json::Value;

use crate::models::{ExecutionResult, Issue, Severity};
use crate::normalize::support::{errors_fails, extract_json_object};
use crate::normalize::{Normalizer, ParseOutcome};

/// Parses `myth analyze -o json` output.
///
/// Mythril streams progress text on stdout and emits the JSON document as
/// the last line. Exit code 1 means "issues found", not failure.
pub struct MythrilNormalizer;

impl Normalizer for MythrilNormalizer {
    fn tool_id(&self) -> &'static str {
        "mythril"
    }

    fn parse(&self, exec: &ExecutionResult) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        let (errors, fails) = errors_fails(exec.exit_code, &exec.log_lines);
        outcome.errors = errors;
        outcome.fails = fails;
        outcome.errors.remove("EXIT_CODE_1");

        for line in &exec.log_lines {
            if line.contains("Exception occurred, aborting analysis.") {
                outcome.notes.insert("analysis incomplete".to_string());
                outcome
                    .fails
                    .insert("EXCEPTION(analysis aborted)".to_string());
            }
        }

        let document = match find_document(exec) {
            Some(doc) => doc,
            None => {
                if exec.exit_code.is_some() {
                    outcome.fails.insert("MALFORMED_OUTPUT".to_string());
                }
                return outcome;
            }
        };

        if let Some(err) = document["error"].as_str() {
            let summary = err.split('.').next().unwrap_or(err);
            outcome.errors.insert(format!("mythril: {}", summary));
        }

        for raw in document["issues"].as_array().into_iter().flatten() {
            outcome.issues.push(parse_issue(raw));
        }

        outcome
    }
}

/// The JSON document is usually the last log line; tolerate it being
/// embedded anywhere in the stream.
fn find_document(exec: &ExecutionResult) -> Option<Value> {
    if let Some(last) = exec.log_lines.iter().rev().find(|l| !l.trim().is_empty()) {
        let trimmed = last.trim();
        if trimmed.starts_with('{') {
            if let Ok(doc) = serde_json::from_str(trimmed) {
                return Some(doc);
            }
        }
    }
    let text = exec.log_text();
    extract_json_object(&text).and_then(|s| serde_json::from_str(s).ok())
}

fn parse_issue(raw: &Value) -> Issue {
    let mut title = raw["title"].as_str().unwrap_or("Mythril Finding").to_string();
    let mut description = raw["description"].as_str().unwrap_or("").to_string();
    let severity = Severity::from_label(raw["severity"].as_str().unwrap_or("Informational"));
    let swc_id = raw["swc-id"].as_str().filter(|s| !s.is_empty());

    if let Some(swc) = swc_id {
        title = format!("{} (SWC {})", title, swc);
        description = format!("{}\nClassification: SWC-{}", description, swc);
    }

    let mut source_file = raw["filename"].as_str().filter(|f| !f.is_empty()).map(String::from);
    let mut line = raw["lineno"].as_u64().map(|n| n as usize);

    // Locations inside compiler-generated utility code are meaningless to
    // the caller; drop them instead of pointing at a phantom file.
    if source_file.as_deref().is_some_and(|f| f.ends_with("#utility.yul")) {
        source_file = None;
        line = None;
    }

    Issue {
        tool: "mythril".to_string(),
        severity,
        recommendation: recommendation_for(&title, swc_id).to_string(),
        title,
        description,
        line,
        line_end: None,
        source_file,
        contract: raw["contract"].as_str().map(String::from),
        function: raw["function"].as_str().map(String::from),
    }
}

fn recommendation_for(title: &str, swc_id: Option<&str>) -> &'static str {
    if let Some(swc) = swc_id {
        return match swc {
            "107" => "Validate external call targets and use checks-effects-interactions",
            "104" => "Check return values from external calls",
            "105" => "Add access control to withdrawal functions",
            "106" => "Add access control to selfdestruct",
            "112" => "Validate delegatecall targets",
            "115" => "Replace tx.origin with msg.sender",
            "116" => "Avoid using block.timestamp for randomness",
            "120" => "Avoid using block.number for randomness",
            _ => "Review SWC documentation",
        };
    }

    let lower = title.to_lowercase();
    if lower.contains("reentrancy") {
        "Use ReentrancyGuard and checks-effects-interactions pattern"
    } else if lower.contains("unchecked") {
        "Check return values or use SafeERC20"
    } else if lower.contains("tx.origin") || lower.contains("tx-origin") {
        "Replace tx.origin with msg.sender"
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
    fn test_high_finding_with_swc() {
        let json = r#"{"error": null, "issues": [{"title": "External Call To User-Supplied Address", "severity": "High", "description": "A call to a user-supplied address is executed.", "swc-id": "107", "filename": "contract.sol", "lineno": 15, "contract": "Vault", "function": "withdraw"}], "success": true}"#;
        let exec = exec_with_logs(&["mythril.laser progress 100%", json], 1);

        let outcome = MythrilNormalizer.parse(&exec);
        assert_eq!(outcome.issues.len(), 1);
        let issue = &outcome.issues[0];
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.title, "External Call To User-Supplied Address (SWC 107)");
        assert_eq!(issue.line, Some(15));
        assert!(issue.recommendation.contains("checks-effects-interactions"));
        assert!(outcome.succeeded());
    }

    #[test]
    fn test_exit_1_whitelisted() {
        let exec = exec_with_logs(&[r#"{"error": null, "issues": [], "success": true}"#], 1);
        let outcome = MythrilNormalizer.parse(&exec);
        assert!(!outcome.errors.contains("EXIT_CODE_1"));
        assert!(outcome.succeeded());
    }

    #[test]
    fn test_utility_yul_location_scrubbed() {
        let json = r#"{"issues": [{"title": "Integer Arithmetic Bugs", "severity": "Medium", "description": "overflow", "swc-id": "101", "filename": "contract.sol#utility.yul", "lineno": 3}]}"#;
        let exec = exec_with_logs(&[json], 1);
        let outcome = MythrilNormalizer.parse(&exec);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].source_file.is_none());
        assert!(outcome.issues[0].line.is_none());
    }

    #[test]
    fn test_aborted_analysis_detected() {
        let exec = exec_with_logs(
            &["mythril.mythril.analysis: Exception occurred, aborting analysis."],
            2,
        );
        let outcome = MythrilNormalizer.parse(&exec);
        assert!(outcome.fails.contains("EXCEPTION(analysis aborted)"));
        assert!(outcome.notes.contains("analysis incomplete"));
    }

    #[test]
    fn test_malformed_output() {
        let exec = exec_with_logs(&["garbage output, no json"], 0);
        let outcome = MythrilNormalizer.parse(&exec);
        assert!(outcome.issues.is_empty());
        assert!(outcome.fails.contains("MALFORMED_OUTPUT"));
    }
}
