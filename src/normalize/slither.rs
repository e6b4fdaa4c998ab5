//! Normalizer for Slither JSON output.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::models::{ExecutionResult, Issue, Severity};
use crate::normalize::support::{errors_fails, extract_json_object};
use crate::normalize::{Normalizer, ParseOutcome};

/// Location suffix in detector descriptions: `path#12` or `path#12-15`.
static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^#\s]+)#(\d+)(?:-(\d+))?").unwrap());

/// Parses Slither's `--json` document.
///
/// Quirk, observed in the wild and deliberately kept per-tool: Slither
/// sometimes reports `"success": false` while still emitting valid
/// detectors. Findings are therefore extracted from `results.detectors`
/// BEFORE the success flag is consulted; a false flag with findings
/// present produces a note, never a drop.
pub struct SlitherNormalizer;

impl Normalizer for SlitherNormalizer {
    fn tool_id(&self) -> &'static str {
        "slither"
    }

    fn parse(&self, exec: &ExecutionResult) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        let (errors, fails) = errors_fails(exec.exit_code, &exec.log_lines);
        outcome.errors = errors;
        outcome.fails = fails;

        // Slither exits 255 when detectors fire; that is not an error.
        outcome.errors.remove("EXIT_CODE_255");
        outcome.errors.remove("EXIT_CODE_1");

        if let Some(reason) = &exec.retrieval_failure {
            outcome.fails.insert("MALFORMED_OUTPUT".to_string());
            outcome.notes.insert(format!("output retrieval: {}", reason));
            return outcome;
        }

        // File mode: the JSON document is the extracted output file.
        // Fall back to scanning the logs for an embedded object.
        let text = match exec.output_text() {
            Some(t) if !t.trim().is_empty() => t,
            _ => exec.log_text(),
        };

        let document: Value = match parse_document(&text) {
            Some(doc) => doc,
            None => {
                if exec.exit_code.is_some() {
                    outcome.fails.insert("MALFORMED_OUTPUT".to_string());
                }
                return outcome;
            }
        };

        let detectors = document
            .pointer("/results/detectors")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for detector in &detectors {
            outcome.issues.push(parse_detector(detector));
        }

        // Success flag is consulted only after findings were extracted.
        if !document["success"].as_bool().unwrap_or(false) {
            if !detectors.is_empty() {
                outcome
                    .notes
                    .insert("detectors present despite success=false".to_string());
            } else if let Some(err) = document["error"].as_str() {
                outcome.errors.insert(format!("slither: {}", truncate(err, 80)));
            }
        }

        outcome
    }
}

fn parse_document(text: &str) -> Option<Value> {
    if let Ok(doc) = serde_json::from_str::<Value>(text.trim()) {
        return Some(doc);
    }
    extract_json_object(text).and_then(|s| serde_json::from_str(s).ok())
}

fn parse_detector(detector: &Value) -> Issue {
    let check = detector["check"].as_str().unwrap_or("");
    let impact = detector["impact"].as_str().unwrap_or("Informational");
    let description = detector["description"].as_str().unwrap_or("").to_string();

    let severity = match impact {
        "High" => Severity::High,
        "Medium" => Severity::Medium,
        "Low" => Severity::Low,
        "Informational" | "Optimization" => Severity::Info,
        other => Severity::from_label(other),
    };

    let mut line = None;
    let mut line_end = None;
    let mut source_file = None;
    let mut contract = None;
    let mut function = None;

    if let Some(caps) = LOCATION.captures(&description) {
        source_file = Some(caps[1].trim_start_matches('(').to_string());
        line = caps[2].parse().ok();
        line_end = caps.get(3).and_then(|m| m.as_str().parse().ok());
    }

    for element in detector["elements"].as_array().into_iter().flatten() {
        if element["type"].as_str() == Some("function") {
            function = element["name"].as_str().map(String::from);
            let parent = &element["type_specific_fields"]["parent"];
            if parent["type"].as_str() == Some("contract") {
                contract = parent["name"].as_str().map(String::from);
            }
        }
        if let Some(mapping) = element.get("source_mapping") {
            let mut lines: Vec<usize> = mapping["lines"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_u64().map(|n| n as usize))
                .collect();
            lines.sort_unstable();
            if line.is_none() {
                line = lines.first().copied();
            }
            if line_end.is_none() && lines.len() > 1 {
                line_end = lines.last().copied();
            }
            if source_file.is_none() {
                source_file = mapping["filename_absolute"]
                    .as_str()
                    .and_then(|p| p.rsplit('/').next())
                    .map(String::from);
            }
        }
    }

    Issue {
        tool: "slither".to_string(),
        severity,
        title: if check.is_empty() {
            "Slither Finding".to_string()
        } else {
            check.to_string()
        },
        description: if description.is_empty() {
            format!("{} detected", check)
        } else {
            description
        },
        line,
        line_end,
        source_file,
        contract,
        function,
        recommendation: recommendation_for(check).to_string(),
    }
}

fn recommendation_for(check: &str) -> &'static str {
    match check {
        "reentrancy-eth" | "reentrancy-no-eth" => {
            "Use ReentrancyGuard and checks-effects-interactions pattern"
        }
        "unchecked-transfer" | "unchecked-send" => "Check return value or use SafeERC20",
        "tx-origin" => "Replace tx.origin with msg.sender",
        "arbitrary-send-eth" => "Add access control and input validation",
        "suicidal" => "Add access control to selfdestruct",
        "locked-ether" => "Add withdrawal function or make contract payable",
        _ => "Review and apply security best practices",
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../fixtures/slither_output.json");

    fn exec_with_file(json: &str, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(exit_code),
            log_lines: vec![],
            output_blob: Some(json.as_bytes().to_vec()),
            retrieval_failure: None,
        }
    }

    #[test]
    fn test_single_high_finding() {
        let outcome = SlitherNormalizer.parse(&exec_with_file(FIXTURE, 255));
        assert_eq!(outcome.issues.len(), 1);
        let issue = &outcome.issues[0];
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.title, "reentrancy-eth");
        assert_eq!(issue.contract.as_deref(), Some("Vault"));
        assert_eq!(issue.function.as_deref(), Some("withdraw"));
        assert_eq!(issue.line, Some(12));
    }

    #[test]
    fn test_findings_kept_despite_false_success_flag() {
        // The fixture carries success=false with one detector present:
        // the finding must be returned, with a note rather than a drop.
        let outcome = SlitherNormalizer.parse(&exec_with_file(FIXTURE, 255));
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.succeeded());
        assert!(outcome
            .notes
            .contains("detectors present despite success=false"));
    }

    #[test]
    fn test_exit_255_whitelisted() {
        let outcome = SlitherNormalizer.parse(&exec_with_file(FIXTURE, 255));
        assert!(!outcome.errors.contains("EXIT_CODE_255"));
    }

    #[test]
    fn test_malformed_output() {
        let outcome = SlitherNormalizer.parse(&exec_with_file("not json at all", 0));
        assert!(outcome.issues.is_empty());
        assert!(outcome.fails.contains("MALFORMED_OUTPUT"));
    }

    #[test]
    fn test_retrieval_failure_is_not_masked() {
        let exec = ExecutionResult {
            exit_code: Some(0),
            log_lines: vec!["Compilation warnings".to_string()],
            output_blob: None,
            retrieval_failure: Some("output.json missing".to_string()),
        };
        let outcome = SlitherNormalizer.parse(&exec);
        assert!(outcome.fails.contains("MALFORMED_OUTPUT"));
        assert!(!outcome.succeeded());
    }

    #[test]
    fn test_json_embedded_in_logs_fallback() {
        let exec = ExecutionResult {
            exit_code: Some(255),
            log_lines: vec![
                "INFO:Detectors:".to_string(),
                FIXTURE.to_string(),
            ],
            output_blob: None,
            retrieval_failure: None,
        };
        let outcome = SlitherNormalizer.parse(&exec);
        assert_eq!(outcome.issues.len(), 1);
    }

    #[test]
    fn test_empty_detectors_clean_run() {
        let json = r#"{"success": true, "error": null, "results": {"detectors": []}}"#;
        let outcome = SlitherNormalizer.parse(&exec_with_file(json, 0));
        assert!(outcome.issues.is_empty());
        assert!(outcome.succeeded());
    }
}
