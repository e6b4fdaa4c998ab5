//! Normalizer for Solhint unix-format output.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ExecutionResult, Issue, Severity};
use crate::normalize::support::{discard_ansi, errors_fails};
use crate::normalize::{Normalizer, ParseOutcome};

/// `file:line:column: message [level/rule-name]`
static REPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<filename>[^:]*)
        :(?P<line>\d+)
        :(?P<column>\d+)
        :\s*(?P<message>.*?)
        \s*\[(?P<level>[^\[/\]]*)/
        (?P<name>[^\[/\]]*)\]$
    ",
    )
    .unwrap()
});

/// Parses `solhint -f unix` line reports.
///
/// Exit code 1 signals findings, not failure. Lines that do not match the
/// report grammar (banners, summaries) are skipped.
pub struct SolhintNormalizer;

impl Normalizer for SolhintNormalizer {
    fn tool_id(&self) -> &'static str {
        "solhint"
    }

    fn parse(&self, exec: &ExecutionResult) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        let (errors, fails) = errors_fails(exec.exit_code, &exec.log_lines);
        outcome.errors = errors;
        outcome.fails = fails;
        outcome.errors.remove("EXIT_CODE_1");

        for line in discard_ansi(&exec.log_lines) {
            let Some(caps) = REPORT.captures(&line) else {
                continue;
            };

            let severity = match caps["level"].to_lowercase().as_str() {
                "error" => Severity::High,
                "warning" => Severity::Medium,
                "info" => Severity::Low,
                other => Severity::from_label(other),
            };
            let name = caps["name"].to_string();

            outcome.issues.push(Issue {
                tool: "solhint".to_string(),
                severity,
                description: caps["message"].to_string(),
                line: caps["line"].parse().ok(),
                line_end: None,
                source_file: Some(caps["filename"].to_string()),
                contract: None,
                function: None,
                recommendation: format!("Rule: {}", name),
                title: name,
            });
        }

        outcome
    }
}
