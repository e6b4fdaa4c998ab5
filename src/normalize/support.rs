//! Shared helpers for tool output normalization.
//!
//! Implements the uniform error/fail taxonomy applied to every tool:
//! `TIMEOUT`, `COMMAND_NOT_FOUND`, `EXIT_CODE_<n>`, `MALFORMED_OUTPUT`,
//! and `EXCEPTION(<summary>)` for stack-trace-like log patterns.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Conventional exit code for "command not found".
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

static ANSI: LazyLock<Regex> = LazyLock::new(|| Regex::new("\x1b\\[[^m]*m").unwrap());

/// Patterns whose first capture summarizes an uncaught tool exception.
static EXCEPTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r".*line [0-9: ]*(Segmentation fault|Killed)").unwrap(),
        Regex::new(r#"Exception in thread "[^"]*" (.*)"#).unwrap(),
        Regex::new(r"^(?:[a-zA-Z0-9]+\.)+[a-zA-Z0-9]*(?:Exception|Error): (.*)$").unwrap(),
        Regex::new(r"thread '[^']*' panicked at '([^']*)'").unwrap(),
    ]
});

const PYTHON_TRACEBACK: &str = "Traceback (most recent call last):";

/// Removes ANSI escape sequences from log lines.
pub fn discard_ansi(lines: &[String]) -> Vec<String> {
    lines.iter().map(|l| ANSI.replace_all(l, "").into_owned()).collect()
}

/// Scans log lines for uncaught exception signatures.
///
/// A Python traceback is summarized by the first non-indented line that
/// follows it; other runtimes are matched line by line.
pub fn scan_exceptions(lines: &[String]) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut in_traceback = false;

    for line in lines {
        if in_traceback {
            if !line.is_empty() && !line.starts_with(' ') {
                found.insert(format!("EXCEPTION({})", line.trim()));
                in_traceback = false;
            }
        } else if line.ends_with(PYTHON_TRACEBACK) {
            in_traceback = true;
        } else {
            for pattern in EXCEPTION_PATTERNS.iter() {
                if let Some(caps) = pattern.captures(line) {
                    found.insert(format!("EXCEPTION({})", &caps[1]));
                    break;
                }
            }
        }
    }

    found
}

/// Classifies an exit code and log into the uniform taxonomy.
///
/// Returns `(errors, fails)`: errors are conditions the tool detected and
/// reported itself (nonzero exits), fails are conditions the tool did not
/// survive (timeout, missing binary, uncaught exceptions).
pub fn errors_fails(
    exit_code: Option<i32>,
    log_lines: &[String],
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut errors = BTreeSet::new();
    let mut fails = BTreeSet::new();

    match exit_code {
        None => {
            fails.insert("TIMEOUT".to_string());
        }
        Some(0) => {}
        Some(EXIT_COMMAND_NOT_FOUND) => {
            fails.insert("COMMAND_NOT_FOUND".to_string());
        }
        Some(code) => {
            errors.insert(format!("EXIT_CODE_{}", code));
        }
    }

    fails.extend(scan_exceptions(&discard_ansi(log_lines)));

    (errors, fails)
}

/// Extracts the first balanced JSON object embedded in free-form text.
///
/// Several tools interleave human-readable progress lines with their JSON
/// document, so structural extraction has to tolerate leading and trailing
/// noise.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_timeout_maps_to_fail() {
        let (errors, fails) = errors_fails(None, &[]);
        assert!(errors.is_empty());
        assert!(fails.contains("TIMEOUT"));
    }

    #[test]
    fn test_command_not_found() {
        let (errors, fails) = errors_fails(Some(127), &[]);
        assert!(errors.is_empty());
        assert!(fails.contains("COMMAND_NOT_FOUND"));
    }

    #[test]
    fn test_nonzero_exit_is_error_not_fail() {
        let (errors, fails) = errors_fails(Some(2), &[]);
        assert!(errors.contains("EXIT_CODE_2"));
        assert!(fails.is_empty());
    }

    #[test]
    fn test_clean_exit() {
        let (errors, fails) = errors_fails(Some(0), &[]);
        assert!(errors.is_empty());
        assert!(fails.is_empty());
    }

    #[test]
    fn test_python_traceback_summary() {
        let log = lines(&[
            "analyzing...",
            "Traceback (most recent call last):",
            "  File \"myth.py\", line 10, in <module>",
            "    raise ValueError(\"bad bytecode\")",
            "ValueError: bad bytecode",
        ]);
        let found = scan_exceptions(&log);
        assert_eq!(found.len(), 1);
        assert!(found.iter().next().unwrap().starts_with("EXCEPTION("));
    }

    #[test]
    fn test_rust_panic_pattern() {
        let log = lines(&["thread 'main' panicked at 'index out of bounds'"]);
        let found = scan_exceptions(&log);
        assert!(found.contains("EXCEPTION(index out of bounds)"));
    }

    #[test]
    fn test_discard_ansi() {
        let log = lines(&["\x1b[31mHigh\x1b[0m severity"]);
        assert_eq!(discard_ansi(&log), vec!["High severity"]);
    }

    #[test]
    fn test_extract_json_object_with_noise() {
        let text = "Compiling contract...\n{\"ok\": {\"nested\": \"}\"}} trailing noise";
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, "{\"ok\": {\"nested\": \"}\"}}");
        assert!(serde_json::from_str::<serde_json::Value>(json).is_ok());
    }

    #[test]
    fn test_extract_json_object_absent() {
        assert!(extract_json_object("no json here").is_none());
    }
}
