//! Output normalization: one strategy per tool id.
//!
//! Each normalizer encodes a single tool's output grammar and maps it into
//! the canonical [`Issue`](crate::models::Issue) shape. The set of
//! normalizers is closed and enumerable; dispatch is a static lookup by
//! tool id, not dynamic loading.

mod mythril;
mod semgrep;
mod slither;
mod solhint;
pub mod support;

pub use mythril::MythrilNormalizer;
pub use semgrep::SemgrepNormalizer;
pub use slither::SlitherNormalizer;
pub use solhint::SolhintNormalizer;

use crate::models::{ExecutionResult, Issue};
use std::collections::BTreeSet;

/// Outcome of parsing one tool's raw output.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Canonical issues, in the tool's emission order.
    pub issues: Vec<Issue>,
    /// Conditions the tool detected and reported itself (nonzero exits,
    /// self-reported errors).
    pub errors: BTreeSet<String>,
    /// Conditions the tool did not survive: timeout, missing binary,
    /// malformed output, uncaught exceptions.
    pub fails: BTreeSet<String>,
    /// Informational notes about parser quirks handled along the way.
    pub notes: BTreeSet<String>,
}

impl ParseOutcome {
    /// True when the tool produced a parseable (possibly empty) issue list.
    pub fn succeeded(&self) -> bool {
        self.fails.is_empty()
    }
}

/// Converts one tool's raw execution result into canonical issues.
///
/// Implementations must never panic on malformed input: structural parse
/// failures yield an empty issue list plus a `MALFORMED_OUTPUT` fails
/// entry, so a single bad tool never halts the batch.
pub trait Normalizer: Send + Sync {
    /// Tool id this normalizer handles.
    fn tool_id(&self) -> &'static str;

    /// Parses the execution result.
    fn parse(&self, exec: &ExecutionResult) -> ParseOutcome;
}

static SLITHER: SlitherNormalizer = SlitherNormalizer;
static MYTHRIL: MythrilNormalizer = MythrilNormalizer;
static SEMGREP: SemgrepNormalizer = SemgrepNormalizer;
static SOLHINT: SolhintNormalizer = SolhintNormalizer;

/// Static normalizer lookup by tool id.
pub fn normalizer_for(tool_id: &str) -> Option<&'static dyn Normalizer> {
    match tool_id {
        "slither" => Some(&SLITHER),
        "mythril" => Some(&MYTHRIL),
        "semgrep" => Some(&SEMGREP),
        "solhint" => Some(&SOLHINT),
        _ => None,
    }
}
