//! Severity levels, source spans, raw findings and final diagnostics.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Rule id used for diagnostics synthesised when a rule errors or panics.
pub const RULE_FAILURE_ID: &str = "rule-failure";

/// Rule id used for diagnostics about malformed or stale inline directives.
pub const INVALID_SUPPRESSION_ID: &str = "invalid-suppression";

/// Severity level of a finding. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Information, Severity::Warning, Severity::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a severity string is outside the recognized set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSeverity(pub String);

impl fmt::Display for UnknownSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown severity '{}' (expected Error, Warning or Information)",
            self.0
        )
    }
}

impl std::error::Error for UnknownSeverity {}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "information" | "info" => Ok(Severity::Information),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// A 1-based line/column range in a source file. Columns count characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A span covering the whole of a single line, used for comment-level diagnostics.
    pub fn line(line: usize) -> Self {
        Self::new(line, 1, line, 1)
    }
}

/// A finding as produced by a rule, before configuration and suppressions apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFinding {
    pub rule_id: &'static str,
    pub span: Span,
    pub message: String,
    /// Severity declared by the rule, before any override.
    pub severity: Severity,
}

/// A finalized, reportable rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule_id: String,
    pub file: PathBuf,
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(
        rule_id: impl Into<String>,
        file: impl Into<PathBuf>,
        span: Span,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            file: file.into(),
            span,
            message: message.into(),
            severity,
        }
    }

    /// Two diagnostics with the same identity collapse into one.
    pub fn same_identity(&self, other: &Diagnostic) -> bool {
        self.rule_id == other.rule_id
            && self.file == other.file
            && self.span == other.span
            && self.message == other.message
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then_with(|| self.rule_id.cmp(&other.rule_id))
            .then_with(|| self.span.cmp(&other.span))
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.severity.cmp(&other.severity))
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts diagnostics and collapses entries with identical identity.
///
/// When duplicates disagree on severity the most severe one is kept.
pub fn sort_and_dedup(diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.sort();
    // Sorted ascending by severity within an identity group, so keep the last.
    let mut out: Vec<Diagnostic> = Vec::with_capacity(diagnostics.len());
    for diag in diagnostics.drain(..) {
        match out.last_mut() {
            Some(last) if last.same_identity(&diag) => *last = diag,
            _ => out.push(diag),
        }
    }
    *diagnostics = out;
}
