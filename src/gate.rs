//! Reduces a run's diagnostics to a pass/fail decision.

use crate::diagnostics::{Diagnostic, Severity};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateOutcome {
    Pass,
    Fail,
    /// The run was cancelled before every unit was analyzed.
    Incomplete,
}

impl GateOutcome {
    /// Process exit code for this outcome. Engine errors use 2, outside the gate.
    pub fn exit_code(&self) -> i32 {
        match self {
            GateOutcome::Pass => 0,
            GateOutcome::Fail => 1,
            GateOutcome::Incomplete => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Pass => "PASS",
            GateOutcome::Fail => "FAIL",
            GateOutcome::Incomplete => "INCOMPLETE",
        }
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub error: usize,
    pub warning: usize,
    pub information: usize,
}

impl SeverityCounts {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut counts = Self::default();
        for diag in diagnostics {
            match diag.severity {
                Severity::Error => counts.error += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Information => counts.information += 1,
            }
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Information => self.information,
        }
    }

    /// Number of diagnostics at or above `threshold`.
    pub fn at_or_above(&self, threshold: Severity) -> usize {
        Severity::ALL
            .iter()
            .filter(|s| **s >= threshold)
            .map(|s| self.get(*s))
            .sum()
    }

    pub fn total(&self) -> usize {
        self.error + self.warning + self.information
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub outcome: GateOutcome,
    pub fail_threshold: Severity,
    pub counts: SeverityCounts,
}

/// FAIL if any diagnostic is at or above `fail_threshold`, PASS otherwise.
/// An incomplete run is INCOMPLETE whatever it found.
pub fn evaluate(diagnostics: &[Diagnostic], fail_threshold: Severity, completed: bool) -> GateReport {
    let counts = SeverityCounts::from_diagnostics(diagnostics);
    let outcome = if !completed {
        GateOutcome::Incomplete
    } else if counts.at_or_above(fail_threshold) > 0 {
        GateOutcome::Fail
    } else {
        GateOutcome::Pass
    };
    GateReport {
        outcome,
        fail_threshold,
        counts,
    }
}
