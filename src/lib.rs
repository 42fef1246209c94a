// Lib file exposing the engine for the binary, the tests and embedding callers.
// This file serves as the root for the library crate.

/// Run orchestration: the `Analyzer`, cancellation and the `RunReport`.
pub mod analyzer;

/// Collects per-unit diagnostics into one ordered, duplicate-free sequence.
pub mod aggregator;

/// Incremental result cache keyed by unit, configuration and rule-set fingerprints.
pub mod cache;

/// Profiles and their resolution into the effective configuration of a run.
pub mod config;

/// Severities, spans, raw findings and diagnostics.
pub mod diagnostics;

/// Pass/fail decision and per-severity counts.
pub mod gate;

/// Reading, parsing and discovering analysis units.
pub mod loader;

/// A uniform view over the Python AST node types.
pub mod node;

/// Text and JSON report rendering.
pub mod output;

/// The rule catalog, the `Rule` trait and the node-kind routing table.
pub mod rules;

/// Inline `# skylos:` suppression directives.
pub mod suppression;

/// Helpers shared across modules.
pub mod utils;

/// The dispatcher walking each unit's AST once and routing nodes to rules.
pub mod visitor;

pub use analyzer::{Analyzer, AnalyzerError, CancellationToken, RunReport, RunStats};
pub use diagnostics::{Diagnostic, Severity, Span};
pub use gate::GateOutcome;
