//! Minimal report renderers used by the command-line front end.
//!
//! Renderers build strings; printing is left to the binary.

use crate::analyzer::RunReport;
use crate::config::EffectiveConfig;
use crate::diagnostics::Severity;
use crate::gate::GateOutcome;
use crate::rules::RuleRegistry;
use colored::*;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn paint_severity(severity: Severity) -> ColoredString {
    match severity {
        Severity::Error => severity.as_str().red().bold(),
        Severity::Warning => severity.as_str().yellow(),
        Severity::Information => severity.as_str().cyan(),
    }
}

fn paint_outcome(outcome: GateOutcome) -> ColoredString {
    match outcome {
        GateOutcome::Pass => outcome.as_str().green().bold(),
        GateOutcome::Fail => outcome.as_str().red().bold(),
        GateOutcome::Incomplete => outcome.as_str().yellow().bold(),
    }
}

/// Human-readable report: one line per diagnostic, then warnings and a summary.
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();

    for diag in &report.diagnostics {
        let _ = writeln!(
            out,
            "{}:{}:{}: {} [{}] {}",
            diag.file.display(),
            diag.span.start_line,
            diag.span.start_column,
            paint_severity(diag.severity),
            diag.rule_id.dimmed(),
            diag.message
        );
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "\n{}", "Warnings".bold());
        for warning in &report.warnings {
            let _ = writeln!(out, " * {}", warning);
        }
    }

    let stats = &report.stats;
    let counts = &report.gate.counts;
    let _ = writeln!(out, "\n{}", "Summary".bold());
    let _ = writeln!(
        out,
        " * Units: {} analyzed ({} cached), {} excluded, {} failed to load",
        stats.analyzed, stats.cached, stats.excluded, stats.load_failed
    );
    if stats.abandoned > 0 {
        let _ = writeln!(out, " * Abandoned: {}", stats.abandoned);
    }
    let _ = writeln!(
        out,
        " * Diagnostics: {} errors, {} warnings, {} information",
        counts.error, counts.warning, counts.information
    );
    let _ = writeln!(
        out,
        " * Gate: {} (fail threshold {})",
        paint_outcome(report.gate.outcome),
        report.gate.fail_threshold
    );
    out
}

pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Rule catalog with the state each rule has under `config`.
pub fn render_rules(registry: &RuleRegistry, config: &EffectiveConfig) -> String {
    let mut out = String::new();
    for rule in registry.iter() {
        let (state, severity) = match config.rule(rule.id()) {
            Some(settings) if settings.enabled => ("on".green(), settings.severity),
            Some(settings) => ("off".dimmed(), settings.severity),
            None => ("off".dimmed(), rule.default_severity()),
        };
        let _ = writeln!(
            out,
            "{:<28} {:<3} {:<11} {}",
            rule.id().bold(),
            state,
            severity.as_str(),
            rule.description()
        );
        if let Some(settings) = config.rule(rule.id()) {
            for (name, value) in &settings.parameters.0 {
                let _ = writeln!(out, "{:<28}     {} = {}", "", name, value);
            }
        }
    }
    out
}
