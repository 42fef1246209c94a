use crate::aggregator::Aggregator;
use crate::cache::{Cache, CacheKey, CacheStats};
use crate::config::{ConfigError, EffectiveConfig};
use crate::diagnostics::{sort_and_dedup, Diagnostic, Severity, RULE_FAILURE_ID};
use crate::gate::{self, GateReport};
use crate::loader::{self, AnalysisUnit, UnitInput};
use crate::rules::{RoutingTable, RuleRegistry, UnitContext};
use crate::suppression::Suppressions;
use crate::visitor::{DispatchOutcome, Dispatcher};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Worker thread stack size. Deeply nested sources make the AST walk recurse deeply.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Cooperative cancellation flag shared between the caller and the workers of a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("cannot read target {path}: {source}")]
    Target {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-run unit statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Units handed to the run.
    pub discovered: usize,
    /// Units whose diagnostics are part of the result (cached or dispatched).
    pub analyzed: usize,
    /// Units skipped by path exclusion.
    pub excluded: usize,
    /// Units answered from the cache.
    pub cached: usize,
    /// Units walked by the dispatcher.
    pub dispatched: usize,
    /// Units that could not be read or parsed.
    pub load_failed: usize,
    /// Units dropped because the run was cancelled.
    pub abandoned: usize,
}

/// The outcome of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Every diagnostic of the run, sorted by (file, rule id, span, message).
    pub diagnostics: Vec<Diagnostic>,
    pub gate: GateReport,
    pub stats: RunStats,
    /// Run-level problems that did not stop the run, such as unreadable units.
    pub warnings: Vec<String>,
    /// False when the run was cancelled.
    pub completed: bool,
}

/// What happened to one unit.
enum UnitResult {
    Excluded,
    LoadFailed(String),
    Abandoned,
    Cached(Vec<Diagnostic>),
    Dispatched(Vec<Diagnostic>),
}

/// The run orchestrator.
///
/// Holds the immutable rule registry and effective configuration, plus a cache that outlives
/// individual runs. Units are processed in parallel on a dedicated `rayon` pool; per-unit
/// results are merged sequentially once the pool is done.
pub struct Analyzer {
    registry: RuleRegistry,
    config: EffectiveConfig,
    cache: Cache,
    jobs: usize,
    cancel: CancellationToken,
    ruleset_version: String,
}

impl Analyzer {
    /// Creates an analyzer with caching disabled and one worker per CPU.
    pub fn new(registry: RuleRegistry, config: EffectiveConfig) -> Self {
        let ruleset_version = registry.ruleset_version();
        Self {
            registry,
            config,
            cache: Cache::disabled(),
            jobs: 0,
            cancel: CancellationToken::new(),
            ruleset_version,
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    /// Worker count; 0 means the number of available CPUs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    /// Cumulative cache counters over every run of this analyzer.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Discovers `.py` files under `target` and analyzes them.
    pub fn analyze_path(&self, target: &Path) -> Result<RunReport, AnalyzerError> {
        let files = loader::discover(target).map_err(|source| AnalyzerError::Target {
            path: target.to_path_buf(),
            source,
        })?;
        debug!(target = %target.display(), files = files.len(), "discovered units");
        self.run(&files)
    }

    /// Analyzes units whose source is already in memory.
    pub fn analyze_units(&self, units: &[AnalysisUnit]) -> Result<RunReport, AnalyzerError> {
        self.run(units)
    }

    fn run<I: UnitInput>(&self, inputs: &[I]) -> Result<RunReport, AnalyzerError> {
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .stack_size(WORKER_STACK_SIZE)
            .build()?;

        let routes = self.registry.routing_table(&self.config);
        debug!(rules = ?routes.rule_ids(), "routing table built");

        let results: Vec<UnitResult> = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| self.process_unit(input, &routes))
                .collect()
        });

        let mut stats = RunStats {
            discovered: inputs.len(),
            ..RunStats::default()
        };
        let mut warnings = Vec::new();
        let mut aggregator = Aggregator::new();
        for result in results {
            match result {
                UnitResult::Excluded => stats.excluded += 1,
                UnitResult::LoadFailed(message) => {
                    stats.load_failed += 1;
                    warnings.push(message);
                }
                UnitResult::Abandoned => stats.abandoned += 1,
                UnitResult::Cached(diagnostics) => {
                    stats.cached += 1;
                    aggregator.add_unit(diagnostics);
                }
                UnitResult::Dispatched(diagnostics) => {
                    stats.dispatched += 1;
                    aggregator.add_unit(diagnostics);
                }
            }
        }
        stats.analyzed = aggregator.units();

        let completed = !self.cancel.is_cancelled();
        if !completed {
            warn!(abandoned = stats.abandoned, "run cancelled before completion");
        }
        let diagnostics = aggregator.finish();
        let gate = gate::evaluate(&diagnostics, self.config.fail_threshold, completed);

        info!(
            units = stats.discovered,
            analyzed = stats.analyzed,
            cached = stats.cached,
            diagnostics = diagnostics.len(),
            outcome = %gate.outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );

        Ok(RunReport {
            diagnostics,
            gate,
            stats,
            warnings,
            completed,
        })
    }

    /// The per-unit pipeline: exclusion, cache lookup, dispatch, severity override,
    /// suppression, threshold filter, sort/dedup, cache store.
    fn process_unit<I: UnitInput>(&self, input: &I, routes: &RoutingTable<'_>) -> UnitResult {
        if self.cancel.is_cancelled() {
            return UnitResult::Abandoned;
        }
        let path = input.path();
        if self.config.is_excluded(path) {
            debug!(file = %path.display(), "excluded");
            return UnitResult::Excluded;
        }

        let unit = match input.load() {
            Ok(unit) => unit,
            Err(e) => {
                warn!(error = %e, "skipping unit");
                return UnitResult::LoadFailed(e.to_string());
            }
        };

        let key = CacheKey::new(
            &unit.path,
            unit.fingerprint.as_str(),
            self.config.fingerprint(),
            self.ruleset_version.as_str(),
        );
        if let Some(diagnostics) = self.cache.lookup(&key) {
            debug!(file = %unit.path.display(), "cache hit");
            return UnitResult::Cached(diagnostics);
        }

        let parsed = match unit.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "skipping unit");
                return UnitResult::LoadFailed(e.to_string());
            }
        };

        let ignored = self.config.ignored_rules_for(&unit.path);
        let narrowed;
        let table = if ignored.is_empty() {
            routes
        } else {
            narrowed = routes.without(&ignored);
            &narrowed
        };

        let ctx = UnitContext {
            path: &unit.path,
            source: &unit.source,
            line_index: &parsed.line_index,
        };
        let output = match Dispatcher::new(table, &self.cancel).run(&ctx, &parsed.body) {
            DispatchOutcome::Completed(output) => output,
            DispatchOutcome::Cancelled => {
                debug!(file = %unit.path.display(), "abandoned mid-walk");
                return UnitResult::Abandoned;
            }
        };
        debug!(
            file = %unit.path.display(),
            evaluations = output.evaluations,
            findings = output.findings.len(),
            "dispatched"
        );

        let mut diagnostics: Vec<Diagnostic> = output
            .findings
            .into_iter()
            .map(|finding| {
                let severity = self
                    .config
                    .rule(finding.rule_id)
                    .map(|settings| settings.severity)
                    .unwrap_or(finding.severity);
                Diagnostic::new(
                    finding.rule_id,
                    unit.path.as_path(),
                    finding.span,
                    finding.message,
                    severity,
                )
            })
            .collect();
        diagnostics.extend(output.failures.into_iter().map(|failure| {
            Diagnostic::new(
                RULE_FAILURE_ID,
                unit.path.as_path(),
                failure.span,
                format!("Rule '{}' failed: {}", failure.rule_id, failure.reason),
                Severity::Warning,
            )
        }));

        let suppressions = Suppressions::scan(&unit.source, &output.statements, &self.registry);
        let mut diagnostics = suppressions.apply(diagnostics);
        diagnostics.extend(suppressions.error_diagnostics(&unit.path));
        diagnostics.retain(|d| self.config.should_report(d.severity));
        sort_and_dedup(&mut diagnostics);

        self.cache.store(&key, &diagnostics);
        UnitResult::Dispatched(diagnostics)
    }
}
