use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use skylos_lint::analyzer::{Analyzer, CancellationToken};
use skylos_lint::cache::{Cache, DiskCache};
use skylos_lint::config::{CliOptions, EffectiveConfig, Profile};
use skylos_lint::diagnostics::Severity;
use skylos_lint::output::{self, OutputFormat};
use skylos_lint::rules::RuleRegistry;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit code for configuration errors, unreadable targets and other engine failures.
const ENGINE_ERROR_EXIT: u8 = 2;

const DEFAULT_CACHE_DIR: &str = ".skylos_cache";

/// Command line interface configuration using `clap`.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Python file or directory to analyze.
    path: PathBuf,

    /// Configuration profile (JSON or YAML).
    /// Without it, `.skylos.json`, `.skylos.yaml` or `.skylos.yml` is searched upward from the target.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Glob of paths to skip entirely. Repeatable; applied after the profile's `exclude`.
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Minimum severity to report (Error, Warning, Information).
    #[arg(short, long)]
    severity: Option<Severity>,

    /// Minimum severity that fails the gate.
    #[arg(long)]
    fail_on: Option<Severity>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Worker threads; 0 uses every available CPU.
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Cache directory. Defaults to `.skylos_cache` next to the analyzed sources.
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,

    /// Disable the result cache.
    #[arg(long)]
    no_cache: bool,

    /// Delete every cached entry before analyzing.
    #[arg(long)]
    clear_cache: bool,

    /// Cancel the run after this many seconds; the gate then reports INCOMPLETE.
    #[arg(long)]
    time_limit: Option<u64>,

    /// Print the rule catalog with its effective settings and exit.
    #[arg(long)]
    list_rules: bool,

    /// Debug logging on stderr. `RUST_LOG` takes precedence.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("skylos_lint=debug")
    } else {
        EnvFilter::new("skylos_lint=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Directory the target lives in: the target itself, or the parent of a file target.
fn target_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn load_profile(cli: &Cli) -> Result<Option<Profile>> {
    if let Some(path) = &cli.config {
        let profile = Profile::from_file(path)?;
        debug!(config = %path.display(), "loaded profile");
        return Ok(Some(profile));
    }
    match Profile::find(&target_dir(&cli.path))? {
        Some((path, profile)) => {
            debug!(config = %path.display(), "discovered profile");
            Ok(Some(profile))
        }
        None => Ok(None),
    }
}

/// Runs the analysis and returns the gate's exit code.
fn run(cli: &Cli) -> Result<u8> {
    let registry = RuleRegistry::builtin();
    let profile = load_profile(cli)?;
    let options = CliOptions {
        exclude: cli.exclude.clone(),
        report_threshold: cli.severity,
        fail_threshold: cli.fail_on,
    };
    let config = EffectiveConfig::resolve(&registry, profile.as_ref(), &options)?;

    if cli.list_rules {
        print!("{}", output::render_rules(&registry, &config));
        return Ok(0);
    }

    let cache_dir = cli
        .cache_dir
        .clone()
        .unwrap_or_else(|| target_dir(&cli.path).join(DEFAULT_CACHE_DIR));
    if cli.clear_cache {
        let removed = DiskCache::clear(&cache_dir)
            .with_context(|| format!("failed to clear cache at {}", cache_dir.display()))?;
        debug!(removed, "cache cleared");
    }
    let cache = if cli.no_cache {
        Cache::disabled()
    } else {
        Cache::disk(&cache_dir)
    };

    let cancel = CancellationToken::new();
    if let Some(seconds) = cli.time_limit {
        let token = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            token.cancel();
        });
    }

    let analyzer = Analyzer::new(registry, config)
        .with_cache(cache)
        .with_jobs(cli.jobs)
        .with_cancellation(cancel);

    if cli.format == OutputFormat::Text {
        println!("Analyzing path: {}", cli.path.display());
    }
    let report = analyzer.analyze_path(&cli.path)?;
    debug!(cache = ?analyzer.cache_stats(), "cache statistics");

    match cli.format {
        OutputFormat::Json => println!("{}", output::render_json(&report)?),
        OutputFormat::Text => print!("{}", output::render_text(&report)),
    }

    Ok(report.gate.outcome.exit_code() as u8)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(ENGINE_ERROR_EXIT)
        }
    }
}
