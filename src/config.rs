//! Configuration profiles and their resolution into one effective per-run configuration.

use crate::diagnostics::Severity;
use crate::rules::{Parameters, RuleRegistry};
use crate::utils::sha256_hex;
use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File names probed, in order, when no profile is given explicitly.
pub const PROFILE_NAMES: &[&str] = &[".skylos.json", ".skylos.yaml", ".skylos.yml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown rule '{id}' referenced in {context}")]
    UnknownRule { id: String, context: String },
    #[error("invalid severity '{value}' in {context} (expected Error, Warning or Information)")]
    InvalidSeverity { value: String, context: String },
    #[error("rule '{rule}' has no parameter '{name}'")]
    UnknownParameter { rule: String, name: String },
    #[error("parameter '{name}' of rule '{rule}' must be a {expected}")]
    InvalidParameter {
        rule: String,
        name: String,
        expected: &'static str,
    },
    #[error("invalid glob pattern: {0}")]
    InvalidGlob(#[from] globset::Error),
}

/// Per-rule section of a profile. Every field is optional; absent fields keep the default.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleOverride {
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// User configuration profile (`.skylos.json` / `.skylos.yaml`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Profile {
    /// When false, every rule starts disabled and only rules enabled under `rules` run.
    #[serde(default = "default_true")]
    pub include_default_rules: bool,

    /// Rules to disable. Wins over `enable: true` under `rules`.
    #[serde(default)]
    pub exclude_rules: Vec<String>,

    #[serde(default)]
    pub rules: BTreeMap<String, RuleOverride>,

    /// Minimum severity to report.
    #[serde(default)]
    pub severity_report_threshold: Option<String>,

    /// Minimum severity that fails the gate.
    #[serde(default)]
    pub fail_threshold: Option<String>,

    /// Path globs; matching units are not analyzed at all.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Path glob -> rule ids disabled for matching units only.
    #[serde(default)]
    pub per_file_ignores: BTreeMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            include_default_rules: true,
            exclude_rules: Vec::new(),
            rules: BTreeMap::new(),
            severity_report_threshold: None,
            fail_threshold: None,
            exclude: Vec::new(),
            per_file_ignores: BTreeMap::new(),
        }
    }
}

impl Profile {
    /// Loads a profile; `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Looks for a profile in `start_dir` and each of its ancestors.
    pub fn find(start_dir: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let mut current = start_dir
            .canonicalize()
            .unwrap_or_else(|_| start_dir.to_path_buf());
        loop {
            for name in PROFILE_NAMES {
                let candidate = current.join(name);
                if candidate.is_file() {
                    let profile = Self::from_file(&candidate)?;
                    return Ok(Some((candidate, profile)));
                }
            }
            if !current.pop() {
                return Ok(None);
            }
        }
    }
}

/// Settings passed on the command line. They take precedence over the profile.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Appended after the profile's `exclude` patterns.
    pub exclude: Vec<String>,
    pub report_threshold: Option<Severity>,
    pub fail_threshold: Option<Severity>,
}

/// Resolved state of one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSettings {
    pub enabled: bool,
    pub severity: Severity,
    pub parameters: Parameters,
}

#[derive(Debug, Clone)]
struct PerFileIgnore {
    pattern: String,
    matcher: GlobMatcher,
    rules: Vec<String>,
}

/// The resolved, immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    rules: BTreeMap<String, RuleSettings>,
    exclude_patterns: Vec<String>,
    exclude_set: GlobSet,
    per_file_ignores: Vec<PerFileIgnore>,
    pub report_threshold: Severity,
    pub fail_threshold: Severity,
    fingerprint: String,
}

#[derive(Serialize)]
struct FingerprintView<'a> {
    rules: &'a BTreeMap<String, RuleSettings>,
    exclude: &'a [String],
    per_file_ignores: Vec<(&'a str, &'a [String])>,
    report_threshold: Severity,
}

fn parse_severity(value: &str, context: impl Into<String>) -> Result<Severity, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidSeverity {
        value: value.to_string(),
        context: context.into(),
    })
}

fn check_rule_id(registry: &RuleRegistry, id: &str, context: &str) -> Result<(), ConfigError> {
    if registry.contains(id) {
        Ok(())
    } else {
        Err(ConfigError::UnknownRule {
            id: id.to_string(),
            context: context.to_string(),
        })
    }
}

impl EffectiveConfig {
    /// Built-in defaults only.
    pub fn defaults(registry: &RuleRegistry) -> Result<Self, ConfigError> {
        Self::resolve(registry, None, &CliOptions::default())
    }

    /// Merges registry defaults, an optional profile and CLI options.
    ///
    /// Any unknown rule id, unknown parameter or bad severity is a hard error.
    pub fn resolve(
        registry: &RuleRegistry,
        profile: Option<&Profile>,
        cli: &CliOptions,
    ) -> Result<Self, ConfigError> {
        let default_profile = Profile::default();
        let profile = profile.unwrap_or(&default_profile);

        let mut rules: BTreeMap<String, RuleSettings> = registry
            .iter()
            .map(|rule| {
                let parameters = rule
                    .parameters()
                    .iter()
                    .map(|spec| (spec.name.to_string(), spec.default.to_value()))
                    .collect();
                let settings = RuleSettings {
                    enabled: profile.include_default_rules && rule.enabled_by_default(),
                    severity: rule.default_severity(),
                    parameters: Parameters(parameters),
                };
                (rule.id().to_string(), settings)
            })
            .collect();

        for (id, entry) in &profile.rules {
            check_rule_id(registry, id, "rules")?;
            let Some(rule) = registry.get(id) else {
                continue;
            };
            let Some(settings) = rules.get_mut(id) else {
                continue;
            };
            if let Some(enable) = entry.enable {
                settings.enabled = enable;
            }
            if let Some(severity) = &entry.severity {
                settings.severity = parse_severity(severity, format!("rules.{}.severity", id))?;
            }
            for (name, value) in &entry.parameters {
                let spec = rule
                    .parameters()
                    .iter()
                    .find(|spec| spec.name == name.as_str())
                    .ok_or_else(|| ConfigError::UnknownParameter {
                        rule: id.clone(),
                        name: name.clone(),
                    })?;
                if !spec.kind.accepts(value) {
                    return Err(ConfigError::InvalidParameter {
                        rule: id.clone(),
                        name: name.clone(),
                        expected: spec.kind.as_str(),
                    });
                }
                settings.parameters.0.insert(name.clone(), value.clone());
            }
        }

        for id in &profile.exclude_rules {
            check_rule_id(registry, id, "excludeRules")?;
            if let Some(settings) = rules.get_mut(id) {
                settings.enabled = false;
            }
        }

        let report_threshold = match (cli.report_threshold, &profile.severity_report_threshold) {
            (Some(severity), _) => severity,
            (None, Some(text)) => parse_severity(text, "severityReportThreshold")?,
            (None, None) => Severity::Information,
        };
        let fail_threshold = match (cli.fail_threshold, &profile.fail_threshold) {
            (Some(severity), _) => severity,
            (None, Some(text)) => parse_severity(text, "failThreshold")?,
            (None, None) => Severity::Error,
        };

        let exclude_patterns: Vec<String> = profile
            .exclude
            .iter()
            .chain(&cli.exclude)
            .cloned()
            .collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &exclude_patterns {
            builder.add(Glob::new(pattern)?);
        }
        let exclude_set = builder.build()?;

        let mut per_file_ignores = Vec::new();
        for (pattern, ids) in &profile.per_file_ignores {
            for id in ids {
                check_rule_id(registry, id, &format!("perFileIgnores.{}", pattern))?;
            }
            per_file_ignores.push(PerFileIgnore {
                pattern: pattern.clone(),
                matcher: Glob::new(pattern)?.compile_matcher(),
                rules: ids.clone(),
            });
        }

        let view = FingerprintView {
            rules: &rules,
            exclude: &exclude_patterns,
            per_file_ignores: per_file_ignores
                .iter()
                .map(|p| (p.pattern.as_str(), p.rules.as_slice()))
                .collect(),
            report_threshold,
        };
        let fingerprint = sha256_hex(&serde_json::to_vec(&view)?);

        let config = Self {
            rules,
            exclude_patterns,
            exclude_set,
            per_file_ignores,
            report_threshold,
            fail_threshold,
            fingerprint,
        };
        debug!(
            enabled = config.enabled_rules().count(),
            fingerprint = %config.fingerprint,
            "resolved configuration"
        );
        Ok(config)
    }

    pub fn rule(&self, id: &str) -> Option<&RuleSettings> {
        self.rules.get(id)
    }

    pub fn is_rule_enabled(&self, id: &str) -> bool {
        self.rules.get(id).is_some_and(|s| s.enabled)
    }

    /// Ids of enabled rules, in id order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(id, _)| id.as_str())
    }

    /// Whether a unit at `path` is excluded from the run entirely.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude_set.is_match(path)
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// Rule ids switched off for `path` by `perFileIgnores`.
    pub fn ignored_rules_for(&self, path: &Path) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .per_file_ignores
            .iter()
            .filter(|p| p.matcher.is_match(path))
            .flat_map(|p| p.rules.iter().map(String::as_str))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn should_report(&self, severity: Severity) -> bool {
        severity >= self.report_threshold
    }

    /// Stable hash of the resolved state that affects per-unit results.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
