// Rules module
// This module holds the rule catalog, the `Rule` capability every rule implements,
// and the node-kind routing table the dispatcher consults.

/// Rules for detecting hardcoded secrets and credentials.
pub mod secrets;

/// Rules for detecting dangerous code patterns (security vulnerabilities).
pub mod danger;

/// Rules for detecting code quality issues.
pub mod quality;

use crate::config::EffectiveConfig;
use crate::diagnostics::{RawFinding, Severity};
use crate::node::{Node, NodeKind};
use crate::utils::{sha256_hex, LineIndex};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

/// Bumped whenever a built-in rule changes behaviour, so cached results are invalidated.
pub const RULESET_REVISION: u32 = 1;

/// Error raised by a rule while evaluating a node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("parameter '{0}' is missing or has the wrong type")]
    BadParameter(String),
    #[error("{0}")]
    Evaluation(String),
}

/// Type of a rule parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
}

impl ParamKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Integer => value.is_u64(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Integer => "non-negative integer",
        }
    }
}

/// Default value of a rule parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Integer(u64),
}

impl ParamDefault {
    pub fn to_value(&self) -> Value {
        match self {
            ParamDefault::Integer(n) => Value::from(*n),
        }
    }
}

/// Declaration of a parameter a rule accepts.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamDefault,
}

/// Resolved parameters for one rule, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Parameters(pub BTreeMap<String, Value>);

impl Parameters {
    pub fn integer(&self, name: &str) -> Result<u64, RuleError> {
        self.0
            .get(name)
            .and_then(Value::as_u64)
            .ok_or_else(|| RuleError::BadParameter(name.to_string()))
    }
}

/// Read-only facts about the unit under analysis.
pub struct UnitContext<'a> {
    pub path: &'a Path,
    pub source: &'a str,
    pub line_index: &'a LineIndex,
}

/// Everything a rule may look at while evaluating one node.
pub struct RuleContext<'a> {
    pub unit: &'a UnitContext<'a>,
    /// Number of enclosing block statements.
    pub depth: usize,
    /// Kind of the direct parent node, if any.
    pub parent: Option<NodeKind>,
    /// Inside the body of a function (at any depth).
    pub in_function: bool,
    /// Inside the body of a class (at any depth).
    pub in_class: bool,
    pub params: &'a Parameters,
}

impl<'a> RuleContext<'a> {
    /// Builds a finding located at `node`, carrying the rule's declared severity.
    pub fn finding<R: Rule + ?Sized>(
        &self,
        rule: &R,
        node: Node<'_>,
        message: impl Into<String>,
    ) -> RawFinding {
        RawFinding {
            rule_id: rule.id(),
            span: self
                .unit
                .line_index
                .span(self.unit.source, node.start(), node.end()),
            message: message.into(),
            severity: rule.default_severity(),
        }
    }
}

/// The shared evaluation capability of every rule.
///
/// Implementations must be pure: no shared mutable state, no AST mutation.
pub trait Rule: Send + Sync {
    /// Stable identifier, e.g. `no-empty-catch`.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn default_severity(&self) -> Severity;

    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Node kinds this rule wants to observe.
    fn subscriptions(&self) -> &'static [NodeKind];

    fn parameters(&self) -> &'static [ParamSpec] {
        &[]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError>;
}

/// The closed set of rules shipped with the engine.
pub static BUILTIN_RULES: &[&dyn Rule] = &[
    &quality::NoEmptyCatch,
    &quality::NoBareExcept,
    &danger::NoEval,
    &danger::NoShellSubprocess,
    &quality::MaxNestingDepth,
    &quality::TooManyParameters,
    &quality::MutableDefaultArgument,
    &quality::NoWildcardImport,
    &quality::CompareToNone,
    &secrets::HardcodedSecret,
    &quality::NoPrint,
];

/// Immutable catalog of available rules, ordered by id.
pub struct RuleRegistry {
    rules: Vec<&'static dyn Rule>,
}

impl RuleRegistry {
    /// Registry holding every built-in rule.
    pub fn builtin() -> Self {
        Self::with_rules(BUILTIN_RULES.to_vec())
    }

    /// Builds a registry from an explicit rule list. Later duplicates of an id are dropped.
    pub fn with_rules(mut rules: Vec<&'static dyn Rule>) -> Self {
        rules.sort_by_key(|r| r.id());
        rules.dedup_by_key(|r| r.id());
        Self { rules }
    }

    pub fn get(&self, id: &str) -> Option<&'static dyn Rule> {
        self.rules
            .binary_search_by_key(&id, |r| r.id())
            .ok()
            .map(|i| self.rules[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Rule> + '_ {
        self.rules.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Version string identifying this engine build and rule catalog; part of every cache key.
    pub fn ruleset_version(&self) -> String {
        let ids: Vec<&str> = self.rules.iter().map(|r| r.id()).collect();
        let digest = sha256_hex(ids.join(",").as_bytes());
        format!(
            "{}-r{}-{}",
            env!("CARGO_PKG_VERSION"),
            RULESET_REVISION,
            &digest[..12]
        )
    }

    /// Builds the node-kind routing table for the rules enabled in `config`.
    pub fn routing_table<'c>(&self, config: &'c EffectiveConfig) -> RoutingTable<'c> {
        let mut routes: HashMap<NodeKind, Vec<Route<'c>>> = HashMap::new();
        // `self.rules` is sorted by id, so every route list is too.
        for rule in &self.rules {
            let Some(settings) = config.rule(rule.id()) else {
                continue;
            };
            if !settings.enabled {
                continue;
            }
            for kind in rule.subscriptions() {
                routes.entry(*kind).or_default().push(Route {
                    rule: *rule,
                    params: &settings.parameters,
                });
            }
        }
        RoutingTable { routes }
    }
}

/// One enabled rule, with its resolved parameters, subscribed to a node kind.
#[derive(Clone)]
pub struct Route<'c> {
    pub rule: &'static dyn Rule,
    pub params: &'c Parameters,
}

/// Node kind → enabled rules interested in that kind, ordered by rule id.
#[derive(Clone, Default)]
pub struct RoutingTable<'c> {
    routes: HashMap<NodeKind, Vec<Route<'c>>>,
}

impl<'c> RoutingTable<'c> {
    pub fn routes(&self, kind: NodeKind) -> &[Route<'c>] {
        self.routes.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A copy of this table with the given rule ids removed.
    pub fn without(&self, ignored: &[&str]) -> RoutingTable<'c> {
        if ignored.is_empty() {
            return self.clone();
        }
        let routes = self
            .routes
            .iter()
            .map(|(kind, list)| {
                let kept = list
                    .iter()
                    .filter(|route| !ignored.contains(&route.rule.id()))
                    .cloned()
                    .collect();
                (*kind, kept)
            })
            .collect();
        RoutingTable { routes }
    }

    /// Distinct rule ids present anywhere in the table, sorted.
    pub fn rule_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self
            .routes
            .values()
            .flat_map(|list| list.iter().map(|route| route.rule.id()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_unique_and_sorted() {
        let registry = RuleRegistry::builtin();
        assert_eq!(registry.len(), BUILTIN_RULES.len());
        let ids: Vec<&str> = registry.iter().map(|r| r.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_lookup() {
        let registry = RuleRegistry::builtin();
        assert!(registry.contains("no-empty-catch"));
        assert!(registry.get("does-not-exist").is_none());
    }

    #[test]
    fn test_ruleset_version_shape() {
        let version = RuleRegistry::builtin().ruleset_version();
        assert!(version.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(version.contains("-r1-"));
    }

    #[test]
    fn test_every_rule_subscribes_to_something() {
        for rule in BUILTIN_RULES {
            assert!(!rule.subscriptions().is_empty(), "{} has no subscriptions", rule.id());
            assert!(!rule.description().is_empty());
        }
    }

    #[test]
    fn test_parameters_accessors() {
        let mut params = Parameters::default();
        params.0.insert("max".to_string(), Value::from(3u64));
        assert_eq!(params.integer("max"), Ok(3));
        assert!(params.integer("missing").is_err());
        params.0.insert("flag".to_string(), Value::from(true));
        assert!(params.integer("flag").is_err());
    }
}
