use crate::diagnostics::{RawFinding, Severity};
use crate::node::{Node, NodeKind};
use crate::rules::{ParamDefault, ParamKind, ParamSpec, Rule, RuleContext, RuleError};
use regex::Regex;
use rustpython_ast::{self as ast, Expr, Stmt};

lazy_static::lazy_static! {
    /// Variable names that usually hold credentials, as a whole name or a `_`-separated suffix.
    static ref SECRET_NAME: Regex = Regex::new(
        r"(?i)(?:^|_)(?:api_?key|secret(?:_key)?|token|password|passwd|access_key(?:_id)?|secret_access_key)$"
    )
    .unwrap();
}

/// String literals assigned to credential-looking names.
pub struct HardcodedSecret;

impl HardcodedSecret {
    /// Name of an assignment target: `api_key` or the attribute of `self.api_key`.
    fn target_name(target: &Expr) -> Option<&str> {
        match target {
            Expr::Name(name) => Some(name.id.as_str()),
            Expr::Attribute(attr) => Some(attr.attr.as_str()),
            _ => None,
        }
    }

    fn literal(value: &Expr) -> Option<&str> {
        match value {
            Expr::Constant(c) => match &c.value {
                ast::Constant::Str(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    fn looks_like_secret(value: &str, min_length: usize) -> bool {
        value.chars().count() >= min_length && !value.chars().any(char::is_whitespace)
    }
}

impl Rule for HardcodedSecret {
    fn id(&self) -> &'static str {
        "hardcoded-secret"
    }

    fn description(&self) -> &'static str {
        "Credentials must not be committed to source"
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Assign, NodeKind::AnnAssign]
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "minLength",
            kind: ParamKind::Integer,
            default: ParamDefault::Integer(20),
        }]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let min_length = ctx.params.integer("minLength")? as usize;

        let (targets, value): (Vec<&Expr>, Option<&Expr>) = match node.as_stmt() {
            Some(Stmt::Assign(assign)) => (assign.targets.iter().collect(), Some(&*assign.value)),
            Some(Stmt::AnnAssign(assign)) => (vec![&*assign.target], assign.value.as_deref()),
            _ => return Ok(Vec::new()),
        };
        let Some(literal) = value.and_then(Self::literal) else {
            return Ok(Vec::new());
        };
        if !Self::looks_like_secret(literal, min_length) {
            return Ok(Vec::new());
        }

        let findings = targets
            .into_iter()
            .filter_map(Self::target_name)
            .filter(|name| SECRET_NAME.is_match(name))
            .map(|name| {
                ctx.finding(
                    self,
                    node,
                    format!("Possible hardcoded secret assigned to '{}'", name),
                )
            })
            .collect();
        Ok(findings)
    }
}
