use crate::diagnostics::{RawFinding, Severity};
use crate::node::{call_name, Node, NodeKind};
use crate::rules::{ParamDefault, ParamKind, ParamSpec, Rule, RuleContext, RuleError};
use rustpython_ast::{self as ast, Expr, Stmt};

const BLOCK_KINDS: &[NodeKind] = &[
    NodeKind::FunctionDef,
    NodeKind::AsyncFunctionDef,
    NodeKind::ClassDef,
    NodeKind::If,
    NodeKind::For,
    NodeKind::AsyncFor,
    NodeKind::While,
    NodeKind::Try,
    NodeKind::TryStar,
    NodeKind::With,
    NodeKind::AsyncWith,
    NodeKind::Match,
];

const FUNCTION_KINDS: &[NodeKind] = &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef];

/// Returns the name and argument list of a (possibly async) function definition.
fn function_signature<'a>(node: Node<'a>) -> Option<(&'a str, &'a ast::Arguments)> {
    match node.as_stmt()? {
        Stmt::FunctionDef(f) => Some((f.name.as_str(), &f.args)),
        Stmt::AsyncFunctionDef(f) => Some((f.name.as_str(), &f.args)),
        _ => None,
    }
}

fn is_none_constant(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(c) if matches!(c.value, ast::Constant::None))
}

/// `except` handlers whose body does nothing.
pub struct NoEmptyCatch;

impl Rule for NoEmptyCatch {
    fn id(&self) -> &'static str {
        "no-empty-catch"
    }

    fn description(&self) -> &'static str {
        "Exception handlers must not silently swallow errors"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ExceptHandler]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let Some(handler) = node.as_except_handler() else {
            return Ok(Vec::new());
        };
        // `pass` and `...` are the only do-nothing statements we treat as empty.
        let empty = handler.body.iter().all(|stmt| match stmt {
            Stmt::Pass(_) => true,
            Stmt::Expr(e) => matches!(&*e.value, Expr::Constant(c) if matches!(c.value, ast::Constant::Ellipsis)),
            _ => false,
        });
        if empty {
            Ok(vec![ctx.finding(self, node, "Empty exception handler silently swallows errors")])
        } else {
            Ok(Vec::new())
        }
    }
}

/// `except:` without an exception type.
pub struct NoBareExcept;

impl Rule for NoBareExcept {
    fn id(&self) -> &'static str {
        "no-bare-except"
    }

    fn description(&self) -> &'static str {
        "Exception handlers should name the exceptions they catch"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ExceptHandler]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        match node.as_except_handler() {
            Some(handler) if handler.type_.is_none() => Ok(vec![ctx.finding(
                self,
                node,
                "Bare 'except:' also catches SystemExit and KeyboardInterrupt",
            )]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Block statements nested deeper than `maxDepth`.
pub struct MaxNestingDepth;

impl Rule for MaxNestingDepth {
    fn id(&self) -> &'static str {
        "max-nesting-depth"
    }

    fn description(&self) -> &'static str {
        "Deeply nested blocks are hard to read and test"
    }

    fn default_severity(&self) -> Severity {
        Severity::Information
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        BLOCK_KINDS
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "maxDepth",
            kind: ParamKind::Integer,
            default: ParamDefault::Integer(5),
        }]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let max_depth = ctx.params.integer("maxDepth")? as usize;
        // The block itself counts as one level.
        let depth = ctx.depth + 1;
        if depth > max_depth {
            Ok(vec![ctx.finding(self, node, format!("Deeply nested code (depth {})", depth))])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Functions declaring more than `max` parameters.
pub struct TooManyParameters;

impl Rule for TooManyParameters {
    fn id(&self) -> &'static str {
        "too-many-parameters"
    }

    fn description(&self) -> &'static str {
        "Functions with long parameter lists are hard to call correctly"
    }

    fn default_severity(&self) -> Severity {
        Severity::Information
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        FUNCTION_KINDS
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "max",
            kind: ParamKind::Integer,
            default: ParamDefault::Integer(6),
        }]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let max = ctx.params.integer("max")? as usize;
        let Some((name, args)) = function_signature(node) else {
            return Ok(Vec::new());
        };

        let mut count = args.posonlyargs.len() + args.args.len() + args.kwonlyargs.len();
        count += usize::from(args.vararg.is_some()) + usize::from(args.kwarg.is_some());

        // The receiver of a method is not something callers pass.
        if ctx.parent == Some(NodeKind::ClassDef) {
            let first = args.posonlyargs.iter().chain(&args.args).next();
            if let Some(first) = first {
                if matches!(first.def.arg.as_str(), "self" | "cls") {
                    count -= 1;
                }
            }
        }

        if count > max {
            Ok(vec![ctx.finding(
                self,
                node,
                format!("Function '{}' has {} parameters (max {})", name, count, max),
            )])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Parameter defaults that are mutable containers shared across calls.
pub struct MutableDefaultArgument;

impl MutableDefaultArgument {
    fn is_mutable(expr: &Expr) -> bool {
        match expr {
            Expr::List(_)
            | Expr::Dict(_)
            | Expr::Set(_)
            | Expr::ListComp(_)
            | Expr::DictComp(_)
            | Expr::SetComp(_) => true,
            Expr::Call(call) => matches!(
                call_name(&call.func).as_deref(),
                Some("list" | "dict" | "set")
            ),
            _ => false,
        }
    }
}

impl Rule for MutableDefaultArgument {
    fn id(&self) -> &'static str {
        "mutable-default-argument"
    }

    fn description(&self) -> &'static str {
        "Mutable default values are shared between calls"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        FUNCTION_KINDS
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let Some((name, args)) = function_signature(node) else {
            return Ok(Vec::new());
        };

        let findings = args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
            .filter_map(|arg| {
                let default = arg.default.as_deref()?;
                Self::is_mutable(default).then(|| {
                    ctx.finding(
                        self,
                        Node::Expr(default),
                        format!(
                            "Parameter '{}' of '{}' has a mutable default value",
                            arg.def.arg, name
                        ),
                    )
                })
            })
            .collect();
        Ok(findings)
    }
}

/// `from module import *`.
pub struct NoWildcardImport;

impl Rule for NoWildcardImport {
    fn id(&self) -> &'static str {
        "no-wildcard-import"
    }

    fn description(&self) -> &'static str {
        "Wildcard imports hide where names come from"
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::ImportFrom]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let Some(Stmt::ImportFrom(import)) = node.as_stmt() else {
            return Ok(Vec::new());
        };
        if import.names.iter().any(|alias| alias.name.as_str() == "*") {
            let module = import
                .module
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| ".".to_string());
            Ok(vec![ctx.finding(self, node, format!("Wildcard import from '{}'", module))])
        } else {
            Ok(Vec::new())
        }
    }
}

/// `x == None` / `x != None` instead of identity checks.
pub struct CompareToNone;

impl Rule for CompareToNone {
    fn id(&self) -> &'static str {
        "compare-to-none"
    }

    fn description(&self) -> &'static str {
        "Comparisons to None should use 'is' or 'is not'"
    }

    fn default_severity(&self) -> Severity {
        Severity::Information
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Compare]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let Some(Expr::Compare(compare)) = node.as_expr() else {
            return Ok(Vec::new());
        };

        let mut left: &Expr = &compare.left;
        for (op, right) in compare.ops.iter().zip(&compare.comparators) {
            let equality = matches!(op, ast::CmpOp::Eq | ast::CmpOp::NotEq);
            if equality && (is_none_constant(left) || is_none_constant(right)) {
                let suggestion = if matches!(op, ast::CmpOp::Eq) {
                    "is"
                } else {
                    "is not"
                };
                return Ok(vec![ctx.finding(
                    self,
                    node,
                    format!("Comparison to None should use '{}'", suggestion),
                )]);
            }
            left = right;
        }
        Ok(Vec::new())
    }
}

/// Calls to `print`. Opt-in: disabled unless a profile enables it.
pub struct NoPrint;

impl Rule for NoPrint {
    fn id(&self) -> &'static str {
        "no-print"
    }

    fn description(&self) -> &'static str {
        "Library code should log instead of printing"
    }

    fn default_severity(&self) -> Severity {
        Severity::Information
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        match node.as_expr() {
            Some(Expr::Call(call)) if call_name(&call.func).as_deref() == Some("print") => {
                Ok(vec![ctx.finding(self, node, "Use of print()")])
            }
            _ => Ok(Vec::new()),
        }
    }
}
