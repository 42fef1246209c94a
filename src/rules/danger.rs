use crate::diagnostics::{RawFinding, Severity};
use crate::node::{call_name, Node, NodeKind};
use crate::rules::{Rule, RuleContext, RuleError};
use rustpython_ast::{self as ast, Expr};

/// Calls that execute a command through the system shell unconditionally.
const SHELL_CALLS: &[&str] = &["os.system", "os.popen"];

/// Calls that only go through the shell with `shell=True`.
const SUBPROCESS_CALLS: &[&str] = &[
    "subprocess.call",
    "subprocess.run",
    "subprocess.Popen",
    "subprocess.check_call",
    "subprocess.check_output",
];

/// Calls to `eval()` / `exec()`.
///
/// These functions execute arbitrary code, which is a major security risk.
pub struct NoEval;

impl Rule for NoEval {
    fn id(&self) -> &'static str {
        "no-eval"
    }

    fn description(&self) -> &'static str {
        "Avoid executing dynamically built code with eval/exec"
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let Some(Expr::Call(call)) = node.as_expr() else {
            return Ok(Vec::new());
        };
        match call_name(&call.func).as_deref() {
            Some(name @ ("eval" | "exec")) => Ok(vec![ctx.finding(
                self,
                node,
                format!("Avoid using {}()", name),
            )]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Shell command execution: `subprocess.*(..., shell=True)`, `os.system`, `os.popen`.
///
/// This can lead to shell injection vulnerabilities if arguments are not sanitized.
pub struct NoShellSubprocess;

impl NoShellSubprocess {
    fn has_shell_true(call: &ast::ExprCall) -> bool {
        call.keywords.iter().any(|keyword| {
            keyword.arg.as_ref().map(|a| a.as_str()) == Some("shell")
                && matches!(
                    &keyword.value,
                    Expr::Constant(c) if matches!(c.value, ast::Constant::Bool(true))
                )
        })
    }
}

impl Rule for NoShellSubprocess {
    fn id(&self) -> &'static str {
        "no-shell-subprocess"
    }

    fn description(&self) -> &'static str {
        "Avoid running commands through the system shell"
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn subscriptions(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn evaluate(&self, node: Node<'_>, ctx: &RuleContext<'_>) -> Result<Vec<RawFinding>, RuleError> {
        let Some(Expr::Call(call)) = node.as_expr() else {
            return Ok(Vec::new());
        };
        let Some(name) = call_name(&call.func) else {
            return Ok(Vec::new());
        };

        if SHELL_CALLS.contains(&name.as_str()) {
            return Ok(vec![ctx.finding(
                self,
                node,
                format!("{}() runs its argument through the shell", name),
            )]);
        }
        if SUBPROCESS_CALLS.contains(&name.as_str()) && Self::has_shell_true(call) {
            return Ok(vec![ctx.finding(
                self,
                node,
                format!("{}() with shell=True", name),
            )]);
        }
        Ok(Vec::new())
    }
}
