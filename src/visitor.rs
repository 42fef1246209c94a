use crate::analyzer::CancellationToken;
use crate::diagnostics::{RawFinding, Span};
use crate::node::{Node, NodeKind};
use crate::rules::{Route, RoutingTable, RuleContext, UnitContext};
use rustpython_ast::Stmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// A rule that returned an error or panicked while evaluating one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule_id: &'static str,
    /// Location of the node being evaluated.
    pub span: Span,
    pub reason: String,
}

/// Everything collected from one walk over a unit.
#[derive(Debug, Default)]
pub struct DispatchOutput {
    /// Findings in traversal order, severities as declared by the rules.
    pub findings: Vec<RawFinding>,
    pub failures: Vec<RuleFailure>,
    /// `(start_line, end_line)` of every statement, outer statements first.
    pub statements: Vec<(usize, usize)>,
    /// Number of rule evaluations performed.
    pub evaluations: usize,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(DispatchOutput),
    /// The run was cancelled mid-walk; partial output is discarded.
    Cancelled,
}

struct Cancelled;

/// Where a node sits relative to its enclosing blocks.
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    depth: usize,
    parent: Option<NodeKind>,
    in_function: bool,
    in_class: bool,
}

impl Position {
    /// The position of the children of a node of `kind` found at `self`.
    fn enter(self, kind: NodeKind) -> Self {
        Self {
            depth: if kind.is_block() { self.depth + 1 } else { self.depth },
            parent: Some(kind),
            in_function: self.in_function || kind.is_function(),
            in_class: self.in_class || kind == NodeKind::ClassDef,
        }
    }
}

/// Walks a unit's AST once, in pre-order, handing each node to the rules subscribed to its kind.
///
/// Rule errors and panics are contained per rule per node: they become `RuleFailure`s and
/// every other rule keeps running.
pub struct Dispatcher<'r, 'c> {
    routes: &'r RoutingTable<'c>,
    cancel: &'r CancellationToken,
}

impl<'r, 'c> Dispatcher<'r, 'c> {
    pub fn new(routes: &'r RoutingTable<'c>, cancel: &'r CancellationToken) -> Self {
        Self { routes, cancel }
    }

    pub fn run(&self, unit: &UnitContext<'_>, body: &[Stmt]) -> DispatchOutcome {
        let mut walk = Walk {
            dispatcher: self,
            unit,
            output: DispatchOutput::default(),
        };
        for stmt in body {
            if walk.visit(Node::Stmt(stmt), Position::default()).is_err() {
                return DispatchOutcome::Cancelled;
            }
        }
        DispatchOutcome::Completed(walk.output)
    }
}

struct Walk<'d, 'r, 'c, 'u> {
    dispatcher: &'d Dispatcher<'r, 'c>,
    unit: &'u UnitContext<'u>,
    output: DispatchOutput,
}

impl<'d, 'r, 'c, 'u> Walk<'d, 'r, 'c, 'u> {
    fn visit(&mut self, node: Node<'_>, at: Position) -> Result<(), Cancelled> {
        if self.dispatcher.cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let kind = node.kind();
        if let Node::Stmt(_) = node {
            let index = self.unit.line_index;
            self.output
                .statements
                .push((index.line_index(node.start()), index.line_index(node.end())));
        }

        for route in self.dispatcher.routes.routes(kind) {
            self.evaluate(route, node, at);
        }

        let inner = at.enter(kind);
        for child in node.children() {
            self.visit(child, inner)?;
        }
        Ok(())
    }

    fn evaluate(&mut self, route: &Route<'_>, node: Node<'_>, at: Position) {
        let ctx = RuleContext {
            unit: self.unit,
            depth: at.depth,
            parent: at.parent,
            in_function: at.in_function,
            in_class: at.in_class,
            params: route.params,
        };
        self.output.evaluations += 1;

        let result = panic::catch_unwind(AssertUnwindSafe(|| route.rule.evaluate(node, &ctx)));
        let reason = match result {
            Ok(Ok(findings)) => {
                self.output.findings.extend(findings);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        let span = self
            .unit
            .line_index
            .span(self.unit.source, node.start(), node.end());
        warn!(
            rule = route.rule.id(),
            file = %self.unit.path.display(),
            line = span.start_line,
            %reason,
            "rule failed"
        );
        self.output.failures.push(RuleFailure {
            rule_id: route.rule.id(),
            span,
            reason,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
