//! A uniform view over the heterogeneous Python AST node types.
//!
//! Rules subscribe to `NodeKind`s; the dispatcher walks `Node`s in source order
//! and routes each one to the rules interested in its kind.

use rustpython_ast::{self as ast, ExceptHandler, Expr, Ranged, Stmt, TextSize};
use serde::Serialize;

/// The kind of an AST node, used as the routing key of the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKind {
    // Statements
    FunctionDef,
    AsyncFunctionDef,
    ClassDef,
    Return,
    Delete,
    Assign,
    AugAssign,
    AnnAssign,
    For,
    AsyncFor,
    While,
    If,
    With,
    AsyncWith,
    Match,
    Raise,
    Try,
    TryStar,
    Assert,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    ExprStmt,
    Pass,
    Break,
    Continue,
    OtherStmt,
    // Exception handlers
    ExceptHandler,
    // Expressions
    BoolOp,
    NamedExpr,
    BinOp,
    UnaryOp,
    Lambda,
    IfExp,
    Dict,
    Set,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Await,
    Yield,
    YieldFrom,
    Compare,
    Call,
    FormattedValue,
    JoinedStr,
    Constant,
    Attribute,
    Subscript,
    Starred,
    Name,
    List,
    Tuple,
    Slice,
    OtherExpr,
}

impl NodeKind {
    /// Block statements increase the nesting depth of everything inside them.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDef
                | NodeKind::AsyncFunctionDef
                | NodeKind::ClassDef
                | NodeKind::If
                | NodeKind::For
                | NodeKind::AsyncFor
                | NodeKind::While
                | NodeKind::Try
                | NodeKind::TryStar
                | NodeKind::With
                | NodeKind::AsyncWith
                | NodeKind::Match
        )
    }

    pub fn is_function(&self) -> bool {
        matches!(self, NodeKind::FunctionDef | NodeKind::AsyncFunctionDef)
    }
}

/// A borrowed reference to any node the dispatcher visits.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    ExceptHandler(&'a ExceptHandler),
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Stmt(stmt) => stmt_kind(stmt),
            Node::Expr(expr) => expr_kind(expr),
            Node::ExceptHandler(_) => NodeKind::ExceptHandler,
        }
    }

    pub fn start(&self) -> TextSize {
        match self {
            Node::Stmt(stmt) => stmt.range().start(),
            Node::Expr(expr) => expr.range().start(),
            Node::ExceptHandler(ExceptHandler::ExceptHandler(h)) => h.range.start(),
        }
    }

    pub fn end(&self) -> TextSize {
        match self {
            Node::Stmt(stmt) => stmt.range().end(),
            Node::Expr(expr) => expr.range().end(),
            Node::ExceptHandler(ExceptHandler::ExceptHandler(h)) => h.range.end(),
        }
    }

    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match *self {
            Node::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match *self {
            Node::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_except_handler(&self) -> Option<&'a ast::ExceptHandlerExceptHandler> {
        match *self {
            Node::ExceptHandler(ExceptHandler::ExceptHandler(h)) => Some(h),
            _ => None,
        }
    }

    /// Direct children of this node, in source order.
    pub fn children(&self) -> Vec<Node<'a>> {
        let mut out = Vec::new();
        match *self {
            Node::Stmt(stmt) => stmt_children(stmt, &mut out),
            Node::Expr(expr) => expr_children(expr, &mut out),
            Node::ExceptHandler(ExceptHandler::ExceptHandler(h)) => {
                if let Some(type_) = &h.type_ {
                    out.push(Node::Expr(type_));
                }
                push_body(&h.body, &mut out);
            }
        }
        out
    }
}

fn stmt_kind(stmt: &Stmt) -> NodeKind {
    match stmt {
        Stmt::FunctionDef(_) => NodeKind::FunctionDef,
        Stmt::AsyncFunctionDef(_) => NodeKind::AsyncFunctionDef,
        Stmt::ClassDef(_) => NodeKind::ClassDef,
        Stmt::Return(_) => NodeKind::Return,
        Stmt::Delete(_) => NodeKind::Delete,
        Stmt::Assign(_) => NodeKind::Assign,
        Stmt::AugAssign(_) => NodeKind::AugAssign,
        Stmt::AnnAssign(_) => NodeKind::AnnAssign,
        Stmt::For(_) => NodeKind::For,
        Stmt::AsyncFor(_) => NodeKind::AsyncFor,
        Stmt::While(_) => NodeKind::While,
        Stmt::If(_) => NodeKind::If,
        Stmt::With(_) => NodeKind::With,
        Stmt::AsyncWith(_) => NodeKind::AsyncWith,
        Stmt::Match(_) => NodeKind::Match,
        Stmt::Raise(_) => NodeKind::Raise,
        Stmt::Try(_) => NodeKind::Try,
        Stmt::TryStar(_) => NodeKind::TryStar,
        Stmt::Assert(_) => NodeKind::Assert,
        Stmt::Import(_) => NodeKind::Import,
        Stmt::ImportFrom(_) => NodeKind::ImportFrom,
        Stmt::Global(_) => NodeKind::Global,
        Stmt::Nonlocal(_) => NodeKind::Nonlocal,
        Stmt::Expr(_) => NodeKind::ExprStmt,
        Stmt::Pass(_) => NodeKind::Pass,
        Stmt::Break(_) => NodeKind::Break,
        Stmt::Continue(_) => NodeKind::Continue,
        #[allow(unreachable_patterns)]
        _ => NodeKind::OtherStmt,
    }
}

fn expr_kind(expr: &Expr) -> NodeKind {
    match expr {
        Expr::BoolOp(_) => NodeKind::BoolOp,
        Expr::NamedExpr(_) => NodeKind::NamedExpr,
        Expr::BinOp(_) => NodeKind::BinOp,
        Expr::UnaryOp(_) => NodeKind::UnaryOp,
        Expr::Lambda(_) => NodeKind::Lambda,
        Expr::IfExp(_) => NodeKind::IfExp,
        Expr::Dict(_) => NodeKind::Dict,
        Expr::Set(_) => NodeKind::Set,
        Expr::ListComp(_) => NodeKind::ListComp,
        Expr::SetComp(_) => NodeKind::SetComp,
        Expr::DictComp(_) => NodeKind::DictComp,
        Expr::GeneratorExp(_) => NodeKind::GeneratorExp,
        Expr::Await(_) => NodeKind::Await,
        Expr::Yield(_) => NodeKind::Yield,
        Expr::YieldFrom(_) => NodeKind::YieldFrom,
        Expr::Compare(_) => NodeKind::Compare,
        Expr::Call(_) => NodeKind::Call,
        Expr::FormattedValue(_) => NodeKind::FormattedValue,
        Expr::JoinedStr(_) => NodeKind::JoinedStr,
        Expr::Constant(_) => NodeKind::Constant,
        Expr::Attribute(_) => NodeKind::Attribute,
        Expr::Subscript(_) => NodeKind::Subscript,
        Expr::Starred(_) => NodeKind::Starred,
        Expr::Name(_) => NodeKind::Name,
        Expr::List(_) => NodeKind::List,
        Expr::Tuple(_) => NodeKind::Tuple,
        Expr::Slice(_) => NodeKind::Slice,
        #[allow(unreachable_patterns)]
        _ => NodeKind::OtherExpr,
    }
}

fn push_body<'a>(body: &'a [Stmt], out: &mut Vec<Node<'a>>) {
    out.extend(body.iter().map(Node::Stmt));
}

fn push_opt<'a>(expr: &'a Option<Box<Expr>>, out: &mut Vec<Node<'a>>) {
    if let Some(expr) = expr {
        out.push(Node::Expr(expr));
    }
}

fn push_defaults<'a>(args: &'a ast::Arguments, out: &mut Vec<Node<'a>>) {
    for arg in args
        .posonlyargs
        .iter()
        .chain(&args.args)
        .chain(&args.kwonlyargs)
    {
        push_opt(&arg.default, out);
    }
}

/// Expressions nested in a `case` pattern: value patterns, mapping keys and class names.
fn push_pattern<'a>(pattern: &'a ast::Pattern, out: &mut Vec<Node<'a>>) {
    match pattern {
        ast::Pattern::MatchValue(node) => out.push(Node::Expr(&node.value)),
        ast::Pattern::MatchSequence(node) => {
            for inner in &node.patterns {
                push_pattern(inner, out);
            }
        }
        ast::Pattern::MatchMapping(node) => {
            for (key, inner) in node.keys.iter().zip(&node.patterns) {
                out.push(Node::Expr(key));
                push_pattern(inner, out);
            }
        }
        ast::Pattern::MatchClass(node) => {
            out.push(Node::Expr(&node.cls));
            for inner in node.patterns.iter().chain(&node.kwd_patterns) {
                push_pattern(inner, out);
            }
        }
        ast::Pattern::MatchAs(node) => {
            if let Some(inner) = &node.pattern {
                push_pattern(inner, out);
            }
        }
        ast::Pattern::MatchOr(node) => {
            for inner in &node.patterns {
                push_pattern(inner, out);
            }
        }
        ast::Pattern::MatchSingleton(_) | ast::Pattern::MatchStar(_) => {}
    }
}

fn stmt_children<'a>(stmt: &'a Stmt, out: &mut Vec<Node<'a>>) {
    match stmt {
        Stmt::FunctionDef(node) => {
            out.extend(node.decorator_list.iter().map(Node::Expr));
            push_defaults(&node.args, out);
            push_opt(&node.returns, out);
            push_body(&node.body, out);
        }
        Stmt::AsyncFunctionDef(node) => {
            out.extend(node.decorator_list.iter().map(Node::Expr));
            push_defaults(&node.args, out);
            push_opt(&node.returns, out);
            push_body(&node.body, out);
        }
        Stmt::ClassDef(node) => {
            out.extend(node.decorator_list.iter().map(Node::Expr));
            out.extend(node.bases.iter().map(Node::Expr));
            out.extend(node.keywords.iter().map(|k| Node::Expr(&k.value)));
            push_body(&node.body, out);
        }
        Stmt::Return(node) => push_opt(&node.value, out),
        Stmt::Delete(node) => out.extend(node.targets.iter().map(Node::Expr)),
        Stmt::Assign(node) => {
            out.extend(node.targets.iter().map(Node::Expr));
            out.push(Node::Expr(&node.value));
        }
        Stmt::AugAssign(node) => {
            out.push(Node::Expr(&node.target));
            out.push(Node::Expr(&node.value));
        }
        Stmt::AnnAssign(node) => {
            out.push(Node::Expr(&node.target));
            out.push(Node::Expr(&node.annotation));
            push_opt(&node.value, out);
        }
        Stmt::For(node) => {
            out.push(Node::Expr(&node.target));
            out.push(Node::Expr(&node.iter));
            push_body(&node.body, out);
            push_body(&node.orelse, out);
        }
        Stmt::AsyncFor(node) => {
            out.push(Node::Expr(&node.target));
            out.push(Node::Expr(&node.iter));
            push_body(&node.body, out);
            push_body(&node.orelse, out);
        }
        Stmt::While(node) => {
            out.push(Node::Expr(&node.test));
            push_body(&node.body, out);
            push_body(&node.orelse, out);
        }
        Stmt::If(node) => {
            out.push(Node::Expr(&node.test));
            push_body(&node.body, out);
            push_body(&node.orelse, out);
        }
        Stmt::With(node) => {
            for item in &node.items {
                out.push(Node::Expr(&item.context_expr));
                push_opt(&item.optional_vars, out);
            }
            push_body(&node.body, out);
        }
        Stmt::AsyncWith(node) => {
            for item in &node.items {
                out.push(Node::Expr(&item.context_expr));
                push_opt(&item.optional_vars, out);
            }
            push_body(&node.body, out);
        }
        Stmt::Match(node) => {
            out.push(Node::Expr(&node.subject));
            for case in &node.cases {
                push_pattern(&case.pattern, out);
                push_opt(&case.guard, out);
                push_body(&case.body, out);
            }
        }
        Stmt::Raise(node) => {
            push_opt(&node.exc, out);
            push_opt(&node.cause, out);
        }
        Stmt::Try(node) => {
            push_body(&node.body, out);
            out.extend(node.handlers.iter().map(Node::ExceptHandler));
            push_body(&node.orelse, out);
            push_body(&node.finalbody, out);
        }
        Stmt::TryStar(node) => {
            push_body(&node.body, out);
            out.extend(node.handlers.iter().map(Node::ExceptHandler));
            push_body(&node.orelse, out);
            push_body(&node.finalbody, out);
        }
        Stmt::Assert(node) => {
            out.push(Node::Expr(&node.test));
            push_opt(&node.msg, out);
        }
        Stmt::Expr(node) => out.push(Node::Expr(&node.value)),
        _ => {}
    }
}

fn push_generators<'a>(generators: &'a [ast::Comprehension], out: &mut Vec<Node<'a>>) {
    for gen in generators {
        out.push(Node::Expr(&gen.target));
        out.push(Node::Expr(&gen.iter));
        out.extend(gen.ifs.iter().map(Node::Expr));
    }
}

fn expr_children<'a>(expr: &'a Expr, out: &mut Vec<Node<'a>>) {
    match expr {
        Expr::BoolOp(node) => out.extend(node.values.iter().map(Node::Expr)),
        Expr::NamedExpr(node) => {
            out.push(Node::Expr(&node.target));
            out.push(Node::Expr(&node.value));
        }
        Expr::BinOp(node) => {
            out.push(Node::Expr(&node.left));
            out.push(Node::Expr(&node.right));
        }
        Expr::UnaryOp(node) => out.push(Node::Expr(&node.operand)),
        Expr::Lambda(node) => {
            push_defaults(&node.args, out);
            out.push(Node::Expr(&node.body));
        }
        // `body if test else orelse`
        Expr::IfExp(node) => {
            out.push(Node::Expr(&node.body));
            out.push(Node::Expr(&node.test));
            out.push(Node::Expr(&node.orelse));
        }
        Expr::Dict(node) => {
            for (key, value) in node.keys.iter().zip(&node.values) {
                if let Some(key) = key {
                    out.push(Node::Expr(key));
                }
                out.push(Node::Expr(value));
            }
        }
        Expr::Set(node) => out.extend(node.elts.iter().map(Node::Expr)),
        Expr::ListComp(node) => {
            out.push(Node::Expr(&node.elt));
            push_generators(&node.generators, out);
        }
        Expr::SetComp(node) => {
            out.push(Node::Expr(&node.elt));
            push_generators(&node.generators, out);
        }
        Expr::DictComp(node) => {
            out.push(Node::Expr(&node.key));
            out.push(Node::Expr(&node.value));
            push_generators(&node.generators, out);
        }
        Expr::GeneratorExp(node) => {
            out.push(Node::Expr(&node.elt));
            push_generators(&node.generators, out);
        }
        Expr::Await(node) => out.push(Node::Expr(&node.value)),
        Expr::Yield(node) => push_opt(&node.value, out),
        Expr::YieldFrom(node) => out.push(Node::Expr(&node.value)),
        Expr::Compare(node) => {
            out.push(Node::Expr(&node.left));
            out.extend(node.comparators.iter().map(Node::Expr));
        }
        Expr::Call(node) => {
            out.push(Node::Expr(&node.func));
            out.extend(node.args.iter().map(Node::Expr));
            out.extend(node.keywords.iter().map(|k| Node::Expr(&k.value)));
        }
        Expr::FormattedValue(node) => {
            out.push(Node::Expr(&node.value));
            push_opt(&node.format_spec, out);
        }
        Expr::JoinedStr(node) => out.extend(node.values.iter().map(Node::Expr)),
        Expr::Attribute(node) => out.push(Node::Expr(&node.value)),
        Expr::Subscript(node) => {
            out.push(Node::Expr(&node.value));
            out.push(Node::Expr(&node.slice));
        }
        Expr::Starred(node) => out.push(Node::Expr(&node.value)),
        Expr::List(node) => out.extend(node.elts.iter().map(Node::Expr)),
        Expr::Tuple(node) => out.extend(node.elts.iter().map(Node::Expr)),
        Expr::Slice(node) => {
            push_opt(&node.lower, out);
            push_opt(&node.upper, out);
            push_opt(&node.step, out);
        }
        _ => {}
    }
}

/// Resolves the dotted name of a call target, e.g. `subprocess.run` or `eval`.
pub fn call_name(func: &Expr) -> Option<String> {
    match func {
        Expr::Name(node) => Some(node.id.to_string()),
        Expr::Attribute(node) => {
            let base = call_name(&node.value)?;
            Some(format!("{}.{}", base, node.attr))
        }
        _ => None,
    }
}
