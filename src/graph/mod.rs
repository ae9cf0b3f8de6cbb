//! # Call-Graph Builder
//!
//! Builds, per compilation unit, an arena of function nodes (named functions,
//! methods, and closure literals) plus directed call edges and the lexical
//! edges from each closure to its enclosing named function.
//!
//! Closures are first-class nodes: every closure literal, at any nesting
//! depth, is registered with exactly one enclosing [`FunctionNode`] — the
//! nearest lexically enclosing *named* function. A closure nested inside
//! another closure still belongs to the named function. The enclosing node id
//! is a non-owning arena handle, which is what lets nested closures borrow
//! their encloser's best-fit cache without cyclic ownership.
//!
//! Call edges to targets that cannot be resolved to a single local function
//! fan out to every same-name candidate; unresolved targets are never
//! silently dropped, they are kept by name for cross-unit resolution.

pub mod scc;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Expr, ImplItem, Item, Stmt};

use crate::parser::CompilationUnit;

/// Arena index of a node in the call graph.
pub type NodeId = usize;

/// A resolved source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    /// 1-indexed line.
    pub line: usize,
    /// 0-indexed column.
    pub column: usize,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A function definition or closure literal in the arena.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub id: NodeId,
    /// Named functions keep their (possibly `Type::method`) name; closures
    /// get a synthetic `parent::{closure@line}` name.
    pub name: String,
    pub loc: SourceLoc,
    /// Parameter names in declaration order, receiver excluded.
    pub params: Vec<String>,
    /// Body statements in program order.
    pub body: Vec<Stmt>,
    /// For closures, the enclosing named function. `None` for named
    /// functions.
    pub enclosing: Option<NodeId>,
    /// For closures, the index of the top-level statement of the enclosing
    /// named function that lexically contains the closure literal. Best-fit
    /// decisions made inside the closure are attributed to that statement.
    pub host_stmt: Option<usize>,
    /// Closure nodes lexically contained in this named function, at any
    /// depth.
    pub lambdas: Vec<NodeId>,
}

impl FunctionNode {
    pub fn is_lambda(&self) -> bool {
        self.enclosing.is_some()
    }
}

/// Per-unit call graph.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub nodes: Vec<FunctionNode>,
    /// caller -> callees, fan-out already applied.
    edges: HashMap<NodeId, Vec<NodeId>>,
    /// Bare and qualified names of named functions.
    by_name: HashMap<String, Vec<NodeId>>,
    /// Closure literal position -> node, used by the tracker to map a
    /// `syn::ExprClosure` it walks into back to its arena node.
    lambda_by_span: HashMap<(usize, usize), NodeId>,
}

impl CallGraph {
    /// Builds the graph for one compilation unit.
    pub fn build(unit: &CompilationUnit) -> Self {
        let mut graph = CallGraph::default();
        graph.collect_items(&unit.ast.items, &unit.file_path, None);

        // Closure collection needs the named nodes in place first so each
        // closure can point at its encloser.
        let named: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|n| !n.is_lambda())
            .map(|n| n.id)
            .collect();
        for id in named {
            graph.collect_lambdas(id, &unit.file_path);
        }

        graph.build_edges();
        graph
    }

    /// Node lookup by arena id.
    pub fn node(&self, id: NodeId) -> &FunctionNode {
        &self.nodes[id]
    }

    /// Call targets of a node.
    pub fn callees(&self, id: NodeId) -> &[NodeId] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All candidate nodes for a call name: exact qualified match first,
    /// then fan-out over every function sharing the bare name.
    pub fn resolve_call(&self, name: &str) -> &[NodeId] {
        if let Some(ids) = self.by_name.get(name) {
            return ids;
        }
        if let Some(bare) = name.rsplit("::").next() {
            if let Some(ids) = self.by_name.get(bare) {
                return ids;
            }
        }
        &[]
    }

    /// The nearest enclosing named function: the node itself when it is
    /// already named.
    pub fn enclosing_function(&self, id: NodeId) -> NodeId {
        self.nodes[id].enclosing.unwrap_or(id)
    }

    /// Maps a closure literal back to its node by source position.
    pub fn lambda_at(&self, line: usize, column: usize) -> Option<NodeId> {
        self.lambda_by_span.get(&(line, column)).copied()
    }

    /// Ids of all named (non-closure) functions.
    pub fn named_functions(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !n.is_lambda())
            .map(|n| n.id)
            .collect()
    }

    fn collect_items(&mut self, items: &[Item], file: &str, prefix: Option<&str>) {
        for item in items {
            match item {
                Item::Fn(f) => {
                    let name = match prefix {
                        Some(p) => format!("{}::{}", p, f.sig.ident),
                        None => f.sig.ident.to_string(),
                    };
                    let params = param_names(&f.sig);
                    let loc = loc_of(file, f.sig.ident.span());
                    self.push_named(name, loc, params, f.block.stmts.clone());
                }
                Item::Impl(imp) => {
                    let ty = type_name(&imp.self_ty);
                    for member in &imp.items {
                        if let ImplItem::Fn(m) = member {
                            let name = format!("{}::{}", ty, m.sig.ident);
                            let params = param_names(&m.sig);
                            let loc = loc_of(file, m.sig.ident.span());
                            self.push_named(name, loc, params, m.block.stmts.clone());
                        }
                    }
                }
                Item::Mod(module) => {
                    if let Some((_, inner)) = &module.content {
                        let nested = match prefix {
                            Some(p) => format!("{}::{}", p, module.ident),
                            None => module.ident.to_string(),
                        };
                        self.collect_items(inner, file, Some(&nested));
                    }
                }
                _ => {}
            }
        }
    }

    fn push_named(&mut self, name: String, loc: SourceLoc, params: Vec<String>, body: Vec<Stmt>) {
        let id = self.nodes.len();
        self.index_name(&name, id);
        self.nodes.push(FunctionNode {
            id,
            name,
            loc,
            params,
            body,
            enclosing: None,
            host_stmt: None,
            lambdas: Vec::new(),
        });
    }

    fn index_name(&mut self, name: &str, id: NodeId) {
        self.by_name.entry(name.to_string()).or_default().push(id);
        if let Some(bare) = name.rsplit("::").next() {
            if bare != name {
                self.by_name.entry(bare.to_string()).or_default().push(id);
            }
        }
    }

    /// Registers every closure literal inside a named function, attributing
    /// each to its host top-level statement.
    fn collect_lambdas(&mut self, owner: NodeId, file: &str) {
        let body = self.nodes[owner].body.clone();
        let mut found: Vec<(usize, syn::ExprClosure)> = Vec::new();
        for (stmt_index, stmt) in body.iter().enumerate() {
            let mut collector = ClosureCollector {
                found: Vec::new(),
            };
            collector.visit_stmt(stmt);
            for closure in collector.found {
                found.push((stmt_index, closure));
            }
        }

        for (host_stmt, closure) in found {
            let span = closure.body.span();
            let literal_span = closure.or1_token.span();
            let line = literal_span.start().line;
            let column = literal_span.start().column;
            let id = self.nodes.len();
            let parent_name = self.nodes[owner].name.clone();
            let params = closure_params(&closure);
            let body = closure_body(&closure);
            self.nodes.push(FunctionNode {
                id,
                name: format!("{}::{{closure@{}}}", parent_name, line),
                loc: SourceLoc {
                    file: file.to_string(),
                    line: span.start().line,
                    column: span.start().column,
                },
                params,
                body,
                enclosing: Some(owner),
                host_stmt: Some(host_stmt),
                lambdas: Vec::new(),
            });
            self.nodes[owner].lambdas.push(id);
            self.lambda_by_span.insert((line, column), id);
        }
    }

    fn build_edges(&mut self) {
        let mut edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in &self.nodes {
            let mut calls = CallCollector { names: Vec::new() };
            for stmt in &node.body {
                calls.visit_stmt(stmt);
            }
            let targets = edges.entry(node.id).or_default();
            for name in calls.names {
                // Self-edges are kept so SCC detection sees direct recursion.
                for &target in self.resolve_call(&name) {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
            // Lexical edge: the encloser reaches each of its closures.
            if let Some(encl) = node.enclosing {
                let up = edges.entry(encl).or_default();
                if !up.contains(&node.id) {
                    up.push(node.id);
                }
            }
        }
        self.edges = edges;
    }
}

/// Collects closure literals in a statement, descending through nested
/// closures: every closure in the subtree belongs to the same named function.
struct ClosureCollector {
    found: Vec<syn::ExprClosure>,
}

impl<'ast> Visit<'ast> for ClosureCollector {
    fn visit_expr_closure(&mut self, node: &'ast syn::ExprClosure) {
        self.found.push(node.clone());
        // Keep walking: closures nested inside this one also belong to the
        // same named function.
        visit::visit_expr_closure(self, node);
    }
}

/// Collects call-target names from a node body, skipping nested closures
/// (they are separate nodes with their own edges).
struct CallCollector {
    names: Vec<String>,
}

impl<'ast> Visit<'ast> for CallCollector {
    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Expr::Path(p) = &*node.func {
            self.names.push(path_name(&p.path));
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        self.names.push(node.method.to_string());
        visit::visit_expr_method_call(self, node);
    }

    fn visit_expr_closure(&mut self, _node: &'ast syn::ExprClosure) {
        // Calls inside a closure belong to the closure's own node.
    }
}

/// Renders a `syn::Path` as `a::b::c`.
pub fn path_name(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn type_name(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_else(|| "_".to_string()),
        other => quote::ToTokens::to_token_stream(other)
            .to_string()
            .replace(' ', ""),
    }
}

fn param_names(sig: &syn::Signature) -> Vec<String> {
    sig.inputs
        .iter()
        .filter_map(|arg| match arg {
            syn::FnArg::Typed(pat_type) => match &*pat_type.pat {
                syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
                _ => None,
            },
            syn::FnArg::Receiver(_) => None,
        })
        .collect()
}

fn closure_params(closure: &syn::ExprClosure) -> Vec<String> {
    closure
        .inputs
        .iter()
        .filter_map(|pat| match pat {
            syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
            syn::Pat::Type(t) => match &*t.pat {
                syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn closure_body(closure: &syn::ExprClosure) -> Vec<Stmt> {
    match &*closure.body {
        Expr::Block(block) => block.block.stmts.clone(),
        other => vec![Stmt::Expr(other.clone(), None)],
    }
}

fn loc_of(file: &str, span: proc_macro2::Span) -> SourceLoc {
    SourceLoc {
        file: file.to_string(),
        line: span.start().line,
        column: span.start().column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CompilationUnit;

    fn unit(src: &str) -> CompilationUnit {
        CompilationUnit::from_source("test.rs", src.to_string()).unwrap()
    }

    #[test]
    fn test_named_functions_and_methods() {
        let graph = CallGraph::build(&unit(
            r#"
            fn top() {}
            struct Db;
            impl Db {
                fn query(&self) {}
            }
            mod inner {
                fn nested() {}
            }
            "#,
        ));
        let names: Vec<&str> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"top"));
        assert!(names.contains(&"Db::query"));
        assert!(names.contains(&"inner::nested"));
    }

    #[test]
    fn test_closure_registered_on_named_encloser() {
        let graph = CallGraph::build(&unit(
            r#"
            fn outer() {
                let f = |x| {
                    let g = |y| y + 1;
                    g(x)
                };
                f(1);
            }
            "#,
        ));
        let outer = graph
            .nodes
            .iter()
            .find(|n| n.name == "outer")
            .expect("outer node");
        // Both closures, including the nested one, belong to `outer`.
        assert_eq!(outer.lambdas.len(), 2);
        for &lambda in &outer.lambdas {
            assert_eq!(graph.enclosing_function(lambda), outer.id);
            assert_eq!(graph.node(lambda).host_stmt, Some(0));
        }
    }

    #[test]
    fn test_call_edges_with_fan_out() {
        let graph = CallGraph::build(&unit(
            r#"
            struct A;
            struct B;
            impl A { fn handle(&self) {} }
            impl B { fn handle(&self) {} }
            fn caller(x: &A) {
                x.handle();
            }
            "#,
        ));
        let caller = graph.nodes.iter().find(|n| n.name == "caller").unwrap();
        // Method call resolution cannot pick between A::handle and B::handle,
        // so the edge fans out to both.
        assert_eq!(graph.callees(caller.id).len(), 2);
    }

    #[test]
    fn test_self_recursion_edge() {
        let graph = CallGraph::build(&unit("fn looper(n: u64) { looper(n); }"));
        let looper = graph.nodes.iter().find(|n| n.name == "looper").unwrap();
        assert!(graph.callees(looper.id).contains(&looper.id));
    }

    #[test]
    fn test_unresolved_call_has_no_edge() {
        let graph = CallGraph::build(&unit("fn f() { external_thing(); }"));
        let f = graph.nodes.iter().find(|n| n.name == "f").unwrap();
        assert!(graph.callees(f.id).is_empty());
    }
}
