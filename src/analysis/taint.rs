//! # Intraprocedural Taint Tracker
//!
//! Walks one function body's statements in program order, maintaining a
//! taint-state mapping from local binding to provenance, and records
//! candidate sink call sites and outgoing calls for the interprocedural
//! propagator.
//!
//! Nested closures are analyzed as part of the enclosing named function's
//! pass: each closure body is walked with the taint environment captured at
//! the closure literal, and every sink candidate found inside it is
//! attributed to the enclosing function's top-level statement that contains
//! the literal. Candidate resolution itself is deferred to the best-fit
//! matcher; the tracker only queues.
//!
//! Parameters of a named function are seeded as tainted with a `Param`
//! origin. That single pass serves double duty: `Call`-origin taint reaching
//! a sink is a direct vulnerability, `Param`-origin taint reaching a sink
//! feeds the function's interprocedural summary.

use std::collections::HashMap;

use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Stmt, Token};

use crate::graph::{path_name, CallGraph, NodeId, SourceLoc};
use crate::report::Severity;
use crate::rules::{OriginClass, RuleMatch, RuleTable, SanitizerRule, SinkRule};

/// Where a tainted value came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaintOrigin {
    /// Return value of a declared source call.
    Call { site: SourceLoc, class: OriginClass },
    /// A parameter of the function under analysis; its real origin is only
    /// known to callers.
    Param { function: NodeId, index: usize },
}

impl TaintOrigin {
    /// Origin class used for sanitizer-effectiveness checks. Parameter taint
    /// has no known class intraprocedurally and is treated as generic.
    pub fn class(&self) -> OriginClass {
        match self {
            TaintOrigin::Call { class, .. } => *class,
            TaintOrigin::Param { .. } => OriginClass::Generic,
        }
    }
}

/// One provenance tag carried by a tainted value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaintTag {
    pub origin: TaintOrigin,
    /// Set when the value passed through a registered sanitizer that is not
    /// effective for its origin class.
    pub weakly_sanitized: bool,
}

/// Taint provenance of a value at a program point. A value may carry several
/// tags when flows merge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaintValue {
    #[default]
    Clean,
    Tainted(Vec<TaintTag>),
}

impl TaintValue {
    pub fn tainted(tag: TaintTag) -> Self {
        TaintValue::Tainted(vec![tag])
    }

    pub fn is_tainted(&self) -> bool {
        matches!(self, TaintValue::Tainted(_))
    }

    pub fn tags(&self) -> &[TaintTag] {
        match self {
            TaintValue::Clean => &[],
            TaintValue::Tainted(tags) => tags,
        }
    }

    /// Merges two values; tags are deduplicated by provenance.
    pub fn join(self, other: TaintValue) -> TaintValue {
        match (self, other) {
            (TaintValue::Clean, v) | (v, TaintValue::Clean) => v,
            (TaintValue::Tainted(mut a), TaintValue::Tainted(b)) => {
                for tag in b {
                    if !a.contains(&tag) {
                        a.push(tag);
                    }
                }
                TaintValue::Tainted(a)
            }
        }
    }
}

/// Maps local bindings to taint provenance. Unknown bindings read as clean.
#[derive(Debug, Clone, Default)]
pub struct TaintState {
    vars: HashMap<String, TaintValue>,
}

impl TaintState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, var: &str, value: TaintValue) {
        self.vars.insert(var.to_string(), value);
    }

    pub fn get(&self, var: &str) -> TaintValue {
        self.vars.get(var).cloned().unwrap_or_default()
    }
}

/// Identity of an ambiguous statement within the enclosing named function.
/// Candidates from a closure body carry the top-level statement that
/// lexically contains the closure literal plus the statement's own index
/// inside the closure body, so separate statements in one closure stay
/// separate while the decision remains scoped to the enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId {
    pub function: NodeId,
    pub index: usize,
    /// Closure-local statement index. `None` for the function's own body.
    pub inner: Option<usize>,
}

/// A candidate sink call awaiting best-fit resolution.
#[derive(Debug, Clone)]
pub struct SinkCandidate {
    pub site: SourceLoc,
    pub rule_name: String,
    pub severity: Severity,
    pub cwe: Option<String>,
    /// Provenance tags of the tainted value reaching a sensitive argument.
    pub tags: Vec<TaintTag>,
    /// Intervening expression nodes between the call and the closest tainted
    /// use within its sensitive arguments. The best-fit metric.
    pub distance: usize,
    pub snippet: String,
}

/// An outgoing call with the taint of its actual arguments, recorded for the
/// interprocedural propagator.
#[derive(Debug, Clone)]
pub struct ObservedCall {
    pub site: SourceLoc,
    /// Resolved call name; kept even when no local target exists so the
    /// cross-unit phase can still match it.
    pub callee: String,
    /// Local fan-out targets. Empty for calls that only resolve in another
    /// unit (or not at all).
    pub targets: Vec<NodeId>,
    pub args: Vec<TaintValue>,
}

/// Tracker output for one named function, closures included.
#[derive(Debug, Clone)]
pub struct TrackedFunction {
    pub function: NodeId,
    pub candidates: Vec<(StmtId, SinkCandidate)>,
    pub calls: Vec<ObservedCall>,
}

/// Intraprocedural tracker for one compilation unit.
pub struct TaintTracker<'a> {
    rules: &'a RuleTable,
    graph: &'a CallGraph,
    file: &'a str,
    source: &'a str,
}

impl<'a> TaintTracker<'a> {
    pub fn new(rules: &'a RuleTable, graph: &'a CallGraph, file: &'a str, source: &'a str) -> Self {
        Self {
            rules,
            graph,
            file,
            source,
        }
    }

    /// Analyzes a named function and every closure lexically nested in it.
    /// Each statement is walked exactly once.
    pub fn analyze_function(&self, function: NodeId) -> TrackedFunction {
        let mut tracked = TrackedFunction {
            function,
            candidates: Vec::new(),
            calls: Vec::new(),
        };

        let node = self.graph.node(function);
        let mut seed = TaintState::new();
        for (index, param) in node.params.iter().enumerate() {
            seed.set(
                param,
                TaintValue::tainted(TaintTag {
                    origin: TaintOrigin::Param { function, index },
                    weakly_sanitized: false,
                }),
            );
        }

        let mut queue: Vec<(NodeId, TaintState)> = vec![(function, seed)];
        while let Some((owner, mut state)) = queue.pop() {
            let body = self.graph.node(owner).body.clone();
            // Closure parameters shadow captured bindings and start clean.
            if self.graph.node(owner).is_lambda() {
                for param in &self.graph.node(owner).params {
                    state.set(param, TaintValue::Clean);
                }
            }
            let mut walker = Walker {
                tracker: self,
                owner,
                state,
                candidates: Vec::new(),
                calls: Vec::new(),
                lambda_jobs: Vec::new(),
            };
            for (index, stmt) in body.iter().enumerate() {
                walker.walk_stmt(index, stmt);
            }
            tracked.candidates.extend(walker.candidates);
            tracked.calls.extend(walker.calls);
            queue.extend(walker.lambda_jobs);
        }

        tracked
    }

    fn loc(&self, span: proc_macro2::Span) -> SourceLoc {
        SourceLoc {
            file: self.file.to_string(),
            line: span.start().line,
            column: span.start().column,
        }
    }

    fn line_snippet(&self, line: usize) -> String {
        self.source
            .lines()
            .nth(line.saturating_sub(1))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

/// Statement walker for one node (named function or closure) body.
struct Walker<'a, 'b> {
    tracker: &'b TaintTracker<'a>,
    owner: NodeId,
    state: TaintState,
    candidates: Vec<(StmtId, SinkCandidate)>,
    calls: Vec<ObservedCall>,
    lambda_jobs: Vec<(NodeId, TaintState)>,
}

impl Walker<'_, '_> {
    /// Statement identity in the enclosing named function: closures map to
    /// the top-level statement hosting their literal, qualified by the
    /// closure-local statement index.
    fn stmt_id(&self, index: usize) -> StmtId {
        let node = self.tracker.graph.node(self.owner);
        match (node.enclosing, node.host_stmt) {
            (Some(function), Some(host)) => StmtId {
                function,
                index: host,
                inner: Some(index),
            },
            _ => StmtId {
                function: self.owner,
                index,
                inner: None,
            },
        }
    }

    fn walk_stmt(&mut self, index: usize, stmt: &Stmt) {
        match stmt {
            Stmt::Local(local) => {
                let value = match &local.init {
                    Some(init) => self.eval(index, &init.expr),
                    None => TaintValue::Clean,
                };
                self.bind(&local.pat, value);
            }
            Stmt::Expr(expr, _) => {
                self.eval(index, expr);
            }
            Stmt::Macro(stmt_macro) => {
                self.eval_macro(index, &stmt_macro.mac);
            }
            Stmt::Item(_) => {}
        }
    }

    fn bind(&mut self, pat: &syn::Pat, value: TaintValue) {
        match pat {
            syn::Pat::Ident(ident) => self.state.set(&ident.ident.to_string(), value),
            syn::Pat::Type(t) => self.bind(&t.pat, value),
            _ => {}
        }
    }

    fn eval(&mut self, stmt: usize, expr: &Expr) -> TaintValue {
        match expr {
            Expr::Path(p) => match p.path.get_ident() {
                Some(ident) => self.state.get(&ident.to_string()),
                None => TaintValue::Clean,
            },
            Expr::Lit(_) => TaintValue::Clean,
            Expr::Reference(r) => self.eval(stmt, &r.expr),
            Expr::Paren(p) => self.eval(stmt, &p.expr),
            Expr::Group(g) => self.eval(stmt, &g.expr),
            Expr::Unary(u) => self.eval(stmt, &u.expr),
            Expr::Cast(c) => self.eval(stmt, &c.expr),
            Expr::Try(t) => self.eval(stmt, &t.expr),
            Expr::Await(a) => self.eval(stmt, &a.base),
            Expr::Field(f) => self.eval(stmt, &f.base),
            Expr::Index(i) => {
                let base = self.eval(stmt, &i.expr);
                let _ = self.eval(stmt, &i.index);
                base
            }
            Expr::Binary(b) => {
                let left = self.eval(stmt, &b.left);
                let right = self.eval(stmt, &b.right);
                left.join(right)
            }
            Expr::Assign(a) => {
                let value = self.eval(stmt, &a.right);
                if let Expr::Path(p) = &*a.left {
                    if let Some(ident) = p.path.get_ident() {
                        self.state.set(&ident.to_string(), value.clone());
                    }
                }
                value
            }
            Expr::Block(b) => self.eval_block(stmt, &b.block),
            Expr::If(i) => {
                let _ = self.eval(stmt, &i.cond);
                let mut value = self.eval_block(stmt, &i.then_branch);
                if let Some((_, else_branch)) = &i.else_branch {
                    value = value.join(self.eval(stmt, else_branch));
                }
                value
            }
            Expr::Match(m) => {
                let mut value = self.eval(stmt, &m.expr);
                for arm in &m.arms {
                    let arm_value = self.eval(stmt, &arm.body);
                    value = value.join(arm_value);
                }
                value
            }
            Expr::Return(r) => match &r.expr {
                Some(inner) => self.eval(stmt, inner),
                None => TaintValue::Clean,
            },
            Expr::MethodCall(call) => self.eval_method_call(stmt, call),
            Expr::Call(call) => self.eval_call(stmt, call),
            Expr::Macro(m) => self.eval_macro(stmt, &m.mac),
            Expr::Closure(closure) => {
                let start = closure.or1_token.span().start();
                if let Some(lambda) = self.tracker.graph.lambda_at(start.line, start.column) {
                    // Snapshot of the environment at the literal: what the
                    // closure captures.
                    self.lambda_jobs.push((lambda, self.state.clone()));
                }
                TaintValue::Clean
            }
            _ => {
                let uses = self.tainted_uses(expr, 0);
                if uses.is_empty() {
                    TaintValue::Clean
                } else {
                    TaintValue::Tainted(dedup_tags(uses))
                }
            }
        }
    }

    fn eval_block(&mut self, stmt: usize, block: &syn::Block) -> TaintValue {
        let mut value = TaintValue::Clean;
        for inner in &block.stmts {
            // Inner statements keep the same top-level statement identity
            // for best-fit purposes.
            if let Stmt::Expr(e, None) = inner {
                value = self.eval(stmt, e);
            } else {
                self.walk_stmt(stmt, inner);
            }
        }
        value
    }

    fn eval_method_call(&mut self, stmt: usize, call: &syn::ExprMethodCall) -> TaintValue {
        let receiver = self.eval(stmt, &call.receiver);
        let args: Vec<TaintValue> = call.args.iter().map(|a| self.eval(stmt, a)).collect();
        let name = call.method.to_string();
        let site = self.tracker.loc(call.method.span());

        match self.tracker.rules.resolve(&name) {
            RuleMatch::Source(rule) => TaintValue::tainted(TaintTag {
                origin: TaintOrigin::Call {
                    site,
                    class: rule.origin,
                },
                weakly_sanitized: false,
            }),
            RuleMatch::Sanitizer(rule) => {
                let combined = args.into_iter().fold(receiver, TaintValue::join);
                apply_sanitizer(rule, combined)
            }
            RuleMatch::Sink(rule) => {
                let call_args: Vec<&Expr> = call.args.iter().collect();
                self.record_sink(stmt, rule, site, &call_args);
                args.into_iter().fold(receiver, TaintValue::join)
            }
            RuleMatch::Neutral => args.into_iter().fold(receiver, TaintValue::join),
            RuleMatch::Unresolved => {
                self.record_call(site, &name, args.clone());
                args.into_iter().fold(receiver, TaintValue::join)
            }
        }
    }

    fn eval_call(&mut self, stmt: usize, call: &syn::ExprCall) -> TaintValue {
        let args: Vec<TaintValue> = call.args.iter().map(|a| self.eval(stmt, a)).collect();
        let joined = || {
            args.clone()
                .into_iter()
                .fold(TaintValue::Clean, TaintValue::join)
        };
        let name = match &*call.func {
            Expr::Path(p) => path_name(&p.path),
            other => {
                let _ = self.eval(stmt, other);
                return joined();
            }
        };
        let site = self.tracker.loc(call.func.span());

        match self.tracker.rules.resolve(&name) {
            RuleMatch::Source(rule) => TaintValue::tainted(TaintTag {
                origin: TaintOrigin::Call {
                    site,
                    class: rule.origin,
                },
                weakly_sanitized: false,
            }),
            RuleMatch::Sanitizer(rule) => apply_sanitizer(rule, joined()),
            RuleMatch::Sink(rule) => {
                let call_args: Vec<&Expr> = call.args.iter().collect();
                self.record_sink(stmt, rule, site, &call_args);
                joined()
            }
            RuleMatch::Neutral => joined(),
            RuleMatch::Unresolved => {
                let value = joined();
                self.record_call(site, &name, args);
                value
            }
        }
    }

    fn eval_macro(&mut self, stmt: usize, mac: &syn::Macro) -> TaintValue {
        // format!-style macros: treat the comma-separated arguments as
        // ordinary expressions so taint flows through interpolation.
        let parsed = mac.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated);
        match parsed {
            Ok(exprs) => exprs
                .iter()
                .map(|e| self.eval(stmt, e))
                .fold(TaintValue::Clean, TaintValue::join),
            Err(_) => {
                log::debug!(
                    "opaque macro {} at {}, assuming clean",
                    path_name(&mac.path),
                    self.tracker.loc(mac.path.span())
                );
                TaintValue::Clean
            }
        }
    }

    fn record_sink(&mut self, stmt: usize, rule: &SinkRule, site: SourceLoc, args: &[&Expr]) {
        let mut uses: Vec<(usize, TaintTag)> = Vec::new();
        for &position in &rule.sensitive_args {
            if let Some(arg) = args.get(position) {
                uses.extend(self.tainted_uses(arg, 0));
            }
        }
        if uses.is_empty() {
            return;
        }
        let distance = uses.iter().map(|(d, _)| *d).min().unwrap_or(0);
        let snippet = self.tracker.line_snippet(site.line);
        let candidate = SinkCandidate {
            site,
            rule_name: rule.name.clone(),
            severity: rule.severity,
            cwe: rule.cwe.clone(),
            tags: dedup_tags(uses),
            distance,
            snippet,
        };
        let id = self.stmt_id(stmt);
        self.candidates.push((id, candidate));
    }

    fn record_call(&mut self, site: SourceLoc, name: &str, args: Vec<TaintValue>) {
        let targets = self.tracker.graph.resolve_call(name).to_vec();
        if targets.is_empty() {
            log::debug!("unresolved call target {} at {}", name, site);
        }
        if !targets.is_empty() || args.iter().any(TaintValue::is_tainted) {
            self.calls.push(ObservedCall {
                site,
                callee: name.to_string(),
                targets,
                args,
            });
        }
    }

    /// Tainted variable uses inside an expression with their syntactic
    /// depth. This is the distance input of the best-fit metric.
    fn tainted_uses(&self, expr: &Expr, depth: usize) -> Vec<(usize, TaintTag)> {
        let mut out = Vec::new();
        self.collect_uses(expr, depth, &mut out);
        out
    }

    fn collect_uses(&self, expr: &Expr, depth: usize, out: &mut Vec<(usize, TaintTag)>) {
        match expr {
            Expr::Path(p) => {
                if let Some(ident) = p.path.get_ident() {
                    if let TaintValue::Tainted(tags) = self.state.get(&ident.to_string()) {
                        for tag in tags {
                            out.push((depth, tag));
                        }
                    }
                }
            }
            Expr::Reference(r) => self.collect_uses(&r.expr, depth + 1, out),
            Expr::Paren(p) => self.collect_uses(&p.expr, depth + 1, out),
            Expr::Group(g) => self.collect_uses(&g.expr, depth + 1, out),
            Expr::Unary(u) => self.collect_uses(&u.expr, depth + 1, out),
            Expr::Cast(c) => self.collect_uses(&c.expr, depth + 1, out),
            Expr::Try(t) => self.collect_uses(&t.expr, depth + 1, out),
            Expr::Await(a) => self.collect_uses(&a.base, depth + 1, out),
            Expr::Field(f) => self.collect_uses(&f.base, depth + 1, out),
            Expr::Binary(b) => {
                self.collect_uses(&b.left, depth + 1, out);
                self.collect_uses(&b.right, depth + 1, out);
            }
            Expr::Index(i) => {
                self.collect_uses(&i.expr, depth + 1, out);
                self.collect_uses(&i.index, depth + 1, out);
            }
            Expr::Call(c) => {
                if let Expr::Path(p) = &*c.func {
                    match self.tracker.rules.resolve(&path_name(&p.path)) {
                        RuleMatch::Source(rule) => {
                            // A source call nested in the argument is itself
                            // the tainted use.
                            out.push((
                                depth,
                                TaintTag {
                                    origin: TaintOrigin::Call {
                                        site: self.tracker.loc(c.func.span()),
                                        class: rule.origin,
                                    },
                                    weakly_sanitized: false,
                                },
                            ));
                            return;
                        }
                        RuleMatch::Sanitizer(rule) => {
                            let mut inner = Vec::new();
                            for arg in &c.args {
                                self.collect_uses(arg, depth + 1, &mut inner);
                            }
                            push_sanitized(rule, inner, out);
                            return;
                        }
                        _ => {}
                    }
                }
                for arg in &c.args {
                    self.collect_uses(arg, depth + 1, out);
                }
            }
            Expr::MethodCall(m) => {
                match self.tracker.rules.resolve(&m.method.to_string()) {
                    RuleMatch::Source(rule) => {
                        out.push((
                            depth,
                            TaintTag {
                                origin: TaintOrigin::Call {
                                    site: self.tracker.loc(m.method.span()),
                                    class: rule.origin,
                                },
                                weakly_sanitized: false,
                            },
                        ));
                        return;
                    }
                    RuleMatch::Sanitizer(rule) => {
                        let mut inner = Vec::new();
                        self.collect_uses(&m.receiver, depth + 1, &mut inner);
                        for arg in &m.args {
                            self.collect_uses(arg, depth + 1, &mut inner);
                        }
                        push_sanitized(rule, inner, out);
                        return;
                    }
                    _ => {}
                }
                self.collect_uses(&m.receiver, depth + 1, out);
                for arg in &m.args {
                    self.collect_uses(arg, depth + 1, out);
                }
            }
            Expr::Macro(m) => {
                if let Ok(exprs) = m
                    .mac
                    .parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated)
                {
                    for inner in &exprs {
                        self.collect_uses(inner, depth + 1, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Filters collected uses through a sanitizer rule, keeping only the tags
/// the rule is not effective against, marked weakly sanitized.
fn push_sanitized(
    rule: &SanitizerRule,
    inner: Vec<(usize, TaintTag)>,
    out: &mut Vec<(usize, TaintTag)>,
) {
    for (d, mut tag) in inner {
        if !rule.is_effective_for(tag.origin.class()) {
            tag.weakly_sanitized = true;
            out.push((d, tag));
        }
    }
}

fn dedup_tags(uses: Vec<(usize, TaintTag)>) -> Vec<TaintTag> {
    let mut tags: Vec<TaintTag> = Vec::new();
    for (_, tag) in uses {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Applies a sanitizer rule tag-by-tag: effective classes drop their tags,
/// everything else survives marked weakly sanitized.
fn apply_sanitizer(rule: &SanitizerRule, value: TaintValue) -> TaintValue {
    match value {
        TaintValue::Clean => TaintValue::Clean,
        TaintValue::Tainted(tags) => {
            let kept: Vec<TaintTag> = tags
                .into_iter()
                .filter(|t| !rule.is_effective_for(t.origin.class()))
                .map(|mut t| {
                    t.weakly_sanitized = true;
                    t
                })
                .collect();
            if kept.is_empty() {
                TaintValue::Clean
            } else {
                TaintValue::Tainted(kept)
            }
        }
    }
}
