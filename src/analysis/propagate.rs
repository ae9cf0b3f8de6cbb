//! # Interprocedural Propagator
//!
//! Summarizes each function as "parameter i can reach sink S" facts and
//! pushes those facts across call edges. Components of mutually recursive
//! functions are iterated to a fixed point in callee-first order; if a
//! component has not converged within the configured iteration bound its
//! summaries are frozen as-is and marked conservative, and a diagnostic is
//! recorded instead of looping forever.
//!
//! Chained findings join a caller-side tainted argument (a source origin)
//! with a callee summary entry for the matching parameter, bounded by
//! `max_call_depth` call hops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::EngineConfig;
use crate::error::Diagnostic;
use crate::graph::{CallGraph, NodeId, SourceLoc};
use crate::report::{Finding, SanitizationStatus, Severity};
use crate::rules::OriginClass;

use super::bestfit::BestFitCache;
use super::taint::{TaintOrigin, TrackedFunction};

/// One "parameter reaches this sink" fact in a function summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReach {
    pub sink_site: SourceLoc,
    pub rule_name: String,
    pub severity: Severity,
    pub cwe: Option<String>,
    pub weakly_sanitized: bool,
    /// Call sites crossed between the summarized function and the sink.
    pub path: Vec<SourceLoc>,
    /// Number of call hops to the sink. Zero means the sink is in the
    /// summarized function's own body.
    pub depth: usize,
}

/// Interprocedural summary of a single function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaintSummary {
    /// Parameter index to the sinks that parameter can reach.
    pub param_reaches: HashMap<usize, Vec<SinkReach>>,
    /// Set when the summary was frozen before convergence and may be
    /// missing reaches. Findings derived through it are flagged so.
    pub conservative: bool,
}

impl TaintSummary {
    fn add(&mut self, param: usize, reach: SinkReach) -> bool {
        let reaches = self.param_reaches.entry(param).or_default();
        if reaches.contains(&reach) {
            return false;
        }
        reaches.push(reach);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.param_reaches.is_empty() && !self.conservative
    }

    /// Union with another summary for the same function name, used when
    /// several units define identically named functions.
    pub fn merge(&mut self, other: &TaintSummary) {
        for (param, reaches) in &other.param_reaches {
            for reach in reaches {
                self.add(*param, reach.clone());
            }
        }
        self.conservative |= other.conservative;
    }
}

pub struct Propagator<'a> {
    graph: &'a CallGraph,
    config: &'a EngineConfig,
    tracked: &'a HashMap<NodeId, TrackedFunction>,
    /// Resolved sinks grouped by the named function that owns them.
    sinks_by_function: HashMap<NodeId, Vec<super::bestfit::ResolvedSink>>,
    summaries: HashMap<NodeId, TaintSummary>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Propagator<'a> {
    pub fn new(
        graph: &'a CallGraph,
        config: &'a EngineConfig,
        tracked: &'a HashMap<NodeId, TrackedFunction>,
        cache: &'a BestFitCache,
    ) -> Self {
        let mut sinks_by_function: HashMap<NodeId, Vec<_>> = HashMap::new();
        for (stmt, sink) in cache.resolved() {
            sinks_by_function
                .entry(stmt.function)
                .or_default()
                .push(sink.clone());
        }
        Self {
            graph,
            config,
            tracked,
            sinks_by_function,
            summaries: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Runs the fixed point over all strongly connected components and
    /// returns per-function summaries. The cancellation flag is checked
    /// between components, so a flagged pass stops with whatever summaries
    /// have accumulated so far.
    pub fn propagate(&mut self, cancel: &AtomicBool) -> &HashMap<NodeId, TaintSummary> {
        let components = crate::graph::scc::strongly_connected_components(self.graph);
        for component in &components {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let cyclic = crate::graph::scc::is_cyclic(self.graph, component);
            if !cyclic {
                let f = component[0];
                let summary = self.compute_summary(f);
                self.summaries.insert(f, summary);
                continue;
            }
            let mut converged = false;
            for _ in 0..self.config.scc_iteration_bound {
                let mut changed = false;
                for &f in component {
                    let summary = self.compute_summary(f);
                    if self.summaries.get(&f) != Some(&summary) {
                        self.summaries.insert(f, summary);
                        changed = true;
                    }
                }
                if !changed {
                    converged = true;
                    break;
                }
            }
            if !converged {
                // Freeze whatever has accumulated and flag every member.
                for &f in component {
                    self.summaries.entry(f).or_default().conservative = true;
                }
                let names = component
                    .iter()
                    .map(|&f| self.graph.node(f).name.clone())
                    .collect();
                self.diagnostics.push(Diagnostic::CyclicPropagationOverflow {
                    component: names,
                    bound: self.config.scc_iteration_bound,
                });
            }
        }
        &self.summaries
    }

    /// Summary of `f` given current summaries of its callees.
    fn compute_summary(&self, f: NodeId) -> TaintSummary {
        let mut summary = TaintSummary::default();

        // Sinks in f's own body (and its closures) reached by f's params.
        if let Some(sinks) = self.sinks_by_function.get(&f) {
            for sink in sinks {
                for tag in &sink.tags {
                    if let TaintOrigin::Param { function, index } = &tag.origin {
                        if *function == f {
                            summary.add(
                                *index,
                                SinkReach {
                                    sink_site: sink.site.clone(),
                                    rule_name: sink.rule_name.clone(),
                                    severity: sink.severity,
                                    cwe: sink.cwe.clone(),
                                    weakly_sanitized: tag.weakly_sanitized,
                                    path: Vec::new(),
                                    depth: 0,
                                },
                            );
                        }
                    }
                }
            }
        }

        // Sinks transitively reached through calls f makes with its own
        // params as arguments.
        let Some(tracked) = self.tracked.get(&f) else {
            return summary;
        };
        for call in &tracked.calls {
            for &target in &call.targets {
                let Some(callee) = self.summaries.get(&target) else {
                    continue;
                };
                for (arg_idx, value) in call.args.iter().enumerate() {
                    for tag in value.tags() {
                        let TaintOrigin::Param { function, index } = &tag.origin else {
                            continue;
                        };
                        if *function != f {
                            continue;
                        }
                        if callee.conservative {
                            summary.conservative = true;
                        }
                        for reach in callee.param_reaches.get(&arg_idx).into_iter().flatten() {
                            if reach.depth + 1 > self.config.max_call_depth {
                                continue;
                            }
                            let mut path = vec![call.site.clone()];
                            path.extend(reach.path.iter().cloned());
                            summary.add(
                                *index,
                                SinkReach {
                                    sink_site: reach.sink_site.clone(),
                                    rule_name: reach.rule_name.clone(),
                                    severity: reach.severity,
                                    cwe: reach.cwe.clone(),
                                    weakly_sanitized: reach.weakly_sanitized
                                        || tag.weakly_sanitized,
                                    path,
                                    depth: reach.depth + 1,
                                },
                            );
                        }
                    }
                }
            }
        }
        summary
    }

    /// Flows that start at a source call in some function and end at a sink
    /// reached through one or more call hops.
    pub fn chained_findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for tracked in self.tracked.values() {
            for call in &tracked.calls {
                for &target in &call.targets {
                    let Some(summary) = self.summaries.get(&target) else {
                        continue;
                    };
                    findings.extend(chain_call(
                        call,
                        summary,
                        self.config.max_call_depth,
                    ));
                }
            }
        }
        findings
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Summaries keyed by function name, for matching calls that did not
    /// resolve inside this unit. Duplicated names are merged by union.
    pub fn named_summaries(&self) -> HashMap<String, TaintSummary> {
        let mut by_name = HashMap::new();
        for (&id, summary) in &self.summaries {
            if summary.is_empty() {
                continue;
            }
            by_name
                .entry(self.graph.node(id).name.clone())
                .or_insert_with(TaintSummary::default)
                .merge(summary);
        }
        by_name
    }
}

/// Findings for one observed call against one callee summary.
fn chain_call(
    call: &super::taint::ObservedCall,
    summary: &TaintSummary,
    max_call_depth: usize,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (arg_idx, value) in call.args.iter().enumerate() {
        for tag in value.tags() {
            let TaintOrigin::Call { site: source, class } = &tag.origin else {
                continue;
            };
            for reach in summary.param_reaches.get(&arg_idx).into_iter().flatten() {
                if reach.depth + 1 > max_call_depth {
                    continue;
                }
                let mut path = vec![call.site.clone()];
                path.extend(reach.path.iter().cloned());
                findings.push(build_finding(
                    source,
                    *class,
                    &reach.sink_site,
                    &reach.rule_name,
                    reach.severity,
                    reach.cwe.clone(),
                    tag.weakly_sanitized || reach.weakly_sanitized,
                    summary.conservative,
                    path,
                    None,
                ));
            }
        }
    }
    findings
}

/// Findings whose call targets only resolve against summaries exported by
/// other units, matched by function name.
pub fn cross_unit_findings(
    tracked: &HashMap<NodeId, TrackedFunction>,
    global: &HashMap<String, TaintSummary>,
    config: &EngineConfig,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for function in tracked.values() {
        for call in &function.calls {
            if !call.targets.is_empty() {
                continue;
            }
            let bare = call.callee.rsplit("::").next().unwrap_or(&call.callee);
            for (name, summary) in global {
                let matches = name == &call.callee
                    || name.rsplit("::").next().unwrap_or(name) == bare;
                if !matches {
                    continue;
                }
                findings.extend(chain_call(call, summary, config.max_call_depth));
            }
        }
    }
    findings
}

/// Findings whose source and sink sit in the same function body.
pub fn direct_findings(cache: &BestFitCache) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (_, sink) in cache.resolved() {
        for tag in &sink.tags {
            let TaintOrigin::Call { site, class } = &tag.origin else {
                continue;
            };
            findings.push(build_finding(
                site,
                *class,
                &sink.site,
                &sink.rule_name,
                sink.severity,
                sink.cwe.clone(),
                tag.weakly_sanitized,
                false,
                Vec::new(),
                Some(sink.snippet.clone()),
            ));
        }
    }
    findings
}

#[allow(clippy::too_many_arguments)]
fn build_finding(
    source: &SourceLoc,
    class: OriginClass,
    sink: &SourceLoc,
    rule: &str,
    severity: Severity,
    cwe: Option<String>,
    weakly_sanitized: bool,
    conservative: bool,
    path: Vec<SourceLoc>,
    snippet: Option<String>,
) -> Finding {
    let sanitization = if weakly_sanitized {
        SanitizationStatus::WeaklySanitized
    } else {
        SanitizationStatus::NotSanitized
    };
    let title = format!("Untrusted {} data reaches {} sink", class, rule);
    let mut description = format!(
        "Data read from an untrusted {} origin at {} flows into a {} sink at {} without effective sanitization.",
        class, source, rule, sink
    );
    if weakly_sanitized {
        description.push_str(
            " A sanitizer was applied along the way but it does not neutralize this class of input.",
        );
    }
    if conservative {
        description.push_str(
            " The flow crosses a recursion cycle whose analysis was truncated, so the path may be incomplete.",
        );
    }
    Finding {
        id: String::new(),
        rule: rule.to_string(),
        title,
        description,
        severity,
        source_site: source.clone(),
        sink_site: sink.clone(),
        path,
        sanitization,
        conservative,
        cwe,
        code_snippet: snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::taint::TaintTracker;
    use crate::parser::CompilationUnit;
    use crate::rules::RuleTable;

    fn run_pipeline(
        source: &str,
        config: &EngineConfig,
    ) -> (Vec<Finding>, Vec<Diagnostic>) {
        let unit = CompilationUnit::from_source("prop.rs", source).unwrap();
        let rules = RuleTable::builtin();
        let graph = CallGraph::build(&unit);
        let mut tracked = HashMap::new();
        let mut cache = BestFitCache::new();
        let tracker = TaintTracker::new(&rules, &graph, "prop.rs", &unit.source_code);
        for id in graph.named_functions() {
            let result = tracker.analyze_function(id);
            let mut by_stmt: HashMap<_, Vec<_>> = HashMap::new();
            for (stmt, candidate) in &result.candidates {
                by_stmt.entry(*stmt).or_default().push(candidate.clone());
            }
            for (stmt, candidates) in by_stmt {
                cache.resolve(stmt, &candidates);
            }
            tracked.insert(id, result);
        }
        let mut propagator = Propagator::new(&graph, config, &tracked, &cache);
        propagator.propagate(&AtomicBool::new(false));
        let mut findings = direct_findings(&cache);
        findings.extend(propagator.chained_findings());
        (findings, propagator.diagnostics().to_vec())
    }

    #[test]
    fn test_chained_flow_through_helper() {
        let source = r#"
            fn run_query(sql: String) {
                execute_query(sql);
            }
            fn handler() {
                let id = request_param("id");
                run_query(id);
            }
        "#;
        let (findings, diags) = run_pipeline(source, &EngineConfig::default());
        assert!(diags.is_empty());
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.rule, "sql-injection");
        assert_eq!(finding.path.len(), 1);
        assert_eq!(finding.sanitization, SanitizationStatus::NotSanitized);
    }

    #[test]
    fn test_weak_sanitizer_survives_the_call_hop() {
        let source = r#"
            fn run_query(sql: String) {
                execute_query(sql);
            }
            fn handler() {
                let id = request_param("id").replace("'", "");
                run_query(id);
            }
        "#;
        let (findings, _) = run_pipeline(source, &EngineConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].sanitization, SanitizationStatus::WeaklySanitized);
    }

    #[test]
    fn test_mutual_recursion_terminates_within_bound() {
        let source = r#"
            fn ping(n: String) {
                pong(n);
            }
            fn pong(n: String) {
                ping(n);
                execute_query(n);
            }
            fn handler() {
                ping(request_param("id"));
            }
        "#;
        let (findings, diags) = run_pipeline(source, &EngineConfig::default());
        // The cycle converges: each param reaches the sink at bounded depth.
        assert!(diags.is_empty());
        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.rule == "sql-injection"));
    }

    #[test]
    fn test_depth_budget_drops_long_chains() {
        let source = r#"
            fn hop1(s: String) { hop2(s); }
            fn hop2(s: String) { hop3(s); }
            fn hop3(s: String) { execute_query(s); }
            fn handler() {
                hop1(request_param("id"));
            }
        "#;
        let config = EngineConfig {
            max_call_depth: 2,
            ..EngineConfig::default()
        };
        let (findings, _) = run_pipeline(source, &config);
        // Three hops are needed but only two are allowed.
        assert!(findings.is_empty());
    }

    #[test]
    fn test_overflow_freezes_component_and_reports() {
        // An ever-growing chain inside the cycle prevents convergence when
        // depths keep increasing under a generous call depth budget.
        let source = r#"
            fn spin(n: String) {
                spin(n);
                execute_query(n);
            }
            fn handler() {
                spin(request_param("id"));
            }
        "#;
        let config = EngineConfig {
            max_call_depth: 1_000,
            scc_iteration_bound: 3,
            ..EngineConfig::default()
        };
        let (findings, diags) = run_pipeline(source, &config);
        assert!(matches!(
            diags.as_slice(),
            [Diagnostic::CyclicPropagationOverflow { bound: 3, .. }]
        ));
        // The frozen summary still yields the depth-0 reach.
        assert!(findings
            .iter()
            .any(|f| f.conservative && f.rule == "sql-injection"));
    }

    #[test]
    fn test_cancelled_propagation_stops_before_components() {
        let source = r#"
            fn run_query(sql: String) {
                execute_query(sql);
            }
            fn handler() {
                let id = request_param("id");
                run_query(id);
            }
        "#;
        let unit = CompilationUnit::from_source("prop.rs", source).unwrap();
        let rules = RuleTable::builtin();
        let graph = CallGraph::build(&unit);
        let cache = BestFitCache::new();
        let tracker = TaintTracker::new(&rules, &graph, "prop.rs", &unit.source_code);
        let mut tracked = HashMap::new();
        for id in graph.named_functions() {
            tracked.insert(id, tracker.analyze_function(id));
        }
        let config = EngineConfig::default();
        let mut propagator = Propagator::new(&graph, &config, &tracked, &cache);
        // A flag raised before propagation starts leaves every summary
        // uncomputed, so no chained flow can be derived.
        assert!(propagator.propagate(&AtomicBool::new(true)).is_empty());
        assert!(propagator.chained_findings().is_empty());
        assert!(propagator.diagnostics().is_empty());
    }

    #[test]
    fn test_cross_unit_match_by_name() {
        let lib = r#"
            fn run_query(sql: String) {
                execute_query(sql);
            }
        "#;
        let app = r#"
            fn handler() {
                run_query(request_param("id"));
            }
        "#;
        let config = EngineConfig::default();
        let rules = RuleTable::builtin();

        let lib_unit = CompilationUnit::from_source("lib.rs", lib).unwrap();
        let lib_graph = CallGraph::build(&lib_unit);
        let mut lib_tracked = HashMap::new();
        let mut lib_cache = BestFitCache::new();
        let tracker = TaintTracker::new(&rules, &lib_graph, "lib.rs", &lib_unit.source_code);
        for id in lib_graph.named_functions() {
            let result = tracker.analyze_function(id);
            let mut by_stmt: HashMap<_, Vec<_>> = HashMap::new();
            for (stmt, candidate) in &result.candidates {
                by_stmt.entry(*stmt).or_default().push(candidate.clone());
            }
            for (stmt, candidates) in by_stmt {
                lib_cache.resolve(stmt, &candidates);
            }
            lib_tracked.insert(id, result);
        }
        let mut lib_prop = Propagator::new(&lib_graph, &config, &lib_tracked, &lib_cache);
        lib_prop.propagate(&AtomicBool::new(false));
        let global = lib_prop.named_summaries();
        assert!(global.contains_key("run_query"));

        let app_unit = CompilationUnit::from_source("app.rs", app).unwrap();
        let app_graph = CallGraph::build(&app_unit);
        let mut app_tracked = HashMap::new();
        let tracker = TaintTracker::new(&rules, &app_graph, "app.rs", &app_unit.source_code);
        for id in app_graph.named_functions() {
            app_tracked.insert(id, tracker.analyze_function(id));
        }
        let findings = cross_unit_findings(&app_tracked, &global, &config);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "sql-injection");
        assert_eq!(findings[0].path.len(), 1);
    }
}
