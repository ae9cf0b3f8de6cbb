//! # Analysis Engine
//!
//! Drives the full pass over a set of source files. Files are parsed and
//! analyzed in parallel and independently: each worker parses its file and
//! runs its own call graph, taint tracker, best-fit cache, and propagator,
//! so no syntax tree ever crosses a thread boundary. A second, sequential
//! phase then matches calls that did not resolve inside their own unit
//! against the summaries every unit exported, by function name.
//!
//! The pass is cooperative: workers check the cancellation flag and the
//! optional time budget before starting a unit, and a pass that stops early
//! reports itself as incomplete rather than failing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info};
use rayon::prelude::*;

use crate::analysis::propagate::{self, Propagator, TaintSummary};
use crate::analysis::taint::{TaintTracker, TrackedFunction};
use crate::analysis::BestFitCache;
use crate::config::EngineConfig;
use crate::error::Diagnostic;
use crate::graph::{CallGraph, NodeId};
use crate::parser::CompilationUnit;
use crate::report::Finding;
use crate::rules::RuleTable;

/// Outcome of one analysis pass.
#[derive(Debug)]
pub struct PassResult {
    /// Raw findings, before policy application and deduplication.
    pub findings: Vec<Finding>,

    /// Non-fatal conditions hit during the pass.
    pub diagnostics: Vec<Diagnostic>,

    /// Set when the pass stopped before analyzing every unit.
    pub incomplete: bool,

    /// Number of units that were actually analyzed.
    pub units_analyzed: usize,
}

/// What one unit contributes to the pass.
struct UnitOutcome {
    findings: Vec<Finding>,
    diagnostics: Vec<Diagnostic>,
    summaries: HashMap<String, TaintSummary>,
    tracked: HashMap<NodeId, TrackedFunction>,
}

pub struct Engine {
    rules: RuleTable,
    config: EngineConfig,
}

impl Engine {
    pub fn new(rules: RuleTable, config: EngineConfig) -> Self {
        Self { rules, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reads the given paths and analyzes them in parallel. Files that fail
    /// to read or parse become `MalformedInput` diagnostics and do not abort
    /// the pass.
    pub fn analyze_files(&self, paths: &[impl AsRef<Path>], cancel: &AtomicBool) -> PassResult {
        let mut sources = Vec::new();
        let mut diagnostics = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match std::fs::read_to_string(path) {
                Ok(text) => sources.push((path.display().to_string(), text)),
                Err(err) => {
                    diagnostics.push(Diagnostic::MalformedInput {
                        unit: path.display().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        let mut result = self.analyze_sources(&sources, cancel);
        result.diagnostics.splice(0..0, diagnostics);
        result
    }

    /// Runs the full pass over `(file name, source text)` pairs, one rayon
    /// worker per file. Parsing happens inside the worker because syntax
    /// trees hold thread-local span data and cannot be sent between threads;
    /// only the worker's plain-data outcome crosses back.
    pub fn analyze_sources(&self, sources: &[(String, String)], cancel: &AtomicBool) -> PassResult {
        let deadline = self
            .config
            .time_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let analyzed = AtomicUsize::new(0);
        let timed_out = AtomicBool::new(false);

        info!("analyzing {} unit(s)", sources.len());
        let outcomes: Vec<UnitOutcome> = sources
            .par_iter()
            .filter_map(|(name, text)| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        timed_out.store(true, Ordering::Relaxed);
                        return None;
                    }
                }
                let outcome = match CompilationUnit::from_source(name, text.as_str()) {
                    Ok(unit) => {
                        let outcome = self.analyze_unit(&unit, cancel);
                        analyzed.fetch_add(1, Ordering::Relaxed);
                        outcome
                    }
                    Err(err) => UnitOutcome {
                        findings: Vec::new(),
                        diagnostics: vec![Diagnostic::MalformedInput {
                            unit: name.clone(),
                            message: err.to_string(),
                        }],
                        summaries: HashMap::new(),
                        tracked: HashMap::new(),
                    },
                };
                Some(outcome)
            })
            .collect();

        self.finish(outcomes, sources.len(), cancel, &timed_out, &analyzed)
    }

    /// Sequential pass over already-parsed units, for callers that hold the
    /// syntax trees themselves.
    pub fn analyze_units(&self, units: &[CompilationUnit], cancel: &AtomicBool) -> PassResult {
        let deadline = self
            .config
            .time_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let analyzed = AtomicUsize::new(0);
        let timed_out = AtomicBool::new(false);

        info!("analyzing {} unit(s)", units.len());
        let mut outcomes = Vec::new();
        for unit in units {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    timed_out.store(true, Ordering::Relaxed);
                    break;
                }
            }
            outcomes.push(self.analyze_unit(unit, cancel));
            analyzed.fetch_add(1, Ordering::Relaxed);
        }

        self.finish(outcomes, units.len(), cancel, &timed_out, &analyzed)
    }

    /// Merges per-unit outcomes, runs the cross-unit matching phase, and
    /// records how the pass ended.
    fn finish(
        &self,
        outcomes: Vec<UnitOutcome>,
        total: usize,
        cancel: &AtomicBool,
        timed_out: &AtomicBool,
        analyzed: &AtomicUsize,
    ) -> PassResult {
        let mut findings = Vec::new();
        let mut diagnostics = Vec::new();
        let mut global: HashMap<String, TaintSummary> = HashMap::new();
        let mut tracked_units = Vec::new();
        for outcome in outcomes {
            findings.extend(outcome.findings);
            diagnostics.extend(outcome.diagnostics);
            for (name, summary) in outcome.summaries {
                global
                    .entry(name)
                    .or_insert_with(TaintSummary::default)
                    .merge(&summary);
            }
            tracked_units.push(outcome.tracked);
        }

        // Second phase: calls that stayed dangling inside their unit get a
        // chance to match summaries exported by the other units.
        for tracked in &tracked_units {
            findings.extend(propagate::cross_unit_findings(tracked, &global, &self.config));
        }

        let units_analyzed = analyzed.load(Ordering::Relaxed);
        let mut incomplete = false;
        if cancel.load(Ordering::Relaxed) {
            diagnostics.push(Diagnostic::Cancelled {
                analyzed: units_analyzed,
                total,
            });
            incomplete = true;
        } else if timed_out.load(Ordering::Relaxed) {
            diagnostics.push(Diagnostic::AnalysisTimeout {
                analyzed: units_analyzed,
                total,
            });
            incomplete = true;
        }

        PassResult {
            findings,
            diagnostics,
            incomplete,
            units_analyzed,
        }
    }

    /// Per-unit pipeline: call graph, taint tracking, best-fit resolution,
    /// intra-unit propagation.
    fn analyze_unit(&self, unit: &CompilationUnit, cancel: &AtomicBool) -> UnitOutcome {
        debug!("analyzing unit {}", unit.file_path);
        let graph = CallGraph::build(unit);
        let tracker = TaintTracker::new(&self.rules, &graph, &unit.file_path, &unit.source_code);

        let mut tracked = HashMap::new();
        let mut cache = BestFitCache::new();
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

        let mut propagator = Propagator::new(&graph, &self.config, &tracked, &cache);
        propagator.propagate(cancel);

        let mut findings = propagate::direct_findings(&cache);
        findings.extend(propagator.chained_findings());

        UnitOutcome {
            findings,
            diagnostics: propagator.diagnostics().to_vec(),
            summaries: propagator.named_summaries(),
            tracked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeakSanitizationPolicy;
    use crate::report::{emit_findings, SanitizationStatus};

    fn engine() -> Engine {
        Engine::new(RuleTable::builtin(), EngineConfig::default())
    }

    fn unit(name: &str, source: &str) -> CompilationUnit {
        CompilationUnit::from_source(name, source).unwrap()
    }

    #[test]
    fn test_single_unit_direct_flow() {
        let units = vec![unit(
            "app.rs",
            r#"
                fn handler() {
                    let id = request_param("id");
                    execute_query(id);
                }
            "#,
        )];
        let result = engine().analyze_units(&units, &AtomicBool::new(false));
        assert_eq!(result.units_analyzed, 1);
        assert!(!result.incomplete);
        let findings = emit_findings(result.findings, WeakSanitizationPolicy::ReportAsFinding);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "sql-injection");
    }

    #[test]
    fn test_cross_unit_flow_through_shared_helper() {
        let units = vec![
            unit(
                "db.rs",
                r#"
                    fn run_query(sql: String) {
                        execute_query(sql);
                    }
                "#,
            ),
            unit(
                "app.rs",
                r#"
                    fn handler() {
                        run_query(request_param("id"));
                    }
                "#,
            ),
        ];
        let result = engine().analyze_units(&units, &AtomicBool::new(false));
        let findings = emit_findings(result.findings, WeakSanitizationPolicy::ReportAsFinding);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].source_site.file, "app.rs");
        assert_eq!(findings[0].sink_site.file, "db.rs");
    }

    #[test]
    fn test_repeated_pass_is_idempotent() {
        let units = vec![unit(
            "app.rs",
            r#"
                fn handler() {
                    let id = request_param("id").replace("'", "");
                    execute_query(id);
                }
            "#,
        )];
        let e = engine();
        let first = emit_findings(
            e.analyze_units(&units, &AtomicBool::new(false)).findings,
            WeakSanitizationPolicy::ReportAsFinding,
        );
        let second = emit_findings(
            e.analyze_units(&units, &AtomicBool::new(false)).findings,
            WeakSanitizationPolicy::ReportAsFinding,
        );
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].sanitization, SanitizationStatus::WeaklySanitized);
        assert_eq!(first[0].source_site, second[0].source_site);
    }

    #[test]
    fn test_sources_pass_parses_inside_workers() {
        let sources = vec![
            (
                "db.rs".to_string(),
                "fn run_query(sql: String) { execute_query(sql); }".to_string(),
            ),
            (
                "app.rs".to_string(),
                "fn handler() { run_query(request_param(\"id\")); }".to_string(),
            ),
            ("broken.rs".to_string(), "fn broken(".to_string()),
        ];
        let result = engine().analyze_sources(&sources, &AtomicBool::new(false));
        assert_eq!(result.units_analyzed, 2);
        assert!(!result.incomplete);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::MalformedInput { .. })));
        let findings = emit_findings(result.findings, WeakSanitizationPolicy::ReportAsFinding);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "sql-injection");
    }

    #[test]
    fn test_cancelled_pass_reports_incomplete() {
        let units = vec![unit("app.rs", "fn handler() {}")];
        let result = engine().analyze_units(&units, &AtomicBool::new(true));
        assert!(result.incomplete);
        assert_eq!(result.units_analyzed, 0);
        assert!(matches!(
            result.diagnostics.as_slice(),
            [Diagnostic::Cancelled { analyzed: 0, total: 1 }]
        ));
    }

    #[test]
    fn test_exhausted_budget_reports_timeout() {
        let units = vec![
            unit("a.rs", "fn a() {}"),
            unit("b.rs", "fn b() {}"),
        ];
        let config = EngineConfig {
            time_budget_ms: Some(0),
            ..EngineConfig::default()
        };
        let e = Engine::new(RuleTable::builtin(), config);
        let result = e.analyze_units(&units, &AtomicBool::new(false));
        assert!(result.incomplete);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::AnalysisTimeout { .. })));
    }

    #[test]
    fn test_unparsable_file_becomes_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.rs");
        let bad = dir.path().join("bad.rs");
        std::fs::write(&good, "fn handler() { execute_query(request_param(\"id\")); }")
            .unwrap();
        std::fs::write(&bad, "fn broken(").unwrap();

        let result = engine().analyze_files(&[good, bad], &AtomicBool::new(false));
        assert_eq!(result.units_analyzed, 1);
        assert!(matches!(
            result.diagnostics.first(),
            Some(Diagnostic::MalformedInput { .. })
        ));
        assert_eq!(result.findings.len(), 1);
    }
}
