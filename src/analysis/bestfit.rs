//! # Best-Fit Sink Matcher
//!
//! A statement can contain several syntactically plausible sink calls
//! reachable from the same tainted value (nested calls, chained builders).
//! Reporting all of them double-counts one logical injection; picking one
//! per closure would let a closure's local context override a decision that
//! is scoped to the enclosing function. The matcher therefore selects
//! exactly one candidate per ambiguous statement and memoizes the choice
//! against the enclosing named function's identity.
//!
//! Selection: the innermost candidate call, i.e. the one whose sensitive
//! argument is syntactically closest to the tainted value's use (fewest
//! intervening expression nodes); ties break on earliest source position.
//!
//! The cache is populated at most once per statement, the first time any
//! part of the function — its own body or any nested closure — asks for that
//! statement. Entries are immutable for the remainder of the pass, and
//! `computed` counts actual resolver executions so tests can assert the
//! exactly-once contract.

use std::collections::HashMap;

use crate::graph::{NodeId, SourceLoc};
use crate::report::Severity;

use super::taint::{SinkCandidate, StmtId, TaintTag};

/// The single sink chosen for an ambiguous statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSink {
    pub site: SourceLoc,
    pub rule_name: String,
    pub severity: Severity,
    pub cwe: Option<String>,
    pub tags: Vec<TaintTag>,
    pub snippet: String,
    /// The named function the decision is scoped to.
    pub decided_in: NodeId,
}

/// Per-unit memo of best-fit decisions, keyed by enclosing function and
/// statement identity. Written only by the worker analyzing the unit.
#[derive(Debug, Default)]
pub struct BestFitCache {
    entries: HashMap<StmtId, ResolvedSink>,
    /// Number of times the resolution algorithm actually ran.
    computed: usize,
}

impl BestFitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a statement's candidates, running the selection algorithm
    /// only on the first request for this statement. Later requests — from
    /// the function's own body or from any nested closure — return the
    /// cached decision unchanged, even if they present different candidates.
    pub fn resolve(&mut self, stmt: StmtId, candidates: &[SinkCandidate]) -> Option<&ResolvedSink> {
        if candidates.is_empty() {
            return self.entries.get(&stmt);
        }
        if !self.entries.contains_key(&stmt) {
            let chosen = select_best_fit(candidates)?;
            self.entries.insert(
                stmt,
                ResolvedSink {
                    site: chosen.site.clone(),
                    rule_name: chosen.rule_name.clone(),
                    severity: chosen.severity,
                    cwe: chosen.cwe.clone(),
                    tags: chosen.tags.clone(),
                    snippet: chosen.snippet.clone(),
                    decided_in: stmt.function,
                },
            );
            self.computed += 1;
        }
        self.entries.get(&stmt)
    }

    /// Cached decision for a statement, if one was ever made.
    pub fn get(&self, stmt: &StmtId) -> Option<&ResolvedSink> {
        self.entries.get(stmt)
    }

    /// How many statements actually ran the selection algorithm.
    pub fn computations(&self) -> usize {
        self.computed
    }

    pub fn resolved(&self) -> impl Iterator<Item = (&StmtId, &ResolvedSink)> {
        self.entries.iter()
    }
}

/// Innermost-wins selection: minimal distance between the candidate call and
/// the closest tainted use in its sensitive arguments, then earliest source
/// position.
fn select_best_fit(candidates: &[SinkCandidate]) -> Option<&SinkCandidate> {
    candidates
        .iter()
        .min_by_key(|c| (c.distance, c.site.line, c.site.column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::OriginClass;
    use crate::analysis::taint::TaintOrigin;

    fn candidate(distance: usize, line: usize, column: usize, rule: &str) -> SinkCandidate {
        SinkCandidate {
            site: SourceLoc {
                file: "bestfit.rs".to_string(),
                line,
                column,
            },
            rule_name: rule.to_string(),
            severity: Severity::Critical,
            cwe: Some("CWE-89".to_string()),
            tags: vec![TaintTag {
                origin: TaintOrigin::Call {
                    site: SourceLoc {
                        file: "bestfit.rs".to_string(),
                        line: 1,
                        column: 0,
                    },
                    class: OriginClass::HttpRequest,
                },
                weakly_sanitized: false,
            }],
            distance,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_innermost_candidate_wins() {
        let mut cache = BestFitCache::new();
        let stmt = StmtId {
            function: 0,
            index: 0,
            inner: None,
        };
        let outer = candidate(3, 10, 4, "sql-injection");
        let inner = candidate(1, 10, 20, "sql-injection");
        let chosen = cache.resolve(stmt, &[outer, inner.clone()]).unwrap();
        assert_eq!(chosen.site, inner.site);
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_tie_breaks_on_earliest_position() {
        let mut cache = BestFitCache::new();
        let stmt = StmtId {
            function: 0,
            index: 0,
            inner: None,
        };
        let late = candidate(2, 12, 8, "sql-injection");
        let early = candidate(2, 11, 2, "sql-injection");
        let chosen = cache.resolve(stmt, &[late, early.clone()]).unwrap();
        assert_eq!(chosen.site, early.site);
    }

    #[test]
    fn test_resolution_runs_once_per_statement() {
        let mut cache = BestFitCache::new();
        let stmt = StmtId {
            function: 7,
            index: 3,
            inner: None,
        };
        let first = candidate(0, 5, 1, "sql-injection");
        let original = cache.resolve(stmt, &[first]).unwrap().clone();

        // A second request for the same statement presents a closer
        // candidate, as a closure re-walk might. The cached decision must
        // come back unchanged and the resolver must not run again.
        let closer = candidate(0, 9, 0, "sql-injection");
        let again = cache.resolve(stmt, &[closer]).unwrap().clone();
        assert_eq!(again, original);
        assert_eq!(cache.computations(), 1);
        assert_eq!(again.decided_in, 7);
    }

    #[test]
    fn test_distinct_statements_get_distinct_entries() {
        let mut cache = BestFitCache::new();
        let a = StmtId {
            function: 1,
            index: 0,
            inner: None,
        };
        let b = StmtId {
            function: 1,
            index: 4,
            inner: None,
        };
        cache.resolve(a, &[candidate(0, 2, 0, "sql-injection")]);
        cache.resolve(b, &[candidate(0, 6, 0, "command-injection")]);
        assert_eq!(cache.computations(), 2);
        assert_eq!(cache.get(&a).unwrap().rule_name, "sql-injection");
        assert_eq!(cache.get(&b).unwrap().rule_name, "command-injection");
    }

    #[test]
    fn test_closure_local_slots_are_distinct_statements() {
        let mut cache = BestFitCache::new();
        let first = StmtId {
            function: 2,
            index: 1,
            inner: Some(0),
        };
        let second = StmtId {
            function: 2,
            index: 1,
            inner: Some(1),
        };
        cache.resolve(first, &[candidate(0, 4, 8, "sql-injection")]);
        cache.resolve(second, &[candidate(0, 5, 8, "command-injection")]);
        assert_eq!(cache.computations(), 2);
        assert_eq!(cache.get(&first).unwrap().rule_name, "sql-injection");
        assert_eq!(cache.get(&second).unwrap().rule_name, "command-injection");
    }
}
