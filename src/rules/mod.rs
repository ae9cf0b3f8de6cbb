//! # Symbol & Rule Table
//!
//! Static mapping from function/method names to taint roles: sources of
//! untrusted data, sinks where tainted data becomes a vulnerability,
//! sanitizers that may remove taint, and explicitly neutral symbols.
//!
//! The table is built once before a pass (built-in defaults or a JSON file)
//! and never mutated during analysis, so it is shared read-only across
//! parallel workers.
//!
//! ## Sanitizer effectiveness
//!
//! A sanitizer rule declares the origin classes it is *effective* for. A
//! registered sanitizer applied to taint of any other class does not clean
//! the value; the flow is kept and marked weakly sanitized. Naive character
//! stripping such as `replace("'", "")` is the canonical example: it is
//! registered, bypassable, and effective for nothing.

use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::EngineError;
use crate::report::Severity;

/// Role a symbol plays in taint tracking, resolved once at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolRole {
    Source,
    Sink,
    Sanitizer,
    Neutral,
    Unresolved,
}

/// Class of untrusted origin a source produces. Sanitizer effectiveness is
/// declared against these classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginClass {
    /// HTTP request data: parameters, headers, bodies.
    HttpRequest,
    /// Process environment and CLI arguments.
    Environment,
    /// File contents read at runtime.
    FileContent,
    /// Unclassified untrusted data, including taint that entered through a
    /// function parameter whose real origin is unknown intraprocedurally.
    Generic,
}

impl fmt::Display for OriginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginClass::HttpRequest => write!(f, "http-request"),
            OriginClass::Environment => write!(f, "environment"),
            OriginClass::FileContent => write!(f, "file-content"),
            OriginClass::Generic => write!(f, "generic"),
        }
    }
}

/// Name pattern a rule matches against call targets.
///
/// A plain identifier (or `path::to::ident`) matches exactly, against either
/// the full call path or its last segment. Anything else is compiled as a
/// regular expression and matched against the full call path.
#[derive(Debug, Clone)]
pub struct SymbolPattern {
    raw: String,
    regex: Option<Regex>,
}

impl SymbolPattern {
    /// Builds a pattern from its textual form.
    pub fn new(raw: &str) -> Result<Self, regex::Error> {
        let is_plain = raw
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':');
        let regex = if is_plain { None } else { Some(Regex::new(raw)?) };
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    /// Whether this pattern matches a resolved call name.
    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(name),
            None => {
                name == self.raw || name.rsplit("::").next() == Some(self.raw.as_str())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl<'de> Deserialize<'de> for SymbolPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SymbolPattern::new(&raw).map_err(de::Error::custom)
    }
}

/// Declares an API whose return value is untrusted.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRule {
    pub pattern: SymbolPattern,
    pub origin: OriginClass,
}

/// Declares an API whose sensitive arguments must not receive tainted data.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkRule {
    pub pattern: SymbolPattern,
    /// Rule name used in findings, e.g. "sql-injection".
    pub name: String,
    /// Argument positions that are sink-sensitive (0-based, receiver
    /// excluded for method calls).
    pub sensitive_args: Vec<usize>,
    pub severity: Severity,
    #[serde(default)]
    pub cwe: Option<String>,
}

/// Declares an API intended to remove taint, with the origin classes it
/// actually neutralizes.
#[derive(Debug, Clone, Deserialize)]
pub struct SanitizerRule {
    pub pattern: SymbolPattern,
    /// Origin classes this sanitizer is known-effective for. Empty means
    /// the transformation is registered but never trusted.
    #[serde(default)]
    pub effective_for: Vec<OriginClass>,
}

impl SanitizerRule {
    pub fn is_effective_for(&self, class: OriginClass) -> bool {
        self.effective_for.contains(&class)
    }
}

/// Result of resolving a call target against the table.
#[derive(Debug, Clone, Copy)]
pub enum RuleMatch<'a> {
    Source(&'a SourceRule),
    Sink(&'a SinkRule),
    Sanitizer(&'a SanitizerRule),
    Neutral,
    Unresolved,
}

impl RuleMatch<'_> {
    pub fn role(&self) -> SymbolRole {
        match self {
            RuleMatch::Source(_) => SymbolRole::Source,
            RuleMatch::Sink(_) => SymbolRole::Sink,
            RuleMatch::Sanitizer(_) => SymbolRole::Sanitizer,
            RuleMatch::Neutral => SymbolRole::Neutral,
            RuleMatch::Unresolved => SymbolRole::Unresolved,
        }
    }
}

/// The complete source/sink/sanitizer declaration table.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RuleTable {
    pub sources: Vec<SourceRule>,
    pub sinks: Vec<SinkRule>,
    pub sanitizers: Vec<SanitizerRule>,
    pub neutral: Vec<SymbolPattern>,
}

impl RuleTable {
    /// The built-in table covering common injection-prone APIs.
    pub fn builtin() -> Self {
        let source = |pattern: &str, origin| SourceRule {
            pattern: SymbolPattern::new(pattern).expect("builtin pattern"),
            origin,
        };
        let sink = |pattern: &str, name: &str, args: &[usize], severity, cwe: &str| SinkRule {
            pattern: SymbolPattern::new(pattern).expect("builtin pattern"),
            name: name.to_string(),
            sensitive_args: args.to_vec(),
            severity,
            cwe: Some(cwe.to_string()),
        };
        let sanitizer = |pattern: &str, effective_for: &[OriginClass]| SanitizerRule {
            pattern: SymbolPattern::new(pattern).expect("builtin pattern"),
            effective_for: effective_for.to_vec(),
        };

        Self {
            sources: vec![
                source("request_param", OriginClass::HttpRequest),
                source("get_parameter", OriginClass::HttpRequest),
                source("query_param", OriginClass::HttpRequest),
                source("read_header", OriginClass::HttpRequest),
                source("env_var", OriginClass::Environment),
                source("read_env", OriginClass::Environment),
                source("read_file_string", OriginClass::FileContent),
            ],
            sinks: vec![
                sink(
                    "prepare_statement",
                    "sql-injection",
                    &[0],
                    Severity::Critical,
                    "CWE-89",
                ),
                sink(
                    "execute_query",
                    "sql-injection",
                    &[0],
                    Severity::Critical,
                    "CWE-89",
                ),
                sink("raw_sql", "sql-injection", &[0], Severity::Critical, "CWE-89"),
                sink(
                    "run_shell",
                    "command-injection",
                    &[0],
                    Severity::Critical,
                    "CWE-78",
                ),
                sink(
                    "spawn_command",
                    "command-injection",
                    &[0],
                    Severity::High,
                    "CWE-78",
                ),
            ],
            sanitizers: vec![
                // Bypassable character stripping: registered, trusted for nothing.
                sanitizer("replace", &[]),
                sanitizer("replace_all", &[]),
                sanitizer("trim_quotes", &[]),
                sanitizer(
                    "sql_escape",
                    &[
                        OriginClass::HttpRequest,
                        OriginClass::Environment,
                        OriginClass::FileContent,
                        OriginClass::Generic,
                    ],
                ),
                sanitizer(
                    "validate_numeric",
                    &[
                        OriginClass::HttpRequest,
                        OriginClass::Environment,
                        OriginClass::FileContent,
                        OriginClass::Generic,
                    ],
                ),
            ],
            neutral: vec![
                SymbolPattern::new("log_request").expect("builtin pattern"),
                SymbolPattern::new("to_string").expect("builtin pattern"),
                SymbolPattern::new("clone").expect("builtin pattern"),
            ],
        }
    }

    /// Loads a table from a JSON rules file.
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| EngineError::RuleLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Resolves a call name to its role. Sources win over sinks, sinks over
    /// sanitizers; anything not declared is `Unresolved` and treated as
    /// neutral by the tracker.
    pub fn resolve(&self, name: &str) -> RuleMatch<'_> {
        if let Some(rule) = self.sources.iter().find(|r| r.pattern.matches(name)) {
            return RuleMatch::Source(rule);
        }
        if let Some(rule) = self.sinks.iter().find(|r| r.pattern.matches(name)) {
            return RuleMatch::Sink(rule);
        }
        if let Some(rule) = self.sanitizers.iter().find(|r| r.pattern.matches(name)) {
            return RuleMatch::Sanitizer(rule);
        }
        if self.neutral.iter().any(|p| p.matches(name)) {
            return RuleMatch::Neutral;
        }
        RuleMatch::Unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_pattern_matches_last_segment() {
        let p = SymbolPattern::new("prepare_statement").unwrap();
        assert!(p.matches("prepare_statement"));
        assert!(p.matches("Connection::prepare_statement"));
        assert!(!p.matches("prepare"));
    }

    #[test]
    fn test_regex_pattern() {
        let p = SymbolPattern::new(r"^db::.*_query$").unwrap();
        assert!(p.matches("db::run_query"));
        assert!(!p.matches("run_query"));
    }

    #[test]
    fn test_builtin_resolution() {
        let table = RuleTable::builtin();
        assert_eq!(table.resolve("request_param").role(), SymbolRole::Source);
        assert_eq!(table.resolve("prepare_statement").role(), SymbolRole::Sink);
        assert_eq!(table.resolve("replace").role(), SymbolRole::Sanitizer);
        assert_eq!(table.resolve("log_request").role(), SymbolRole::Neutral);
        assert_eq!(table.resolve("totally_unknown").role(), SymbolRole::Unresolved);
    }

    #[test]
    fn test_replace_is_never_effective() {
        let table = RuleTable::builtin();
        match table.resolve("replace") {
            RuleMatch::Sanitizer(rule) => {
                assert!(!rule.is_effective_for(OriginClass::HttpRequest));
                assert!(!rule.is_effective_for(OriginClass::Generic));
            }
            other => panic!("expected sanitizer, got {:?}", other.role()),
        }
    }

    #[test]
    fn test_table_from_json() {
        let json = r#"{
            "sources": [{ "pattern": "fetch_input", "origin": "http-request" }],
            "sinks": [{
                "pattern": "exec_raw",
                "name": "sql-injection",
                "sensitive_args": [0],
                "severity": "critical",
                "cwe": "CWE-89"
            }],
            "sanitizers": [{ "pattern": "strip_quotes" }]
        }"#;
        let table: RuleTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.resolve("fetch_input").role(), SymbolRole::Source);
        assert_eq!(table.resolve("exec_raw").role(), SymbolRole::Sink);
        assert_eq!(table.resolve("strip_quotes").role(), SymbolRole::Sanitizer);
    }
}
