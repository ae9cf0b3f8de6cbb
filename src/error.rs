//! # Error Taxonomy
//!
//! Error and diagnostic types for the analysis engine.
//!
//! Everything here is recoverable at the pass level: one compilation unit
//! failing never aborts the analysis of the others. Only [`EngineError`]
//! variants are surfaced to the caller as hard failures (bad rules file,
//! unreadable input); everything that happens *during* a pass is carried as
//! a [`Diagnostic`] on the pass result instead.

use thiserror::Error;

/// Hard errors raised while setting up or driving an analysis pass.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The compilation unit could not be parsed into an AST.
    #[error("failed to parse {unit}: {message}")]
    MalformedInput { unit: String, message: String },

    /// A rules file could not be read or deserialized.
    #[error("failed to load rule table from {path}: {message}")]
    RuleLoad { path: String, message: String },

    /// A configuration file could not be deserialized.
    #[error("failed to load configuration from {path}: {message}")]
    ConfigLoad { path: String, message: String },

    /// A source file could not be read from disk.
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pass-level diagnostics attached to a [`PassResult`](crate::engine::PassResult).
///
/// `UnresolvedSymbol` is deliberately absent: unresolved call targets are
/// logged at debug level and treated as neutral, they are not worth a
/// per-pass diagnostic.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// A unit was skipped because its AST could not be produced.
    #[error("unit {unit} failed analysis: {message}")]
    MalformedInput { unit: String, message: String },

    /// The fixed point over a recursive call-graph component did not
    /// stabilize within the iteration bound. Summaries for the named
    /// functions were frozen at their last value and treated conservatively.
    #[error("taint summaries for recursive component [{}] did not stabilize within {bound} iterations", component.join(", "))]
    CyclicPropagationOverflow { component: Vec<String>, bound: usize },

    /// The global time budget ran out before all units were analyzed.
    /// Results are partial.
    #[error("analysis time budget exceeded after {analyzed} of {total} units")]
    AnalysisTimeout { analyzed: usize, total: usize },

    /// The pass was cancelled cooperatively before all units were analyzed.
    #[error("analysis cancelled after {analyzed} of {total} units")]
    Cancelled { analyzed: usize, total: usize },
}
