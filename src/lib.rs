//! # TaintHound Library
//!
//! Static taint analysis for Rust sources: tracks untrusted data from
//! declared sources to sensitive sinks across function calls and nested
//! closures, and reports injection-style flows.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions and argument parsing
//! - [`rules`] - Source, sink, and sanitizer declarations
//! - [`parser`] - AST parsing of compilation units
//! - [`graph`] - Per-unit call graph with closure enclosure
//! - [`analysis`] - Taint tracking, best-fit sink matching, propagation
//! - [`engine`] - Parallel pass driver over many units
//! - [`report`] - Finding emission and rendering in multiple formats
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//! use tainthound::{Engine, EngineConfig, RuleTable, WeakSanitizationPolicy};
//! use tainthound::report::emit_findings;
//!
//! let engine = Engine::new(RuleTable::builtin(), EngineConfig::default());
//! let result = engine.analyze_files(&["src/handler.rs"], &AtomicBool::new(false));
//! let findings = emit_findings(result.findings, WeakSanitizationPolicy::ReportAsFinding);
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod parser;
pub mod report;
pub mod rules;

pub use cli::Cli;
pub use config::{EngineConfig, WeakSanitizationPolicy};
pub use engine::{Engine, PassResult};
pub use error::{Diagnostic, EngineError};
pub use parser::CompilationUnit;
pub use report::{Finding, Report, Severity};
pub use rules::RuleTable;
