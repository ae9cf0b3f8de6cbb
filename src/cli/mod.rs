//! # CLI Module
//!
//! Command-line interface for TaintHound, built with the `clap` derive
//! macros for declarative argument parsing.
//!
//! ## Commands
//!
//! - `scan` - Analyze Rust sources for tainted source-to-sink flows
//! - `rules` - Display the active rule table
//! - `version` - Show version information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TaintHound command-line interface.
///
/// A static taint analysis scanner. Tracks untrusted data from declared
/// sources to sensitive sinks across function and closure boundaries and
/// reports injection-style flows.
#[derive(Parser, Debug)]
#[command(name = "tainthound")]
#[command(version)]
#[command(about = "Static taint analysis scanner for injection-style data flows")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the TaintHound CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan Rust sources for tainted source-to-sink flows.
    ///
    /// Analyzes each file's call graph, tracks taint through local bindings
    /// and nested closures, and propagates summaries across function calls,
    /// including calls into other scanned files.
    Scan {
        /// Path to the file or directory to scan.
        ///
        /// If a directory is specified, all `.rs` files within it will be analyzed.
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Scan directories recursively.
        #[arg(short, long, default_value_t = true)]
        recursive: bool,

        /// Output format for the report.
        ///
        /// Supported formats:
        /// - `terminal`: Colorized console output (default)
        /// - `json`: Machine-readable JSON format
        /// - `markdown`: Human-readable Markdown report
        /// - `github`: GitHub Actions workflow annotations
        #[arg(short, long, default_value = "terminal")]
        format: String,

        /// Output directory for generated reports.
        ///
        /// If not specified, reports are printed to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum severity level to include in results.
        ///
        /// Valid values: critical, high, medium, low, info
        #[arg(short, long)]
        severity: Option<String>,

        /// Path to a JSON rule table replacing the built-in rules.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Path to a JSON engine configuration file.
        ///
        /// Recognized keys: `max_call_depth`, `scc_iteration_bound`,
        /// `weak_sanitization_policy`, `time_budget_ms`. Missing keys take
        /// their defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How to report flows whose only sanitization is ineffective.
        ///
        /// Valid values: report-as-finding, report-as-warning, suppress.
        /// Overrides the configuration file.
        #[arg(long, value_name = "POLICY")]
        weak_sanitization: Option<String>,

        /// Maximum call hops a flow may cross. Overrides the configuration
        /// file.
        #[arg(long)]
        max_call_depth: Option<usize>,

        /// Abort the scan after this many milliseconds and report partial
        /// results.
        #[arg(long)]
        time_budget_ms: Option<u64>,
    },

    /// List the active source, sink, and sanitizer rules.
    Rules {
        /// Path to a JSON rule table replacing the built-in rules.
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Print version information.
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify that the CLI definition is valid.
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
