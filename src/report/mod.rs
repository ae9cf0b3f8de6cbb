//! # Report Generation Module
//!
//! Turns raw taint flows into a deterministic report: applies the weak
//! sanitization policy, deduplicates repeated flows, orders findings, and
//! renders terminal, Markdown, JSON, and GitHub annotation output.
//!
//! ## Key Types
//!
//! - [`Report`] - Complete analysis report
//! - [`Finding`] - Individual source-to-sink flow
//! - [`Severity`] - Severity classification for findings

mod finding;
mod formatter;

pub use finding::{Finding, SanitizationStatus, Severity};
pub use formatter::*;

use std::collections::HashSet;
use std::path::PathBuf;

use colored::*;
use serde::{Deserialize, Serialize};

use crate::config::WeakSanitizationPolicy;
use crate::error::Diagnostic;

/// Finalizes raw flows into reportable findings.
///
/// The same logical flow is often discovered more than once, for example
/// through several summary depths of a recursive callee. Findings are
/// deduplicated by source and sink site, keeping the variant with the
/// shortest call path. Weakly sanitized flows are then kept, downgraded, or
/// dropped per the configured policy, and the survivors are ordered by
/// file, source line, and sink line before identifiers are assigned.
pub fn emit_findings(
    mut raw: Vec<Finding>,
    policy: WeakSanitizationPolicy,
) -> Vec<Finding> {
    raw.sort_by_key(|f| f.path.len());
    let mut seen = HashSet::new();
    let mut findings: Vec<Finding> = raw
        .into_iter()
        .filter(|f| {
            seen.insert((
                f.source_site.file.clone(),
                f.source_site.line,
                f.source_site.column,
                f.sink_site.file.clone(),
                f.sink_site.line,
                f.sink_site.column,
            ))
        })
        .collect();

    findings.retain_mut(|f| {
        if f.sanitization != SanitizationStatus::WeaklySanitized {
            return true;
        }
        match policy {
            WeakSanitizationPolicy::ReportAsFinding => true,
            WeakSanitizationPolicy::ReportAsWarning => {
                f.severity = Severity::Low;
                true
            }
            WeakSanitizationPolicy::Suppress => false,
        }
    });

    findings.sort_by(|a, b| {
        (
            &a.source_site.file,
            a.source_site.line,
            a.sink_site.line,
            &a.rule,
        )
            .cmp(&(
                &b.source_site.file,
                b.source_site.line,
                b.sink_site.line,
                &b.rule,
            ))
    });

    for (i, finding) in findings.iter_mut().enumerate() {
        finding.id = format!("TH-{:04}", i + 1);
    }
    findings
}

/// Complete analysis report.
///
/// Contains metadata about the scan, all findings, analysis diagnostics,
/// and summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata about the scan operation.
    pub metadata: ReportMetadata,

    /// All findings from the analysis.
    pub findings: Vec<Finding>,

    /// Non-fatal conditions hit during analysis, such as truncated
    /// recursion cycles or unparsable files.
    pub diagnostics: Vec<Diagnostic>,

    /// Summary statistics by severity.
    pub summary: ReportSummary,
}

/// Metadata about the scan operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Tool version used for the scan.
    pub version: String,

    /// Timestamp when the scan was performed.
    pub timestamp: String,

    /// Path that was scanned.
    pub scanned_path: String,

    /// Number of files analyzed.
    pub files_analyzed: usize,

    /// Set when the scan stopped early on a time budget or cancellation
    /// and findings may be missing.
    pub incomplete: bool,
}

/// Summary of findings by severity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Count of critical severity findings.
    pub critical: usize,

    /// Count of high severity findings.
    pub high: usize,

    /// Count of medium severity findings.
    pub medium: usize,

    /// Count of low severity findings.
    pub low: usize,

    /// Count of informational findings.
    pub info: usize,

    /// Total count of all findings.
    pub total: usize,
}

impl Report {
    /// Creates a new report from emitted findings.
    ///
    /// Automatically calculates summary statistics from the findings.
    pub fn new(
        findings: Vec<Finding>,
        diagnostics: Vec<Diagnostic>,
        scanned_path: PathBuf,
        files_analyzed: usize,
        incomplete: bool,
    ) -> Self {
        let summary = ReportSummary::from_findings(&findings);

        let metadata = ReportMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono_lite_timestamp(),
            scanned_path: scanned_path.display().to_string(),
            files_analyzed,
            incomplete,
        };

        Self {
            metadata,
            findings,
            diagnostics,
            summary,
        }
    }

    /// Prints colorized output to the terminal.
    pub fn print_terminal(&self) {
        if self.findings.is_empty() {
            println!("\n{}", "[+] No taint flows found.".green().bold());
        } else {
            println!("\n{}", "[!] Taint Flows:".red().bold());
            println!("{}", "=".repeat(60).cyan());

            for (i, finding) in self.findings.iter().enumerate() {
                finding.print_terminal(i + 1);
            }
        }

        for diagnostic in &self.diagnostics {
            println!("{} {}", "[~]".yellow().bold(), diagnostic);
        }
        if self.metadata.incomplete {
            println!(
                "{}",
                "[~] Analysis stopped early; results are partial.".yellow().bold()
            );
        }
    }

    /// Prints summary statistics to the terminal.
    pub fn print_summary(&self) {
        println!(
            "{}",
            format!(
                "[*] Summary: {} Critical | {} High | {} Medium | {} Low | {} Info",
                self.summary.critical,
                self.summary.high,
                self.summary.medium,
                self.summary.low,
                self.summary.info
            )
            .bold()
        );

        if self.summary.total == 0 {
            println!("{}", "[+] No issues found.".green().bold());
        } else {
            let message = format!("[!] Total: {} issue(s) found", self.summary.total);
            if self.summary.critical > 0 {
                println!("{}", message.red().bold());
            } else if self.summary.high > 0 {
                println!("{}", message.yellow().bold());
            } else {
                println!("{}", message.blue().bold());
            }
        }
    }

    /// Converts the report to Markdown format.
    pub fn to_markdown(&self) -> String {
        formatter::to_markdown(self)
    }

    /// Converts the report to GitHub Actions annotations, one per line.
    pub fn to_github_annotations(&self) -> String {
        formatter::to_github_annotations(self)
    }
}

impl ReportSummary {
    /// Creates a summary from a collection of findings.
    fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = ReportSummary {
            critical: 0,
            high: 0,
            medium: 0,
            low: 0,
            info: 0,
            total: findings.len(),
        };

        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }

        summary
    }
}

/// Generates a simple timestamp without external dependencies.
fn chrono_lite_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SourceLoc;

    fn flow(src_line: usize, sink_line: usize, status: SanitizationStatus) -> Finding {
        Finding {
            id: String::new(),
            rule: "sql-injection".to_string(),
            title: "Test Finding".to_string(),
            description: "Test description".to_string(),
            severity: Severity::Critical,
            source_site: SourceLoc {
                file: "app.rs".to_string(),
                line: src_line,
                column: 4,
            },
            sink_site: SourceLoc {
                file: "app.rs".to_string(),
                line: sink_line,
                column: 8,
            },
            path: Vec::new(),
            sanitization: status,
            conservative: false,
            cwe: Some("CWE-89".to_string()),
            code_snippet: None,
        }
    }

    #[test]
    fn test_report_creation() {
        let findings = vec![flow(3, 9, SanitizationStatus::NotSanitized)];
        let report = Report::new(findings, Vec::new(), PathBuf::from("./test"), 1, false);

        assert_eq!(report.summary.critical, 1);
        assert_eq!(report.summary.total, 1);
        assert!(!report.metadata.incomplete);
    }

    #[test]
    fn test_emit_dedups_by_source_and_sink() {
        let mut second = flow(3, 9, SanitizationStatus::NotSanitized);
        second.path = vec![SourceLoc {
            file: "app.rs".to_string(),
            line: 5,
            column: 4,
        }];
        let findings = emit_findings(
            vec![second, flow(3, 9, SanitizationStatus::NotSanitized)],
            WeakSanitizationPolicy::ReportAsFinding,
        );
        assert_eq!(findings.len(), 1);
        // The shorter path wins the dedup.
        assert!(findings[0].path.is_empty());
        assert_eq!(findings[0].id, "TH-0001");
    }

    #[test]
    fn test_emit_orders_by_file_then_lines() {
        let findings = emit_findings(
            vec![
                flow(10, 12, SanitizationStatus::NotSanitized),
                flow(3, 9, SanitizationStatus::NotSanitized),
            ],
            WeakSanitizationPolicy::ReportAsFinding,
        );
        assert_eq!(findings[0].source_site.line, 3);
        assert_eq!(findings[1].source_site.line, 10);
        assert_eq!(findings[1].id, "TH-0002");
    }

    #[test]
    fn test_policy_downgrades_weakly_sanitized() {
        let findings = emit_findings(
            vec![flow(3, 9, SanitizationStatus::WeaklySanitized)],
            WeakSanitizationPolicy::ReportAsWarning,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[test]
    fn test_policy_suppresses_weakly_sanitized() {
        let findings = emit_findings(
            vec![
                flow(3, 9, SanitizationStatus::WeaklySanitized),
                flow(20, 22, SanitizationStatus::NotSanitized),
            ],
            WeakSanitizationPolicy::Suppress,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].sanitization, SanitizationStatus::NotSanitized);
    }
}
