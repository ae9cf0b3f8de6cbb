//! Markdown and CI output rendering for [`Report`].

use super::{Report, SanitizationStatus, Severity};

/// Renders the full report as a Markdown document.
pub fn to_markdown(report: &Report) -> String {
    let mut out = String::new();

    out.push_str("# Taint Analysis Report\n\n");
    out.push_str(&format!(
        "- **Version:** {}\n- **Scanned path:** `{}`\n- **Files analyzed:** {}\n\n",
        report.metadata.version, report.metadata.scanned_path, report.metadata.files_analyzed
    ));

    out.push_str("## Summary\n\n");
    out.push_str("| Severity | Count |\n|----------|-------|\n");
    out.push_str(&format!("| Critical | {} |\n", report.summary.critical));
    out.push_str(&format!("| High | {} |\n", report.summary.high));
    out.push_str(&format!("| Medium | {} |\n", report.summary.medium));
    out.push_str(&format!("| Low | {} |\n", report.summary.low));
    out.push_str(&format!("| Info | {} |\n\n", report.summary.info));

    if report.metadata.incomplete {
        out.push_str("> **Note:** analysis stopped early; results are partial.\n\n");
    }

    if report.findings.is_empty() {
        out.push_str("No taint flows found.\n");
    } else {
        out.push_str("## Findings\n\n");
        for finding in &report.findings {
            out.push_str(&format!(
                "### {} {} ({})\n\n",
                finding.id, finding.title, finding.rule
            ));
            out.push_str(finding.severity.markdown_badge());
            out.push('\n');
            out.push_str(&format!("\n- **Source:** `{}`\n", finding.source_site));
            out.push_str(&format!("- **Sink:** `{}`\n", finding.sink_site));
            for (hop, site) in finding.path.iter().enumerate() {
                out.push_str(&format!("- **Via call {}:** `{}`\n", hop + 1, site));
            }
            if finding.sanitization == SanitizationStatus::WeaklySanitized {
                out.push_str("- **Sanitization:** present but ineffective\n");
            }
            if let Some(ref cwe) = finding.cwe {
                out.push_str(&format!("- **Reference:** {}\n", cwe));
            }
            out.push_str(&format!("\n{}\n", finding.description));
            if let Some(ref snippet) = finding.code_snippet {
                out.push_str(&format!("\n```rust\n{}\n```\n", snippet));
            }
            out.push('\n');
        }
    }

    if !report.diagnostics.is_empty() {
        out.push_str("## Diagnostics\n\n");
        for diagnostic in &report.diagnostics {
            out.push_str(&format!("- {}\n", diagnostic));
        }
    }

    out
}

/// Renders findings as GitHub Actions workflow annotations, one per line.
///
/// Critical and High findings become `error` annotations, the rest
/// `warning`, so a CI job fails loudly on the flows that matter.
pub fn to_github_annotations(report: &Report) -> String {
    let mut out = String::new();
    for finding in &report.findings {
        let level = if finding.severity >= Severity::High {
            "error"
        } else {
            "warning"
        };
        out.push_str(&format!(
            "::{} file={},line={},col={}::{} [{}] {} (source at {})\n",
            level,
            finding.sink_site.file,
            finding.sink_site.line,
            finding.sink_site.column,
            finding.id,
            finding.rule,
            finding.title,
            finding.source_site,
        ));
    }
    for diagnostic in &report.diagnostics {
        out.push_str(&format!("::notice ::{}\n", diagnostic));
    }
    out
}
