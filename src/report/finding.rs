//! # Finding and Severity Definitions
//!
//! Data structures for reporting taint flows, plus their terminal
//! rendering.

use colored::*;
use serde::{Deserialize, Serialize};

use crate::graph::SourceLoc;

/// Severity level classification for findings.
///
/// Ordered from lowest to highest severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational finding, no direct security impact.
    Info = 0,

    /// Low severity, minimal security impact.
    Low = 1,

    /// Medium severity, moderate security impact.
    Medium = 2,

    /// High severity, significant security impact.
    High = 3,

    /// Critical severity, severe security impact.
    Critical = 4,
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl Severity {
    /// Returns a colored label for terminal output.
    pub fn colored_label(&self) -> ColoredString {
        match self {
            Severity::Critical => "CRITICAL".white().on_red().bold(),
            Severity::High => "HIGH".black().on_yellow().bold(),
            Severity::Medium => "MEDIUM".white().on_bright_blue().bold(),
            Severity::Low => "LOW".black().on_white().bold(),
            Severity::Info => "INFO".black().on_bright_white(),
        }
    }

    /// Returns a text indicator for the severity.
    pub fn indicator(&self) -> &'static str {
        match self {
            Severity::Critical => "[!!]",
            Severity::High => "[!]",
            Severity::Medium => "[~]",
            Severity::Low => "[-]",
            Severity::Info => "[i]",
        }
    }

    /// Returns a Markdown badge for the severity.
    pub fn markdown_badge(&self) -> &'static str {
        match self {
            Severity::Critical => {
                "![Critical](https://img.shields.io/badge/severity-CRITICAL-red)"
            }
            Severity::High => "![High](https://img.shields.io/badge/severity-HIGH-orange)",
            Severity::Medium => "![Medium](https://img.shields.io/badge/severity-MEDIUM-yellow)",
            Severity::Low => "![Low](https://img.shields.io/badge/severity-LOW-blue)",
            Severity::Info => "![Info](https://img.shields.io/badge/severity-INFO-lightgrey)",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

/// Whether any sanitizer touched the flow before the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SanitizationStatus {
    /// The value reaches the sink untouched by any sanitizer.
    NotSanitized,

    /// A sanitizer ran on the value but is ineffective for the value's
    /// origin class, such as a quote-stripping replace before a SQL query.
    WeaklySanitized,
}

impl std::fmt::Display for SanitizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanitizationStatus::NotSanitized => write!(f, "not sanitized"),
            SanitizationStatus::WeaklySanitized => write!(f, "weakly sanitized"),
        }
    }
}

/// A complete source-to-sink taint flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Unique identifier for this finding instance.
    pub id: String,

    /// Name of the sink rule that matched (e.g., "sql-injection").
    pub rule: String,

    /// Short, descriptive title of the finding.
    pub title: String,

    /// Detailed description of the flow.
    pub description: String,

    /// Severity classification.
    pub severity: Severity,

    /// Where the untrusted data enters the program.
    pub source_site: SourceLoc,

    /// Where the untrusted data is consumed.
    pub sink_site: SourceLoc,

    /// Call sites crossed between source and sink, in order. Empty for
    /// flows contained in a single function.
    pub path: Vec<SourceLoc>,

    /// Sanitization observed along the flow.
    pub sanitization: SanitizationStatus,

    /// Set when the flow crosses a recursion cycle whose analysis was
    /// truncated.
    pub conservative: bool,

    /// CWE (Common Weakness Enumeration) identifier if applicable.
    pub cwe: Option<String>,

    /// Source line of the sink call, when available.
    pub code_snippet: Option<String>,
}

impl Finding {
    /// Prints the finding to terminal with color formatting.
    pub fn print_terminal(&self, index: usize) {
        println!();
        println!(
            "{} {} [{}] {}",
            format!("#{}", index).cyan().bold(),
            self.severity.colored_label(),
            self.rule.yellow(),
            self.title.white().bold()
        );

        println!(
            "   {} {}",
            "Source:".dimmed(),
            self.source_site.to_string().blue()
        );
        println!(
            "   {} {}",
            "Sink:  ".dimmed(),
            self.sink_site.to_string().blue()
        );
        for (hop, site) in self.path.iter().enumerate() {
            println!(
                "   {} {}",
                format!("via #{}:", hop + 1).dimmed(),
                site.to_string().cyan()
            );
        }

        for line in self.description.lines() {
            println!("   {}", line.dimmed());
        }

        if self.sanitization == SanitizationStatus::WeaklySanitized {
            println!("   {}", "Sanitization along this flow is ineffective.".yellow());
        }

        if let Some(ref snippet) = self.code_snippet {
            println!("\n   {}", "Code:".yellow());
            for line in snippet.lines() {
                println!("   {}", line.bright_white());
            }
        }

        if let Some(ref cwe) = self.cwe {
            println!("   {} {}", "Reference:".dimmed(), cwe.blue());
        }

        println!("{}", "-".repeat(60).dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("unknown".parse::<Severity>().is_err());
    }

    #[test]
    fn test_sanitization_serializes_kebab_case() {
        let json = serde_json::to_string(&SanitizationStatus::WeaklySanitized).unwrap();
        assert_eq!(json, "\"weakly-sanitized\"");
    }
}
