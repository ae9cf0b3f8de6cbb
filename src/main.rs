//! # TaintHound CLI Entry Point
//!
//! Main entry point for the TaintHound command-line taint analysis scanner.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::Parser;
use colored::*;

use tainthound::cli::{Cli, Commands};
use tainthound::config::EngineConfig;
use tainthound::engine::Engine;
use tainthound::report::{emit_findings, Report, Severity};
use tainthound::rules::RuleTable;
use tainthound::Diagnostic;

/// ASCII art banner displayed at startup.
const BANNER: &str = r#"
 _____     _       _   _   _                       _
|_   _|_ _(_)_ __ | |_| | | | ___  _   _ _ __   __| |
  | |/ _` | | '_ \| __| |_| |/ _ \| | | | '_ \ / _` |
  | | (_| | | | | | |_|  _  | (_) | |_| | | | | (_| |
  |_|\__,_|_|_| |_|\__|_| |_|\___/ \__,_|_| |_|\__,_|

            Static Taint Analysis Scanner
"#;

/// Application entry point.
///
/// Initializes the logging system, displays the banner, parses command-line
/// arguments, and dispatches to the appropriate command handler.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("{}", BANNER.cyan().bold());

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            recursive,
            format,
            output,
            severity,
            rules,
            config,
            weak_sanitization,
            max_call_depth,
            time_budget_ms,
        } => {
            let mut engine_config = match config {
                Some(ref path) => EngineConfig::from_json_file(path)?,
                None => EngineConfig::default(),
            };
            if let Some(policy) = weak_sanitization {
                engine_config.weak_sanitization_policy =
                    policy.parse().map_err(anyhow::Error::msg)?;
            }
            if let Some(depth) = max_call_depth {
                engine_config.max_call_depth = depth;
            }
            if let Some(budget) = time_budget_ms {
                engine_config.time_budget_ms = Some(budget);
            }
            let min_severity = severity
                .map(|s| s.parse::<Severity>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let rule_table = load_rules(rules)?;
            run_scan(path, recursive, format, output, min_severity, rule_table, engine_config)?;
        }
        Commands::Rules { rules } => {
            list_rules(&load_rules(rules)?);
        }
        Commands::Version => {
            println!(
                "{} {}",
                "TaintHound version:".green(),
                env!("CARGO_PKG_VERSION").yellow()
            );
        }
    }

    Ok(())
}

fn load_rules(path: Option<PathBuf>) -> Result<RuleTable> {
    Ok(match path {
        Some(ref p) => RuleTable::from_json_file(p)?,
        None => RuleTable::builtin(),
    })
}

/// Executes the scan operation.
///
/// Collects Rust source files from the given path, runs the analysis engine
/// over them, and renders the report in the requested format.
fn run_scan(
    path: PathBuf,
    recursive: bool,
    format: String,
    output: Option<PathBuf>,
    min_severity: Option<Severity>,
    rules: RuleTable,
    config: EngineConfig,
) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    println!(
        "{} {}",
        "[*] Scanning:".green().bold(),
        path.display().to_string().yellow()
    );

    let files = if path.is_file() {
        vec![path.clone()]
    } else {
        collect_rust_files(&path, recursive)?
    };

    if files.is_empty() {
        println!("{}", "[!] No Rust source files found.".yellow());
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut sources = Vec::new();
    let mut diagnostics = Vec::new();
    for file in &files {
        pb.set_message(format!(
            "Reading {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        ));
        match std::fs::read_to_string(file) {
            Ok(text) => sources.push((file.display().to_string(), text)),
            Err(e) => {
                log::warn!("failed to read {}: {}", file.display(), e);
                diagnostics.push(Diagnostic::MalformedInput {
                    unit: file.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
        pb.inc(1);
    }
    pb.set_message("analyzing");

    let engine = Engine::new(rules, config.clone());
    let cancel = AtomicBool::new(false);
    let result = engine.analyze_sources(&sources, &cancel);
    pb.finish_and_clear();
    diagnostics.extend(result.diagnostics);

    let mut findings = emit_findings(result.findings, config.weak_sanitization_policy);
    if let Some(min) = min_severity {
        findings.retain(|f| f.severity >= min);
    }

    let report = Report::new(
        findings,
        diagnostics,
        path.clone(),
        result.units_analyzed,
        result.incomplete,
    );

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "markdown" => {
            let md = report.to_markdown();
            if let Some(ref out_path) = output {
                std::fs::create_dir_all(out_path)?;
                let report_path = out_path.join("taint_report.md");
                std::fs::write(&report_path, &md)?;
                println!(
                    "{} {}",
                    "[+] Report saved to:".green(),
                    report_path.display().to_string().yellow()
                );
            } else {
                println!("{}", md);
            }
        }
        "github" => {
            print!("{}", report.to_github_annotations());
        }
        _ => {
            report.print_terminal();
        }
    }

    println!("\n{}", "=".repeat(60).cyan());
    report.print_summary();

    Ok(())
}

/// Collects Rust source files from a directory, excluding `target`.
fn collect_rust_files(dir: &PathBuf, recursive: bool) -> Result<Vec<PathBuf>> {
    use walkdir::WalkDir;

    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().extension().is_some_and(|ext| ext == "rs")
                && !e.path().to_string_lossy().contains("target")
        })
        .map(|e| e.path().to_path_buf())
        .collect();

    Ok(files)
}

/// Displays the active rule table.
fn list_rules(table: &RuleTable) {
    println!("{}", "[*] Sources:".green().bold());
    for rule in &table.sources {
        println!(
            "  {} [{}]",
            rule.pattern.as_str().cyan().bold(),
            rule.origin.to_string().yellow()
        );
    }

    println!("\n{}", "[*] Sinks:".green().bold());
    for rule in &table.sinks {
        println!(
            "  {} {} [{}]{}",
            rule.pattern.as_str().cyan().bold(),
            rule.name.white(),
            rule.severity.to_string().yellow(),
            rule.cwe
                .as_deref()
                .map(|c| format!(" {}", c.dimmed()))
                .unwrap_or_default()
        );
    }

    println!("\n{}", "[*] Sanitizers:".green().bold());
    for rule in &table.sanitizers {
        let effective = if rule.effective_for.is_empty() {
            "effective for nothing".dimmed().to_string()
        } else {
            rule.effective_for
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  {} [{}]",
            rule.pattern.as_str().cyan().bold(),
            effective.yellow()
        );
    }
}
