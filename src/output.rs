//! Run report rendering
//!
//! Human output is a colored summary table with optional per-path listings;
//! JSON output is a stable structure for downstream build/sync tooling.

use crate::reconciler::RunReport;
use colored::Colorize;
use serde::Serialize;

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Quiet,       // Only errors
    Normal,      // Standard output
    Verbose,     // More details
    VeryVerbose, // All details including file paths
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: String,
    timestamp: String,
    committed: bool,
    diff: &'a crate::snapshot::Diff,
    errors: Vec<JsonError<'a>>,
    stats: &'a crate::store::RunStats,
    bytes_hashed: u64,
}

#[derive(Serialize)]
struct JsonError<'a> {
    path: &'a str,
    message: String,
}

/// Serialize a run report for scripting
pub fn to_json(report: &RunReport) -> anyhow::Result<String> {
    let json = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        committed: report.committed,
        diff: &report.diff,
        errors: report
            .errors
            .iter()
            .map(|e| JsonError {
                path: &e.path,
                message: e.source.to_string(),
            })
            .collect(),
        stats: &report.stats,
        bytes_hashed: report.bytes_hashed,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

pub fn print_json(report: &RunReport) -> anyhow::Result<()> {
    println!("{}", to_json(report)?);
    Ok(())
}

pub fn print_human(report: &RunReport, mode: OutputMode) {
    if mode == OutputMode::Quiet {
        print_errors(report);
        return;
    }

    println!();
    let title = if report.committed {
        "Imprint Run Results"
    } else {
        "Imprint Status (not committed)"
    };
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));

    let sections = [
        ("Added", &report.diff.added),
        ("Removed", &report.diff.removed),
        ("Changed", &report.diff.changed),
        ("Unchanged", &report.diff.unchanged),
    ];

    for (name, paths) in sections {
        println!("{:<12} {:>8}", name.cyan(), paths.len());

        if mode == OutputMode::Verbose && name != "Unchanged" {
            let show_count = std::cmp::min(5, paths.len());
            for path in paths.iter().take(show_count) {
                println!("  {}", path.dimmed());
            }
            if paths.len() > show_count {
                println!("  {}", format!("... and {} more", paths.len() - show_count).dimmed());
            }
        }

        if mode == OutputMode::VeryVerbose {
            for path in paths {
                println!("  {}", path.dimmed());
            }
        }
    }

    println!("{}", "-".repeat(50));
    println!(
        "{} files, {} hashed",
        report.stats.total_files,
        bytesize::to_string(report.bytes_hashed, true)
    );

    if report.diff.is_clean() {
        println!("{}", "Tree is unchanged since the last run.".green());
    }

    print_errors(report);
    println!();
}

fn print_errors(report: &RunReport) {
    for err in &report.errors {
        eprintln!("{} could not hash {}: {}", "Warning:".yellow(), err.path, err.source);
    }
}
