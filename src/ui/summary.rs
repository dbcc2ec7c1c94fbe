//! End-of-run status table.

use crate::pipeline::outcome::{BuildStatus, RunReport};
use crate::ui::icons::{MISSING, SPARKLE};
use console::style;

/// One table row per input URL, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub url: String,
    /// `None` when no worker reported the URL.
    pub status: Option<BuildStatus>,
    /// Last line of the repository's report.
    pub detail: String,
}

pub fn summary_rows(report: &RunReport, inputs: &[String]) -> Vec<SummaryRow> {
    inputs
        .iter()
        .map(|url| match report.get(url) {
            Some(entry) => SummaryRow {
                url: url.clone(),
                status: Some(entry.build_status()),
                detail: entry.lines().pop().unwrap_or_default(),
            },
            None => SummaryRow {
                url: url.clone(),
                status: None,
                detail: "incomplete: no result from worker".to_string(),
            },
        })
        .collect()
}

/// Print the table, the incomplete URLs and the totals to stdout.
pub fn print_summary(report: &RunReport, inputs: &[String]) {
    let rows = summary_rows(report, inputs);
    let width = rows.iter().map(|r| r.url.len()).max().unwrap_or(0);

    println!();
    for row in &rows {
        let status = match row.status {
            Some(BuildStatus::Compiled) => style(BuildStatus::Compiled.to_string()).green(),
            Some(BuildStatus::CompilationError) => {
                style(BuildStatus::CompilationError.to_string()).red()
            }
            Some(BuildStatus::NotBuilt) => style(BuildStatus::NotBuilt.to_string()).yellow(),
            None => style("Incomplete".to_string()).magenta().bold(),
        };
        println!(
            "{:<width$}  {:<21}  {}",
            row.url,
            status,
            style(&row.detail).dim(),
            width = width
        );
    }

    let missing = report.missing(inputs);
    if !missing.is_empty() {
        println!();
        println!(
            "{}{}",
            MISSING,
            style(format!("{} repositories were not reported:", missing.len()))
                .magenta()
                .bold()
        );
        for url in missing {
            println!("  - {}", url);
        }
    }

    let summary = report.summary(inputs);
    println!();
    println!(
        "{}{} compiled, {} compilation errors, {} not built, {} incomplete ({} total)",
        SPARKLE,
        style(summary.compiled).green().bold(),
        style(summary.compilation_errors).red().bold(),
        style(summary.not_built).yellow(),
        style(summary.missing).magenta(),
        summary.total
    );
}
