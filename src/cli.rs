//! Terminal output for the `butterfly` binary

use std::fmt::Write as _;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::analysis::{AnalysisKind, ConsolidatedReport, ProjectHealth};

/// Prints the banner shown when the CLI starts
pub fn print_banner() {
    println!(
        "{}\n{}\n",
        "Butterfly".bold().bright_magenta(),
        "Codebase health analysis".bright_blue()
    );
}

/// Prints an informational line
pub fn print_info(message: &str) {
    println!("{}", message.green());
}

/// Prints a warning line
pub fn print_warning(message: &str) {
    println!("{}", message.yellow());
}

/// Prints an error line to stderr
pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}

/// Spinner shown while an analysis runs
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["-", "\\", "|", "/", "-", "\\", "|", "/"]),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn paint_health(health: ProjectHealth) -> ColoredString {
    let label = health.as_str();
    match health {
        ProjectHealth::Critical => label.bold().red(),
        ProjectHealth::AtRisk => label.bold().yellow(),
        ProjectHealth::Stable => label.bold().cyan(),
        ProjectHealth::Healthy => label.bold().green(),
        ProjectHealth::Unknown => label.bold().dimmed(),
    }
}

/// Human readable rendering of a report
pub fn render_report(report: &ConsolidatedReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Overall project health:".bold(), paint_health(report.health()));
    let _ = writeln!(out, "{}", report.summary());

    let _ = writeln!(out, "\n{}", "Tasks".bold().underline());
    for kind in AnalysisKind::SUMMARY_ORDER {
        match (report.analysis(kind), report.failure(kind)) {
            (Some(result), _) => {
                let rating = result.headline().unwrap_or("unrated");
                let _ = writeln!(out, "  {} {:<14} {}", "✓".green(), kind.label(), rating);
            }
            (None, reason) => {
                let _ = writeln!(
                    out,
                    "  {} {:<14} {}",
                    "✗".red(),
                    kind.label(),
                    reason.unwrap_or("no result").dimmed()
                );
            }
        }
    }

    if !report.action_items().is_empty() {
        let _ = writeln!(out, "\n{}", "Prioritized action items".bold().underline());
        for (i, item) in report.action_items().iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, item);
        }
    }
    out
}
