//! Terminal output: per-variant progress lines and the end-of-run summary.

use std::path::Path;

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use buildall_pipeline::{BuildReport, RunEvent, RunReport};

pub fn print_event(event: &RunEvent<'_>, dry_run: bool) {
    match event {
        RunEvent::Scheduled(variant) if dry_run => {
            println!("{} {} ({})", "~".cyan(), variant.output_filename(), variant.build_id);
        }
        RunEvent::Scheduled(variant) => {
            println!(
                "{} building {} {} ({})",
                "▶".blue().bold(),
                variant.name,
                variant.version,
                variant.output_filename()
            );
        }
        RunEvent::Built(report) => print_built(report),
        RunEvent::Failed(failure) => {
            println!("{} {} ({}): {}", "✗".red().bold(), failure.name, failure.build_id, failure.error);
        }
    }
}

fn print_built(report: &BuildReport) {
    println!(
        "{} {} built in {:.1}s",
        "✓".green().bold(),
        report.name,
        report.duration_ms as f64 / 1000.0
    );
    for listing in &report.listings {
        println!("  {}", display_name(&listing.artifact));
        for entry in &listing.entries {
            println!("    {entry}");
        }
        if listing.truncated {
            println!("    ...");
        }
    }
    if !report.uploaded_labels.is_empty() {
        println!("  uploaded to {}", report.uploaded_labels.join(", ").bold());
    }
}

#[derive(Tabled)]
struct ScheduledRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "package")]
    package: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "build id")]
    build_id: String,
    #[tabled(rename = "package")]
    package: String,
    #[tabled(rename = "error")]
    error: String,
}

pub fn print_summary(report: &RunReport) {
    if report.dry_run {
        if report.scheduled.is_empty() {
            println!("{} nothing to build", "✓".green().bold());
            return;
        }
        let rows = report
            .scheduled
            .iter()
            .enumerate()
            .map(|(i, path)| ScheduledRow {
                position: i + 1,
                package: display_name(path),
            });
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("[dry-run] {} build(s) would run", report.scheduled.len());
        return;
    }

    println!(
        "{} built, {} failed",
        report.built.len().to_string().green(),
        report.failures.len().to_string().red()
    );
    if report.failures.is_empty() {
        return;
    }
    let rows = report.failures.iter().map(|f| FailureRow {
        build_id: f.build_id.to_string(),
        package: f.name.clone(),
        error: f.error.clone(),
    });
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
