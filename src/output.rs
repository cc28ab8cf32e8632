//! Renders a finished `ScanReport` for the CLI: a colorized console
//! summary and an optional save to disk in JSON or plain-text form.

use crate::coordinator::ScanReport;
use crate::model::Finding;
use colored::Colorize;
use std::fs::write;
use std::io;

/// Prints the final summary block: one line per finding plus totals.
pub fn print_summary(report: &ScanReport) {
    println!("\n{}", "Summary:".bold().underline().blue());
    println!("{:<20}{}", "Sensitive keywords:".bold(), report.findings.len().to_string().white());
    println!("{:<20}{}", "Total requests:".bold(), report.total_requests.to_string().white());
    if report.cancelled {
        println!("{:<20}{}", "Status:".bold(), "cancelled (partial results)".yellow());
    }

    for finding in &report.findings {
        println!("{}", format_finding(finding));
    }

    if !report.unknown_status_code_counts.is_empty() {
        println!("{}", "Unrecognized status codes seen:".yellow());
        for (code, count) in &report.unknown_status_code_counts {
            println!("  {code}: {count}");
        }
    }
}

fn format_finding(finding: &Finding) -> String {
    let locations = finding
        .locations
        .iter()
        .map(|l| format!("{}..{}", l.start, l.end))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "  {} {} at [{}]",
        "[blocked]".red().bold(),
        finding.keyword.green().bold(),
        locations
    )
}

/// Saves `report` to `path` in `format` ("json" or "text"); any other
/// value falls back to text.
pub fn save_report(report: &ScanReport, path: &str, format: &str) -> io::Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
            write(path, json)
        }
        _ => write(path, format_text_report(report)),
    }
}

fn format_text_report(report: &ScanReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("total_requests: {}\n", report.total_requests));
    out.push_str(&format!("cancelled: {}\n", report.cancelled));
    for finding in &report.findings {
        out.push_str(&format!("{}: {:?}\n", finding.keyword, finding.locations));
    }
    out
}
