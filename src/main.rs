//! This is the main entry point for the lexprobe binary.
//! It handles the entire scanning process, including:
//! - Parsing command-line arguments.
//! - Reading the input text and optional config/rule-preset overlays.
//! - Resolving and validating the scan configuration into a `ConfigView`.
//! - Setting up the HTTP client and concurrency controls.
//! - Running a single scan with a colored console event sink.
//! - Handling graceful cancellation on Ctrl+C.
//! - Printing a final summary and optionally saving a report to disk.

use clap::Parser;
use colored::*;
use lexprobe::config::{ConfigView, ScanConfigInput};
use lexprobe::coordinator::ScanCoordinator;
use lexprobe::error::ConfigError;
use lexprobe::events::{ConsoleEventSink, EventSink, NullEventSink};
use lexprobe::output;
use lexprobe::parser;
use lexprobe::rules::RuleEvaluator;
use lexprobe::transport::{HttpTransport, UpstreamConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::Instant;

mod args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = args::Args::parse();

    if args.upstream_url.trim().is_empty() {
        eprintln!("{} {}", "[error]".red().bold(), ConfigError::EmptyUpstreamUrl);
        std::process::exit(2);
    }

    let input_text = parser::read_input_text(args.input.as_deref())?;

    let file_overlay = match &args.config {
        Some(path) => parser::load_config_file(path)?,
        None => ScanConfigInput::default(),
    };
    let cli_overlay = ScanConfigInput {
        concurrency: args.concurrency,
        timeout_seconds: args.timeout_seconds,
        ..Default::default()
    };
    let layered = file_overlay.layer(cli_overlay);

    let config = match ConfigView::resolve(layered) {
        Ok(view) => view,
        Err(errors) => {
            for error in &errors {
                eprintln!("{} {error}", "[error]".red().bold());
            }
            std::process::exit(2);
        }
    };

    let rule_preset = parser::load_rule_preset(args.rules.as_deref())?;

    let api_key = std::env::var(&args.api_key_env).unwrap_or_default();
    let upstream = UpstreamConfig { url: args.upstream_url.clone(), model: args.model.clone(), api_key };

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(config.concurrency.min(25))
        .user_agent("lexprobe/1.0 (+https://github.com/lexprobe/lexprobe)")
        .build()?;

    let sink: Arc<dyn EventSink> =
        if args.quiet { Arc::new(NullEventSink) } else { Arc::new(ConsoleEventSink) };

    let coordinator = Arc::new(ScanCoordinator::new(
        config,
        Box::new(HttpTransport::new(client, upstream)),
        RuleEvaluator::new(rule_preset),
        sink,
    ));

    let coordinator_for_signal = coordinator.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\nReceived Ctrl+C, stopping scan gracefully...");
            coordinator_for_signal.cancel();
        }
    });

    let start = Instant::now();
    let report = coordinator.scan_text(input_text).await?;
    let elapsed = start.elapsed();

    output::print_summary(&report);
    println!(
        "{:<20}{:?} ({:.2} req/sec)",
        "Elapsed:".bold(),
        elapsed,
        report.total_requests as f64 / elapsed.as_secs_f64().max(0.001)
    );

    if let Some(path) = &args.output {
        output::save_report(&report, path, &args.output_format)?;
        println!("Report saved to: {path}");
    }

    Ok(())
}
