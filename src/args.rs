//! Command-line arguments for the `lexprobe` binary, parsed with `clap`.

use clap::Parser;

/// Reverse-engineers an LLM gateway's keyword-blocking filter by binary
/// search and reports where each blocked keyword occurs in the input.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the text file to scan, or "-"/omitted for stdin.
    #[arg(short, long)]
    pub input: Option<String>,

    /// Upstream gateway URL to probe.
    #[arg(short, long)]
    pub upstream_url: String,

    /// Model name to send in each probe request.
    #[arg(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Name of the environment variable holding the upstream API key.
    #[arg(long, default_value = "LEXPROBE_API_KEY")]
    pub api_key_env: String,

    /// Path to a JSON file overriding scan configuration defaults.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Path to a JSON file overriding the default block-rule preset.
    #[arg(long)]
    pub rules: Option<String>,

    /// Maximum concurrent probes in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    /// Path to save the final scan report.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Format for the saved report ("json" or "text").
    #[arg(long, default_value = "text")]
    pub output_format: String,

    /// Suppress per-chunk progress events on the console.
    #[arg(long)]
    pub quiet: bool,
}
