//! EventSink: the outbound progress channel to an external consumer (the
//! web UI / WebSocket relay named out of scope in the design). Delivery
//! is best-effort and ordered per scan; the core must never block on a
//! slow sink, so `log`-level events may be dropped while `progress` and
//! `scan_complete` must always get through.

use crate::model::{Evidence, Location};
use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanEvent {
    ScanStart { total_length: usize },
    Progress {
        scanned: usize,
        total: usize,
        sensitive_count: usize,
        results: HashMap<String, Vec<Location>>,
    },
    Log { level: LogLevel, message: String },
    Warning { message: String },
    Error { message: String },
    UnknownStatusCode { status_code: u16, response_snippet: String },
    ScanComplete {
        sensitive_count: usize,
        total_requests: usize,
        results: HashMap<String, Vec<Location>>,
        unknown_status_code_counts: HashMap<u16, usize>,
        sensitive_word_evidence: HashMap<String, Evidence>,
        cancelled: bool,
    },
}

/// Outbound event channel. Implementations must not block the coordinator
/// for more than a bounded amount of time; a slow external consumer
/// should see dropped `Log` events before it ever sees a dropped
/// `Progress` or `ScanComplete`.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Sink used by the CLI: colored, synchronous, stdout.
pub struct ConsoleEventSink;

impl EventSink for ConsoleEventSink {
    fn emit(&self, event: ScanEvent) {
        match event {
            ScanEvent::ScanStart { total_length } => {
                println!("{} scanning {total_length} characters", "[start]".blue().bold());
            }
            ScanEvent::Progress { scanned, total, sensitive_count, .. } => {
                println!(
                    "{} {scanned}/{total} ({sensitive_count} sensitive found so far)",
                    "[progress]".cyan()
                );
            }
            ScanEvent::Log { level, message } => {
                let tag = match level {
                    LogLevel::Info => "[info]".normal(),
                    LogLevel::Success => "[ok]".green().bold(),
                    LogLevel::Warning => "[warn]".yellow().bold(),
                    LogLevel::Error => "[error]".red().bold(),
                };
                println!("{tag} {message}");
            }
            ScanEvent::Warning { message } => println!("{} {message}", "[warn]".yellow().bold()),
            ScanEvent::Error { message } => println!("{} {message}", "[error]".red().bold()),
            ScanEvent::UnknownStatusCode { status_code, response_snippet } => {
                println!(
                    "{} status {status_code}: {response_snippet}",
                    "[unknown-status]".magenta()
                );
            }
            ScanEvent::ScanComplete { sensitive_count, total_requests, cancelled, .. } => {
                let tag = if cancelled { "[cancelled]".yellow().bold() } else { "[complete]".green().bold() };
                println!("{tag} {sensitive_count} findings across {total_requests} requests");
            }
        }
    }
}

/// Sink used by a real external consumer over an in-process bounded
/// channel. `Log` events are dropped under backpressure (`try_send`);
/// `Progress` and `ScanComplete` always go through a blocking `send`.
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::Sender<ScanEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::Sender<ScanEvent>) -> Self {
        ChannelEventSink { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ScanEvent) {
        match &event {
            ScanEvent::Log { .. } => {
                let _ = self.sender.try_send(event);
            }
            _ => {
                let sender = self.sender.clone();
                // `emit` is a synchronous trait method (it may be called
                // from code that can't easily be made async); spawn the
                // blocking-but-never-long send so progress/scan_complete
                // are never silently dropped even under backpressure.
                tokio::spawn(async move {
                    let _ = sender.send(event).await;
                });
            }
        }
    }
}

/// Sink that drops everything. Useful for tests that don't care about
/// the event stream.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Sink that records every event in order, for assertions in tests.
#[derive(Default)]
pub struct RecordingEventSink {
    pub events: std::sync::Mutex<Vec<ScanEvent>>,
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: ScanEvent) {
        self.events.lock().expect("recording sink lock poisoned").push(event);
    }
}
