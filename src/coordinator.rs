//! ScanCoordinator: the top-level driver. Chunks long input, runs the
//! macro→micro loop over each chunk, orchestrates the three-stage
//! verification, and emits progress events throughout.

use crate::binary_search::narrow;
use crate::config::ConfigView;
use crate::error::ScanError;
use crate::events::{EventSink, ScanEvent};
use crate::mask::MaskRegistry;
use crate::model::{Candidate, Evidence, Finding, Fragment, Location};
use crate::probe::ProbeClient;
use crate::rules::RuleEvaluator;
use crate::transport::Transport;
use crate::verify;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Final, authoritative result of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub total_requests: usize,
    pub unknown_status_code_counts: HashMap<u16, usize>,
    pub cancelled: bool,
}

pub struct ScanCoordinator {
    config: ConfigView,
    probe: Arc<ProbeClient>,
    mask: Arc<MaskRegistry>,
    sink: Arc<dyn EventSink>,
    cancel_flag: Arc<AtomicBool>,
    run_lock: Mutex<()>,
}

impl ScanCoordinator {
    pub fn new(
        config: ConfigView,
        transport: Box<dyn Transport>,
        rules: RuleEvaluator,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let mask = Arc::new(MaskRegistry::new());
        let probe =
            Arc::new(ProbeClient::with_sink(transport, rules, mask.clone(), config, sink.clone()));
        ScanCoordinator {
            config,
            probe,
            mask,
            sink,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            run_lock: Mutex::new(()),
        }
    }

    /// Request cancellation of an in-flight scan. No-op if none is
    /// running. In-flight probes complete or time out; verification is
    /// skipped if not yet started.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Run a single scan over `text`. At most one active scan per
    /// coordinator: a concurrent call returns `AlreadyRunning`.
    pub async fn scan_text(&self, text: String) -> Result<ScanReport, ScanError> {
        let _guard = self.run_lock.try_lock().map_err(|_| ScanError::AlreadyRunning)?;
        self.cancel_flag.store(false, Ordering::SeqCst);

        let total_len = text.chars().count();
        self.sink.emit(ScanEvent::ScanStart { total_length: total_len });

        if total_len == 0 {
            let report = ScanReport {
                findings: Vec::new(),
                total_requests: 0,
                unknown_status_code_counts: HashMap::new(),
                cancelled: false,
            };
            self.emit_complete(&report);
            return Ok(report);
        }

        let chunks = chunk_text(&text, self.config.chunk_size, self.config.overlap_size);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut scanned = 0usize;
        let mut running_keywords: HashSet<String> = HashSet::new();
        let mut cancelled = false;
        let mut fatal: Option<ScanError> = None;

        for chunk in chunks {
            if self.cancelled() {
                cancelled = true;
                break;
            }

            let chunk_start = chunk.orig_start;
            let chunk_len = chunk.len();
            match self.probe.classify(&chunk.text).await {
                Ok((outcome, _)) if outcome.is_blocked() => {
                    let before = candidates.len();
                    narrow(chunk, &self.probe, &self.mask, &self.config, 0, &mut candidates).await;
                    for c in &candidates[before..] {
                        running_keywords.insert(c.text.clone());
                    }
                }
                Ok(_) => {}
                Err(reason) => {
                    fatal = Some(ScanError::ProbeFailed {
                        attempts: self.config.max_retries + 1,
                        reason,
                    });
                    break;
                }
            }

            // Chunks overlap by `overlap_size` characters, so summing
            // `chunk_len` double-counts the shared region; track the
            // furthest original-text offset covered so far instead, which
            // stays monotone and never exceeds `total_len`.
            scanned = scanned.max(chunk_start + chunk_len).min(total_len);
            self.emit_progress(scanned, total_len, &running_keywords, &candidates);
        }

        if let Some(err) = fatal {
            self.sink.emit(ScanEvent::Error { message: err.to_string() });
            let report = ScanReport {
                findings: unverified_findings(candidates),
                total_requests: self.probe.total_requests(),
                unknown_status_code_counts: self.probe.unknown_status_counts(),
                cancelled: false,
            };
            self.emit_complete_marked_partial(&report);
            return Err(err);
        }

        let candidates = if self.config.enable_deduplication {
            dedup_candidates(candidates, &self.config)
        } else {
            candidates
        };

        let findings = if cancelled {
            unverified_findings(candidates)
        } else {
            verify::run(candidates, &self.probe, &text).await
        };

        let report = ScanReport {
            findings,
            total_requests: self.probe.total_requests(),
            unknown_status_code_counts: self.probe.unknown_status_counts(),
            cancelled,
        };
        self.emit_complete(&report);
        Ok(report)
    }

    fn emit_progress(
        &self,
        scanned: usize,
        total: usize,
        running_keywords: &HashSet<String>,
        candidates: &[Candidate],
    ) {
        let results = partial_results(candidates);
        self.sink.emit(ScanEvent::Progress {
            scanned,
            total,
            sensitive_count: running_keywords.len(),
            results,
        });
    }

    fn emit_complete(&self, report: &ScanReport) {
        self.sink.emit(ScanEvent::ScanComplete {
            sensitive_count: report.findings.len(),
            total_requests: report.total_requests,
            results: report
                .findings
                .iter()
                .map(|f| (f.keyword.clone(), f.locations.clone()))
                .collect(),
            unknown_status_code_counts: report.unknown_status_code_counts.clone(),
            sensitive_word_evidence: report
                .findings
                .iter()
                .map(|f| (f.keyword.clone(), f.evidence.clone()))
                .collect(),
            cancelled: report.cancelled,
        });
    }

    fn emit_complete_marked_partial(&self, report: &ScanReport) {
        let mut partial = report.clone();
        partial.cancelled = true;
        self.emit_complete(&partial);
    }
}

fn partial_results(candidates: &[Candidate]) -> HashMap<String, Vec<Location>> {
    let mut map: HashMap<String, Vec<Location>> = HashMap::new();
    for c in candidates {
        map.entry(c.text.clone()).or_default().push(Location { start: c.start, end: c.end });
    }
    map
}

fn unverified_findings(candidates: Vec<Candidate>) -> Vec<Finding> {
    let mut seen: HashMap<String, Vec<Location>> = HashMap::new();
    let mut evidence: HashMap<String, Evidence> = HashMap::new();
    for c in candidates {
        evidence.entry(c.text.clone()).or_insert_with(|| c.evidence.clone());
        seen.entry(c.text).or_default().push(Location { start: c.start, end: c.end });
    }
    seen.into_iter()
        .map(|(keyword, locations)| {
            let evidence = evidence.remove(&keyword).unwrap_or(Evidence::Keyword {
                value: keyword.clone(),
                context: None,
            });
            Finding { keyword, locations, evidence }
        })
        .collect()
}

/// Split `text` into consecutive `chunk_size`-character chunks with
/// `overlap` characters shared between adjacent chunks, carrying each
/// chunk's absolute base offset.
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Fragment> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![Fragment::new(text.to_string(), 0)];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let stride = chunk_size.saturating_sub(overlap).max(1);

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        chunks.push(Fragment::new(piece, start));
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}

/// Merge candidates whose ranges overlap by at least
/// `dedup_overlap_threshold` of the shorter one's length, or whose edges
/// are within `dedup_adjacent_distance` of each other. The shorter text
/// of a merged pair is kept.
fn dedup_candidates(mut candidates: Vec<Candidate>, config: &ConfigView) -> Vec<Candidate> {
    candidates.sort_by_key(|c| c.start);
    let mut merged: Vec<Candidate> = Vec::new();

    'next: for candidate in candidates {
        for kept in merged.iter_mut() {
            if should_merge(kept, &candidate, config) {
                if candidate.len() < kept.len() {
                    *kept = candidate;
                }
                continue 'next;
            }
        }
        merged.push(candidate);
    }

    merged
}

fn should_merge(a: &Candidate, b: &Candidate, config: &ConfigView) -> bool {
    let overlap_start = a.start.max(b.start);
    let overlap_end = a.end.min(b.end);
    let overlap_len = overlap_end.saturating_sub(overlap_start);
    let shorter = a.len().min(b.len()).max(1);
    let overlap_ratio = overlap_len as f64 / shorter as f64;
    if overlap_ratio >= config.dedup_overlap_threshold {
        return true;
    }

    // Edge-distance merging only makes sense for near-duplicate fragments
    // of the *same* keyword (e.g. the same occurrence re-emitted from two
    // overlapping chunks) or a substring/superstring pair reaching the
    // dedup pass without having gone through containment refinement. Two
    // distinct keywords that merely happen to sit close together in the
    // text (e.g. "foo bar") must not be collapsed into a single finding.
    let related = a.text == b.text || a.text.contains(b.text.as_str()) || b.text.contains(a.text.as_str());
    if !related {
        return false;
    }

    let edge_distance = if a.end <= b.start {
        b.start - a.end
    } else if b.end <= a.start {
        a.start - b.end
    } else {
        0
    };
    edge_distance <= config.dedup_adjacent_distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::transport::MockTransport;

    fn coordinator(keywords: &[&str], config: ConfigView) -> (Arc<ScanCoordinator>, Arc<RecordingEventSink>) {
        let sink = Arc::new(RecordingEventSink::default());
        let coordinator = Arc::new(ScanCoordinator::new(
            config,
            Box::new(MockTransport::new(keywords.iter().map(|s| s.to_string()))),
            RuleEvaluator::default_preset(),
            sink.clone(),
        ));
        (coordinator, sink)
    }

    #[tokio::test]
    async fn empty_input_yields_no_probes_and_no_findings() {
        let (coordinator, _sink) = coordinator(&["foo"], ConfigView::default());
        let report = coordinator.scan_text(String::new()).await.unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.total_requests, 0);
    }

    #[tokio::test]
    async fn simple_single_keyword_scan() {
        let (coordinator, _sink) = coordinator(&["foo"], ConfigView::default());
        let report = coordinator.scan_text("hello foo world".to_string()).await.unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].keyword, "foo");
        assert_eq!(report.findings[0].locations, vec![Location { start: 6, end: 9 }]);
    }

    #[tokio::test]
    async fn straddling_chunk_boundary_is_not_duplicated() {
        let mut config = ConfigView::default();
        config.chunk_size = 10;
        config.overlap_size = 6;
        config.switch_threshold = 20;
        let (coordinator, _sink) = coordinator(&["secret"], config);
        let text = "0123456secret890xxxxxxxxxxxxxxxxxxxxx";
        let report = coordinator.scan_text(text.to_string()).await.unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].keyword, "secret");
    }

    #[tokio::test]
    async fn input_made_only_of_mask_characters_yields_no_probes() {
        let (coordinator, _sink) = coordinator(&["foo"], ConfigView::default());
        let report = coordinator.scan_text("****".to_string()).await.unwrap();
        assert!(report.findings.is_empty());
    }

    #[test]
    fn dedup_merges_high_overlap_and_prefers_shorter() {
        let config = ConfigView::default();
        let a = Candidate {
            text: "black cat".into(),
            start: 0,
            end: 9,
            evidence: Evidence::Keyword { value: "black cat".into(), context: None },
        };
        let b = Candidate {
            text: "cat".into(),
            start: 6,
            end: 9,
            evidence: Evidence::Keyword { value: "cat".into(), context: None },
        };
        let merged = dedup_candidates(vec![a, b], &config);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "cat");
    }

    #[test]
    fn chunk_text_covers_whole_input_with_overlap() {
        let text = "a".repeat(25);
        let chunks = chunk_text(&text, 10, 3);
        assert!(chunks.len() > 1);
        let last = chunks.last().unwrap();
        assert_eq!(last.orig_start + last.len(), 25);
    }

    #[test]
    fn unrelated_candidates_within_adjacent_distance_are_not_merged() {
        let config = ConfigView::default();
        let foo = Candidate {
            text: "foo".into(),
            start: 0,
            end: 3,
            evidence: Evidence::Keyword { value: "foo".into(), context: None },
        };
        let bar = Candidate {
            text: "bar".into(),
            start: 4,
            end: 7,
            evidence: Evidence::Keyword { value: "bar".into(), context: None },
        };
        let merged = dedup_candidates(vec![foo, bar], &config);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn progress_never_reports_scanned_beyond_total() {
        let mut config = ConfigView::default();
        config.chunk_size = 10;
        config.overlap_size = 3;
        config.switch_threshold = 20;
        let (coordinator, sink) = coordinator(&["ab"], config);
        let text = "a".repeat(25);
        coordinator.scan_text(text.clone()).await.unwrap();

        let total_len = text.chars().count();
        let events = sink.events.lock().unwrap();
        for event in events.iter() {
            if let ScanEvent::Progress { scanned, total, .. } = event {
                assert!(*scanned <= *total, "scanned ({scanned}) exceeded total ({total})");
                assert_eq!(*total, total_len);
            }
        }
    }
}
