//! ProbeClient: the single suspension point of the whole engine. Gates
//! concurrency with a semaphore, masks known keywords before every
//! network call, retries transient failures with capped jittered
//! backoff, and caches identical-text probes to cut down on redundant
//! network calls under `enable_triple_probe`.

use crate::config::ConfigView;
use crate::events::{EventSink, ScanEvent};
use crate::mask::MaskRegistry;
use crate::model::{Evidence, Outcome};
use crate::rules::{RawResponse, RuleEvaluator, UnknownStatusTally};
use crate::transport::Transport;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

const UNKNOWN_STATUS_SNIPPET_LEN: usize = 200;

const BACKOFF_BASE_SECS: f64 = 2.0;
const BACKOFF_CAP_SECS: f64 = 10.0;

pub struct ProbeClient {
    transport: Box<dyn Transport>,
    rules: RuleEvaluator,
    mask: std::sync::Arc<MaskRegistry>,
    semaphore: Semaphore,
    config: ConfigView,
    cache: Mutex<HashMap<[u8; 32], (Outcome, Option<Evidence>)>>,
    tally: UnknownStatusTally,
    total_requests: std::sync::atomic::AtomicUsize,
    sink: Arc<dyn EventSink>,
}

impl ProbeClient {
    pub fn new(
        transport: Box<dyn Transport>,
        rules: RuleEvaluator,
        mask: std::sync::Arc<MaskRegistry>,
        config: ConfigView,
    ) -> Self {
        ProbeClient::with_sink(transport, rules, mask, config, Arc::new(crate::events::NullEventSink))
    }

    /// Same as `new`, but with an explicit event sink so `unknown_status_code`
    /// events (spec.md §6/§7 — a status matching no rule) reach the
    /// external consumer instead of only being tallied.
    pub fn with_sink(
        transport: Box<dyn Transport>,
        rules: RuleEvaluator,
        mask: std::sync::Arc<MaskRegistry>,
        config: ConfigView,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        ProbeClient {
            transport,
            rules,
            mask,
            semaphore: Semaphore::new(config.concurrency),
            config,
            cache: Mutex::new(HashMap::new()),
            tally: UnknownStatusTally::default(),
            total_requests: std::sync::atomic::AtomicUsize::new(0),
            sink,
        }
    }

    pub fn total_requests(&self) -> usize {
        self.total_requests.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn unknown_status_counts(&self) -> HashMap<u16, usize> {
        self.tally.snapshot()
    }

    /// Surfaces a recoverable condition (granularity floor reached,
    /// recursion cap reached) as a `ScanEvent::Warning`, per spec.md §7 —
    /// these never abort the scan, they're just reported. Exposed here
    /// because `BinarySearcher`/`PrecisionScanner` already hold an
    /// `Arc<ProbeClient>` and this avoids threading a second sink handle
    /// through every recursive call.
    pub fn emit_warning(&self, message: impl Into<String>) {
        self.sink.emit(ScanEvent::Warning { message: message.into() });
    }

    /// Classify `text`, after masking every keyword the registry already
    /// knows about. Returns the outcome and, for a fresh `Blocked`
    /// result, the evidence that produced it.
    pub async fn classify(&self, text: &str) -> Result<(Outcome, Option<Evidence>), String> {
        let masked = self.mask.apply(text);
        self.classify_prepared(masked).await
    }

    /// Classify `text` as-is, without consulting `MaskRegistry`.
    ///
    /// The verifier re-probes a candidate's own text in isolation to
    /// confirm it still blocks on its own; by that point the candidate's
    /// text has already been added to the registry (`PrecisionScanner`
    /// masks each keyword as soon as it's found), so routing that probe
    /// through `classify`'s masking would mask the candidate entirely into
    /// `*` and short-circuit to `Safe` without ever reaching the network.
    pub async fn classify_unmasked(&self, text: &str) -> Result<(Outcome, Option<Evidence>), String> {
        self.classify_prepared(text.to_string()).await
    }

    async fn classify_prepared(&self, masked: String) -> Result<(Outcome, Option<Evidence>), String> {
        let _permit = self.semaphore.acquire().await.map_err(|e| e.to_string())?;

        if masked.is_empty() || masked.chars().all(|c| c == '*') {
            return Ok((Outcome::Safe, None));
        }

        let cache_key = sha256_key(&masked);
        if let Some(cached) = self.cache.lock().expect("probe cache lock poisoned").get(&cache_key)
        {
            return Ok(cached.clone());
        }

        let mut rng = rand::rng();
        for attempt in 0..=self.config.max_retries {
            self.total_requests.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let sent = self
                .transport
                .send(&masked, Duration::from_secs(self.config.timeout_seconds))
                .await;

            let raw = match sent {
                Ok(raw) => raw,
                Err(io_err) => {
                    if attempt == self.config.max_retries {
                        return Err(io_err);
                    }
                    sleep(self.backoff_delay(attempt, &mut rng)).await;
                    continue;
                }
            };

            let (outcome, evidence) = self.rules.evaluate(&raw);
            match outcome {
                Outcome::Retry => {
                    if attempt == self.config.max_retries {
                        return Err("retry budget exhausted".to_string());
                    }
                    sleep(self.backoff_delay(attempt, &mut rng)).await;
                    continue;
                }
                Outcome::Unknown => {
                    self.tally.record(raw.status);
                    self.sink.emit(ScanEvent::UnknownStatusCode {
                        status_code: raw.status,
                        response_snippet: truncate_snippet(&raw.body, UNKNOWN_STATUS_SNIPPET_LEN),
                    });
                    self.cache
                        .lock()
                        .expect("probe cache lock poisoned")
                        .insert(cache_key, (Outcome::Safe, None));
                    return Ok((Outcome::Safe, None));
                }
                Outcome::Blocked | Outcome::Safe => {
                    self.cache
                        .lock()
                        .expect("probe cache lock poisoned")
                        .insert(cache_key, (outcome, evidence.clone()));
                    return Ok((outcome, evidence));
                }
            }
        }

        unreachable!("loop above always returns within max_retries + 1 iterations")
    }

    fn backoff_delay(&self, attempt: usize, rng: &mut impl Rng) -> Duration {
        let raw = (BACKOFF_BASE_SECS * 2f64.powi(attempt as i32)).min(BACKOFF_CAP_SECS);
        let jitter_span = self.config.jitter;
        let jitter_factor = 1.0 + rng.random_range(-jitter_span..=jitter_span);
        Duration::from_secs_f64((raw * jitter_factor).max(0.0))
    }
}

/// First `max_chars` characters of `body`, for the `response_snippet`
/// field of an `unknown_status_code` event.
fn truncate_snippet(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

fn sha256_key(text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleEvaluator;
    use crate::transport::MockTransport;

    fn client(keywords: &[&str]) -> ProbeClient {
        let mask = std::sync::Arc::new(MaskRegistry::new());
        ProbeClient::new(
            Box::new(MockTransport::new(keywords.iter().map(|s| s.to_string()))),
            RuleEvaluator::default_preset(),
            mask,
            ConfigView::default(),
        )
    }

    #[tokio::test]
    async fn safe_text_returns_safe() {
        let c = client(&["foo"]);
        let (outcome, _) = c.classify("hello world").await.unwrap();
        assert_eq!(outcome, Outcome::Safe);
    }

    #[tokio::test]
    async fn blocked_text_returns_blocked_with_evidence() {
        let c = client(&["foo"]);
        let (outcome, evidence) = c.classify("hello foo world").await.unwrap();
        assert_eq!(outcome, Outcome::Blocked);
        assert!(evidence.is_some());
    }

    #[tokio::test]
    async fn classify_unmasked_ignores_a_keyword_already_in_the_registry() {
        let mask = std::sync::Arc::new(MaskRegistry::new());
        mask.add("foo");
        let c = ProbeClient::new(
            Box::new(MockTransport::new(["foo"])),
            RuleEvaluator::default_preset(),
            mask,
            ConfigView::default(),
        );
        // `classify` would mask "foo" into "***" and return Safe with no
        // network call; `classify_unmasked` must still probe the raw text.
        let (masked_outcome, _) = c.classify("foo").await.unwrap();
        assert_eq!(masked_outcome, Outcome::Safe);
        let (unmasked_outcome, _) = c.classify_unmasked("foo").await.unwrap();
        assert_eq!(unmasked_outcome, Outcome::Blocked);
    }

    #[tokio::test]
    async fn empty_after_masking_is_safe_with_no_probe() {
        let mask = std::sync::Arc::new(MaskRegistry::new());
        mask.add("foo");
        let c = ProbeClient::new(
            Box::new(MockTransport::new(["foo"])),
            RuleEvaluator::default_preset(),
            mask,
            ConfigView::default(),
        );
        let (outcome, _) = c.classify("foo").await.unwrap();
        assert_eq!(outcome, Outcome::Safe);
        assert_eq!(c.total_requests(), 0);
    }

    #[tokio::test]
    async fn retry_then_blocked_counts_every_attempt() {
        let mask = std::sync::Arc::new(MaskRegistry::new());
        let transport = MockTransport::new(["secret"]).with_initial_retries(2);
        let mut config = ConfigView::default();
        config.max_retries = 3;
        let c = ProbeClient::new(Box::new(transport), RuleEvaluator::default_preset(), mask, config);
        let (outcome, _) = c.classify("this has secret in it").await.unwrap();
        assert_eq!(outcome, Outcome::Blocked);
        assert_eq!(c.total_requests(), 3);
    }

    #[tokio::test]
    async fn repeated_identical_probe_is_served_from_cache() {
        let c = client(&["foo"]);
        c.classify("hello foo world").await.unwrap();
        c.classify("hello foo world").await.unwrap();
        assert_eq!(c.total_requests(), 1);
    }

    struct TeapotTransport;

    #[async_trait::async_trait]
    impl crate::transport::Transport for TeapotTransport {
        async fn send(&self, _text: &str, _timeout: Duration) -> Result<RawResponse, String> {
            Ok(RawResponse { status: 418, body: "i'm a teapot".to_string() })
        }
    }

    #[tokio::test]
    async fn unknown_status_is_tallied_and_emitted_as_safe() {
        let mask = std::sync::Arc::new(MaskRegistry::new());
        let sink = Arc::new(crate::events::RecordingEventSink::default());
        let c = ProbeClient::with_sink(
            Box::new(TeapotTransport),
            RuleEvaluator::default_preset(),
            mask,
            ConfigView::default(),
            sink.clone(),
        );
        let (outcome, _) = c.classify("anything").await.unwrap();
        assert_eq!(outcome, Outcome::Safe);
        assert_eq!(c.unknown_status_counts().get(&418), Some(&1));

        let events = sink.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ScanEvent::UnknownStatusCode { status_code: 418, .. }
        )));
    }
}
