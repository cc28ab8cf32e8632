//! The HTTP transport boundary between `ProbeClient` and the upstream
//! gateway, plus a deterministic in-memory transport used by tests (and
//! available to downstream consumers who want to exercise the engine
//! without a live endpoint).

use crate::rules::RawResponse;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Upstream endpoint + auth configuration for the real transport.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

/// Issues one classify-style request and returns the raw status/body.
/// Retries, backoff and masking all happen above this trait in
/// `ProbeClient`; a `Transport` impl does exactly one network call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, text: &str, timeout: Duration) -> Result<RawResponse, String>;
}

/// Real transport: a single-message chat-completion-style POST.
pub struct HttpTransport {
    client: Client,
    upstream: UpstreamConfig,
}

impl HttpTransport {
    pub fn new(client: Client, upstream: UpstreamConfig) -> Self {
        HttpTransport { client, upstream }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, text: &str, timeout: Duration) -> Result<RawResponse, String> {
        let body = serde_json::json!({
            "model": self.upstream.model,
            "messages": [{"role": "user", "content": text}],
            "stream": false,
        });

        let response = self
            .client
            .post(&self.upstream.url)
            .bearer_auth(&self.upstream.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| e.to_string())?;
        Ok(RawResponse { status, body: body_text })
    }
}

/// Deterministic mock oracle: rejects a text iff it contains any member
/// of a hidden keyword set, used by the end-to-end tests in spec.md §8.
pub struct MockTransport {
    keywords: HashSet<String>,
    calls: AtomicUsize,
    /// Returns RETRY for the first `retry_budget` calls, then falls
    /// through to normal keyword evaluation. Models scenario S6.
    retry_budget: AtomicUsize,
}

impl MockTransport {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        MockTransport {
            keywords: keywords.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            retry_budget: AtomicUsize::new(0),
        }
    }

    pub fn with_initial_retries(self, retries: usize) -> Self {
        self.retry_budget.store(retries, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, text: &str, _timeout: Duration) -> Result<RawResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.retry_budget.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .retry_budget
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Ok(RawResponse { status: 429, body: String::new() });
        }

        let lower = text.to_lowercase();
        let hit = self.keywords.iter().find(|k| lower.contains(k.as_str()));
        match hit {
            Some(k) => Ok(RawResponse { status: 400, body: format!("blocked: {k}") }),
            None => Ok(RawResponse { status: 200, body: "ok".to_string() }),
        }
    }
}
