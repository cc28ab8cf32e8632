//! RuleEvaluator: maps a raw HTTP response (status + body) to an
//! `Outcome`, using a preset ruleset loaded at scan start. Modeled as a
//! tagged struct carrying the three rule tables rather than a trait
//! hierarchy — there is exactly one evaluation strategy, just
//! data-parameterized.

use crate::model::{Evidence, Outcome};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

/// A raw HTTP response as seen by the evaluator.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The three disjoint rule tables from the design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePreset {
    pub block_status_codes: HashSet<u16>,
    pub block_keywords: Vec<String>,
    pub retry_status_codes: HashSet<u16>,
}

impl Default for RulePreset {
    fn default() -> Self {
        RulePreset {
            block_status_codes: [400, 403, 451].into_iter().collect(),
            block_keywords: vec![
                "content_filter".to_string(),
                "sensitive".to_string(),
                "blocked".to_string(),
                "policy violation".to_string(),
            ],
            retry_status_codes: [429, 502, 503, 504].into_iter().collect(),
        }
    }
}

static DEFAULT_PRESET: Lazy<RulePreset> = Lazy::new(RulePreset::default);

/// Per-scan counter of status codes that matched no rule (spec.md §4.B /
/// §7 "Unknown outcome").
#[derive(Debug, Default)]
pub struct UnknownStatusTally {
    counts: Mutex<std::collections::HashMap<u16, usize>>,
}

impl UnknownStatusTally {
    pub fn record(&self, status: u16) {
        let mut counts = self.counts.lock().expect("unknown-status tally lock poisoned");
        *counts.entry(status).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> std::collections::HashMap<u16, usize> {
        self.counts.lock().expect("unknown-status tally lock poisoned").clone()
    }
}

/// Evaluates raw responses against a fixed preset of rules.
pub struct RuleEvaluator {
    preset: RulePreset,
    /// Precompiled case-insensitive matcher for `block_keywords`, built
    /// once so every probe response doesn't re-scan the keyword list
    /// linearly by hand.
    keyword_set: RegexSet,
}

impl RuleEvaluator {
    pub fn new(preset: RulePreset) -> Self {
        let patterns: Vec<String> = preset
            .block_keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect();
        let keyword_set = RegexSet::new(&patterns).unwrap_or_else(|_| {
            RegexSet::new(std::iter::empty::<&str>()).expect("empty RegexSet always builds")
        });
        RuleEvaluator { preset, keyword_set }
    }

    pub fn default_preset() -> Self {
        RuleEvaluator::new(DEFAULT_PRESET.clone())
    }

    /// Resolution order per spec.md §4.B: RETRY, then BLOCKED (status or
    /// keyword), then SAFE on 2xx, then UNKNOWN.
    pub fn evaluate(&self, response: &RawResponse) -> (Outcome, Option<Evidence>) {
        if self.preset.retry_status_codes.contains(&response.status) {
            return (Outcome::Retry, None);
        }

        if self.preset.block_status_codes.contains(&response.status) {
            return (
                Outcome::Blocked,
                Some(Evidence::StatusCode { value: response.status.to_string() }),
            );
        }

        let lower = response.body.to_lowercase();
        if let Some(idx) = self.keyword_matches_lower(&lower) {
            let matched = self.preset.block_keywords[idx].clone();
            let context = body_snippet(&response.body, &matched);
            return (Outcome::Blocked, Some(Evidence::Keyword { value: matched, context }));
        }

        if (200..300).contains(&response.status) {
            return (Outcome::Safe, None);
        }

        (Outcome::Unknown, None)
    }

    fn keyword_matches_lower(&self, lower_body: &str) -> Option<usize> {
        self.keyword_set.matches(lower_body).iter().next()
    }
}

/// Extracts a small window of context around the first case-insensitive
/// occurrence of `keyword` inside `body`, for the `evidence.context`
/// field of a downstream `Finding`.
fn body_snippet(body: &str, keyword: &str) -> Option<String> {
    static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    let lower_body = body.to_lowercase();
    let lower_keyword = keyword.to_lowercase();
    let pos = lower_body.find(&lower_keyword)?;
    let start = body[..pos].char_indices().rev().take(30).last().map(|(i, _)| i).unwrap_or(0);
    let end_from = pos + keyword.len();
    let end = body[end_from..]
        .char_indices()
        .take(30)
        .last()
        .map(|(i, c)| end_from + i + c.len_utf8())
        .unwrap_or(body.len());
    Some(WHITESPACE.replace_all(&body[start..end], " ").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval() -> RuleEvaluator {
        RuleEvaluator::default_preset()
    }

    #[test]
    fn retry_takes_priority_over_everything_else() {
        let (outcome, _) = eval().evaluate(&RawResponse { status: 429, body: "blocked".into() });
        assert_eq!(outcome, Outcome::Retry);
    }

    #[test]
    fn status_code_block_without_keyword() {
        let (outcome, evidence) =
            eval().evaluate(&RawResponse { status: 403, body: "nothing interesting".into() });
        assert_eq!(outcome, Outcome::Blocked);
        assert!(matches!(evidence, Some(Evidence::StatusCode { .. })));
    }

    #[test]
    fn keyword_block_on_2xx_status() {
        let (outcome, evidence) = eval().evaluate(&RawResponse {
            status: 200,
            body: "we detected a policy violation in your request".into(),
        });
        assert_eq!(outcome, Outcome::Blocked);
        assert!(matches!(evidence, Some(Evidence::Keyword { .. })));
    }

    #[test]
    fn safe_on_2xx_with_no_match() {
        let (outcome, _) = eval().evaluate(&RawResponse { status: 200, body: "ok".into() });
        assert_eq!(outcome, Outcome::Safe);
    }

    #[test]
    fn unknown_on_unrecognized_status() {
        let (outcome, _) = eval().evaluate(&RawResponse { status: 418, body: "teapot".into() });
        assert_eq!(outcome, Outcome::Unknown);
    }
}
