//! Verifier: the three-stage refinement applied to the candidate list
//! produced by macro+micro scanning: (1) re-probe each candidate in
//! isolation and drop hallucinated artifacts, (2) reduce containment
//! relations to their shortest true trigger, (3) recount occurrences
//! against the original input for the final location list.

use crate::model::{Candidate, Finding, Location};
use crate::probe::ProbeClient;
use std::cmp::Ordering;
use std::sync::Arc;

/// Runs all three stages and returns the final findings, sorted by the
/// first location's start offset.
pub async fn run(candidates: Vec<Candidate>, probe: &Arc<ProbeClient>, original: &str) -> Vec<Finding> {
    let verified = verify_isolated(candidates, probe).await;
    let reduced = refine_containment(verified, probe).await;
    let mut findings = recount_occurrences(reduced, original);
    findings.sort_by_key(|f| f.locations.first().map(|l| l.start).unwrap_or(0));
    findings
}

/// Stage 1: drop any candidate whose text, re-probed alone, now comes
/// back `Safe` — a long-phrase artifact caused by context interactions
/// rather than the keyword itself.
async fn verify_isolated(candidates: Vec<Candidate>, probe: &Arc<ProbeClient>) -> Vec<Candidate> {
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match probe.classify_unmasked(&candidate.text).await {
            Ok((outcome, _)) if outcome.is_blocked() => kept.push(candidate),
            _ => {}
        }
    }
    kept
}

/// Stage 2: for every pair `(a, b)` where `a.text` is a proper substring
/// of `b.text`, probe `a.text` alone; if still `Blocked`, `b` is dropped
/// (the shorter `a` is the true trigger). Applied to a fixed point.
/// Deterministic tie-break on equal length: lexicographically smaller
/// wins, matching `candidate_order`.
async fn refine_containment(mut candidates: Vec<Candidate>, probe: &Arc<ProbeClient>) -> Vec<Candidate> {
    loop {
        candidates.sort_by(candidate_order);
        candidates.dedup_by(|a, b| a.text == b.text);

        let mut drop_index = None;
        'outer: for i in 0..candidates.len() {
            for j in 0..candidates.len() {
                if i == j {
                    continue;
                }
                if candidates[i].is_contained_in(&candidates[j]) {
                    if let Ok((outcome, _)) = probe.classify_unmasked(&candidates[i].text).await {
                        if outcome.is_blocked() {
                            drop_index = Some(j);
                            break 'outer;
                        }
                    }
                }
            }
        }

        match drop_index {
            Some(idx) => {
                candidates.remove(idx);
            }
            None => break,
        }
    }
    candidates
}

/// Shorter text first; ties broken lexicographically. Used only to make
/// containment refinement's fixed point deterministic, not attached to
/// `Candidate` as a global ordering.
fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.text.len().cmp(&b.text.len()).then_with(|| a.text.cmp(&b.text))
}

/// Stage 3: for each surviving keyword, scan the *original* input for
/// every non-overlapping occurrence (leftmost-longest), producing the
/// final location list. Evidence is carried over from whichever probe
/// first confirmed the keyword.
fn recount_occurrences(candidates: Vec<Candidate>, original: &str) -> Vec<Finding> {
    let mut findings: Vec<Finding> = Vec::new();

    for candidate in candidates {
        if findings.iter().any(|f| f.keyword == candidate.text) {
            continue;
        }
        let locations = find_all_occurrences(original, &candidate.text);
        if locations.is_empty() {
            continue;
        }
        findings.push(Finding { keyword: candidate.text, locations, evidence: candidate.evidence });
    }

    findings
}

/// Non-overlapping, leftmost-first substring occurrences of `needle` in
/// `haystack`, in character-offset coordinates.
fn find_all_occurrences(haystack: &str, needle: &str) -> Vec<Location> {
    if needle.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = haystack.chars().collect();
    let needle_chars: Vec<char> = needle.chars().collect();
    let nlen = needle_chars.len();
    let mut locations = Vec::new();
    let mut i = 0;
    while i + nlen <= chars.len() {
        if chars[i..i + nlen] == needle_chars[..] {
            locations.push(Location { start: i, end: i + nlen });
            i += nlen;
        } else {
            i += 1;
        }
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigView;
    use crate::mask::MaskRegistry;
    use crate::model::Evidence;
    use crate::rules::RuleEvaluator;
    use crate::transport::MockTransport;

    fn candidate(text: &str, start: usize, end: usize) -> Candidate {
        Candidate {
            text: text.to_string(),
            start,
            end,
            evidence: Evidence::Keyword { value: text.to_string(), context: None },
        }
    }

    fn probe(keywords: &[&str]) -> Arc<ProbeClient> {
        probe_with_mask(keywords).0
    }

    fn probe_with_mask(keywords: &[&str]) -> (Arc<ProbeClient>, Arc<MaskRegistry>) {
        let mask = Arc::new(MaskRegistry::new());
        let client = Arc::new(ProbeClient::new(
            Box::new(MockTransport::new(keywords.iter().map(|s| s.to_string()))),
            RuleEvaluator::default_preset(),
            mask.clone(),
            ConfigView::default(),
        ));
        (client, mask)
    }

    #[tokio::test]
    async fn verification_survives_the_candidate_already_being_masked() {
        // PrecisionScanner adds every keyword it finds to the registry
        // before verification runs; a real candidate must still survive
        // stage 1 even though probing its own text through the masking
        // `classify` would turn it entirely into `*` and read as Safe.
        let (p, mask) = probe_with_mask(&["secret"]);
        mask.add("secret");
        let candidates = vec![candidate("secret", 7, 13)];
        let kept = verify_isolated(candidates, &p).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "secret");
    }

    #[tokio::test]
    async fn hallucinated_candidate_is_dropped() {
        // The oracle only knows "x" as blocking; a candidate claiming a
        // longer phrase that the oracle never actually rejects should be
        // dropped in stage 1.
        let p = probe(&["x"]);
        let candidates = vec![candidate("totally different phrase", 0, 10)];
        let kept = verify_isolated(candidates, &p).await;
        assert!(kept.is_empty());
    }

    #[tokio::test]
    async fn containment_reduces_to_shortest_trigger() {
        let p = probe(&["cat"]);
        let candidates = vec![candidate("black cat", 0, 9), candidate("cat", 6, 9)];
        let reduced = refine_containment(candidates, &p).await;
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].text, "cat");
    }

    #[test]
    fn recount_merges_all_occurrences_in_original() {
        let candidates = vec![candidate("ab", 10, 12)];
        let findings = recount_occurrences(candidates, "xx ab xx ab xx");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations.len(), 2);
    }

    #[tokio::test]
    async fn full_pipeline_dedups_straddled_boundary_keyword() {
        let p = probe(&["secret"]);
        let candidates = vec![candidate("secret", 7, 13)];
        let findings = run(candidates, &p, "0123456secret890").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].locations, vec![Location { start: 7, end: 13 }]);
    }
}
