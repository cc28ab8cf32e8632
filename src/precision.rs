//! PrecisionScanner: the micro phase. On a short `Blocked` fragment,
//! locates the next keyword occurrence via a forward scan (exponential
//! then binary search for the minimal blocking prefix) followed by a
//! left squeeze (contract the start while the end stays fixed).

use crate::config::ConfigView;
use crate::mask::MaskRegistry;
use crate::model::{Candidate, Fragment};
use crate::probe::ProbeClient;
use std::sync::Arc;

/// Scans `fragment` end to end, emitting one `Candidate` per keyword
/// occurrence found, masking each into the registry as it's confirmed so
/// later probes in the same fragment benefit from it.
pub async fn scan_fragment(
    fragment: Fragment,
    probe: &Arc<ProbeClient>,
    mask: &Arc<MaskRegistry>,
    config: &ConfigView,
    out: &mut Vec<Candidate>,
) {
    let chars: Vec<char> = fragment.text.chars().collect();
    let mut cursor = 0usize;

    loop {
        let tail = &chars[cursor..];
        if tail.len() < config.min_granularity {
            return;
        }

        let Some(end) = expand_right_edge(tail, probe, config).await else {
            return;
        };
        if end < config.min_granularity {
            probe.emit_warning(format!(
                "granularity floor reached: blocking prefix of length {end} is below min_granularity ({}); remaining fragment dropped",
                config.min_granularity
            ));
            return;
        }

        let Some(start) = contract_left_edge(tail, end, probe, config).await else {
            return;
        };
        if end - start < config.min_granularity {
            probe.emit_warning(format!(
                "granularity floor reached: squeezed keyword of length {} is below min_granularity ({}); remaining fragment dropped",
                end - start,
                config.min_granularity
            ));
            return;
        }

        let text: String = tail[start..end].iter().collect();
        let global_start = fragment.to_global(cursor + start);
        let global_end = fragment.to_global(cursor + end);

        // The rule that first confirmed this exact span `Blocked` — the
        // left-squeeze loop above already probed `text` itself as its
        // final step, so this normally hits the probe cache rather than
        // issuing a fresh request.
        let evidence = match probe.classify(&text).await {
            Ok((_, Some(evidence))) => evidence,
            _ => crate::model::Evidence::Keyword { value: text.clone(), context: None },
        };

        mask.add(text.clone());

        out.push(Candidate { text, start: global_start, end: global_end, evidence });

        cursor += end;
        if cursor >= chars.len() {
            return;
        }
    }
}

/// Find the smallest prefix length `k` such that `tail[0..k]` probes
/// `Blocked`, using exponential probing (1, 2, 4, 8, ...) to find a
/// bracket, then binary search within it for the exact minimum.
async fn expand_right_edge(
    tail: &[char],
    probe: &Arc<ProbeClient>,
    _config: &ConfigView,
) -> Option<usize> {
    let max_len = tail.len();
    let mut k = 1usize;
    let mut prev = 0usize;

    loop {
        let candidate_len = k.min(max_len);
        let text: String = tail[..candidate_len].iter().collect();
        let (outcome, _) = probe.classify(&text).await.ok()?;
        if outcome.is_blocked() {
            return Some(binary_search_min_blocked(tail, prev, candidate_len, probe).await?);
        }
        if candidate_len == max_len {
            return None;
        }
        prev = candidate_len;
        k = (k * 2).min(max_len.max(1));
        if k == prev {
            k = max_len;
        }
    }
}

/// Binary search the minimal blocking prefix length within `(lo, hi]`,
/// where `tail[..lo]` is known `Safe` (or `lo == 0`) and `tail[..hi]` is
/// known `Blocked`.
async fn binary_search_min_blocked(
    tail: &[char],
    mut lo: usize,
    mut hi: usize,
    probe: &Arc<ProbeClient>,
) -> Option<usize> {
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let text: String = tail[..mid].iter().collect();
        let (outcome, _) = probe.classify(&text).await.ok()?;
        if outcome.is_blocked() {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(hi)
}

/// Holding `end` fixed, find the greatest `s` such that `tail[s..end]`
/// is still `Blocked` (and `s + 1` is `Safe`), via exponential-then-binary
/// search growing `s` from 0.
async fn contract_left_edge(
    tail: &[char],
    end: usize,
    probe: &Arc<ProbeClient>,
    config: &ConfigView,
) -> Option<usize> {
    let ceiling = end.saturating_sub(config.min_granularity);
    if ceiling == 0 {
        return Some(0);
    }

    let mut step = 1usize;
    let mut lo = 0usize; // tail[lo..end] known Blocked
    let mut hi = None::<usize>; // smallest s probed Safe so far

    loop {
        let probe_s = step.min(ceiling);
        let text: String = tail[probe_s..end].iter().collect();
        let (outcome, _) = probe.classify(&text).await.ok()?;
        if outcome.is_blocked() {
            lo = probe_s;
            if probe_s == ceiling {
                break;
            }
            step = (step * 2).min(ceiling.max(1));
            if step == probe_s {
                step = ceiling;
            }
        } else {
            hi = Some(probe_s);
            break;
        }
    }

    let Some(mut hi) = hi else {
        return Some(lo);
    };
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let text: String = tail[mid..end].iter().collect();
        let (outcome, _) = probe.classify(&text).await.ok()?;
        if outcome.is_blocked() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(lo)
}
