//! BinarySearcher: the macro phase. Recursively narrows a `Blocked`
//! fragment into pieces at most `switch_threshold` characters long, each
//! individually confirmed `Blocked`, then hands each to the micro phase.

use crate::mask::MaskRegistry;
use crate::model::{Candidate, Fragment};
use crate::precision::scan_fragment;
use crate::probe::ProbeClient;
use crate::config::ConfigView;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Runs the macro phase on a fragment already known to be `Blocked`,
/// appending every confirmed keyword `Candidate` it (directly, or via the
/// micro phase) discovers to `out`.
///
/// Returns a boxed future: `narrow` calls itself on each blocked child,
/// and an `async fn` cannot directly recurse into its own unboxed future
/// (the resulting state machine would be infinitely sized).
pub fn narrow<'a>(
    fragment: Fragment,
    probe: &'a Arc<ProbeClient>,
    mask: &'a Arc<MaskRegistry>,
    config: &'a ConfigView,
    depth: usize,
    out: &'a mut Vec<Candidate>,
) -> BoxFuture<'a, ()> {
    Box::pin(narrow_inner(fragment, probe, mask, config, depth, out))
}

async fn narrow_inner(
    fragment: Fragment,
    probe: &Arc<ProbeClient>,
    mask: &Arc<MaskRegistry>,
    config: &ConfigView,
    depth: usize,
    out: &mut Vec<Candidate>,
) {
    if depth >= config.max_recursion_depth && fragment.len() > config.switch_threshold {
        probe.emit_warning(format!(
            "recursion cap ({}) reached on a {}-character fragment; handing off to the micro phase regardless of length",
            config.max_recursion_depth,
            fragment.len()
        ));
    }

    if fragment.len() <= config.switch_threshold || depth >= config.max_recursion_depth {
        scan_fragment(fragment, probe, mask, config, out).await;
        return;
    }

    let chars: Vec<char> = fragment.text.chars().collect();
    let len = chars.len();
    let mid = len / 2;
    let overlap = config.overlap_size;

    let left_end = (mid + overlap).min(len);
    let left = slice_fragment(&fragment, &chars, 0, left_end);

    let right_start = mid.saturating_sub(overlap);
    let right = slice_fragment(&fragment, &chars, right_start, len);

    let middle = if config.enable_middle_chunk_probe {
        let half_width = ((config.middle_chunk_overlap_factor * overlap as f64).ceil() as usize).max(1);
        let m_start = mid.saturating_sub(half_width);
        let m_end = (mid + half_width).min(len);
        if m_end > m_start {
            Some(slice_fragment(&fragment, &chars, m_start, m_end))
        } else {
            None
        }
    } else {
        None
    };

    if config.enable_triple_probe {
        let (outcome, _) = probe.classify(&fragment.text).await.unwrap_or((crate::model::Outcome::Blocked, None));
        let _ = outcome; // the full-fragment probe is informational; parent BLOCKED status is already known
    }

    let mut pieces = vec![left, right];
    if let Some(m) = middle {
        pieces.push(m);
    }

    let mut futures = Vec::with_capacity(pieces.len());
    for piece in &pieces {
        futures.push(probe.classify(&piece.text));
    }
    let results = futures::future::join_all(futures).await;

    let mut any_blocked = false;
    for (piece, result) in pieces.into_iter().zip(results.into_iter()) {
        match result {
            Ok((outcome, _)) if outcome.is_blocked() => {
                any_blocked = true;
                narrow(piece, probe, mask, config, depth + 1, out).await;
            }
            _ => {}
        }
    }

    if !any_blocked {
        // A keyword straddled both halves and overlap didn't cover it.
        scan_fragment(fragment, probe, mask, config, out).await;
    }
}

fn slice_fragment(parent: &Fragment, chars: &[char], start: usize, end: usize) -> Fragment {
    let text: String = chars[start..end].iter().collect();
    Fragment::new(text, parent.to_global(start))
}
