//! Core data types shared by every component of the scanning engine.
//!
//! These mirror the data model in the design: `Fragment`, `Outcome`,
//! `Candidate`, `Finding` and `MaskEntry` all use the same coordinate
//! system (character offsets into the *original* input text) so that a
//! child produced three recursion levels deep can still be translated
//! back to a position the caller understands.

use serde::{Deserialize, Serialize};

/// A classify() outcome for a single probed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The probe accepted the text.
    Safe,
    /// The probe rejected the text.
    Blocked,
    /// Transient failure; must be reattempted by the caller.
    Retry,
    /// Status code matched no rule. Treated as Safe for progress purposes.
    Unknown,
}

impl Outcome {
    pub fn is_blocked(self) -> bool {
        matches!(self, Outcome::Blocked)
    }
}

/// What caused a candidate to first resolve as `Blocked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evidence {
    /// A body substring matched one of the configured block keywords.
    Keyword { value: String, context: Option<String> },
    /// A bare status code matched the block set, with no keyword hit.
    StatusCode { value: String },
}

/// A view over the input text carrying its absolute base offset, so a
/// recursive child can translate a local position back to a global one.
///
/// Invariant: `text == original[orig_start .. orig_start + text.len()]`
/// once `text` has been unmasked (masking never changes length).
#[derive(Debug, Clone)]
pub struct Fragment {
    pub text: String,
    pub orig_start: usize,
}

impl Fragment {
    pub fn new(text: impl Into<String>, orig_start: usize) -> Self {
        Self { text: text.into(), orig_start }
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Translate a local char offset into this fragment to a global
    /// character offset in the original input.
    pub fn to_global(&self, local: usize) -> usize {
        self.orig_start + local
    }
}

/// A not-yet-verified keyword occurrence produced by the micro phase.
///
/// Invariant at creation: `end - start <= switch_threshold` and
/// `original[start..end] == text` (modulo masking of earlier findings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub evidence: Evidence,
}

impl Candidate {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether `self.text` is a (non-identical) substring of `other.text`.
    pub fn is_contained_in(&self, other: &Candidate) -> bool {
        self.text != other.text && other.text.contains(self.text.as_str())
    }
}

/// A confirmed, half-open character range `[start, end)` in original-text
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

/// Final output of a scan: one entry per confirmed sensitive keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub keyword: String,
    pub locations: Vec<Location>,
    pub evidence: Evidence,
}

/// A keyword string confirmed `Blocked` in isolation at some earlier point
/// in the scan. Non-empty by construction (`MaskRegistry::add` rejects the
/// empty string).
pub type MaskEntry = String;
