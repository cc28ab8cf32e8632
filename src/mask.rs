//! MaskRegistry: process-lifetime (scan-lifetime) store of confirmed
//! sensitive substrings. Produces masked views of text so ProbeClient can
//! suppress already-known triggers while keeping the absolute coordinate
//! system intact (masking is always equal-length).

use std::sync::Mutex;

const MASK_CHAR: char = '*';

/// Shared-mutable registry of confirmed keywords for a single scan.
///
/// A single mutex guards both `add` and `apply`, which is the "acceptable"
/// option the design calls out explicitly: reads never observe a
/// partially-added keyword because both operations take the same lock.
pub struct MaskRegistry {
    keywords: Mutex<Vec<String>>,
}

impl MaskRegistry {
    pub fn new() -> Self {
        MaskRegistry { keywords: Mutex::new(Vec::new()) }
    }

    /// Insert `keyword`, no-op on duplicate or empty string.
    pub fn add(&self, keyword: impl Into<String>) {
        let keyword = keyword.into();
        if keyword.is_empty() {
            return;
        }
        let mut guard = self.keywords.lock().expect("mask registry lock poisoned");
        if !guard.iter().any(|k| k == &keyword) {
            guard.push(keyword);
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.lock().expect("mask registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.keywords.lock().expect("mask registry lock poisoned").clone()
    }

    /// Replace every non-overlapping occurrence of every registered
    /// keyword with `*` of equal length. Longest-first iteration gives
    /// deterministic leftmost-longest masking when matches overlap.
    pub fn apply(&self, text: &str) -> String {
        let mut keywords = self.snapshot();
        keywords.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        mask_with(text, &keywords)
    }

    /// Whether `text`, after masking, contains any non-mask character.
    pub fn fully_masked_is_empty(&self, text: &str) -> bool {
        let masked = self.apply(text);
        masked.is_empty() || masked.chars().all(|c| c == MASK_CHAR)
    }
}

impl Default for MaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure masking function, split out from `MaskRegistry::apply` so it is
/// independently unit-testable and benchmarkable without constructing a
/// registry.
pub fn mask_with(text: &str, keywords_longest_first: &[String]) -> String {
    if keywords_longest_first.is_empty() || text.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut masked = vec![false; chars.len()];

    for keyword in keywords_longest_first {
        if keyword.is_empty() {
            continue;
        }
        let kw_chars: Vec<char> = keyword.chars().collect();
        let klen = kw_chars.len();
        if klen == 0 || klen > chars.len() {
            continue;
        }
        let mut i = 0;
        while i + klen <= chars.len() {
            if masked[i..i + klen].iter().any(|&m| m) {
                i += 1;
                continue;
            }
            if chars[i..i + klen] == kw_chars[..] {
                for slot in masked.iter_mut().take(i + klen).skip(i) {
                    *slot = true;
                }
                i += klen;
            } else {
                i += 1;
            }
        }
    }

    chars
        .iter()
        .zip(masked.iter())
        .map(|(&c, &m)| if m { MASK_CHAR } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_masks_equal_length() {
        let reg = MaskRegistry::new();
        reg.add("foo");
        let masked = reg.apply("hello foo world");
        assert_eq!(masked, "hello *** world");
        assert_eq!(masked.len(), "hello foo world".len());
    }

    #[test]
    fn apply_is_idempotent() {
        let reg = MaskRegistry::new();
        reg.add("secret");
        let once = reg.apply("a secret here");
        let twice = reg.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let reg = MaskRegistry::new();
        reg.add("x");
        reg.add("x");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn longest_first_prevents_short_keyword_fragmenting_a_longer_match() {
        let reg = MaskRegistry::new();
        reg.add("cat");
        reg.add("black cat");
        let masked = reg.apply("a black cat sat");
        assert_eq!(masked, "a ********* sat");
    }

    #[test]
    fn fully_masked_detection() {
        let reg = MaskRegistry::new();
        reg.add("foo");
        assert!(reg.fully_masked_is_empty("foo"));
        assert!(reg.fully_masked_is_empty(""));
        assert!(!reg.fully_masked_is_empty("foo bar"));
    }
}
