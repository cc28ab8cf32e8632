//! Scan configuration: layered loading, bounds validation, and the
//! immutable snapshot (`ConfigView`) every component is handed at scan
//! start. No hot-reload: a `ConfigView` is frozen once and lives for the
//! duration of a single scan, per the design's ownership rules.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Raw, partially-specified configuration as loaded from a JSON file or
/// CLI flags. Every field is optional so a config file only needs to
/// mention the keys it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfigInput {
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<usize>,
    pub chunk_size: Option<usize>,
    pub overlap_size: Option<usize>,
    pub min_granularity: Option<usize>,
    pub switch_threshold: Option<usize>,
    pub max_recursion_depth: Option<usize>,
    pub enable_triple_probe: Option<bool>,
    pub enable_middle_chunk_probe: Option<bool>,
    pub middle_chunk_overlap_factor: Option<f64>,
    pub enable_deduplication: Option<bool>,
    pub dedup_overlap_threshold: Option<f64>,
    pub dedup_adjacent_distance: Option<usize>,
    pub jitter: Option<f64>,
}

impl ScanConfigInput {
    /// Merge `other` on top of `self`: any field `other` sets wins.
    pub fn layer(self, other: ScanConfigInput) -> ScanConfigInput {
        ScanConfigInput {
            concurrency: other.concurrency.or(self.concurrency),
            timeout_seconds: other.timeout_seconds.or(self.timeout_seconds),
            max_retries: other.max_retries.or(self.max_retries),
            chunk_size: other.chunk_size.or(self.chunk_size),
            overlap_size: other.overlap_size.or(self.overlap_size),
            min_granularity: other.min_granularity.or(self.min_granularity),
            switch_threshold: other.switch_threshold.or(self.switch_threshold),
            max_recursion_depth: other.max_recursion_depth.or(self.max_recursion_depth),
            enable_triple_probe: other.enable_triple_probe.or(self.enable_triple_probe),
            enable_middle_chunk_probe: other
                .enable_middle_chunk_probe
                .or(self.enable_middle_chunk_probe),
            middle_chunk_overlap_factor: other
                .middle_chunk_overlap_factor
                .or(self.middle_chunk_overlap_factor),
            enable_deduplication: other.enable_deduplication.or(self.enable_deduplication),
            dedup_overlap_threshold: other
                .dedup_overlap_threshold
                .or(self.dedup_overlap_threshold),
            dedup_adjacent_distance: other
                .dedup_adjacent_distance
                .or(self.dedup_adjacent_distance),
            jitter: other.jitter.or(self.jitter),
        }
    }
}

/// Immutable, fully-resolved configuration snapshot. Shared (`Clone` is
/// cheap: every field is `Copy`) across every task of a single scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfigView {
    pub concurrency: usize,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub min_granularity: usize,
    pub switch_threshold: usize,
    pub max_recursion_depth: usize,
    pub enable_triple_probe: bool,
    pub enable_middle_chunk_probe: bool,
    pub middle_chunk_overlap_factor: f64,
    pub enable_deduplication: bool,
    pub dedup_overlap_threshold: f64,
    pub dedup_adjacent_distance: usize,
    pub jitter: f64,
}

impl Default for ConfigView {
    fn default() -> Self {
        ConfigView {
            concurrency: 15,
            timeout_seconds: 30,
            max_retries: 3,
            chunk_size: 30_000,
            overlap_size: 12,
            min_granularity: 1,
            switch_threshold: 35,
            max_recursion_depth: 30,
            enable_triple_probe: true,
            enable_middle_chunk_probe: true,
            middle_chunk_overlap_factor: 1.0,
            enable_deduplication: true,
            dedup_overlap_threshold: 0.5,
            dedup_adjacent_distance: 30,
            jitter: 0.5,
        }
    }
}

macro_rules! check_range {
    ($errors:ident, $field:literal, $value:expr, $min:expr, $max:expr) => {
        if $value < $min || $value > $max {
            $errors.push(ConfigError::OutOfRange {
                field: $field,
                value: format!("{:?}", $value),
                min: format!("{:?}", $min),
                max: format!("{:?}", $max),
            });
        }
    };
}

impl ConfigView {
    /// Layer `input` over the defaults and validate the result, producing
    /// a frozen `ConfigView` or the full list of bound violations.
    pub fn resolve(input: ScanConfigInput) -> Result<ConfigView, Vec<ConfigError>> {
        let defaults = ConfigView::default();
        let view = ConfigView {
            concurrency: input.concurrency.unwrap_or(defaults.concurrency),
            timeout_seconds: input.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            max_retries: input.max_retries.unwrap_or(defaults.max_retries),
            chunk_size: input.chunk_size.unwrap_or(defaults.chunk_size),
            overlap_size: input.overlap_size.unwrap_or(defaults.overlap_size),
            min_granularity: input.min_granularity.unwrap_or(defaults.min_granularity),
            switch_threshold: input.switch_threshold.unwrap_or(defaults.switch_threshold),
            max_recursion_depth: input
                .max_recursion_depth
                .unwrap_or(defaults.max_recursion_depth),
            enable_triple_probe: input
                .enable_triple_probe
                .unwrap_or(defaults.enable_triple_probe),
            enable_middle_chunk_probe: input
                .enable_middle_chunk_probe
                .unwrap_or(defaults.enable_middle_chunk_probe),
            middle_chunk_overlap_factor: input
                .middle_chunk_overlap_factor
                .unwrap_or(defaults.middle_chunk_overlap_factor),
            enable_deduplication: input
                .enable_deduplication
                .unwrap_or(defaults.enable_deduplication),
            dedup_overlap_threshold: input
                .dedup_overlap_threshold
                .unwrap_or(defaults.dedup_overlap_threshold),
            dedup_adjacent_distance: input
                .dedup_adjacent_distance
                .unwrap_or(defaults.dedup_adjacent_distance),
            jitter: input.jitter.unwrap_or(defaults.jitter),
        };

        let mut errors = Vec::new();
        check_range!(errors, "concurrency", view.concurrency, 1, 50);
        check_range!(errors, "timeout_seconds", view.timeout_seconds, 1, 120);
        check_range!(errors, "max_retries", view.max_retries, 1, 10);
        check_range!(errors, "chunk_size", view.chunk_size, 100, 1_000_000);
        check_range!(errors, "overlap_size", view.overlap_size, 0, 1000);
        check_range!(errors, "min_granularity", view.min_granularity, 1, 10);
        check_range!(errors, "switch_threshold", view.switch_threshold, 20, 100);
        check_range!(errors, "max_recursion_depth", view.max_recursion_depth, 1, 100);
        check_range!(
            errors,
            "middle_chunk_overlap_factor",
            view.middle_chunk_overlap_factor,
            0.5,
            2.0
        );
        check_range!(errors, "dedup_overlap_threshold", view.dedup_overlap_threshold, 0.0, 1.0);
        check_range!(errors, "jitter", view.jitter, 0.0, 1.0);

        if view.switch_threshold <= 2 * view.overlap_size {
            errors.push(ConfigError::SwitchThresholdTooSmall {
                switch_threshold: view.switch_threshold,
                overlap_size: view.overlap_size,
            });
        }

        if errors.is_empty() {
            Ok(view)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let view = ConfigView::resolve(ScanConfigInput::default()).unwrap();
        assert_eq!(view.concurrency, 15);
        assert_eq!(view.switch_threshold, 35);
    }

    #[test]
    fn rejects_switch_threshold_not_exceeding_double_overlap() {
        let input = ScanConfigInput {
            switch_threshold: Some(20),
            overlap_size: Some(10),
            ..Default::default()
        };
        let errors = ConfigView::resolve(input).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ConfigError::SwitchThresholdTooSmall { .. }))
        );
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let input = ScanConfigInput { concurrency: Some(0), ..Default::default() };
        let errors = ConfigView::resolve(input).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::OutOfRange { field, .. } if *field == "concurrency")));
    }

    #[test]
    fn layering_prefers_override() {
        let base = ScanConfigInput { concurrency: Some(5), ..Default::default() };
        let override_ = ScanConfigInput { concurrency: Some(9), ..Default::default() };
        let merged = base.layer(override_);
        assert_eq!(merged.concurrency, Some(9));
    }
}
