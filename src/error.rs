//! Error types for the scanning engine.
//!
//! Why a hand-written enum instead of deriving one? It keeps public
//! function signatures simple (`Result<T, ScanError>`), gives readable
//! `Display` output for the CLI and the `error` event, and lets `?`
//! convert library errors (`io`, `reqwest`, `serde_json`) automatically
//! via `From`.

use std::fmt;

/// A single out-of-bounds or structurally invalid configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OutOfRange { field: &'static str, value: String, min: String, max: String },
    SwitchThresholdTooSmall { switch_threshold: usize, overlap_size: usize },
    EmptyUpstreamUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange { field, value, min, max } => write!(
                f,
                "config field `{field}` = {value} is out of bounds [{min}, {max}]"
            ),
            ConfigError::SwitchThresholdTooSmall { switch_threshold, overlap_size } => write!(
                f,
                "switch_threshold ({switch_threshold}) must be greater than 2 * overlap_size ({overlap_size}), \
                 otherwise macro recursion never shrinks a fragment"
            ),
            ConfigError::EmptyUpstreamUrl => write!(f, "upstream_url must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level error type for the engine and its CLI.
#[derive(Debug)]
pub enum ScanError {
    /// Config failed validation at scan start. No probes are issued.
    Config(ConfigError),
    /// A probe exhausted its retry budget; the scan was aborted.
    ProbeFailed { attempts: usize, reason: String },
    /// A second scan was requested while one was already running on this
    /// coordinator.
    AlreadyRunning,
    Io(std::io::Error),
    Http(reqwest::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Config(e) => write!(f, "configuration error: {e}"),
            ScanError::ProbeFailed { attempts, reason } => {
                write!(f, "probe failed after {attempts} attempt(s): {reason}")
            }
            ScanError::AlreadyRunning => write!(f, "a scan is already running on this coordinator"),
            ScanError::Io(e) => write!(f, "io error: {e}"),
            ScanError::Http(e) => write!(f, "http error: {e}"),
            ScanError::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Config(e) => Some(e),
            ScanError::Io(e) => Some(e),
            ScanError::Http(e) => Some(e),
            ScanError::Json(e) => Some(e),
            ScanError::ProbeFailed { .. } | ScanError::AlreadyRunning => None,
        }
    }
}

impl From<ConfigError> for ScanError {
    fn from(e: ConfigError) -> Self {
        ScanError::Config(e)
    }
}

impl From<std::io::Error> for ScanError {
    fn from(e: std::io::Error) -> Self {
        ScanError::Io(e)
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        ScanError::Http(e)
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::Json(e)
    }
}
