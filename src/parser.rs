//! Parsing helpers: reading the input text, an optional layered config
//! file, and an optional rule-preset file. Kept small and
//! dependency-light, the same role this module played in the reference
//! tool it is adapted from (wordlist/user-agent/header file reading
//! there; input text/config/rules here).

use crate::config::ScanConfigInput;
use crate::rules::RulePreset;
use std::fs::read_to_string;
use std::io;

/// Reads the text to scan from a file path, or from stdin if `path` is
/// `None` or `"-"`.
pub fn read_input_text(path: Option<&str>) -> io::Result<String> {
    match path {
        None | Some("-") => io::read_to_string(io::stdin()),
        Some(p) => read_to_string(p),
    }
}

/// Loads a JSON `ScanConfigInput` overlay from disk. Missing keys in the
/// file simply stay `None` and fall through to defaults/CLI overrides.
pub fn load_config_file(path: &str) -> Result<ScanConfigInput, crate::error::ScanError> {
    let content = read_to_string(path)?;
    let input: ScanConfigInput = serde_json::from_str(&content)?;
    Ok(input)
}

/// Loads a JSON `RulePreset` from disk, falling back to the built-in
/// default preset when `path` is `None`.
pub fn load_rule_preset(path: Option<&str>) -> Result<RulePreset, crate::error::ScanError> {
    match path {
        None => Ok(RulePreset::default()),
        Some(p) => {
            let content = read_to_string(p)?;
            let preset: RulePreset = serde_json::from_str(&content)?;
            Ok(preset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rule_preset_falls_back_to_default_when_no_path_given() {
        let preset = load_rule_preset(None).unwrap();
        assert_eq!(preset.block_status_codes, RulePreset::default().block_status_codes);
    }
}
