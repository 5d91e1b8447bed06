//! Session configuration (config.json).
//!
//! {
//!   "dialect": "sam",
//!   "tracked_sections": ["Resources", "Conditions"],
//!   "sweep_unowned": true
//! }

use crate::action::Dialect;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub dialect: Dialect,

    /// Top-level sections whose entries are tracked for ownership.
    pub tracked_sections: Vec<String>,

    /// Delete a removed entity's entries; when off they stay as unmanaged.
    pub sweep_unowned: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            tracked_sections: ["Resources", "Conditions", "Parameters", "Outputs"]
                .map(String::from)
                .to_vec(),
            sweep_unowned: true,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn is_tracked(&self, section: &str) -> bool {
        self.tracked_sections.iter().any(|s| s == section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_files_fill_in_defaults() {
        let cfg = SessionConfig::from_json_str(r#"{"dialect": "serverless"}"#).unwrap();
        assert_eq!(cfg.dialect, Dialect::Serverless);
        assert!(cfg.sweep_unowned);
        assert!(cfg.is_tracked("Outputs"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(SessionConfig::from_json_str(r#"{"dialects": "sam"}"#).is_err());
        assert!(SessionConfig::from_json_str(r#"{"dialect": "terraform"}"#).is_err());
    }
}
