//! Debugger configuration types.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{DebuggerError, Result};

/// Debugger configuration, usually read from a TOML file.
///
/// ```toml
/// skip = ["stdlib.*", "vendor.?ib"]
/// case_insensitive_paths = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Shell-style patterns over module names; frames of matching modules
    /// never stop on stepping.
    #[serde(default)]
    pub skip: Vec<String>,
    /// Lower-case canonical file names (case-insensitive file systems).
    #[serde(default)]
    pub case_insensitive_paths: bool,
}

impl DebuggerConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DebuggerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DebuggerError::Config(format!("failed to parse config: {}", e)))
    }
}
