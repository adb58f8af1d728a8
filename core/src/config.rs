//! Configuration for the Monitor engine and the passgen application.
//!
//! Both structs deserialize from YAML with every field optional; missing
//! fields take the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;


/// Default bound on nested dispatch (a callback calling `set` which fires a
/// callback which calls `set`, ...).
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 32;


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Mutating calls made while this many dispatches are already on the
    /// stack are rejected.
    pub max_dispatch_depth: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}


/// Top-level `passgen.yaml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    /// Where saved preferences live. `None` means the default location.
    pub preferences_file: Option<PathBuf>,
}


/// Parse an `AppConfig` from YAML text. Empty text yields the defaults.
pub fn parse(content: &str, origin: &Path) -> Result<AppConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}


/// Load an `AppConfig` from a YAML file.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, path)
}


/// Load the config file if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<AppConfig, ConfigError> {
    if path.exists() {
        load(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(AppConfig::default())
    }
}
