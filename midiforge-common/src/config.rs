//! TOML configuration loading and config file resolution
//!
//! Settings priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! This module covers the file tier; the CLI and environment tiers are merged
//! on top of it by the binary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MIDIFORGE_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Augmentation defaults
    #[serde(default)]
    pub augment: AugmentSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[augment]` table; every field falls back to the built-in default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AugmentSection {
    /// Transpose offsets in semitones
    #[serde(default)]
    pub transpose: Option<Vec<i32>>,

    /// Uniform time-stretch factors
    #[serde(default)]
    pub time_stretch: Option<Vec<f64>>,

    /// Parallel worker count
    #[serde(default)]
    pub workers: Option<usize>,

    /// Maximum documents between read and archive write
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    /// Seconds between progress log lines
    #[serde(default)]
    pub progress_interval_secs: Option<u64>,

    /// Extension for output archive entries (without the dot)
    #[serde(default)]
    pub entry_extension: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))?;

    info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}

/// Platform default config file location (`<config_dir>/midiforge/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("midiforge").join("config.toml"))
}

/// Pick the config file to load, if any
///
/// An explicitly named file (CLI argument or `MIDIFORGE_CONFIG`) must exist;
/// the platform default is only used when present.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    match default_config_path() {
        Some(path) if path.is_file() => Ok(Some(path)),
        other => {
            debug!("No config file found (looked for {:?})", other);
            Ok(None)
        }
    }
}

/// Resolve and load the config file, falling back to defaults when none exists
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg)? {
        Some(path) => load_toml_config(&path),
        None => Ok(TomlConfig::default()),
    }
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}
