//! Path utilities for cue-engine configuration files.

use std::path::PathBuf;

/// Default directory for engine configuration: `~/.config/cue-engine`.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("cue-engine")
}

/// Default config file path for a given filename, under
/// [`default_config_dir`].
///
/// # Arguments
/// * `filename` - Config file name (e.g., "engine.yaml").
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
