//! TOML configuration file loading
//!
//! Reads `$HUB_CONFIG` or `~/.config/machine-hub/config.toml`. Every field is
//! optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HubConfigFile {
    /// Edge server base addresses
    #[serde(default)]
    pub peers: Option<Vec<String>>,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub snapshot: SnapshotFileConfig,

    #[serde(default)]
    pub reconcile: ReconcileFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,

    /// Bearer key peers must present
    pub api_key: Option<String>,
}

/// Device snapshot configuration
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotFileConfig {
    pub path: Option<PathBuf>,
    pub enabled: Option<bool>,
}

/// Startup reconciliation configuration
#[derive(Debug, Default, Deserialize)]
pub struct ReconcileFileConfig {
    pub on_start: Option<bool>,
}

/// Load the config file, falling back to defaults when absent or invalid
#[must_use]
pub fn load_config_file() -> HubConfigFile {
    let path = std::env::var("HUB_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    path.map(|p| load_from(&p)).unwrap_or_default()
}

/// Load a specific config file
///
/// A missing file is silent; unreadable or invalid files log a warning
#[must_use]
pub fn load_from(path: &Path) -> HubConfigFile {
    if !path.exists() {
        return HubConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HubConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HubConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/machine-hub/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("machine-hub").join("config.toml"))
}
