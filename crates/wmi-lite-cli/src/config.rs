//! Configuration and snapshot loading

use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use wmi_lite_provider::{MemoryProvider, Snapshot};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot file served by the in-memory provider
    pub snapshot: Option<PathBuf>,
    /// Namespace to query (defaults to `root/cimv2`)
    pub namespace: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot: None,
            namespace: None,
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// A relative `snapshot` path is resolved against the config file's
    /// directory.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::parse(&content)
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;

        if let (Some(snapshot), Some(dir)) = (&config.snapshot, path.parent())
            && snapshot.is_relative()
        {
            config.snapshot = Some(dir.join(snapshot));
        }

        Ok(config)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Find a config file in the default locations
    ///
    /// Checks `WMI_LITE_CONFIG`, then `wmi-lite.toml` in the working
    /// directory, then `wmi-lite/wmi-lite.toml` under the user config dir.
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WMI_LITE_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let paths = [
            Some(PathBuf::from("wmi-lite.toml")),
            dirs::config_dir().map(|p| p.join("wmi-lite/wmi-lite.toml")),
        ];

        paths.into_iter().flatten().find(|path| path.exists())
    }
}

/// Load a snapshot file into an in-memory provider
///
/// Files ending in `.json` are read as JSON, anything else as TOML.
///
/// # Errors
/// Returns error if the file cannot be read or parsed
pub fn load_snapshot(path: &Path) -> eyre::Result<MemoryProvider> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read snapshot {}", path.display()))?;
    let json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let snapshot = parse_snapshot(&content, json)
        .wrap_err_with(|| format!("failed to parse snapshot {}", path.display()))?;
    Ok(MemoryProvider::from_snapshot(snapshot))
}

fn parse_snapshot(content: &str, json: bool) -> eyre::Result<Snapshot> {
    if json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(toml::from_str(content)?)
    }
}
