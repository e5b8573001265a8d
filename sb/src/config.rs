//! Host configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use settingsstore::APP_DIR_NAME;

use crate::coordinator::CoordinatorConfig;

const LOCAL_CONFIG: &str = ".sidebar.yml";
const USER_CONFIG: &str = "sidebar.yml";

/// Host configuration
///
/// Distinct from the settings document: this file describes how the host
/// runs, the settings document describes what the widgets show.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub log_level: Option<String>,

    /// Directory holding the settings, shortcuts and notes documents
    pub data_dir: Option<PathBuf>,

    pub coordinator: CoordinatorConfig,

    pub widgets: WidgetsConfig,
}

/// Which widgets load, and where they go
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WidgetsConfig {
    /// Widget names skipped at discovery (case-insensitive)
    pub disabled: Vec<String>,

    /// Rank overrides on top of the built-in priority table
    pub priorities: HashMap<String, u32>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(LOCAL_CONFIG))
                .chain(Self::user_config_path())
                .collect(),
        };
        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(USER_CONFIG))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.log_level.is_none());
        assert!(config.widgets.disabled.is_empty());
        assert_eq!(config.coordinator.tick_interval_ms, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sidebar.yml");
        fs::write(
            &path,
            "log-level: debug\n\
             data-dir: /tmp/sidebar\n\
             coordinator:\n  settings-ttl-secs: 5\n\
             widgets:\n  disabled: [Weather]\n  priorities:\n    System Monitor: 0\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/sidebar")));
        assert_eq!(config.coordinator.settings_ttl_secs, 5);
        assert_eq!(config.coordinator.tick_interval_ms, 1000);
        assert_eq!(config.widgets.disabled, vec!["Weather".to_string()]);
        assert_eq!(config.widgets.priorities.get("System Monitor"), Some(&0));

        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("debug"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "widgets: [not, a, map]\n").unwrap();
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parse"));
    }
}
