//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Base resolution of the master tick in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How long a cached settings snapshot stays fresh
    #[serde(default = "default_settings_ttl_secs")]
    pub settings_ttl_secs: u64,

    /// Request timeout for the shared HTTP client
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// User-Agent header sent by the shared HTTP client
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Window during which saves for the same document are merged
    #[serde(default = "default_save_coalesce_ms")]
    pub save_coalesce_ms: u64,

    /// Broadcast channel capacity for coordinator events
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_settings_ttl_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("gtt-sidebar/{}", env!("CARGO_PKG_VERSION"))
}

fn default_save_coalesce_ms() -> u64 {
    50
}

fn default_event_buffer() -> usize {
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            settings_ttl_secs: default_settings_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
            save_coalesce_ms: default_save_coalesce_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn settings_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn save_coalesce(&self) -> Duration {
        Duration::from_millis(self.save_coalesce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.settings_ttl(), Duration::from_secs(30));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.save_coalesce(), Duration::from_millis(50));
        assert_eq!(config.event_buffer, 256);
        assert!(config.user_agent.starts_with("gtt-sidebar/"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("settings-ttl-secs: 5\nsave-coalesce-ms: 10\n").unwrap();
        assert_eq!(config.settings_ttl(), Duration::from_secs(5));
        assert_eq!(config.save_coalesce(), Duration::from_millis(10));
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn test_zero_tick_interval_is_floored() {
        let config = CoordinatorConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
