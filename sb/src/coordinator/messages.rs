//! Events and metrics published by the Coordinator

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use settingsstore::SettingsData;

/// What caused a settings change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeSource {
    /// Explicit `update_settings` call
    Update,
    /// Background reload after the cache expired
    Reload,
}

/// Events broadcast to every `subscribe_events` receiver
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A new settings snapshot is now cached
    SettingsChanged {
        snapshot: Arc<SettingsData>,
        source: ChangeSource,
    },

    /// One master tick finished dispatching
    MasterTick(TickReport),
}

/// Outcome of one master tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TickReport {
    /// Subscribers invoked this tick
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    /// Due subscribers skipped because their previous run had not finished
    pub skipped_in_flight: usize,
    pub elapsed: Duration,
}

impl TickReport {
    pub fn failures(&self) -> usize {
        self.failed + self.panicked
    }
}

/// Coordinator metrics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorMetrics {
    pub ticks: u64,
    pub invocations: u64,
    pub failures: u64,
    pub skipped_in_flight: u64,
    pub registered_subscribers: usize,
    pub reloads: u64,
    pub reload_failures: u64,
    pub settings_notifications: u64,
    pub http_clients_built: u64,
    pub saves_queued: u64,
    pub saves_written: u64,
    pub saves_coalesced: u64,
    pub saves_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_report_failures() {
        let report = TickReport {
            dispatched: 4,
            succeeded: 1,
            failed: 2,
            panicked: 1,
            ..Default::default()
        };
        assert_eq!(report.failures(), 3);
    }

    #[test]
    fn test_metrics_serialize_kebab_case() {
        let metrics = CoordinatorMetrics {
            saves_coalesced: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["saves-coalesced"], 2);
    }
}
