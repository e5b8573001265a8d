//! CPU, RAM and network latency monitor

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use settingsstore::SystemMonitorSettings;
use sysinfo::System;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::SYSTEM_MONITOR;
use crate::coordinator::{Coordinator, CoordinatorEvent};
use crate::lifecycle::{WidgetContext, WidgetFactory};
use crate::widget::{InitPhase, PeriodicSubscriber, Surface, Widget, WidgetError, WidgetMetadata};

/// Latency probe target
const PROBE_URL: &str = "https://dns.google";
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

const FIVE_MINUTES_SECS: u64 = 5 * 60;
const ONE_HOUR_SECS: u64 = 60 * 60;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One reading of the machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub cpu_pct: f32,
    pub ram_pct: f32,
    /// Round trip in milliseconds; `None` when the probe failed
    pub ping_ms: Option<f64>,
}

/// Which readings exceed their thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alerts {
    pub cpu: bool,
    pub ram: bool,
    pub ping: bool,
}

impl Alerts {
    pub fn any(&self) -> bool {
        self.cpu || self.ram || self.ping
    }
}

/// Compare a sample against thresholds; a reading alerts only when strictly above
pub fn evaluate(sample: &Sample, thresholds: &SystemMonitorSettings) -> Alerts {
    Alerts {
        cpu: sample.cpu_pct > thresholds.cpu_threshold as f32,
        ram: sample.ram_pct > thresholds.ram_threshold as f32,
        ping: sample.ping_ms.is_some_and(|ms| ms > thresholds.ping_threshold as f64),
    }
}

/// Bounded sample history with trailing averages
#[derive(Debug, Clone)]
pub struct History {
    values: VecDeque<f64>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    /// Sized to hold one hour of samples taken every `frequency_secs`
    pub fn for_frequency(frequency_secs: u64) -> Self {
        Self::new((ONE_HOUR_SECS / frequency_secs.max(1)) as usize)
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the most recent `count` samples, or of all when fewer exist
    pub fn average_last(&self, count: usize) -> Option<f64> {
        if self.values.is_empty() || count == 0 {
            return None;
        }
        let take = count.min(self.values.len());
        let sum: f64 = self.values.iter().rev().take(take).sum();
        Some(sum / take as f64)
    }
}

/// Trailing ping averages shown under the live readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingAverages {
    pub five_minutes: Option<f64>,
    /// Only reported once a full hour of samples exists
    pub one_hour: Option<f64>,
}

pub fn ping_averages(history: &History, frequency_secs: u64) -> PingAverages {
    let frequency_secs = frequency_secs.max(1);
    let five = (FIVE_MINUTES_SECS / frequency_secs) as usize;
    let hour = (ONE_HOUR_SECS / frequency_secs) as usize;
    PingAverages {
        five_minutes: history.average_last(five),
        one_hour: if history.len() >= hour {
            history.average_last(hour)
        } else {
            None
        },
    }
}

pub fn render(sample: &Sample, alerts: &Alerts, averages: &PingAverages) -> Vec<String> {
    let mark = |alert: bool| if alert { " !" } else { "" };
    let ping = match sample.ping_ms {
        Some(ms) => format!("Ping {:.0}ms{}", ms, mark(alerts.ping)),
        None => "Ping N/A".to_string(),
    };
    let avg = |value: Option<f64>| match value {
        Some(ms) => format!("{:.1}ms", ms),
        None => "(collecting data...)".to_string(),
    };
    vec![
        format!("CPU {:.0}%{}", sample.cpu_pct, mark(alerts.cpu)),
        format!("RAM {:.0}%{}", sample.ram_pct, mark(alerts.ram)),
        ping,
        format!("Avg 5m {} / 1h {}", avg(averages.five_minutes), avg(averages.one_hour)),
    ]
}

/// Periodic half; replaced whenever the sampling frequency changes
struct Sampler {
    coordinator: Coordinator,
    surface: Surface,
    system: Arc<Mutex<System>>,
    pings: Arc<Mutex<History>>,
    frequency_secs: u64,
}

impl Sampler {
    fn read_system(&self) -> (f32, f32) {
        let mut system = lock(&self.system);
        system.refresh_cpu_usage();
        system.refresh_memory();
        let total = system.total_memory();
        let ram_pct = if total == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
        };
        (system.global_cpu_usage(), ram_pct)
    }

    async fn probe(&self) -> Option<f64> {
        let client = match self.coordinator.shared_client() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "No HTTP client for latency probe");
                return None;
            }
        };
        let started = Instant::now();
        match client.head(PROBE_URL).timeout(PROBE_TIMEOUT).send().await {
            Ok(_) => Some(started.elapsed().as_secs_f64() * 1000.0),
            Err(e) => {
                debug!(error = %e, "Sampler::probe: failed");
                None
            }
        }
    }
}

#[async_trait]
impl PeriodicSubscriber for Sampler {
    fn name(&self) -> &str {
        SYSTEM_MONITOR
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.frequency_secs)
    }

    async fn on_tick(&self) -> Result<(), WidgetError> {
        let (cpu_pct, ram_pct) = self.read_system();
        let ping_ms = self.probe().await;
        let sample = Sample {
            cpu_pct,
            ram_pct,
            ping_ms,
        };

        let settings = self.coordinator.current_settings().await;
        let alerts = evaluate(&sample, &settings.system_monitor);
        if alerts.any() {
            debug!(?sample, ?alerts, "Sampler::on_tick: threshold exceeded");
        }

        let averages = {
            let mut pings = lock(&self.pings);
            if let Some(ms) = ping_ms {
                pings.push(ms);
            }
            ping_averages(&pings, self.frequency_secs)
        };
        self.surface.set_lines(render(&sample, &alerts, &averages));
        Ok(())
    }
}

struct MonitorState {
    coordinator: Coordinator,
    surface: Surface,
    system: Arc<Mutex<System>>,
    pings: Arc<Mutex<History>>,
    current: Mutex<Arc<Sampler>>,
}

impl MonitorState {
    fn sampler(&self, frequency_secs: u64) -> Arc<Sampler> {
        Arc::new(Sampler {
            coordinator: self.coordinator.clone(),
            surface: self.surface.clone(),
            system: self.system.clone(),
            pings: self.pings.clone(),
            frequency_secs,
        })
    }

    /// Swap in a sampler for the new frequency, keeping the registration if there was one
    fn apply_frequency(&self, frequency_secs: u64) {
        let replacement = self.sampler(frequency_secs);
        let previous = {
            let mut current = lock(&self.current);
            if current.frequency_secs == frequency_secs {
                return;
            }
            std::mem::replace(&mut *current, replacement.clone())
        };
        info!(
            from = previous.frequency_secs,
            to = frequency_secs,
            "System monitor frequency changed"
        );

        *lock(&self.pings) = History::for_frequency(frequency_secs);
        let previous: Arc<dyn PeriodicSubscriber> = previous;
        if self.coordinator.unsubscribe(&previous) {
            let replacement: Arc<dyn PeriodicSubscriber> = replacement;
            let interval = replacement.interval();
            if let Err(e) = self.coordinator.subscribe(replacement, interval) {
                warn!(error = %e, "Failed to resubscribe system monitor");
            }
        }
    }
}

pub struct SystemMonitorWidget {
    state: Arc<MonitorState>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SystemMonitorWidget {
    pub fn new(coordinator: Coordinator) -> Self {
        let frequency_secs = coordinator.settings().system_monitor.update_frequency_seconds.max(1) as u64;
        let surface = Surface::new();
        let system = Arc::new(Mutex::new(System::new()));
        let pings = Arc::new(Mutex::new(History::for_frequency(frequency_secs)));
        let first = Arc::new(Sampler {
            coordinator: coordinator.clone(),
            surface: surface.clone(),
            system: system.clone(),
            pings: pings.clone(),
            frequency_secs,
        });
        Self {
            state: Arc::new(MonitorState {
                coordinator,
                surface,
                system,
                pings,
                current: Mutex::new(first),
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn describe() -> WidgetMetadata {
        WidgetMetadata::builtin("CPU, memory and network latency with alert thresholds")
            .depends_on(["http-client", "settings"])
    }

    pub fn factory() -> WidgetFactory {
        WidgetFactory::new(SYSTEM_MONITOR, InitPhase::Remote, |ctx: &WidgetContext| {
            Ok(Arc::new(SystemMonitorWidget::new(ctx.coordinator.clone())) as Arc<dyn Widget>)
        })
        .with_metadata(Self::describe())
    }

    fn current(&self) -> Arc<Sampler> {
        lock(&self.state.current).clone()
    }

    fn spawn_listener(&self) -> JoinHandle<()> {
        let state = self.state.clone();
        let mut events = state.coordinator.subscribe_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CoordinatorEvent::SettingsChanged { snapshot, .. }) => {
                        let frequency_secs = snapshot.system_monitor.update_frequency_seconds.max(1) as u64;
                        state.apply_frequency(frequency_secs);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "SystemMonitor listener lagged");
                        let frequency_secs = state
                            .coordinator
                            .current_settings()
                            .await
                            .system_monitor
                            .update_frequency_seconds
                            .max(1) as u64;
                        state.apply_frequency(frequency_secs);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl Widget for SystemMonitorWidget {
    fn name(&self) -> &str {
        SYSTEM_MONITOR
    }

    fn phase(&self) -> InitPhase {
        InitPhase::Remote
    }

    fn metadata(&self) -> WidgetMetadata {
        Self::describe()
    }

    fn surface(&self) -> Surface {
        self.state.surface.clone()
    }

    async fn initialize(&self) -> Result<(), WidgetError> {
        debug!("SystemMonitorWidget::initialize: called");
        {
            let mut listener = lock(&self.listener);
            if listener.is_none() {
                *listener = Some(self.spawn_listener());
            }
        }
        self.current().on_tick().await
    }

    fn dispose(&self) -> Result<(), WidgetError> {
        if let Some(handle) = lock(&self.listener).take() {
            handle.abort();
        }
        Ok(())
    }

    fn subscriber(&self) -> Option<Arc<dyn PeriodicSubscriber>> {
        Some(self.current())
    }

    async fn refresh(&self) -> Result<(), WidgetError> {
        self.current().on_tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use settingsstore::{SettingsData, SettingsStore};
    use tempfile::tempdir;

    fn thresholds() -> SystemMonitorSettings {
        SystemMonitorSettings {
            cpu_threshold: 80,
            ram_threshold: 90,
            ping_threshold: 100,
            update_frequency_seconds: 2,
        }
    }

    #[test]
    fn test_alert_only_above_threshold() {
        let at_limit = Sample {
            cpu_pct: 80.0,
            ram_pct: 90.0,
            ping_ms: Some(100.0),
        };
        assert_eq!(evaluate(&at_limit, &thresholds()), Alerts::default());

        let over = Sample {
            cpu_pct: 80.5,
            ram_pct: 91.0,
            ping_ms: Some(100.1),
        };
        let alerts = evaluate(&over, &thresholds());
        assert!(alerts.cpu && alerts.ram && alerts.ping);
    }

    #[test]
    fn test_failed_ping_never_alerts() {
        let sample = Sample {
            cpu_pct: 10.0,
            ram_pct: 10.0,
            ping_ms: None,
        };
        let alerts = evaluate(&sample, &thresholds());
        assert!(!alerts.any());

        let lines = render(&sample, &alerts, &ping_averages(&History::new(10), 2));
        assert_eq!(lines[2], "Ping N/A");
        assert_eq!(lines[3], "Avg 5m (collecting data...) / 1h (collecting data...)");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = History::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            history.push(v);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.average_last(2), Some(35.0));
        assert_eq!(history.average_last(10), Some(30.0));
        assert_eq!(History::new(3).average_last(2), None);
    }

    #[test]
    fn test_hour_average_needs_full_window() {
        let mut history = History::for_frequency(600);
        for _ in 0..5 {
            history.push(20.0);
        }
        let averages = ping_averages(&history, 600);
        assert_eq!(averages.five_minutes, None);
        assert_eq!(averages.one_hour, None);

        history.push(20.0);
        let averages = ping_averages(&history, 600);
        assert_eq!(averages.one_hour, Some(20.0));
    }

    #[test]
    fn test_render_marks_alerts() {
        let sample = Sample {
            cpu_pct: 97.2,
            ram_pct: 41.0,
            ping_ms: Some(23.4),
        };
        let alerts = Alerts {
            cpu: true,
            ..Default::default()
        };
        let lines = render(&sample, &alerts, &ping_averages(&History::new(10), 2));
        assert_eq!(lines[0], "CPU 97% !");
        assert_eq!(lines[1], "RAM 41%");
        assert_eq!(lines[2], "Ping 23ms");
    }

    #[tokio::test]
    async fn test_frequency_change_resubscribes() {
        let temp = tempdir().unwrap();
        let coordinator = Coordinator::new(CoordinatorConfig::default(), SettingsStore::new(temp.path()));
        let widget = SystemMonitorWidget::new(coordinator.clone());

        let first = widget.subscriber().unwrap();
        assert!(Arc::ptr_eq(&first, &widget.subscriber().unwrap()));
        assert_eq!(first.interval(), Duration::from_secs(2));
        coordinator.subscribe(first.clone(), first.interval()).unwrap();

        widget.state.apply_frequency(5);
        let second = widget.subscriber().unwrap();
        assert_eq!(second.interval(), Duration::from_secs(5));
        assert!(!coordinator.is_subscribed(&first));
        assert!(coordinator.is_subscribed(&second));
        assert_eq!(coordinator.subscriber_count(), 1);

        widget.state.apply_frequency(5);
        assert!(Arc::ptr_eq(&second, &widget.subscriber().unwrap()));
    }

    #[tokio::test]
    async fn test_settings_event_drives_listener() {
        let temp = tempdir().unwrap();
        let coordinator = Coordinator::new(CoordinatorConfig::default(), SettingsStore::new(temp.path()));
        let widget = SystemMonitorWidget::new(coordinator.clone());
        *widget.listener.lock().unwrap() = Some(widget.spawn_listener());

        let mut settings = SettingsData::default();
        settings.system_monitor.update_frequency_seconds = 7;
        coordinator.update_settings(settings).unwrap();

        for _ in 0..100 {
            if widget.subscriber().unwrap().interval() == Duration::from_secs(7) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(widget.subscriber().unwrap().interval(), Duration::from_secs(7));

        widget.dispose().unwrap();
        widget.dispose().unwrap();
    }
}
