//! Settings document types and range validation

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Schema version written into new documents
pub const SCHEMA_VERSION: &str = "1.0.0";

pub const WIDTH_RANGE: RangeInclusive<f64> = 100.0..=200.0;
pub const MARGIN_RANGE: RangeInclusive<f64> = 0.0..=50.0;
pub const CPU_THRESHOLD_RANGE: RangeInclusive<i32> = 50..=95;
pub const RAM_THRESHOLD_RANGE: RangeInclusive<i32> = 50..=95;
pub const PING_THRESHOLD_RANGE: RangeInclusive<i32> = 25..=500;
pub const UPDATE_FREQUENCY_RANGE: RangeInclusive<i32> = 1..=10;
pub const WEATHER_REFRESH_RANGE: RangeInclusive<i32> = 5..=240;
pub const STOCK_REFRESH_RANGE: RangeInclusive<i32> = 1..=120;
pub const MAX_STOCK_SYMBOLS: usize = 8;

/// Width difference below which two snapshots count as the same geometry
const WIDTH_TOLERANCE: f64 = 0.1;

fn clamp_f64(value: f64, range: &RangeInclusive<f64>, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(*range.start(), *range.end())
    } else {
        fallback
    }
}

fn clamp_i32(value: i32, range: &RangeInclusive<i32>) -> i32 {
    value.clamp(*range.start(), *range.end())
}

/// Which screen edge the panel docks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SidebarPosition {
    #[default]
    Right,
    Left,
}

impl std::fmt::Display for SidebarPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Right => write!(f, "right"),
            Self::Left => write!(f, "left"),
        }
    }
}

/// Top-level settings document
///
/// Treated as an immutable snapshot once loaded: callers that want a change
/// build a new value and hand it to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SettingsData {
    /// Schema version for forward migration
    pub version: String,

    /// Panel geometry
    pub window: WindowSettings,

    /// System monitor thresholds and cadence
    pub system_monitor: SystemMonitorSettings,

    /// Weather widget source
    pub weather: WeatherSettings,

    /// Stock ticker source
    pub stocks: StockSettings,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            window: WindowSettings::default(),
            system_monitor: SystemMonitorSettings::default(),
            weather: WeatherSettings::default(),
            stocks: StockSettings::default(),
        }
    }
}

impl SettingsData {
    /// Clamp every field into its documented range
    pub fn validate_and_correct(&mut self) {
        debug!("SettingsData::validate_and_correct: called");
        if self.version.trim().is_empty() {
            self.version = SCHEMA_VERSION.to_string();
        }
        self.window.validate_and_correct();
        self.system_monitor.validate_and_correct();
        self.weather.validate_and_correct();
        self.stocks.validate_and_correct();
    }

    /// Consume and return a clamped copy
    pub fn corrected(mut self) -> Self {
        self.validate_and_correct();
        self
    }

    /// True if clamping would leave the document unchanged
    pub fn is_valid(&self) -> bool {
        let corrected = self.clone().corrected();
        let valid = corrected == *self;
        debug!(valid, "SettingsData::is_valid: called");
        valid
    }

    /// Compare only the fields widgets react to
    ///
    /// Background reloads use this to decide whether listeners need a
    /// notification; cosmetic differences (version, weather/stock sources)
    /// do not count.
    pub fn observable_eq(&self, other: &Self) -> bool {
        let eq = self.window.position == other.window.position
            && (self.window.width - other.window.width).abs() < WIDTH_TOLERANCE
            && self.system_monitor == other.system_monitor;
        debug!(eq, "SettingsData::observable_eq: called");
        eq
    }
}

/// Window positioning and sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WindowSettings {
    pub position: SidebarPosition,
    pub width: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_side: f64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            position: SidebarPosition::Right,
            width: 122.0,
            margin_top: 5.0,
            margin_bottom: 5.0,
            margin_side: 5.0,
        }
    }
}

impl WindowSettings {
    pub fn validate_and_correct(&mut self) {
        let defaults = Self::default();
        self.width = clamp_f64(self.width, &WIDTH_RANGE, defaults.width);
        self.margin_top = clamp_f64(self.margin_top, &MARGIN_RANGE, defaults.margin_top);
        self.margin_bottom = clamp_f64(self.margin_bottom, &MARGIN_RANGE, defaults.margin_bottom);
        self.margin_side = clamp_f64(self.margin_side, &MARGIN_RANGE, defaults.margin_side);
    }
}

/// System monitor thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SystemMonitorSettings {
    /// CPU usage percent that flags an alert
    pub cpu_threshold: i32,

    /// RAM usage percent that flags an alert
    pub ram_threshold: i32,

    /// Latency in milliseconds that flags an alert
    pub ping_threshold: i32,

    /// Seconds between samples
    pub update_frequency_seconds: i32,
}

impl Default for SystemMonitorSettings {
    fn default() -> Self {
        Self {
            cpu_threshold: 85,
            ram_threshold: 85,
            ping_threshold: 100,
            update_frequency_seconds: 2,
        }
    }
}

impl SystemMonitorSettings {
    pub fn validate_and_correct(&mut self) {
        self.cpu_threshold = clamp_i32(self.cpu_threshold, &CPU_THRESHOLD_RANGE);
        self.ram_threshold = clamp_i32(self.ram_threshold, &RAM_THRESHOLD_RANGE);
        self.ping_threshold = clamp_i32(self.ping_threshold, &PING_THRESHOLD_RANGE);
        self.update_frequency_seconds = clamp_i32(self.update_frequency_seconds, &UPDATE_FREQUENCY_RANGE);
    }
}

/// Weather data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WeatherSettings {
    /// OpenWeatherMap `q=` location string
    pub location: String,

    /// API key; empty means the widget is not configured
    pub api_key: String,

    pub refresh_minutes: i32,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            location: "Saint-Joseph-de-Beauce,QC,CA".to_string(),
            api_key: String::new(),
            refresh_minutes: 30,
        }
    }
}

impl WeatherSettings {
    pub fn validate_and_correct(&mut self) {
        self.location = self.location.trim().to_string();
        if self.location.is_empty() {
            self.location = Self::default().location;
        }
        self.api_key = self.api_key.trim().to_string();
        self.refresh_minutes = clamp_i32(self.refresh_minutes, &WEATHER_REFRESH_RANGE);
    }
}

/// Stock ticker data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StockSettings {
    /// Yahoo Finance chart symbols
    pub symbols: Vec<String>,

    pub refresh_minutes: i32,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC-USD".to_string(), "SPY".to_string(), "GC=F".to_string()],
            refresh_minutes: 10,
        }
    }
}

impl StockSettings {
    pub fn validate_and_correct(&mut self) {
        let mut seen = Vec::with_capacity(self.symbols.len());
        for symbol in self.symbols.drain(..) {
            let symbol = symbol.trim().to_string();
            if !symbol.is_empty() && !seen.contains(&symbol) {
                seen.push(symbol);
            }
        }
        seen.truncate(MAX_STOCK_SYMBOLS);
        self.symbols = seen;
        self.refresh_minutes = clamp_i32(self.refresh_minutes, &STOCK_REFRESH_RANGE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = SettingsData::default();
        assert!(settings.is_valid());
        assert_eq!(settings.version, SCHEMA_VERSION);
        assert_eq!(settings.window.width, 122.0);
        assert_eq!(settings.system_monitor.cpu_threshold, 85);
    }

    #[test]
    fn test_threshold_above_range_is_clamped_to_max() {
        let mut settings = SettingsData::default();
        settings.system_monitor.cpu_threshold = 999;
        assert!(!settings.is_valid());

        settings.validate_and_correct();
        assert_eq!(settings.system_monitor.cpu_threshold, 95);
        assert!(settings.is_valid());
    }

    #[test]
    fn test_values_below_range_are_clamped_to_min() {
        let mut settings = SettingsData::default();
        settings.window.width = 10.0;
        settings.window.margin_top = -4.0;
        settings.system_monitor.ping_threshold = 1;
        settings.system_monitor.update_frequency_seconds = 0;

        settings.validate_and_correct();
        assert_eq!(settings.window.width, 100.0);
        assert_eq!(settings.window.margin_top, 0.0);
        assert_eq!(settings.system_monitor.ping_threshold, 25);
        assert_eq!(settings.system_monitor.update_frequency_seconds, 1);
    }

    #[test]
    fn test_non_finite_width_falls_back_to_default() {
        let mut settings = SettingsData::default();
        settings.window.width = f64::NAN;
        assert!(!settings.is_valid());

        settings.validate_and_correct();
        assert_eq!(settings.window.width, 122.0);
    }

    #[test]
    fn test_stock_symbols_are_cleaned() {
        let mut stocks = StockSettings {
            symbols: vec![" SPY ".into(), "".into(), "SPY".into(), "AAPL".into()],
            refresh_minutes: 0,
        };
        stocks.validate_and_correct();
        assert_eq!(stocks.symbols, vec!["SPY".to_string(), "AAPL".to_string()]);
        assert_eq!(stocks.refresh_minutes, 1);

        let mut many = StockSettings {
            symbols: (0..20).map(|i| format!("S{}", i)).collect(),
            refresh_minutes: 10,
        };
        many.validate_and_correct();
        assert_eq!(many.symbols.len(), MAX_STOCK_SYMBOLS);
    }

    #[test]
    fn test_blank_weather_location_restored() {
        let mut weather = WeatherSettings {
            location: "   ".into(),
            api_key: " key ".into(),
            refresh_minutes: 1,
        };
        weather.validate_and_correct();
        assert_eq!(weather.location, WeatherSettings::default().location);
        assert_eq!(weather.api_key, "key");
        assert_eq!(weather.refresh_minutes, 5);
    }

    #[test]
    fn test_observable_eq_ignores_unobserved_fields() {
        let a = SettingsData::default();
        let mut b = a.clone();
        b.version = "2.0.0".into();
        b.weather.location = "Oslo".into();
        b.window.width += 0.05;
        b.window.margin_side = 20.0;
        assert!(a.observable_eq(&b));

        b.system_monitor.ram_threshold = 60;
        assert!(!a.observable_eq(&b));

        let mut c = a.clone();
        c.window.position = SidebarPosition::Left;
        assert!(!a.observable_eq(&c));

        let mut d = a.clone();
        d.window.width = 150.0;
        assert!(!a.observable_eq(&d));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "window:\n  position: left\nsystem-monitor:\n  cpu-threshold: 70\n";
        let settings: SettingsData = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(settings.window.position, SidebarPosition::Left);
        assert_eq!(settings.window.width, 122.0);
        assert_eq!(settings.system_monitor.cpu_threshold, 70);
        assert_eq!(settings.system_monitor.ram_threshold, 85);
        assert_eq!(settings.version, SCHEMA_VERSION);
    }

    #[test]
    fn test_yaml_uses_kebab_case_keys() {
        let yaml = serde_yaml::to_string(&SettingsData::default()).unwrap();
        assert!(yaml.contains("system-monitor:"));
        assert!(yaml.contains("margin-top:"));
        assert!(yaml.contains("update-frequency-seconds:"));
        assert!(yaml.contains("position: right"));
    }

    proptest! {
        #[test]
        fn prop_corrected_settings_are_always_valid(
            width in proptest::num::f64::ANY,
            margin in -1000.0f64..1000.0,
            cpu in any::<i32>(),
            ram in any::<i32>(),
            ping in any::<i32>(),
            freq in any::<i32>(),
        ) {
            let mut settings = SettingsData::default();
            settings.window.width = width;
            settings.window.margin_bottom = margin;
            settings.system_monitor = SystemMonitorSettings {
                cpu_threshold: cpu,
                ram_threshold: ram,
                ping_threshold: ping,
                update_frequency_seconds: freq,
            };

            let corrected = settings.corrected();
            prop_assert!(corrected.is_valid());
            prop_assert!(WIDTH_RANGE.contains(&corrected.window.width));
            prop_assert!(CPU_THRESHOLD_RANGE.contains(&corrected.system_monitor.cpu_threshold));
            prop_assert!(PING_THRESHOLD_RANGE.contains(&corrected.system_monitor.ping_threshold));
        }

        #[test]
        fn prop_in_range_threshold_is_untouched(cpu in 50i32..=95) {
            let mut settings = SettingsData::default();
            settings.system_monitor.cpu_threshold = cpu;
            prop_assert_eq!(settings.corrected().system_monitor.cpu_threshold, cpu);
        }
    }
}
