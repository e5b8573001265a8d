//! Built-in widgets

pub mod clock;
pub mod notes;
pub mod shortcuts;
pub mod stocks;
pub mod system_monitor;
pub mod weather;

pub use clock::ClockWidget;
pub use notes::NotesWidget;
pub use shortcuts::ShortcutsWidget;
pub use stocks::StocksWidget;
pub use system_monitor::SystemMonitorWidget;
pub use weather::WeatherWidget;

use crate::lifecycle::WidgetCatalog;

pub const CLOCK: &str = "Clock";
pub const WEATHER: &str = "Weather";
pub const STOCKS: &str = "Stocks";
pub const NOTES: &str = "Notes";
pub const SHORTCUTS: &str = "Shortcuts";
pub const SYSTEM_MONITOR: &str = "System Monitor";

/// Every built-in widget, in discovery order
pub fn builtin_catalog() -> WidgetCatalog {
    let mut catalog = WidgetCatalog::new();
    catalog
        .register(ClockWidget::factory())
        .register(SystemMonitorWidget::factory())
        .register(WeatherWidget::factory())
        .register(StocksWidget::factory())
        .register(NotesWidget::factory())
        .register(ShortcutsWidget::factory());
    catalog
}
