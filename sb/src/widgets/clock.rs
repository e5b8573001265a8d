//! Clock widget

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use tracing::debug;

use super::CLOCK;
use crate::lifecycle::{WidgetContext, WidgetFactory};
use crate::widget::{InitPhase, PeriodicSubscriber, Surface, Widget, WidgetError, WidgetMetadata};

const TICK: Duration = Duration::from_secs(1);

/// Time and date lines for `now`
pub fn render<Tz: TimeZone>(now: &DateTime<Tz>) -> [String; 2]
where
    Tz::Offset: std::fmt::Display,
{
    [now.format("%H:%M:%S").to_string(), now.format("%B %d, %Y").to_string()]
}

struct ClockTicker {
    surface: Surface,
}

#[async_trait]
impl PeriodicSubscriber for ClockTicker {
    fn name(&self) -> &str {
        CLOCK
    }

    fn interval(&self) -> Duration {
        TICK
    }

    async fn on_tick(&self) -> Result<(), WidgetError> {
        self.surface.set_lines(render(&Local::now()));
        Ok(())
    }
}

pub struct ClockWidget {
    surface: Surface,
    ticker: Arc<ClockTicker>,
}

impl ClockWidget {
    pub fn new() -> Self {
        let surface = Surface::new();
        Self {
            ticker: Arc::new(ClockTicker {
                surface: surface.clone(),
            }),
            surface,
        }
    }

    pub fn describe() -> WidgetMetadata {
        WidgetMetadata::builtin("Local time and date")
    }

    pub fn factory() -> WidgetFactory {
        WidgetFactory::new(CLOCK, InitPhase::Local, |_: &WidgetContext| {
            Ok(Arc::new(ClockWidget::new()) as Arc<dyn Widget>)
        })
        .with_metadata(Self::describe())
    }
}

impl Default for ClockWidget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Widget for ClockWidget {
    fn name(&self) -> &str {
        CLOCK
    }

    fn phase(&self) -> InitPhase {
        InitPhase::Local
    }

    fn metadata(&self) -> WidgetMetadata {
        Self::describe()
    }

    fn surface(&self) -> Surface {
        self.surface.clone()
    }

    async fn initialize(&self) -> Result<(), WidgetError> {
        debug!("ClockWidget::initialize: called");
        self.ticker.on_tick().await
    }

    fn dispose(&self) -> Result<(), WidgetError> {
        Ok(())
    }

    fn subscriber(&self) -> Option<Arc<dyn PeriodicSubscriber>> {
        Some(self.ticker.clone())
    }

    async fn refresh(&self) -> Result<(), WidgetError> {
        self.ticker.on_tick().await
    }
}
