//! Weather widget backed by OpenWeatherMap current conditions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::WEATHER;
use crate::coordinator::Coordinator;
use crate::lifecycle::{WidgetContext, WidgetFactory};
use crate::widget::{InitPhase, PeriodicSubscriber, Surface, Widget, WidgetError, WidgetMetadata};

const ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Current conditions extracted from a response
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub temperature_c: f64,
    pub description: String,
    pub condition_id: i64,
    pub city: Option<String>,
}

/// Pull the fields the widget shows out of a current-conditions response
pub fn parse_current(body: &Value) -> Result<WeatherReading, WidgetError> {
    let temperature_c = body["main"]["temp"]
        .as_f64()
        .ok_or_else(|| WidgetError::BadResponse("missing main.temp".to_string()))?;
    let weather = &body["weather"][0];
    let description = weather["description"]
        .as_str()
        .ok_or_else(|| WidgetError::BadResponse("missing weather[0].description".to_string()))?
        .to_string();
    let condition_id = weather["id"].as_i64().unwrap_or_default();
    let city = body["name"].as_str().map(str::to_string);
    Ok(WeatherReading {
        temperature_c,
        description,
        condition_id,
        city,
    })
}

/// Icon for an OpenWeatherMap condition code
pub fn condition_icon(id: i64) -> &'static str {
    match id {
        200..=299 => "⛈",
        300..=399 => "🌦",
        500..=599 => "🌧",
        600..=699 => "❄",
        700..=799 => "🌫",
        800 => "☀",
        801..=804 => "☁",
        _ => "🌡",
    }
}

pub fn render(reading: &WeatherReading) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}°C",
        condition_icon(reading.condition_id),
        reading.temperature_c.round()
    )];
    lines.push(reading.description.clone());
    if let Some(city) = &reading.city {
        lines.push(city.clone());
    }
    lines
}

struct WeatherFetcher {
    coordinator: Coordinator,
    surface: Surface,
    interval: Duration,
}

impl WeatherFetcher {
    async fn fetch(&self) -> Result<WeatherReading, WidgetError> {
        let settings = self.coordinator.current_settings().await;
        let weather = &settings.weather;
        if weather.api_key.is_empty() {
            return Err(WidgetError::NotConfigured("weather API key is empty".to_string()));
        }
        let client = self
            .coordinator
            .shared_client()
            .map_err(|e| WidgetError::Other(e.to_string()))?;
        debug!(location = %weather.location, "WeatherFetcher::fetch: requesting");
        let body: Value = client
            .get(ENDPOINT)
            .query(&[
                ("q", weather.location.as_str()),
                ("appid", weather.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_current(&body)
    }
}

#[async_trait]
impl PeriodicSubscriber for WeatherFetcher {
    fn name(&self) -> &str {
        WEATHER
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn on_tick(&self) -> Result<(), WidgetError> {
        match self.fetch().await {
            Ok(reading) => {
                self.surface.set_lines(render(&reading));
                self.surface.set_inert(false);
                Ok(())
            }
            Err(e @ WidgetError::NotConfigured(_)) => {
                self.surface.set_lines(["Weather", "Set an API key in settings"]);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

pub struct WeatherWidget {
    surface: Surface,
    fetcher: Arc<WeatherFetcher>,
}

impl WeatherWidget {
    pub fn new(coordinator: Coordinator) -> Self {
        let minutes = coordinator.settings().weather.refresh_minutes.max(1) as u64;
        let surface = Surface::new();
        Self {
            fetcher: Arc::new(WeatherFetcher {
                coordinator,
                surface: surface.clone(),
                interval: Duration::from_secs(minutes * 60),
            }),
            surface,
        }
    }

    pub fn describe() -> WidgetMetadata {
        WidgetMetadata::builtin("Current conditions from OpenWeatherMap")
            .depends_on(["http-client", "settings"])
    }

    pub fn factory() -> WidgetFactory {
        WidgetFactory::new(WEATHER, InitPhase::Remote, |ctx: &WidgetContext| {
            Ok(Arc::new(WeatherWidget::new(ctx.coordinator.clone())) as Arc<dyn Widget>)
        })
        .with_metadata(Self::describe())
    }
}

#[async_trait]
impl Widget for WeatherWidget {
    fn name(&self) -> &str {
        WEATHER
    }

    fn phase(&self) -> InitPhase {
        InitPhase::Remote
    }

    fn metadata(&self) -> WidgetMetadata {
        Self::describe()
    }

    fn surface(&self) -> Surface {
        self.surface.clone()
    }

    async fn initialize(&self) -> Result<(), WidgetError> {
        debug!("WeatherWidget::initialize: called");
        self.surface.set_lines(["Weather", "Loading..."]);
        self.fetcher.on_tick().await?;
        info!("Weather loaded");
        Ok(())
    }

    fn dispose(&self) -> Result<(), WidgetError> {
        Ok(())
    }

    fn subscriber(&self) -> Option<Arc<dyn PeriodicSubscriber>> {
        Some(self.fetcher.clone())
    }

    async fn refresh(&self) -> Result<(), WidgetError> {
        self.fetcher.on_tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use serde_json::json;
    use settingsstore::SettingsStore;
    use tempfile::tempdir;

    #[test]
    fn test_parse_current() {
        let body = json!({
            "weather": [{"id": 801, "main": "Clouds", "description": "few clouds"}],
            "main": {"temp": -3.6, "humidity": 80},
            "name": "Saint-Joseph-de-Beauce"
        });
        let reading = parse_current(&body).unwrap();
        assert_eq!(reading.temperature_c, -3.6);
        assert_eq!(reading.description, "few clouds");
        assert_eq!(reading.condition_id, 801);

        let lines = render(&reading);
        assert_eq!(lines[0], "☁ -4°C");
        assert_eq!(lines[2], "Saint-Joseph-de-Beauce");
    }

    #[test]
    fn test_parse_rejects_error_body() {
        let body = json!({"cod": "401", "message": "Invalid API key"});
        assert!(matches!(parse_current(&body), Err(WidgetError::BadResponse(_))));
    }

    #[test]
    fn test_condition_icons() {
        assert_eq!(condition_icon(800), "☀");
        assert_eq!(condition_icon(502), "🌧");
        assert_eq!(condition_icon(42), "🌡");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let temp = tempdir().unwrap();
        let coordinator = Coordinator::new(CoordinatorConfig::default(), SettingsStore::new(temp.path()));
        let widget = WeatherWidget::new(coordinator);

        let err = widget.initialize().await.unwrap_err();
        assert!(matches!(err, WidgetError::NotConfigured(_)));
        assert_eq!(widget.surface().lines()[1], "Set an API key in settings");
        assert_eq!(widget.subscriber().unwrap().interval(), Duration::from_secs(30 * 60));
    }
}
