//! Stock ticker widget backed by the Yahoo Finance chart endpoint

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::STOCKS;
use crate::coordinator::Coordinator;
use crate::lifecycle::{WidgetContext, WidgetFactory};
use crate::widget::{InitPhase, PeriodicSubscriber, Surface, Widget, WidgetError, WidgetMetadata};

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    /// Percent change against the previous close, when known
    pub change_pct: Option<f64>,
}

/// Extract the latest price and daily change from a chart response
pub fn parse_quote(symbol: &str, body: &Value) -> Result<Quote, WidgetError> {
    let result = &body["chart"]["result"][0];
    if result.is_null() {
        let reason = body["chart"]["error"]["description"]
            .as_str()
            .unwrap_or("empty chart result");
        return Err(WidgetError::BadResponse(format!("{}: {}", symbol, reason)));
    }

    let meta = &result["meta"];
    let price = meta["regularMarketPrice"]
        .as_f64()
        .ok_or_else(|| WidgetError::BadResponse(format!("{}: missing regularMarketPrice", symbol)))?;

    let closes: Vec<f64> = result["indicators"]["quote"][0]["close"]
        .as_array()
        .map(|values| values.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    let previous = if closes.len() >= 2 {
        Some(closes[closes.len() - 2])
    } else {
        meta["chartPreviousClose"]
            .as_f64()
            .or_else(|| meta["previousClose"].as_f64())
    };
    let change_pct = previous
        .filter(|p| *p != 0.0)
        .map(|p| (price - p) / p * 100.0);

    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        change_pct,
    })
}

pub fn render_quote(quote: &Quote) -> String {
    match quote.change_pct {
        Some(change) => format!("{} {:.2} {:+.1}%", quote.symbol, quote.price, change),
        None => format!("{} {:.2}", quote.symbol, quote.price),
    }
}

struct StockFetcher {
    coordinator: Coordinator,
    surface: Surface,
    interval: Duration,
}

impl StockFetcher {
    async fn fetch_one(&self, client: &reqwest::Client, symbol: &str) -> Result<Quote, WidgetError> {
        debug!(%symbol, "StockFetcher::fetch_one: requesting");
        let url = format!("{}/{}", CHART_ENDPOINT, symbol);
        let body: Value = client
            .get(url)
            .query(&[("interval", "1d"), ("range", "5d")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_quote(symbol, &body)
    }
}

#[async_trait]
impl PeriodicSubscriber for StockFetcher {
    fn name(&self) -> &str {
        STOCKS
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn on_tick(&self) -> Result<(), WidgetError> {
        let symbols = self.coordinator.current_settings().await.stocks.symbols.clone();
        if symbols.is_empty() {
            self.surface.set_lines(["(no symbols)"]);
            return Ok(());
        }
        let client = self
            .coordinator
            .shared_client()
            .map_err(|e| WidgetError::Other(e.to_string()))?;

        let results = join_all(symbols.iter().map(|s| self.fetch_one(&client, s))).await;
        let mut lines = Vec::with_capacity(results.len());
        let mut fetched = 0;
        let mut last_error = None;
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(quote) => {
                    fetched += 1;
                    lines.push(render_quote(&quote));
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "Quote fetch failed");
                    lines.push(format!("{} --", symbol));
                    last_error = Some(e);
                }
            }
        }
        self.surface.set_lines(lines);

        // A partial result still counts as a successful refresh
        match last_error {
            Some(e) if fetched == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

pub struct StocksWidget {
    surface: Surface,
    fetcher: Arc<StockFetcher>,
}

impl StocksWidget {
    pub fn new(coordinator: Coordinator) -> Self {
        let minutes = coordinator.settings().stocks.refresh_minutes.max(1) as u64;
        let surface = Surface::new();
        Self {
            fetcher: Arc::new(StockFetcher {
                coordinator,
                surface: surface.clone(),
                interval: Duration::from_secs(minutes * 60),
            }),
            surface,
        }
    }

    pub fn describe() -> WidgetMetadata {
        WidgetMetadata::builtin("Latest quotes for the configured symbols")
            .depends_on(["http-client", "settings"])
    }

    pub fn factory() -> WidgetFactory {
        WidgetFactory::new(STOCKS, InitPhase::Remote, |ctx: &WidgetContext| {
            Ok(Arc::new(StocksWidget::new(ctx.coordinator.clone())) as Arc<dyn Widget>)
        })
        .with_metadata(Self::describe())
    }
}

#[async_trait]
impl Widget for StocksWidget {
    fn name(&self) -> &str {
        STOCKS
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
        debug!("StocksWidget::initialize: called");
        self.fetcher.on_tick().await
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
