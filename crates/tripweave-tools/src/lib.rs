pub mod currency;
pub mod search;
pub mod weather;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tripweave_core::config::ToolsConfig;
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::types::CurrencyConversion;

pub use currency::{FxChain, RateProvider, StaticRateProvider, UniRateProvider, YahooFinanceProvider};
pub use search::{hits_to_prompt, SearchHit, SearchProvider, TavilySearch};
pub use weather::{DailyForecast, OpenMeteoWeather, WeatherProvider, WeatherReport};

/// Per-request HTTP timeout for the shipped providers.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent("tripweave/0.1")
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// The external tools agents may call. Weather and search are bounded by one
/// timeout; currency conversion bounds each provider attempt separately.
#[derive(Clone)]
pub struct ToolKit {
    weather: Arc<dyn WeatherProvider>,
    search: Option<Arc<dyn SearchProvider>>,
    fx: FxChain,
    timeout: Duration,
}

impl ToolKit {
    pub fn new(weather: Arc<dyn WeatherProvider>, fx: FxChain) -> Self {
        Self {
            weather,
            search: None,
            fx,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.fx = self.fx.with_attempt_timeout(timeout);
        self
    }

    /// Build the shipped providers from `[tools]`.
    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut kit = Self::new(
            Arc::new(OpenMeteoWeather::new(&config.weather)),
            FxChain::from_config(&config.currency),
        )
        .with_timeout(Duration::from_secs(config.tool_timeout_secs));

        if let Some(search) = &config.search {
            if search.provider == "tavily" && !search.api_key.is_empty() {
                kit = kit.with_search(Arc::new(TavilySearch::new(search)));
            } else {
                tracing::warn!(provider = %search.provider, "Unsupported or unkeyed search provider, search disabled");
            }
        }
        kit
    }

    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    pub async fn get_weather(&self, destination: &str, dates: &str) -> Result<WeatherReport> {
        self.bounded("weather", self.weather.forecast(destination, dates))
            .await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let provider = self.search.as_ref().ok_or_else(|| TripweaveError::ToolFailure {
            tool: "search".into(),
            message: "no search provider configured".into(),
        })?;
        self.bounded("search", provider.search(query)).await
    }

    pub async fn convert_currency(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<CurrencyConversion> {
        self.fx.convert(amount, from, to).await
    }

    async fn bounded<T>(&self, tool: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TripweaveError::ToolTimeout {
                tool: tool.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}
