use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use tripweave_core::config::CurrencyProviderConfig;
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::types::{round_cents, CurrencyConversion};

use crate::http_client;

const UNIRATE_URL: &str = "https://api.unirateapi.com/api/convert";
const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Source of exchange rates.
pub trait RateProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Convert `amount` from one ISO code to another, returning the converted amount.
    fn convert(&self, amount: f64, from: &str, to: &str) -> BoxFuture<'_, Result<f64>>;
}

fn fx_err(provider: &str, message: impl std::fmt::Display) -> TripweaveError {
    TripweaveError::ToolFailure {
        tool: format!("currency:{}", provider),
        message: message.to_string(),
    }
}

// ── UniRate ─────────────────────────────────────────────────────

pub struct UniRateProvider {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl UniRateProvider {
    /// `api_key` falls back to `RATE_CONVERTER_API_KEY`.
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.or_else(|| std::env::var("RATE_CONVERTER_API_KEY").ok()),
            base_url: base_url.unwrap_or_else(|| UNIRATE_URL.to_string()),
            http: http_client(),
        }
    }
}

#[derive(Deserialize)]
struct UniRateResponse {
    result: Option<f64>,
    to: Option<String>,
}

impl RateProvider for UniRateProvider {
    fn name(&self) -> &str {
        "unirate"
    }

    fn convert(&self, amount: f64, from: &str, to: &str) -> BoxFuture<'_, Result<f64>> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();

        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| fx_err("unirate", "RATE_CONVERTER_API_KEY is not set"))?;

            let amount_s = amount.to_string();
            let resp = self
                .http
                .get(&self.base_url)
                .query(&[
                    ("api_key", api_key),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                    ("amount", amount_s.as_str()),
                ])
                .send()
                .await
                .map_err(|e| fx_err("unirate", e))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(fx_err("unirate", format!("HTTP {}", status.as_u16())));
            }

            let body: UniRateResponse = resp.json().await.map_err(|e| fx_err("unirate", e))?;
            match (body.result, body.to) {
                (Some(result), Some(_)) => Ok(result),
                _ => Err(fx_err("unirate", "response missing result")),
            }
        })
    }
}

// ── Yahoo Finance ───────────────────────────────────────────────

pub struct YahooFinanceProvider {
    base_url: String,
    http: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| YAHOO_CHART_URL.to_string()),
            http: http_client(),
        }
    }
}

#[derive(Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

fn chart_rate(body: ChartEnvelope) -> Option<f64> {
    body.chart
        .result?
        .into_iter()
        .next()?
        .meta
        .regular_market_price
        .filter(|r| *r > 0.0)
}

impl RateProvider for YahooFinanceProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn convert(&self, amount: f64, from: &str, to: &str) -> BoxFuture<'_, Result<f64>> {
        let symbol = format!("{}{}=X", from.to_uppercase(), to.to_uppercase());

        Box::pin(async move {
            let url = format!("{}/{}", self.base_url.trim_end_matches('/'), symbol);
            let resp = self
                .http
                .get(&url)
                .header("User-Agent", "Mozilla/5.0 (tripweave)")
                .send()
                .await
                .map_err(|e| fx_err("yahoo", e))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(fx_err("yahoo", format!("HTTP {}", status.as_u16())));
            }

            let body: ChartEnvelope = resp.json().await.map_err(|e| fx_err("yahoo", e))?;
            let rate = chart_rate(body)
                .ok_or_else(|| fx_err("yahoo", format!("no price for {}", symbol)))?;
            Ok(amount * rate)
        })
    }
}

// ── Static ──────────────────────────────────────────────────────

/// Fixed rates keyed by concatenated pair, e.g. `USDEUR`. The inverse pair is
/// derived when only one direction is configured.
pub struct StaticRateProvider {
    rates: HashMap<String, f64>,
}

impl StaticRateProvider {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        Self { rates }
    }

    fn rate(&self, from: &str, to: &str) -> Option<f64> {
        if let Some(r) = self.rates.get(&format!("{}{}", from, to)) {
            return Some(*r);
        }
        self.rates
            .get(&format!("{}{}", to, from))
            .filter(|r| **r > 0.0)
            .map(|r| 1.0 / r)
    }
}

impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn convert(&self, amount: f64, from: &str, to: &str) -> BoxFuture<'_, Result<f64>> {
        let result = self
            .rate(&from.to_uppercase(), &to.to_uppercase())
            .map(|r| amount * r)
            .ok_or_else(|| fx_err("static", format!("no rate for {}{}", from, to)));
        Box::pin(async move { result })
    }
}

// ── Chain ───────────────────────────────────────────────────────

/// Ordered list of rate providers, tried in sequence. Each attempt gets its
/// own timeout; a provider that times out counts as failed.
#[derive(Clone)]
pub struct FxChain {
    providers: Vec<Arc<dyn RateProvider>>,
    attempt_timeout: Duration,
}

impl FxChain {
    pub fn new(providers: Vec<Arc<dyn RateProvider>>) -> Self {
        Self {
            providers,
            attempt_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn from_config(entries: &[CurrencyProviderConfig]) -> Self {
        let providers = entries
            .iter()
            .map(|entry| -> Arc<dyn RateProvider> {
                match entry {
                    CurrencyProviderConfig::Unirate { api_key, base_url } => {
                        Arc::new(UniRateProvider::new(api_key.clone(), base_url.clone()))
                    }
                    CurrencyProviderConfig::Yahoo { base_url } => {
                        Arc::new(YahooFinanceProvider::new(base_url.clone()))
                    }
                    CurrencyProviderConfig::Static { rates } => {
                        Arc::new(StaticRateProvider::new(rates.clone()))
                    }
                }
            })
            .collect();
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Convert through the first provider that succeeds.
    ///
    /// Same-currency requests resolve locally with provider `identity`.
    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<CurrencyConversion> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();

        if from == to {
            return Ok(CurrencyConversion {
                amount,
                from,
                to,
                converted: round_cents(amount),
                rate: 1.0,
                provider: "identity".into(),
                timestamp: Utc::now(),
            });
        }

        let mut failures = Vec::new();
        for provider in &self.providers {
            let attempt = tokio::time::timeout(
                self.attempt_timeout,
                provider.convert(amount, &from, &to),
            )
            .await
            .unwrap_or_else(|_| {
                Err(TripweaveError::ToolTimeout {
                    tool: format!("currency:{}", provider.name()),
                    timeout_secs: self.attempt_timeout.as_secs(),
                })
            });
            match attempt {
                Ok(converted) => {
                    debug!(provider = provider.name(), %from, %to, amount, converted, "Converted currency");
                    let rate = if amount != 0.0 { converted / amount } else { 0.0 };
                    return Ok(CurrencyConversion {
                        amount,
                        from,
                        to,
                        converted: round_cents(converted),
                        rate,
                        provider: provider.name().to_string(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Rate provider failed, trying next");
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        Err(TripweaveError::ToolFailure {
            tool: "currency".into(),
            message: if failures.is_empty() {
                "no rate providers configured".into()
            } else {
                failures.join("; ")
            },
        })
    }
}
