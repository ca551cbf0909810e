use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use tripweave_core::config::WeatherConfig;
use tripweave_core::error::{Result, TripweaveError};

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Forecast for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    pub temp_max_c: Option<f64>,
    pub temp_min_c: Option<f64>,
    pub precipitation_chance: Option<f64>,
}

/// Weather findings for a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// The travel dates as the traveller wrote them.
    pub requested_dates: String,
    pub days: Vec<DailyForecast>,
}

impl WeatherReport {
    /// Compact text form used inside agent prompts.
    pub fn to_prompt_lines(&self) -> String {
        let mut out = format!(
            "Forecast for {} ({:.2}, {:.2}), traveller dates: {}\n",
            self.location, self.latitude, self.longitude, self.requested_dates
        );
        for d in &self.days {
            out.push_str(&format!(
                "- {}: {}..{} C, rain {}\n",
                d.date,
                fmt_opt(d.temp_min_c),
                fmt_opt(d.temp_max_c),
                d.precipitation_chance
                    .map(|p| format!("{:.0}%", p))
                    .unwrap_or_else(|| "n/a".into())
            ));
        }
        out
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "?".into())
}

/// Source of weather data for a destination.
pub trait WeatherProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn forecast(&self, destination: &str, dates: &str) -> BoxFuture<'_, Result<WeatherReport>>;
}

/// Open-Meteo geocoding + daily forecast. No API key required.
pub struct OpenMeteoWeather {
    http: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

impl OpenMeteoWeather {
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            http: crate::http_client(),
            geocoding_url: config
                .geocoding_url
                .clone()
                .unwrap_or_else(|| GEOCODING_URL.to_string()),
            forecast_url: config
                .forecast_url
                .clone()
                .unwrap_or_else(|| FORECAST_URL.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct GeoResponse {
    #[serde(default)]
    results: Vec<GeoPlace>,
}

#[derive(Deserialize)]
struct GeoPlace {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    daily: DailySeries,
}

#[derive(Deserialize)]
struct DailySeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

fn tool_err(e: impl std::fmt::Display) -> TripweaveError {
    TripweaveError::ToolFailure {
        tool: "weather".into(),
        message: e.to_string(),
    }
}

/// Zip the parallel daily arrays into per-day records.
fn into_days(series: DailySeries) -> Vec<DailyForecast> {
    series
        .time
        .into_iter()
        .enumerate()
        .map(|(i, date)| DailyForecast {
            date,
            temp_max_c: series.temperature_2m_max.get(i).copied().flatten(),
            temp_min_c: series.temperature_2m_min.get(i).copied().flatten(),
            precipitation_chance: series
                .precipitation_probability_max
                .get(i)
                .copied()
                .flatten(),
        })
        .collect()
}

impl WeatherProvider for OpenMeteoWeather {
    fn name(&self) -> &str {
        "open-meteo"
    }

    fn forecast(&self, destination: &str, dates: &str) -> BoxFuture<'_, Result<WeatherReport>> {
        let destination = destination.to_string();
        let dates = dates.to_string();

        Box::pin(async move {
            // Geocoding matches on the place name, so drop any ", Country" suffix.
            let query = destination
                .split(',')
                .next()
                .unwrap_or(&destination)
                .trim()
                .to_string();

            let geo: GeoResponse = self
                .http
                .get(&self.geocoding_url)
                .query(&[("name", query.as_str()), ("count", "1"), ("format", "json")])
                .send()
                .await
                .map_err(tool_err)?
                .error_for_status()
                .map_err(tool_err)?
                .json()
                .await
                .map_err(tool_err)?;

            let place = geo
                .results
                .into_iter()
                .next()
                .ok_or_else(|| tool_err(format!("no location found for '{}'", destination)))?;

            let lat = place.latitude.to_string();
            let lon = place.longitude.to_string();
            let forecast: ForecastResponse = self
                .http
                .get(&self.forecast_url)
                .query(&[
                    ("latitude", lat.as_str()),
                    ("longitude", lon.as_str()),
                    (
                        "daily",
                        "temperature_2m_max,temperature_2m_min,precipitation_probability_max",
                    ),
                    ("timezone", "auto"),
                ])
                .send()
                .await
                .map_err(tool_err)?
                .error_for_status()
                .map_err(tool_err)?
                .json()
                .await
                .map_err(tool_err)?;

            let location = match place.country {
                Some(country) => format!("{}, {}", place.name, country),
                None => place.name,
            };

            Ok(WeatherReport {
                location,
                latitude: place.latitude,
                longitude: place.longitude,
                requested_dates: dates,
                days: into_days(forecast.daily),
            })
        })
    }
}
