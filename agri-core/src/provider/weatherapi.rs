use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    model::{Alert, City, CurrentWeather, Forecast, ForecastDay},
    provider::http::{fetch_body, parse_json},
};

use super::{AlertFeed, ForecastProvider, WeatherProvider};

const SERVICE: &str = "WeatherAPI";
const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";
const FORECAST_DAYS: &str = "7";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    alert_region: Option<String>,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), alert_region: None, http: Client::new() }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Region polled by the live alert feed, e.g. a country name.
    pub fn with_alert_region(mut self, region: &str) -> Self {
        self.alert_region = Some(region.to_string());
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaCurrentResponse {
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date: NaiveDate,
    day: WaDay,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Default, Deserialize)]
struct WaAlert {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WaAlerts {
    #[serde(default)]
    alert: Vec<WaAlert>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
    #[serde(default)]
    alerts: WaAlerts,
}

#[derive(Debug, Deserialize)]
struct WaAlertsResponse {
    #[serde(default)]
    alerts: WaAlerts,
}

fn icon_url(icon: &str) -> String {
    if icon.starts_with("//") { format!("https:{icon}") } else { icon.to_string() }
}

fn parse_expiry(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(err) => {
            debug!("Unparseable alert expiry '{raw}': {err}");
            None
        }
    }
}

fn convert_alerts(alerts: WaAlerts) -> Vec<Alert> {
    alerts
        .alert
        .into_iter()
        .map(|a| Alert {
            expires: parse_expiry(a.expires.as_deref()),
            event: a.event,
            headline: a.headline,
            description: a.desc,
        })
        .collect()
}

pub(crate) fn parse_current(body: &str) -> Result<CurrentWeather> {
    let parsed: WaCurrentResponse = parse_json(SERVICE, "current", body)?;

    Ok(CurrentWeather {
        temp_c: parsed.current.temp_c,
        icon: icon_url(&parsed.current.condition.icon),
        condition: parsed.current.condition.text,
    })
}

pub(crate) fn parse_forecast(body: &str) -> Result<Forecast> {
    let parsed: WaForecastResponse = parse_json(SERVICE, "forecast", body)?;

    let days = parsed
        .forecast
        .forecastday
        .into_iter()
        .map(|d| ForecastDay {
            date: d.date,
            max_temp_c: d.day.maxtemp_c,
            min_temp_c: d.day.mintemp_c,
            icon: icon_url(&d.day.condition.icon),
            condition: d.day.condition.text,
        })
        .collect();

    Ok(Forecast { days, alerts: convert_alerts(parsed.alerts) })
}

pub(crate) fn parse_alerts(body: &str) -> Result<Vec<Alert>> {
    let parsed: WaAlertsResponse = parse_json(SERVICE, "alerts", body)?;
    Ok(convert_alerts(parsed.alerts))
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn get_weather(&self, city: &City) -> Result<CurrentWeather> {
        let request = self
            .http
            .get(self.url("current.json"))
            .query(&[("key", self.api_key.as_str()), ("q", city.name())]);

        let body = fetch_body(SERVICE, "current", request).await?;
        parse_current(&body)
    }
}

#[async_trait]
impl ForecastProvider for WeatherApiProvider {
    async fn get_forecast(&self, city: &City) -> Result<Forecast> {
        let request = self.http.get(self.url("forecast.json")).query(&[
            ("key", self.api_key.as_str()),
            ("q", city.name()),
            ("days", FORECAST_DAYS),
            ("alerts", "yes"),
        ]);

        let body = fetch_body(SERVICE, "forecast", request).await?;
        parse_forecast(&body)
    }
}

#[async_trait]
impl AlertFeed for WeatherApiProvider {
    async fn poll(&self) -> Result<Vec<Alert>> {
        let Some(region) = self.alert_region.as_deref() else {
            warn!("Live alerts requested without a region; returning none");
            return Ok(Vec::new());
        };

        let request = self
            .http
            .get(self.url("alerts.json"))
            .query(&[("key", self.api_key.as_str()), ("q", region)]);

        let body = fetch_body(SERVICE, "alerts", request).await?;
        parse_alerts(&body)
    }
}
