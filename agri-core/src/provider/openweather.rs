use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::{
    model::{City, CurrentWeather, Forecast, ForecastDay},
    provider::http::{fetch_body, parse_json},
};

use super::{ForecastProvider, WeatherProvider};

const SERVICE: &str = "OpenWeather";
const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http: Client::new() }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, endpoint: &str, what: &str, city: &City) -> Result<String> {
        let request = self.http.get(format!("{}/{endpoint}", self.base_url)).query(&[
            ("q", city.name()),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ]);

        fetch_body(SERVICE, what, request).await
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    temp_min: Option<f64>,
    #[serde(default)]
    temp_max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

fn icon_url(code: &str) -> String {
    if code.is_empty() { String::new() } else { format!("https://openweathermap.org/img/wn/{code}@2x.png") }
}

fn describe(weather: &[OwWeather]) -> (String, String) {
    weather
        .first()
        .map(|w| (w.description.clone(), icon_url(&w.icon)))
        .unwrap_or_else(|| ("Unknown".to_string(), String::new()))
}

pub(crate) fn parse_current(body: &str) -> Result<CurrentWeather> {
    let parsed: OwCurrentResponse = parse_json(SERVICE, "current", body)?;
    let (condition, icon) = describe(&parsed.weather);

    Ok(CurrentWeather { temp_c: parsed.main.temp, condition, icon })
}

/// Fold the 3-hourly entries into one row per calendar day (UTC).
///
/// The day's condition is taken from the entry closest to midday.
pub(crate) fn parse_forecast(body: &str) -> Result<Forecast> {
    let parsed: OwForecastResponse = parse_json(SERVICE, "forecast", body)?;

    struct Acc {
        max: f64,
        min: f64,
        midday_gap: i64,
        condition: (String, String),
    }

    let mut days: BTreeMap<NaiveDate, Acc> = BTreeMap::new();

    for entry in &parsed.list {
        let at = DateTime::<Utc>::from_timestamp(entry.dt, 0)
            .ok_or_else(|| anyhow!("OpenWeather forecast entry has invalid timestamp {}", entry.dt))?;
        let date = at.date_naive();
        let hi = entry.main.temp_max.unwrap_or(entry.main.temp);
        let lo = entry.main.temp_min.unwrap_or(entry.main.temp);
        let gap = (at.timestamp() - date.and_hms_opt(12, 0, 0).map(|n| n.and_utc().timestamp()).unwrap_or(0)).abs();

        let acc = days.entry(date).or_insert_with(|| Acc {
            max: hi,
            min: lo,
            midday_gap: i64::MAX,
            condition: ("Unknown".to_string(), String::new()),
        });
        acc.max = acc.max.max(hi);
        acc.min = acc.min.min(lo);
        if gap < acc.midday_gap {
            acc.midday_gap = gap;
            acc.condition = describe(&entry.weather);
        }
    }

    let days = days
        .into_iter()
        .map(|(date, acc)| ForecastDay {
            date,
            max_temp_c: acc.max,
            min_temp_c: acc.min,
            condition: acc.condition.0,
            icon: acc.condition.1,
        })
        .collect();

    // The free forecast feed carries no alerts.
    Ok(Forecast { days, alerts: Vec::new() })
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn get_weather(&self, city: &City) -> Result<CurrentWeather> {
        let body = self.get("weather", "current", city).await?;
        parse_current(&body)
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherProvider {
    async fn get_forecast(&self, city: &City) -> Result<Forecast> {
        let body = self.get("forecast", "5-day forecast", city).await?;
        parse_forecast(&body)
    }
}
