use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

use crate::{
    catalog::CityCatalog,
    error::UnknownCityError,
    model::{City, MandiRate},
    provider::http::{fetch_body, parse_json},
};

use super::MarketRateProvider;

const SERVICE: &str = "Mandi";
const DEFAULT_BASE_URL: &str = "https://api.madadgaar.net/external";

/// Market rates from the mandi price service.
///
/// The service is keyed by location: the city is resolved to coordinates
/// through the catalog, the nearest mandis are looked up, then each mandi's
/// rate sheet is fetched.
#[derive(Debug, Clone)]
pub struct MandiProvider {
    token: String,
    base_url: String,
    category: Option<String>,
    catalog: Arc<CityCatalog>,
    http: Client,
}

impl MandiProvider {
    pub fn new(token: String, catalog: Arc<CityCatalog>) -> Self {
        Self { token, base_url: DEFAULT_BASE_URL.to_string(), category: None, catalog, http: Client::new() }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Restrict rate sheets to one item category, e.g. "Grain".
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}/{path}", self.base_url))
            .header("Accept", "application/json")
            .header("X-Authorization-Token", &self.token)
    }

    async fn nearest_mandis(&self, lat: f64, lng: f64) -> Result<Vec<(i64, String)>> {
        let request = self.get("nearest_mandis").query(&[("lat", lat), ("long", lng)]);
        let body = fetch_body(SERVICE, "nearest mandis", request).await?;
        parse_mandis(&body)
    }

    async fn rates_for(&self, mandi_id: i64, mandi_name: &str) -> Result<Vec<MandiRate>> {
        let mut request = self.get(&format!("all_rates/{mandi_id}"));
        if let Some(category) = self.category.as_deref() {
            request = request.query(&[("category", category)]);
        }

        let body = fetch_body(SERVICE, "rates", request).await?;
        parse_rates(&body, mandi_name)
    }
}

#[derive(Debug, Deserialize)]
struct MandisResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RateItem {
    item_name: String,
    #[serde(default)]
    item_category: String,
    #[serde(deserialize_with = "deserialize_price")]
    min_rate: f64,
    #[serde(deserialize_with = "deserialize_price")]
    max_rate: f64,
    #[serde(deserialize_with = "deserialize_price")]
    retail_rate: f64,
    #[serde(default)]
    unit_name: String,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    data: Vec<RateItem>,
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
        Null(()),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) if s.trim().is_empty() => Ok(0.0),
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::Null(()) => Ok(0.0),
    }
}

/// Mandis arrive as `[id, name, ...]` arrays; anything else is skipped.
pub(crate) fn parse_mandis(body: &str) -> Result<Vec<(i64, String)>> {
    let parsed: MandisResponse = parse_json(SERVICE, "nearest mandis", body)?;

    let mandis: Vec<(i64, String)> = parsed
        .data
        .iter()
        .filter_map(|entry| {
            let fields = entry.as_array().filter(|a| a.len() >= 2)?;
            let id = match &fields[0] {
                serde_json::Value::Number(n) => n.as_i64()?,
                serde_json::Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            let name = match &fields[1] {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((id, name))
        })
        .collect();

    if mandis.is_empty() {
        return Err(anyhow!("No valid mandi IDs found."));
    }
    Ok(mandis)
}

pub(crate) fn parse_rates(body: &str, mandi: &str) -> Result<Vec<MandiRate>> {
    let parsed: RatesResponse = parse_json(SERVICE, "rates", body)?;

    Ok(parsed
        .data
        .into_iter()
        .map(|r| MandiRate {
            mandi: mandi.to_string(),
            item: r.item_name,
            category: r.item_category,
            min_price: r.min_rate,
            max_price: r.max_rate,
            retail_price: r.retail_rate,
            unit: r.unit_name,
        })
        .collect())
}

#[async_trait]
impl MarketRateProvider for MandiProvider {
    async fn get_mandi_rates(&self, city: &City) -> Result<Vec<MandiRate>> {
        let coords = self
            .catalog
            .coordinates(city)
            .ok_or_else(|| UnknownCityError(city.name().to_string()))?;

        let mandis = self
            .nearest_mandis(coords.lat, coords.lng)
            .await
            .with_context(|| format!("Failed to find mandis near {city}"))?;
        debug!("{} mandis near {city}", mandis.len());

        let mut rates = Vec::new();
        for (id, name) in &mandis {
            rates.extend(self.rates_for(*id, name).await?);
        }

        Ok(rates)
    }
}
