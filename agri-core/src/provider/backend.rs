use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::{
    model::{City, MandiRate, Profile},
    provider::http::{fetch_body, parse_json},
    session::Session,
};

use super::{AuthProvider, MarketRateProvider};

const SERVICE: &str = "Backend";

/// Client for the application's own REST backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    session: Session,
    http: Client,
}

impl BackendClient {
    pub fn new(base_url: &str, session: Session) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), session, http: Client::new() }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.http.get(format!("{}/{path}", self.base_url));
        match self.session.bearer() {
            Some(bearer) => request.header("Authorization", bearer),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: Profile,
}

#[derive(Debug, Deserialize)]
struct BackendRate {
    #[serde(default)]
    mandi: String,
    item: String,
    #[serde(default)]
    category: String,
    min_price: f64,
    max_price: f64,
    retail_price: f64,
    #[serde(default)]
    unit: String,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    data: Vec<BackendRate>,
}

pub(crate) fn parse_profile(body: &str) -> Result<Profile> {
    let parsed: ProfileResponse = parse_json(SERVICE, "profile", body)?;
    Ok(parsed.user)
}

pub(crate) fn parse_rates(body: &str) -> Result<Vec<MandiRate>> {
    let parsed: RatesResponse = parse_json(SERVICE, "mandi rates", body)?;

    Ok(parsed
        .data
        .into_iter()
        .map(|r| MandiRate {
            mandi: r.mandi,
            item: r.item,
            category: r.category,
            min_price: r.min_price,
            max_price: r.max_price,
            retail_price: r.retail_price,
            unit: r.unit,
        })
        .collect())
}

#[async_trait]
impl AuthProvider for BackendClient {
    async fn get_profile(&self) -> Result<Profile> {
        if !self.session.is_authenticated() {
            return Err(anyhow!("Not signed in: no session token configured"));
        }

        let body = fetch_body(SERVICE, "profile", self.get("auth/profile")).await?;
        parse_profile(&body)
    }
}

#[async_trait]
impl MarketRateProvider for BackendClient {
    async fn get_mandi_rates(&self, city: &City) -> Result<Vec<MandiRate>> {
        let request = self.get("info/mandi-rates").query(&[("city", city.name())]);
        let body = fetch_body(SERVICE, "mandi rates", request).await?;
        parse_rates(&body)
    }
}
