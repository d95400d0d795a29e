use crate::{
    Config,
    catalog::{CityCatalog, CityRow},
    error::ProviderError,
    model::{Alert, City, CurrentWeather, Forecast, MandiRate, Profile},
    provider::{
        backend::BackendClient, mandi::MandiProvider, openweather::OpenWeatherProvider,
        weatherapi::WeatherApiProvider,
    },
    session::Session,
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, future::Future, sync::Arc, time::Duration};

pub mod backend;
pub(crate) mod http;
pub mod mandi;
pub mod openweather;
pub mod weatherapi;

/// Weather services that can back the weather and forecast panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn get_weather(&self, city: &City) -> anyhow::Result<CurrentWeather>;
}

#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn get_forecast(&self, city: &City) -> anyhow::Result<Forecast>;
}

#[async_trait]
pub trait MarketRateProvider: Send + Sync + Debug {
    async fn get_mandi_rates(&self, city: &City) -> anyhow::Result<Vec<MandiRate>>;
}

/// City-independent source of live alerts, polled on an interval.
#[async_trait]
pub trait AlertFeed: Send + Sync + Debug {
    async fn poll(&self) -> anyhow::Result<Vec<Alert>>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync + Debug {
    async fn get_profile(&self) -> anyhow::Result<Profile>;
}

/// Where the city list comes from.
pub trait CityDataSource {
    fn load_rows(&self) -> anyhow::Result<Vec<CityRow>>;
}

/// The three per-city sources fanned out on every commit.
#[derive(Debug, Clone)]
pub struct DataProviders {
    pub weather: Arc<dyn WeatherProvider>,
    pub forecast: Arc<dyn ForecastProvider>,
    pub rates: Arc<dyn MarketRateProvider>,
}

/// Run one provider call under `timeout` and classify whatever went wrong.
pub async fn call_with_timeout<T, F>(service: &str, timeout: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ProviderError::classify(&err)),
        Err(_) => Err(ProviderError::timeout(service)),
    }
}

/// Construct the weather + forecast pair for an explicit ProviderId.
pub fn weather_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<(Arc<dyn WeatherProvider>, Arc<dyn ForecastProvider>)> {
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `agri configure {id}` and enter your API key."
        )
    })?;

    let pair: (Arc<dyn WeatherProvider>, Arc<dyn ForecastProvider>) = match id {
        ProviderId::OpenWeather => {
            let p = Arc::new(OpenWeatherProvider::new(api_key.to_owned()));
            (p.clone(), p)
        }
        ProviderId::WeatherApi => {
            let p = Arc::new(WeatherApiProvider::new(api_key.to_owned()));
            (p.clone(), p)
        }
    };

    Ok(pair)
}

/// Market rates come straight from the mandi service when a token is set,
/// otherwise from the application backend.
pub fn rates_from_config(
    config: &Config,
    catalog: Arc<CityCatalog>,
    session: &Session,
) -> anyhow::Result<Arc<dyn MarketRateProvider>> {
    if let Some(token) = config.mandi.token.as_deref() {
        let mut provider = MandiProvider::new(token.to_owned(), catalog);
        if let Some(base) = config.mandi.base_url.as_deref() {
            provider = provider.with_base_url(base);
        }
        if let Some(category) = config.mandi.category.as_deref() {
            provider = provider.with_category(category);
        }
        let rates: Arc<dyn MarketRateProvider> = Arc::new(provider);
        return Ok(rates);
    }

    let rates: Arc<dyn MarketRateProvider> = backend_from_config(config, session)?;
    Ok(rates)
}

pub fn backend_from_config(config: &Config, session: &Session) -> anyhow::Result<Arc<BackendClient>> {
    let base_url = config.backend.base_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!(
            "No backend URL configured.\n\
             Hint: run `agri configure backend` or `agri configure mandi` first."
        )
    })?;

    Ok(Arc::new(BackendClient::new(base_url, session.clone())))
}

/// Build the per-city providers, using `default_provider` for weather.
pub fn data_providers_from_config(
    config: &Config,
    catalog: Arc<CityCatalog>,
    session: &Session,
) -> anyhow::Result<DataProviders> {
    let id = config.default_provider_id()?;
    let (weather, forecast) = weather_from_config(id, config)?;
    let rates = rates_from_config(config, catalog, session)?;

    Ok(DataProviders { weather, forecast, rates })
}

/// Live alerts need WeatherAPI; without its key the feed is disabled.
pub fn alert_feed_from_config(config: &Config) -> Option<Arc<dyn AlertFeed>> {
    let key = config.provider_api_key(ProviderId::WeatherApi)?;
    let provider = WeatherApiProvider::new(key.to_owned()).with_alert_region(config.alert_region());
    let feed: Arc<dyn AlertFeed> = Arc::new(provider);
    Some(feed)
}
