//! Fan-out of the per-city provider fetches and the stale-response guard.
//!
//! Every commit opens a new epoch. Fetches carry a [`Ticket`] naming the epoch
//! they were issued under; a result is applied only if its epoch is still the
//! current one. Older requests are never aborted, their results are simply
//! dropped on arrival.

use log::{debug, info, warn};
use serde::Serialize;
use std::{future::Future, time::Duration};
use tokio::sync::mpsc;

use crate::{
    error::{DashboardError, ProviderError},
    model::{City, CurrentWeather, Forecast, MandiRate},
    provider::{DataProviders, call_with_timeout},
};

/// Monotonic commit counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch(u64);

impl Epoch {
    fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

/// Identifies the commit a request was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub epoch: Epoch,
    pub city: City,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Weather,
    Forecast,
    Rates,
}

impl Source {
    fn service(self) -> &'static str {
        match self {
            Source::Weather => "Weather provider",
            Source::Forecast => "Forecast provider",
            Source::Rates => "Mandi rates provider",
        }
    }

    fn load_error(self, cause: ProviderError) -> DashboardError {
        match self {
            Source::Weather => DashboardError::WeatherLoad(cause),
            Source::Forecast => DashboardError::ForecastLoad(cause),
            Source::Rates => DashboardError::RatesLoad(cause),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Visible state of one provider panel.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResult<T> {
    pub status: LoadStatus,
    pub value: Option<T>,
    pub error: Option<ProviderError>,
    pub for_city: Option<City>,
}

impl<T> Default for ProviderResult<T> {
    fn default() -> Self {
        Self { status: LoadStatus::Idle, value: None, error: None, for_city: None }
    }
}

impl<T> ProviderResult<T> {
    fn begin(&mut self, city: &City) {
        self.status = LoadStatus::Loading;
        self.value = None;
        self.error = None;
        self.for_city = Some(city.clone());
    }

    fn resolve(&mut self, result: Result<T, ProviderError>) {
        match result {
            Ok(value) => {
                self.status = LoadStatus::Ready;
                self.value = Some(value);
                self.error = None;
            }
            Err(err) => {
                self.status = LoadStatus::Failed;
                self.value = None;
                self.error = Some(err);
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }
}

#[derive(Debug)]
pub enum Payload {
    Weather(Result<CurrentWeather, ProviderError>),
    Forecast(Result<Forecast, ProviderError>),
    Rates(Result<Vec<MandiRate>, ProviderError>),
}

impl Payload {
    pub fn source(&self) -> Source {
        match self {
            Payload::Weather(_) => Source::Weather,
            Payload::Forecast(_) => Source::Forecast,
            Payload::Rates(_) => Source::Rates,
        }
    }

    fn error(&self) -> Option<&ProviderError> {
        match self {
            Payload::Weather(r) => r.as_ref().err(),
            Payload::Forecast(r) => r.as_ref().err(),
            Payload::Rates(r) => r.as_ref().err(),
        }
    }
}

/// A finished fetch, delivered back to the coordinator's owner.
#[derive(Debug)]
pub struct FetchOutcome {
    pub ticket: Ticket,
    pub payload: Payload,
}

/// What applying an outcome did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Ready(Source),
    Failed(DashboardError),
    /// Issued for a superseded commit; nothing changed.
    Stale,
}

#[derive(Debug)]
pub struct EnvironmentalDataCoordinator {
    providers: DataProviders,
    request_timeout: Duration,
    outcomes: mpsc::UnboundedSender<FetchOutcome>,
    epoch: Epoch,
    committed: Option<City>,
    weather: ProviderResult<CurrentWeather>,
    forecast: ProviderResult<Forecast>,
    rates: ProviderResult<Vec<MandiRate>>,
}

impl EnvironmentalDataCoordinator {
    /// The receiver yields every finished fetch; feed each one to [`Self::apply`].
    pub fn new(
        providers: DataProviders,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<FetchOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            providers,
            request_timeout,
            outcomes: tx,
            epoch: Epoch::default(),
            committed: None,
            weather: ProviderResult::default(),
            forecast: ProviderResult::default(),
            rates: ProviderResult::default(),
        };
        (coordinator, rx)
    }

    /// Start loading all three panels for `city`, superseding earlier requests.
    pub fn on_city_committed(&mut self, city: City) -> Ticket {
        let ticket = self.begin(city);
        self.dispatch(&ticket);
        ticket
    }

    /// Open a new epoch and mark every panel as loading for `city`.
    pub fn begin(&mut self, city: City) -> Ticket {
        self.epoch = self.epoch.next();
        self.weather.begin(&city);
        self.forecast.begin(&city);
        self.rates.begin(&city);
        self.committed = Some(city.clone());

        info!("Loading dashboard data for {city} (epoch {})", self.epoch.0);
        Ticket { epoch: self.epoch, city }
    }

    /// Spawn the three provider fetches for `ticket`.
    pub fn dispatch(&self, ticket: &Ticket) {
        let timeout = self.request_timeout;

        let weather = self.providers.weather.clone();
        self.spawn_fetch(ticket, Source::Weather, timeout, move |city: City| async move {
            weather.get_weather(&city).await.map(|w| Payload::Weather(Ok(w)))
        });

        let forecast = self.providers.forecast.clone();
        self.spawn_fetch(ticket, Source::Forecast, timeout, move |city: City| async move {
            forecast.get_forecast(&city).await.map(|f| Payload::Forecast(Ok(f)))
        });

        let rates = self.providers.rates.clone();
        self.spawn_fetch(ticket, Source::Rates, timeout, move |city: City| async move {
            rates.get_mandi_rates(&city).await.map(|r| Payload::Rates(Ok(r)))
        });
    }

    fn spawn_fetch<F, Fut>(&self, ticket: &Ticket, source: Source, timeout: Duration, fetch: F)
    where
        F: FnOnce(City) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        let ticket = ticket.clone();
        let tx = self.outcomes.clone();

        tokio::spawn(async move {
            let payload = call_with_timeout(source.service(), timeout, fetch(ticket.city.clone()))
                .await
                .unwrap_or_else(|err| failed(source, err));

            // The receiver is gone only when the dashboard is shutting down.
            let _ = tx.send(FetchOutcome { ticket, payload });
        });
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.epoch == self.epoch
    }

    /// Apply a finished fetch if it belongs to the current commit.
    pub fn apply(&mut self, outcome: FetchOutcome) -> Applied {
        let source = outcome.payload.source();

        if !self.is_current(&outcome.ticket) {
            debug!(
                "Discarding stale {source:?} result for {} (epoch {}, current {})",
                outcome.ticket.city, outcome.ticket.epoch.0, self.epoch.0
            );
            return Applied::Stale;
        }

        let failure = outcome.payload.error().cloned();
        match outcome.payload {
            Payload::Weather(result) => self.weather.resolve(result),
            Payload::Forecast(result) => self.forecast.resolve(result),
            Payload::Rates(result) => self.rates.resolve(result),
        }

        match failure {
            Some(cause) => {
                warn!("{source:?} load for {} failed: {cause}", outcome.ticket.city);
                Applied::Failed(source.load_error(cause))
            }
            None => {
                debug!("{source:?} ready for {}", outcome.ticket.city);
                Applied::Ready(source)
            }
        }
    }

    pub fn weather(&self) -> &ProviderResult<CurrentWeather> {
        &self.weather
    }

    pub fn forecast(&self) -> &ProviderResult<Forecast> {
        &self.forecast
    }

    pub fn rates(&self) -> &ProviderResult<Vec<MandiRate>> {
        &self.rates
    }

    pub fn committed_city(&self) -> Option<&City> {
        self.committed.as_ref()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// No panel is waiting on a response.
    pub fn is_settled(&self) -> bool {
        !self.weather.is_loading() && !self.forecast.is_loading() && !self.rates.is_loading()
    }
}

fn failed(source: Source, err: ProviderError) -> Payload {
    match source {
        Source::Weather => Payload::Weather(Err(err)),
        Source::Forecast => Payload::Forecast(Err(err)),
        Source::Rates => Payload::Rates(Err(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        model::ForecastDay,
        provider::{ForecastProvider, MarketRateProvider, WeatherProvider},
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Fixed {
        delay: Duration,
        fail_forecast: bool,
    }

    #[async_trait]
    impl WeatherProvider for Fixed {
        async fn get_weather(&self, city: &City) -> anyhow::Result<CurrentWeather> {
            tokio::time::sleep(self.delay).await;
            Ok(CurrentWeather { temp_c: 30.0, condition: format!("Clear in {city}"), icon: String::new() })
        }
    }

    #[async_trait]
    impl ForecastProvider for Fixed {
        async fn get_forecast(&self, _city: &City) -> anyhow::Result<Forecast> {
            if self.fail_forecast {
                anyhow::bail!("forecast backend down");
            }
            Ok(Forecast::default())
        }
    }

    #[async_trait]
    impl MarketRateProvider for Fixed {
        async fn get_mandi_rates(&self, _city: &City) -> anyhow::Result<Vec<MandiRate>> {
            Ok(Vec::new())
        }
    }

    fn coordinator(delay: Duration, fail_forecast: bool) -> (EnvironmentalDataCoordinator, mpsc::UnboundedReceiver<FetchOutcome>) {
        let p = Arc::new(Fixed { delay, fail_forecast });
        let providers = DataProviders { weather: p.clone(), forecast: p.clone(), rates: p };
        EnvironmentalDataCoordinator::new(providers, Duration::from_secs(10))
    }

    fn city(name: &str) -> City {
        City::new(name).unwrap()
    }

    fn weather_for(name: &str) -> Payload {
        Payload::Weather(Ok(CurrentWeather { temp_c: 20.0, condition: name.into(), icon: String::new() }))
    }

    #[tokio::test]
    async fn begin_marks_every_panel_loading() {
        let (mut coord, _rx) = coordinator(Duration::ZERO, false);
        coord.begin(city("Karachi"));

        for status in [coord.weather().status, coord.forecast().status, coord.rates().status] {
            assert_eq!(status, LoadStatus::Loading);
        }
        assert_eq!(coord.weather().for_city, Some(city("Karachi")));
        assert!(!coord.is_settled());
    }

    #[tokio::test]
    async fn late_result_for_superseded_city_is_discarded() {
        let (mut coord, _rx) = coordinator(Duration::ZERO, false);
        let a = coord.begin(city("Lahore"));
        let b = coord.begin(city("Karachi"));

        let applied = coord.apply(FetchOutcome { ticket: a, payload: weather_for("Lahore") });
        assert_eq!(applied, Applied::Stale);
        assert_eq!(coord.weather().status, LoadStatus::Loading);
        assert!(coord.weather().value.is_none());

        let applied = coord.apply(FetchOutcome { ticket: b, payload: weather_for("Karachi") });
        assert_eq!(applied, Applied::Ready(Source::Weather));
        assert_eq!(coord.weather().value.as_ref().unwrap().condition, "Karachi");
    }

    #[tokio::test]
    async fn stale_failure_does_not_clear_loading() {
        let (mut coord, _rx) = coordinator(Duration::ZERO, false);
        let old = coord.begin(city("Lahore"));
        coord.begin(city("Multan"));

        let stale = FetchOutcome {
            ticket: old,
            payload: Payload::Rates(Err(ProviderError::new(ErrorKind::Transport, "reset"))),
        };
        assert_eq!(coord.apply(stale), Applied::Stale);
        assert!(coord.rates().is_loading());
        assert!(coord.rates().error.is_none());
    }

    #[tokio::test]
    async fn recommitting_same_city_opens_new_epoch() {
        let (mut coord, _rx) = coordinator(Duration::ZERO, false);
        let first = coord.begin(city("Lahore"));
        let second = coord.begin(city("lahore"));

        assert!(second.epoch > first.epoch);
        assert!(!coord.is_current(&first));
    }

    #[tokio::test]
    async fn failure_is_local_to_its_panel() {
        let (mut coord, _rx) = coordinator(Duration::ZERO, false);
        let t = coord.begin(city("Quetta"));

        coord.apply(FetchOutcome { ticket: t.clone(), payload: weather_for("Quetta") });
        let applied = coord.apply(FetchOutcome {
            ticket: t.clone(),
            payload: Payload::Forecast(Err(ProviderError::new(ErrorKind::Rejected(500), "boom"))),
        });

        assert!(matches!(applied, Applied::Failed(DashboardError::ForecastLoad(_))));
        assert_eq!(coord.forecast().status, LoadStatus::Failed);
        assert_eq!(coord.weather().status, LoadStatus::Ready);
        assert_eq!(coord.rates().status, LoadStatus::Loading);
    }

    #[tokio::test]
    async fn dispatch_delivers_all_three_outcomes() {
        let (mut coord, mut rx) = coordinator(Duration::ZERO, true);
        coord.on_city_committed(city("Karachi"));

        let mut sources = Vec::new();
        for _ in 0..3 {
            let outcome = rx.recv().await.expect("outcome");
            sources.push(outcome.payload.source());
            coord.apply(outcome);
        }

        assert!(sources.contains(&Source::Weather));
        assert!(sources.contains(&Source::Forecast));
        assert!(sources.contains(&Source::Rates));
        assert!(coord.is_settled());
        assert_eq!(coord.weather().status, LoadStatus::Ready);
        assert_eq!(coord.rates().status, LoadStatus::Ready);
        assert_eq!(coord.forecast().status, LoadStatus::Failed);
        assert_eq!(coord.forecast().error.as_ref().unwrap().kind, ErrorKind::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let p = Arc::new(Fixed { delay: Duration::from_secs(60), fail_forecast: false });
        let providers = DataProviders { weather: p.clone(), forecast: p.clone(), rates: p };
        let (mut coord, mut rx) = EnvironmentalDataCoordinator::new(providers, Duration::from_secs(5));
        coord.on_city_committed(city("Sukkur"));

        loop {
            let outcome = rx.recv().await.expect("outcome");
            if outcome.payload.source() == Source::Weather {
                coord.apply(outcome);
                break;
            }
            coord.apply(outcome);
        }

        assert_eq!(coord.weather().status, LoadStatus::Failed);
        assert_eq!(coord.weather().error.as_ref().unwrap().kind, ErrorKind::Timeout);
    }

    #[test]
    fn forecast_value_is_kept_on_ready() {
        let mut result: ProviderResult<Forecast> = ProviderResult::default();
        result.begin(&city("Hyderabad"));
        let day = ForecastDay {
            date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            max_temp_c: 40.0,
            min_temp_c: 30.0,
            condition: "Hot".into(),
            icon: String::new(),
        };
        result.resolve(Ok(Forecast { days: vec![day], alerts: Vec::new() }));

        assert_eq!(result.status, LoadStatus::Ready);
        assert_eq!(result.value.unwrap().days.len(), 1);
    }
}
