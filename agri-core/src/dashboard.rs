//! The dashboard: search box, the three provider panels, the profile and the
//! shared error banner, driven by one event loop.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    alerts::AlertSnapshot,
    catalog::CityCatalog,
    config::Config,
    coordinator::{Applied, EnvironmentalDataCoordinator, FetchOutcome, ProviderResult, Ticket},
    dismissal::{Bounds, Point},
    error::{DashboardError, ProviderError},
    model::{Alert, City, CurrentWeather, Forecast, MandiRate, Profile},
    provider::{AuthProvider, DataProviders, call_with_timeout},
    search::{CitySearchController, SearchState},
};

/// The single "last error" slot. The most recent message wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorBanner(Option<String>);

impl ErrorBanner {
    /// Show `err` unless it is a fail-soft error.
    pub fn show(&mut self, err: &DashboardError) {
        if err.is_banner_worthy() {
            self.0 = Some(err.to_string());
        } else {
            debug!("Not showing fail-soft error in banner: {err}");
        }
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn message(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum ProfileState {
    #[default]
    NotRequested,
    Loading,
    Loaded(Profile),
    Failed(ProviderError),
}

/// Everything that can happen to the dashboard.
#[derive(Debug)]
pub enum DashboardEvent {
    /// Full text of the search box after a keystroke.
    Input(String),
    /// Choose the n-th visible suggestion.
    Pick(usize),
    Press(Point),
    Fetched(FetchOutcome),
    Profile(Result<Profile, ProviderError>),
}

/// Render model. Live alerts are joined in here and nowhere else.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub search: SearchState,
    pub banner: Option<String>,
    pub profile: ProfileState,
    pub weather: ProviderResult<CurrentWeather>,
    pub forecast: ProviderResult<Forecast>,
    pub rates: ProviderResult<Vec<MandiRate>>,
    /// Alerts that came with the forecast for the committed city.
    pub forecast_alerts: Vec<Alert>,
    /// Alerts from the live feed, independent of the city.
    pub live_alerts: Vec<Alert>,
    pub live_alerts_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Dashboard {
    search: CitySearchController,
    coordinator: EnvironmentalDataCoordinator,
    banner: ErrorBanner,
    profile: ProfileState,
    request_timeout: Duration,
}

impl Dashboard {
    /// The receiver yields provider results; wrap each in [`DashboardEvent::Fetched`].
    pub fn new(
        catalog: Arc<CityCatalog>,
        providers: DataProviders,
        debounce: Duration,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<FetchOutcome>) {
        let (coordinator, outcomes) = EnvironmentalDataCoordinator::new(providers, request_timeout);
        let dashboard = Self {
            search: CitySearchController::new(catalog, debounce),
            coordinator,
            banner: ErrorBanner::default(),
            profile: ProfileState::default(),
            request_timeout,
        };
        (dashboard, outcomes)
    }

    pub fn from_config(
        catalog: Arc<CityCatalog>,
        providers: DataProviders,
        config: &Config,
    ) -> (Self, mpsc::UnboundedReceiver<FetchOutcome>) {
        Self::new(catalog, providers, config.debounce(), config.request_timeout())
    }

    pub fn mount(&mut self, region: Bounds) {
        self.search.mount(region);
    }

    pub fn unmount(&mut self) {
        self.search.unmount();
    }

    /// Apply one event. Returns the ticket of the fetches it started, if any.
    pub fn handle(&mut self, event: DashboardEvent, now: Instant) -> Option<Ticket> {
        match event {
            DashboardEvent::Input(text) => {
                self.banner.clear();
                self.search.on_input(&text, now);
                None
            }
            DashboardEvent::Pick(index) => {
                let city = self.search.select_suggestion(index)?;
                Some(self.coordinator.on_city_committed(city))
            }
            DashboardEvent::Press(at) => {
                self.search.on_press(at);
                None
            }
            DashboardEvent::Fetched(outcome) => {
                match self.coordinator.apply(outcome) {
                    Applied::Ready(_) => self.banner.clear(),
                    Applied::Failed(err) => self.banner.show(&err),
                    Applied::Stale => {}
                }
                None
            }
            DashboardEvent::Profile(result) => self.on_profile(result),
        }
    }

    /// Commit `city` as if picked from the list.
    pub fn commit(&mut self, city: City) -> Ticket {
        let city = self.search.select(city);
        self.coordinator.on_city_committed(city)
    }

    /// Fire the debounce if due and start fetching for the committed city.
    pub fn tick(&mut self, now: Instant) -> Option<Ticket> {
        let city = self.search.poll(now)?;
        Some(self.coordinator.on_city_committed(city))
    }

    /// When [`Self::tick`] must next be called.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.search.next_deadline()
    }

    /// Load the profile in the background; deliver the result as
    /// [`DashboardEvent::Profile`].
    pub fn spawn_profile_load(
        &mut self,
        auth: Arc<dyn AuthProvider>,
    ) -> oneshot::Receiver<Result<Profile, ProviderError>> {
        let (tx, rx) = oneshot::channel();
        let timeout = self.request_timeout;
        self.profile = ProfileState::Loading;

        tokio::spawn(async move {
            let result = call_with_timeout("Profile service", timeout, auth.get_profile()).await;
            let _ = tx.send(result);
        });

        rx
    }

    fn on_profile(&mut self, result: Result<Profile, ProviderError>) -> Option<Ticket> {
        match result {
            Ok(profile) => {
                // The user's own choice, made or in progress, outranks the profile.
                let untouched =
                    self.search.committed_city().is_none() && self.search.next_deadline().is_none();
                let seed = profile.city().filter(|_| untouched);
                self.profile = ProfileState::Loaded(profile);

                let city = seed?;
                info!("Seeding city from profile: {city}");
                self.search.seed(city.clone());
                Some(self.coordinator.on_city_committed(city))
            }
            Err(cause) => {
                let err = DashboardError::ProfileLoad(cause.clone());
                warn!("{err}: {cause}");
                self.banner.show(&err);
                self.profile = ProfileState::Failed(cause);
                None
            }
        }
    }

    pub fn search(&self) -> &CitySearchController {
        &self.search
    }

    pub fn coordinator(&self) -> &EnvironmentalDataCoordinator {
        &self.coordinator
    }

    pub fn banner(&self) -> &ErrorBanner {
        &self.banner
    }

    pub fn profile(&self) -> &ProfileState {
        &self.profile
    }

    /// Snapshot for rendering. Expired alerts are left out of both lists.
    pub fn view(&self, live: &AlertSnapshot, now: DateTime<Utc>) -> DashboardView {
        let forecast = self.coordinator.forecast();
        let forecast_alerts = forecast
            .value
            .iter()
            .flat_map(|f| f.alerts.iter())
            .filter(|a| a.is_active(now))
            .cloned()
            .collect();
        let live_alerts = live.alerts.iter().filter(|a| a.is_active(now)).cloned().collect();

        DashboardView {
            search: self.search.state(),
            banner: self.banner.message().map(str::to_string),
            profile: self.profile.clone(),
            weather: self.coordinator.weather().clone(),
            forecast: forecast.clone(),
            rates: self.coordinator.rates().clone(),
            forecast_alerts,
            live_alerts,
            live_alerts_refreshed_at: live.refreshed_at,
        }
    }
}
