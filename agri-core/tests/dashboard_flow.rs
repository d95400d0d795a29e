use agri_core::{
    Alert, AlertSnapshot, City, CityCatalog, CityRow, CurrentWeather, Dashboard, DashboardEvent,
    FetchOutcome, Forecast, LiveAlertFeed, LoadStatus, MandiRate, Profile,
    coordinator::Source,
    provider::{AlertFeed, AuthProvider, DataProviders, ForecastProvider, MarketRateProvider, WeatherProvider},
    timer::sleep_until_deadline,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedReceiver, time::Instant};

const DEBOUNCE: Duration = Duration::from_millis(1000);

/// Lahore's weather is slow; Quetta has no forecast.
#[derive(Debug)]
struct FakeServices;

#[async_trait]
impl WeatherProvider for FakeServices {
    async fn get_weather(&self, city: &City) -> anyhow::Result<CurrentWeather> {
        if city.name() == "Lahore" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(CurrentWeather { temp_c: 33.0, condition: format!("Sunny in {city}"), icon: String::new() })
    }
}

#[async_trait]
impl ForecastProvider for FakeServices {
    async fn get_forecast(&self, city: &City) -> anyhow::Result<Forecast> {
        if city.name() == "Quetta" {
            anyhow::bail!("forecast service unavailable");
        }
        Ok(Forecast::default())
    }
}

#[async_trait]
impl MarketRateProvider for FakeServices {
    async fn get_mandi_rates(&self, city: &City) -> anyhow::Result<Vec<MandiRate>> {
        Ok(vec![MandiRate {
            mandi: format!("{city} Mandi"),
            item: "Wheat".into(),
            category: "Grain".into(),
            min_price: 3900.0,
            max_price: 4100.0,
            retail_price: 4200.0,
            unit: "40 Kg".into(),
        }])
    }
}

#[async_trait]
impl AuthProvider for FakeServices {
    async fn get_profile(&self) -> anyhow::Result<Profile> {
        Ok(Profile { name: "Ali".into(), email: String::new(), city: "Multan".into() })
    }
}

fn catalog() -> Arc<CityCatalog> {
    let rows: Vec<CityRow> = ["Lahore", "Karachi", "Quetta", "Larkana", "Multan"]
        .iter()
        .map(|name| CityRow::new(name, "Pakistan"))
        .collect();
    Arc::new(CityCatalog::load(&rows, "Pakistan"))
}

fn dashboard() -> (Dashboard, UnboundedReceiver<FetchOutcome>) {
    let services = Arc::new(FakeServices);
    let providers = DataProviders { weather: services.clone(), forecast: services.clone(), rates: services };
    Dashboard::new(catalog(), providers, DEBOUNCE, Duration::from_secs(10))
}

async fn settle(dash: &mut Dashboard, outcomes: &mut UnboundedReceiver<FetchOutcome>) {
    while !dash.coordinator().is_settled() {
        let outcome = outcomes.recv().await.expect("fetch outcome");
        dash.handle(DashboardEvent::Fetched(outcome), Instant::now());
    }
}

#[tokio::test(start_paused = true)]
async fn typing_lah_suggests_lahore_then_commits_text_verbatim() {
    let (mut dash, mut outcomes) = dashboard();

    dash.handle(DashboardEvent::Input("Lah".into()), Instant::now());
    let suggested: Vec<&str> = dash.search().visible_suggestions().iter().map(City::name).collect();
    assert_eq!(suggested, vec!["Lahore"]);

    sleep_until_deadline(dash.next_deadline()).await;
    let ticket = dash.tick(Instant::now()).expect("debounced commit");
    assert_eq!(ticket.city.name(), "Lah");

    settle(&mut dash, &mut outcomes).await;
    assert_eq!(dash.coordinator().weather().status, LoadStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn keystroke_burst_commits_once() {
    let (mut dash, _outcomes) = dashboard();

    for text in ["K", "Ka", "Kar", "Kara", "Karachi  "] {
        dash.handle(DashboardEvent::Input(text.into()), Instant::now());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(dash.tick(Instant::now()).is_none(), "no commit mid-burst");
    }

    sleep_until_deadline(dash.next_deadline()).await;
    let ticket = dash.tick(Instant::now()).expect("one commit");
    assert_eq!(ticket.city.name(), "Karachi");

    tokio::time::sleep(DEBOUNCE * 5).await;
    assert!(dash.tick(Instant::now()).is_none());
    assert_eq!(dash.coordinator().epoch(), ticket.epoch);
}

#[tokio::test(start_paused = true)]
async fn selection_mid_window_supersedes_debounce() {
    let (mut dash, _outcomes) = dashboard();

    dash.handle(DashboardEvent::Input("La".into()), Instant::now());
    tokio::time::sleep(DEBOUNCE / 2).await;
    let picked = dash.handle(DashboardEvent::Pick(1), Instant::now()).expect("pick commits");
    assert_eq!(picked.city.name(), "Larkana");

    tokio::time::sleep(DEBOUNCE * 2).await;
    assert!(dash.tick(Instant::now()).is_none());
    assert_eq!(dash.coordinator().epoch(), picked.epoch);
}

#[tokio::test(start_paused = true)]
async fn late_weather_for_previous_city_is_ignored() {
    let (mut dash, mut outcomes) = dashboard();

    dash.commit(City::new("Lahore").unwrap());
    dash.commit(City::new("Karachi").unwrap());
    settle(&mut dash, &mut outcomes).await;

    let weather = dash.coordinator().weather();
    assert_eq!(weather.for_city, City::new("Karachi"));
    assert_eq!(weather.value.as_ref().unwrap().condition, "Sunny in Karachi");

    let late = loop {
        let outcome = outcomes.recv().await.expect("Lahore weather eventually arrives");
        if outcome.payload.source() == Source::Weather {
            break outcome;
        }
        dash.handle(DashboardEvent::Fetched(outcome), Instant::now());
    };
    assert_eq!(late.ticket.city.name(), "Lahore");
    assert!(!dash.coordinator().is_current(&late.ticket));
    dash.handle(DashboardEvent::Fetched(late), Instant::now());

    let weather = dash.coordinator().weather();
    assert_eq!(weather.status, LoadStatus::Ready);
    assert_eq!(weather.value.as_ref().unwrap().condition, "Sunny in Karachi");
}

#[tokio::test(start_paused = true)]
async fn forecast_failure_leaves_other_panels_alone() {
    let (mut dash, mut outcomes) = dashboard();

    dash.commit(City::new("Quetta").unwrap());
    settle(&mut dash, &mut outcomes).await;

    let coordinator = dash.coordinator();
    assert_eq!(coordinator.forecast().status, LoadStatus::Failed);
    assert_eq!(coordinator.weather().status, LoadStatus::Ready);
    assert_eq!(coordinator.rates().status, LoadStatus::Ready);
    assert_eq!(coordinator.rates().value.as_ref().unwrap()[0].mandi, "Quetta Mandi");
}

#[tokio::test(start_paused = true)]
async fn profile_seeds_city_on_load() {
    let (mut dash, mut outcomes) = dashboard();

    let profile = dash.spawn_profile_load(Arc::new(FakeServices)).await.expect("profile");
    let ticket = dash.handle(DashboardEvent::Profile(profile), Instant::now()).expect("seeded commit");
    assert_eq!(ticket.city.name(), "Multan");

    settle(&mut dash, &mut outcomes).await;
    assert_eq!(dash.search().committed_city().map(City::name), Some("Multan"));
    assert_eq!(dash.banner().message(), None);
}

#[derive(Debug)]
struct FlakyAlerts(Mutex<u32>);

#[async_trait]
impl AlertFeed for FlakyAlerts {
    async fn poll(&self) -> anyhow::Result<Vec<Alert>> {
        let mut calls = self.0.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            Ok(vec![Alert {
                event: "Flood Warning".into(),
                headline: "River Ravi in high flood".into(),
                description: String::new(),
                expires: None,
            }])
        } else {
            anyhow::bail!("alert service down")
        }
    }
}

#[tokio::test(start_paused = true)]
async fn alert_failures_keep_last_set_and_never_reach_banner() {
    let (mut dash, mut outcomes) = dashboard();
    let feed = LiveAlertFeed::spawn(
        Arc::new(FlakyAlerts(Mutex::new(0))),
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    let mut updates = feed.subscribe();
    updates.changed().await.expect("first refresh");

    dash.commit(City::new("Multan").unwrap());
    settle(&mut dash, &mut outcomes).await;

    // Several failed polls later.
    tokio::time::sleep(Duration::from_secs(60 * 3 + 1)).await;
    let snapshot: AlertSnapshot = feed.current();
    assert!(snapshot.consecutive_failures >= 3);

    let view = dash.view(&snapshot, Utc::now());
    assert_eq!(view.live_alerts.len(), 1);
    assert_eq!(view.live_alerts[0].event, "Flood Warning");
    assert_eq!(view.banner, None);

    feed.shutdown().await;
}
