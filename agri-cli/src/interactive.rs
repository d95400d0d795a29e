//! Line-oriented driver for the dashboard.
//!
//! Every stdin line is the new content of the search box. A few slash
//! commands stand in for the pointer:
//!
//! - `/pick N` selects suggestion N
//! - `/close` presses outside the suggestion list
//! - `/quit` exits

use agri_core::{
    Bounds, Config, Dashboard, DashboardEvent, LiveAlertFeed, Point, Profile, ProviderError,
    provider::{alert_feed_from_config, backend_from_config, data_providers_from_config},
    timer::sleep_until_deadline,
};
use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::oneshot,
    time::Instant,
};

use crate::{cli::load_catalog, render};

/// The search box and its suggestion list, in terminal cells.
const SEARCH_REGION: Bounds = Bounds { x: 0.0, y: 0.0, width: 40.0, height: 12.0 };
const OUTSIDE: Point = Point { x: -1.0, y: -1.0 };

#[derive(Debug, PartialEq)]
enum Line {
    Text(String),
    Pick(usize),
    Close,
    Quit,
    Unknown(String),
}

fn parse_line(line: &str) -> Line {
    let Some(command) = line.trim().strip_prefix('/') else {
        return Line::Text(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("pick"), Some(n)) => n.parse().map(Line::Pick).unwrap_or_else(|_| Line::Unknown(line.to_string())),
        (Some("close"), None) => Line::Close,
        (Some("quit"), None) => Line::Quit,
        _ => Line::Unknown(line.to_string()),
    }
}

type ProfileReceiver = oneshot::Receiver<Result<Profile, ProviderError>>;

/// Resolves once with the profile result, then never again.
async fn recv_profile(rx: &mut Option<ProfileReceiver>) -> Option<Result<Profile, ProviderError>> {
    let Some(pending) = rx.as_mut() else {
        return std::future::pending().await;
    };
    let result = pending.await.ok();
    *rx = None;
    result
}

pub async fn run(config: Config, json: bool) -> Result<()> {
    let catalog = load_catalog(&config)?;
    let session = config.session();
    let providers = data_providers_from_config(&config, catalog.clone(), &session)?;

    let (mut dashboard, mut outcomes) = Dashboard::from_config(catalog, providers, &config);
    dashboard.mount(SEARCH_REGION);

    let mut profile = None;
    if session.is_authenticated() {
        match backend_from_config(&config, &session) {
            Ok(backend) => profile = Some(dashboard.spawn_profile_load(backend)),
            Err(err) => warn!("Profile not loaded: {err}"),
        }
    }

    let feed = match alert_feed_from_config(&config) {
        Some(source) => LiveAlertFeed::spawn(source, config.alert_interval(), config.request_timeout()),
        None => {
            info!("Live alerts need a weatherapi key; feed disabled");
            LiveAlertFeed::disabled()
        }
    };
    let mut alerts = feed.subscribe();
    let mut alerts_open = true;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    if !json {
        println!("Type a city name. /pick N selects a suggestion, /close hides the list, /quit exits.");
    }

    loop {
        // With stdin gone, stay only until the last commit has settled.
        if !stdin_open
            && dashboard.next_deadline().is_none()
            && dashboard.coordinator().is_settled()
            && profile.is_none()
        {
            break;
        }

        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let now = Instant::now();
                match line? {
                    None => stdin_open = false,
                    Some(line) => match parse_line(&line) {
                        Line::Quit => break,
                        Line::Text(text) => { dashboard.handle(DashboardEvent::Input(text), now); }
                        Line::Pick(index) => {
                            if dashboard.handle(DashboardEvent::Pick(index), now).is_none() {
                                println!("No suggestion {index} to pick");
                            }
                        }
                        Line::Close => { dashboard.handle(DashboardEvent::Press(OUTSIDE), now); }
                        Line::Unknown(text) => {
                            println!("Unknown command: {text}");
                            continue;
                        }
                    },
                }
            }
            _ = sleep_until_deadline(dashboard.next_deadline()) => {
                dashboard.tick(Instant::now());
            }
            Some(outcome) = outcomes.recv() => {
                dashboard.handle(DashboardEvent::Fetched(outcome), Instant::now());
            }
            result = recv_profile(&mut profile) => match result {
                Some(result) => { dashboard.handle(DashboardEvent::Profile(result), Instant::now()); }
                None => debug!("Profile task ended without a result"),
            },
            changed = alerts.changed(), if alerts_open => {
                if changed.is_err() {
                    alerts_open = false;
                    continue;
                }
            }
        }

        let live = alerts.borrow_and_update().clone();
        let view = dashboard.view(&live, Utc::now());
        if json {
            println!("{}", serde_json::to_string(&view)?);
        } else {
            render::print_view(&view);
            println!("{}", "-".repeat(40));
        }
    }

    dashboard.unmount();
    feed.shutdown().await;
    Ok(())
}
