use agri_core::{
    AlertSnapshot, City, CityCatalog, Config, CsvCitySource, Dashboard, DashboardEvent, ProviderId,
    provider::{CityDataSource, alert_feed_from_config, call_with_timeout, data_providers_from_config},
};
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use log::{debug, warn};
use std::sync::Arc;
use tokio::time::Instant;

use crate::{interactive, render};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "agri", version, about = "Weather, forecast and mandi rates dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a service.
    Configure {
        /// "openweather", "weatherapi", "mandi" or "backend".
        service: String,
    },

    /// List the suggestions the search box would show for a query.
    Cities {
        query: String,
    },

    /// Load the dashboard once for a city and print it.
    Show {
        city: String,

        /// Print the dashboard as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive dashboard driven by stdin.
    Dashboard {
        /// Print every update as a JSON line.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { service } => configure(&service),
            Command::Cities { query } => {
                let config = Config::load()?;
                let catalog = load_catalog(&config)?;
                render::print_suggestions(&query, &catalog.search(&query));
                Ok(())
            }
            Command::Show { city, json } => show(&Config::load()?, &city, json).await,
            Command::Dashboard { json } => interactive::run(Config::load()?, json).await,
        }
    }
}

fn configure(service: &str) -> Result<()> {
    let mut config = Config::load()?;

    match service.to_lowercase().as_str() {
        "mandi" => {
            config.mandi.token = Some(prompt_secret("Mandi API token:")?);
        }
        "backend" => {
            let current = config.backend.base_url.clone().unwrap_or_default();
            let base_url = Text::new("Backend base URL:").with_default(&current).prompt()?;
            config.backend.base_url = Some(base_url.trim().to_string());
            config.backend.token = Some(prompt_secret("Session token:")?);
        }
        other => {
            let id = ProviderId::try_from(other)?;
            let key = prompt_secret(&format!("API key for {id}:"))?;
            config.upsert_provider_api_key(id, key);
        }
    }

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn prompt_secret(message: &str) -> Result<String> {
    let value = Password::new(message)
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;

    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("A value is required"));
    }
    Ok(value)
}

pub(crate) fn load_catalog(config: &Config) -> Result<Arc<CityCatalog>> {
    let path = config.cities_csv()?;
    let rows = CsvCitySource::new(path).load_rows()?;
    let catalog = CityCatalog::load(&rows, &config.country);

    if catalog.is_empty() {
        warn!("No cities for {} in {}", config.country, path.display());
    }
    debug!("Loaded {} cities for {}", catalog.len(), config.country);

    Ok(Arc::new(catalog))
}

async fn show(config: &Config, name: &str, json: bool) -> Result<()> {
    let city = City::new(name).ok_or_else(|| anyhow!("City name must not be empty"))?;
    let catalog = load_catalog(config)?;
    if !catalog.contains(city.name()) {
        warn!("{city} is not in the city list; requesting it anyway");
    }

    let providers = data_providers_from_config(config, catalog.clone(), &config.session())?;
    let (mut dashboard, mut outcomes) = Dashboard::from_config(catalog, providers, config);
    dashboard.commit(city);

    while !dashboard.coordinator().is_settled() {
        let outcome = outcomes.recv().await.context("Fetch results channel closed")?;
        dashboard.handle(DashboardEvent::Fetched(outcome), Instant::now());
    }

    let mut live = AlertSnapshot::default();
    if let Some(feed) = alert_feed_from_config(config) {
        let result = call_with_timeout("Alert feed", config.request_timeout(), feed.poll()).await;
        live.apply(result, Utc::now());
    }

    let view = dashboard.view(&live, Utc::now());
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        render::print_view(&view);
    }

    Ok(())
}
