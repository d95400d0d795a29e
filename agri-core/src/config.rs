use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::{provider::ProviderId, session::Session};

const DEFAULT_COUNTRY: &str = "Pakistan";

/// Configuration for a single weather provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Direct access to the mandi price service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MandiConfig {
    pub token: Option<String>,
    /// Item category filter, e.g. "Grain". All categories when absent.
    pub category: Option<String>,
    pub base_url: Option<String>,
}

/// The application backend (profile, and rates when no mandi token is set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Optional default provider id, e.g. "openweather" or "weatherapi".
    pub default_provider: Option<String>,

    /// Country whose cities are offered by the search box.
    #[serde(default = "default_country")]
    pub country: String,

    /// CSV with at least `city` and `country` columns.
    #[serde(default)]
    pub cities_csv: Option<PathBuf>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_alert_poll_secs")]
    pub alert_poll_secs: u64,

    /// Region for live alerts; falls back to `country`.
    #[serde(default)]
    pub alert_region: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Example TOML:
    /// [providers.weatherapi]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub mandi: MandiConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_alert_poll_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            providers: HashMap::new(),
            country: default_country(),
            cities_csv: None,
            debounce_ms: default_debounce_ms(),
            alert_poll_secs: default_alert_poll_secs(),
            alert_region: None,
            request_timeout_secs: default_request_timeout_secs(),
            mandi: MandiConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "No default provider configured.\n\
                 Hint: run `agri configure <provider>` (e.g. `agri configure weatherapi`) first."
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_poll_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn alert_region(&self) -> &str {
        self.alert_region.as_deref().unwrap_or(&self.country)
    }

    /// Backend session built from the stored token.
    pub fn session(&self) -> Session {
        self.backend.token.as_deref().map(Session::with_token).unwrap_or_default()
    }

    /// Path of the city list; required to build the catalog.
    pub fn cities_csv(&self) -> Result<&PathBuf> {
        self.cities_csv.as_ref().ok_or_else(|| {
            anyhow!(
                "No city list configured.\n\
                 Hint: set `cities_csv = \"/path/to/cities.csv\"` in {}",
                Self::config_file_path().map(|p| p.display().to_string()).unwrap_or_else(|_| "the config file".into())
            )
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration TOML")
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "agri-dashboard", "agri")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Convenience helper: set/replace a provider API key and optionally set default provider.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    #[test]
    fn default_provider_id_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.default_provider_id().unwrap_err();

        assert!(err.to_string().contains("No default provider configured"));
    }

    #[test]
    fn set_api_key_and_default_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WEATHER_KEY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");
        assert_eq!(default, ProviderId::WeatherApi);

        assert_eq!(cfg.provider_api_key(ProviderId::WeatherApi), Some("WEATHER_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::WeatherApi));
        assert!(cfg.provider_config(ProviderId::OpenWeather).is_none());
    }

    #[test]
    fn upsert_does_not_override_existing_default() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WEATHER_KEY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");
        assert_eq!(default, ProviderId::OpenWeather);

        cfg.set_default_provider(ProviderId::WeatherApi);
        assert_eq!(cfg.default_provider_id().unwrap(), ProviderId::WeatherApi);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg = Config::from_toml_str("default_provider = \"weatherapi\"\n").unwrap();

        assert_eq!(cfg.country, "Pakistan");
        assert_eq!(cfg.debounce(), Duration::from_millis(1000));
        assert_eq!(cfg.alert_interval(), Duration::from_secs(300));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.alert_region(), "Pakistan");
        assert!(!cfg.session().is_authenticated());
        assert!(cfg.cities_csv().is_err());
    }

    #[test]
    fn full_toml_roundtrips_through_serializer() {
        let src = r#"
            default_provider = "openweather"
            country = "Pakistan"
            cities_csv = "/data/pakistan_cities.csv"
            debounce_ms = 400
            alert_region = "Punjab"

            [providers.openweather]
            api_key = "OW"

            [mandi]
            token = "MT"
            category = "Grain"

            [backend]
            base_url = "https://agri.example.com/api"
            token = "jwt"
        "#;

        let cfg = Config::from_toml_str(src).unwrap();
        assert_eq!(cfg.debounce(), Duration::from_millis(400));
        assert_eq!(cfg.alert_region(), "Punjab");
        assert_eq!(cfg.mandi.category.as_deref(), Some("Grain"));
        assert!(cfg.session().is_authenticated());

        let text = toml::to_string_pretty(&cfg).unwrap();
        let again = Config::from_toml_str(&text).unwrap();
        assert_eq!(again.provider_api_key(ProviderId::OpenWeather), Some("OW"));
        assert_eq!(again.cities_csv().unwrap(), &PathBuf::from("/data/pakistan_cities.csv"));
    }
}
