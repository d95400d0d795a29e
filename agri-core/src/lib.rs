//! Core library for the `agri` dashboard.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The city catalog and the debounced city search
//! - Abstraction over weather, forecast, market-rate, alert and profile providers
//! - Per-city fetch coordination with stale-response discarding
//! - The live alert feed and the dashboard that ties everything together
//!
//! It is used by `agri-cli`, but can also be reused by other binaries or services.

pub mod alerts;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod dismissal;
pub mod error;
pub mod model;
pub mod provider;
pub mod search;
pub mod session;
pub mod timer;

pub use alerts::{AlertSnapshot, LiveAlertFeed};
pub use catalog::{CityCatalog, CityRow, CsvCitySource};
pub use config::{Config, ProviderConfig};
pub use coordinator::{EnvironmentalDataCoordinator, FetchOutcome, LoadStatus, ProviderResult};
pub use dashboard::{Dashboard, DashboardEvent, DashboardView, ErrorBanner, ProfileState};
pub use dismissal::{Bounds, DismissalController, Point};
pub use error::{DashboardError, ErrorKind, ProviderError};
pub use model::{Alert, City, CurrentWeather, Forecast, ForecastDay, MandiRate, Profile};
pub use provider::{DataProviders, ProviderId};
pub use search::{CitySearchController, SearchPhase};
pub use session::Session;
