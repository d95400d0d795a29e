//! Error taxonomy for the dashboard.
//!
//! Provider clients return `anyhow::Result`; the coordinator classifies those
//! errors into a [`ProviderError`] so each panel can keep its own failure and
//! the banner can show a short, provider-specific message.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum ErrorKind {
    Timeout,
    Transport,
    /// The service answered with a non-success HTTP status.
    Rejected(u16),
    Decode,
    NotFound,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => f.write_str("timed out"),
            ErrorKind::Transport => f.write_str("network error"),
            ErrorKind::Rejected(status) => write!(f, "rejected with status {status}"),
            ErrorKind::Decode => f.write_str("unreadable response"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::Other => f.write_str("failed"),
        }
    }
}

/// A failure local to one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn timeout(service: &str) -> Self {
        Self::new(ErrorKind::Timeout, format!("{service} did not answer in time"))
    }

    /// Classify an error returned by a provider client by walking its cause chain.
    pub fn classify(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        for cause in err.chain() {
            if let Some(status) = cause.downcast_ref::<HttpStatusError>() {
                let kind = if status.status == 404 {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::Rejected(status.status)
                };
                return Self::new(kind, message);
            }
            if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
                let kind = if http.is_timeout() {
                    ErrorKind::Timeout
                } else if http.is_decode() {
                    ErrorKind::Decode
                } else {
                    ErrorKind::Transport
                };
                return Self::new(kind, message);
            }
            if cause.downcast_ref::<serde_json::Error>().is_some() {
                return Self::new(ErrorKind::Decode, message);
            }
            if cause.downcast_ref::<UnknownCityError>().is_some() {
                return Self::new(ErrorKind::NotFound, message);
            }
        }

        Self::new(ErrorKind::Other, message)
    }
}

/// Non-success HTTP status from a remote service.
#[derive(Debug, Error)]
#[error("{service} request failed with status {status}: {body}")]
pub struct HttpStatusError {
    pub service: &'static str,
    pub status: u16,
    pub body: String,
}

/// The city is not present in the catalog, so it cannot be located.
#[derive(Debug, Error)]
#[error("City '{0}' not found in catalog")]
pub struct UnknownCityError(pub String);

/// A city-list row that could not be read. Skipped, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {line}: {reason}")]
pub struct CatalogParseError {
    pub line: u64,
    pub reason: String,
}

/// Everything the dashboard can report.
///
/// `Display` yields the text shown in the error banner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("Failed to load profile")]
    ProfileLoad(#[source] ProviderError),
    #[error("Weather load failed")]
    WeatherLoad(#[source] ProviderError),
    #[error("Forecast load failed")]
    ForecastLoad(#[source] ProviderError),
    #[error("Mandi rates load failed")]
    RatesLoad(#[source] ProviderError),
    #[error("Live alerts refresh failed")]
    AlertFeed(#[source] ProviderError),
    #[error("Skipped city row")]
    CatalogParse(#[source] CatalogParseError),
}

impl DashboardError {
    /// Only profile and per-city provider loads are shown to the user.
    pub fn is_banner_worthy(&self) -> bool {
        !matches!(self, DashboardError::AlertFeed(_) | DashboardError::CatalogParse(_))
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            DashboardError::ProfileLoad(e)
            | DashboardError::WeatherLoad(e)
            | DashboardError::ForecastLoad(e)
            | DashboardError::RatesLoad(e)
            | DashboardError::AlertFeed(e) => Some(e),
            DashboardError::CatalogParse(_) => None,
        }
    }
}
