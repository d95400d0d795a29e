use anyhow::{Context, Result};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::HttpStatusError;

/// Send a request and return the body of a successful response.
///
/// Non-success statuses become [`HttpStatusError`] so callers can tell a
/// rejected request from a transport failure.
pub(crate) async fn fetch_body(service: &'static str, what: &str, request: RequestBuilder) -> Result<String> {
    let res: Response = request
        .send()
        .await
        .with_context(|| format!("Failed to send request to {service} ({what})"))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .with_context(|| format!("Failed to read {service} {what} response body"))?;

    if !status.is_success() {
        return Err(HttpStatusError { service, status: status.as_u16(), body: truncate_body(&body) }.into());
    }

    Ok(body)
}

pub(crate) fn parse_json<T: DeserializeOwned>(service: &str, what: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).with_context(|| format!("Failed to parse {service} {what} JSON"))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate_body("ok"), "ok");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }

    #[test]
    fn parse_json_adds_context() {
        let err = parse_json::<u8>("WeatherAPI", "current", "{").unwrap_err();
        assert!(err.to_string().contains("Failed to parse WeatherAPI current JSON"));
    }
}
