// Region lookup via IP geolocation
//
// The lookup result only selects which crisis resource to show. Any failure
// yields the default region; it never blocks the session.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use super::lexicon::Language;
use super::resources::RegionCode;

pub const DEFAULT_GEOLOCATION_ENDPOINT: &str = "https://ipapi.co/json/";

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    country_code: Option<String>,
}

/// Resolves the caller's region from a geolocation endpoint
#[derive(Debug, Clone)]
pub struct RegionLocator {
    client: Option<reqwest::Client>,
    endpoint: String,
    fallback: RegionCode,
}

impl RegionLocator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, fallback: RegionCode) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build geolocation HTTP client")?;

        Ok(Self {
            client: Some(client),
            endpoint: endpoint.into(),
            fallback,
        })
    }

    /// Locator that never makes a request
    pub fn disabled(fallback: RegionCode) -> Self {
        Self {
            client: None,
            endpoint: String::new(),
            fallback,
        }
    }

    pub fn fallback(&self) -> &RegionCode {
        &self.fallback
    }

    /// Look up the region, falling back on any failure
    pub async fn locate(&self) -> RegionCode {
        let Some(client) = &self.client else {
            return self.fallback.clone();
        };

        match self.fetch(client).await {
            Ok(region) => {
                tracing::debug!(region = %region, "Located region");
                region
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback = %self.fallback, "Region lookup failed, using default");
                self.fallback.clone()
            }
        }
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<RegionCode> {
        let response = client
            .get(&self.endpoint)
            .send()
            .await
            .context("Geolocation request failed")?
            .error_for_status()
            .context("Geolocation endpoint returned an error")?;

        let body: GeoResponse = response
            .json()
            .await
            .context("Failed to parse geolocation response")?;

        let code = body
            .country_code
            .context("Geolocation response has no country_code")?;

        Ok(RegionCode::parse(&code)?)
    }
}

impl Language {
    /// UI language suggested for a region
    pub fn suggested_for(region: &RegionCode) -> Language {
        match region.as_str() {
            "JP" => Language::Ja,
            _ => Language::En,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(server: &mockito::Server) -> RegionLocator {
        RegionLocator::new(
            format!("{}/json/", server.url()),
            Duration::from_secs(2),
            RegionCode::us(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_locate_reads_country_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/json/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ip":"203.0.113.7","country_code":"JP"}"#)
            .create_async()
            .await;

        let region = locator(&server).locate().await;
        assert_eq!(region.as_str(), "JP");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_locate_falls_back_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/")
            .with_status(429)
            .create_async()
            .await;

        assert_eq!(locator(&server).locate().await, RegionCode::us());
    }

    #[tokio::test]
    async fn test_locate_falls_back_on_bad_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/")
            .with_status(200)
            .with_body(r#"{"country_code":"Narnia"}"#)
            .create_async()
            .await;

        assert_eq!(locator(&server).locate().await, RegionCode::us());
    }

    #[tokio::test]
    async fn test_disabled_locator() {
        let locator = RegionLocator::disabled(RegionCode::parse("GB").unwrap());
        assert_eq!(locator.locate().await.as_str(), "GB");
    }

    #[test]
    fn test_suggested_language() {
        assert_eq!(Language::suggested_for(&RegionCode::parse("JP").unwrap()), Language::Ja);
        assert_eq!(Language::suggested_for(&RegionCode::us()), Language::En);
    }
}
