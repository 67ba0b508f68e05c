//! Best-effort visitor geolocation.
//!
//! [`HttpLocationProvider`] walks an ordered list of geolocation services and
//! returns the first one that yields a country. If none do, it falls back to
//! IP-only services so the cached location at least records an address.
//! Every attempt is bounded by an [`AttemptPolicy`] timeout, and a failed
//! provider is logged and skipped. `locate()` never errors: total failure is
//! an empty [`LocationInfo`].
//!
//! `locate()` performs no writes. Dropping its future (for example because
//! the caller went away) abandons the in-flight request with nothing to
//! clean up.

use crate::retry::{with_timeout_retry_if, AttemptError, AttemptPolicy};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where the visitor appears to be browsing from. Always advisory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationInfo {
    /// ISO 3166-1 alpha-2 country code, as reported by the provider
    #[serde(rename = "country")]
    pub country_code: Option<String>,
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl LocationInfo {
    /// Location known only by country.
    pub fn from_country(country_code: &str) -> Self {
        Self {
            country_code: Some(country_code.to_string()),
            ..Self::default()
        }
    }

    /// Location known only by address (degraded lookup).
    pub fn ip_only(ip: &str) -> Self {
        Self {
            ip: Some(ip.to_string()),
            ..Self::default()
        }
    }

    /// Country code if the provider gave a non-blank one.
    pub fn country(&self) -> Option<&str> {
        self.country_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// Nothing at all is known.
    pub fn is_empty(&self) -> bool {
        self.country().is_none() && self.ip.as_deref().map_or(true, |ip| ip.trim().is_empty())
    }
}

/// Source of a visitor's location.
pub trait LocationProvider {
    /// Look up the visitor's location. Never fails; unknown fields are `None`.
    fn locate(&self) -> impl Future<Output = LocationInfo> + Send;
}

/// Provider that always answers with a fixed location.
///
/// Used for tests and for pinning a country from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticLocationProvider {
    location: LocationInfo,
}

impl StaticLocationProvider {
    pub fn new(location: LocationInfo) -> Self {
        Self { location }
    }
}

impl LocationProvider for StaticLocationProvider {
    async fn locate(&self) -> LocationInfo {
        self.location.clone()
    }
}

/// Response layout of a geolocation service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoFormat {
    /// ipapi.co `/json/`
    IpApi,
    /// ipgeolocation.io `/ipgeo`
    IpGeolocation,
    /// ipinfo.io `/json`
    IpInfo,
}

impl FromStr for GeoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipapi" => Ok(GeoFormat::IpApi),
            "ipgeolocation" => Ok(GeoFormat::IpGeolocation),
            "ipinfo" => Ok(GeoFormat::IpInfo),
            other => Err(format!("Unknown geolocation format: '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    country_code: Option<String>,
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpGeolocationResponse {
    country_code2: Option<String>,
    ip: Option<String>,
    city: Option<String>,
    state_prov: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    country: Option<String>,
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpOnlyResponse {
    ip: Option<String>,
    origin: Option<String>,
}

impl GeoFormat {
    /// Parse a response body into a location.
    ///
    /// A body without a country code is a failure: a geolocation service that
    /// cannot place the visitor is no better than the next one in line.
    pub fn parse(&self, body: &str) -> Result<LocationInfo, ProviderError> {
        let location = match self {
            GeoFormat::IpApi => {
                let data: IpApiResponse = serde_json::from_str(body)?;
                LocationInfo {
                    country_code: data.country_code,
                    ip: data.ip,
                    city: data.city,
                    region: data.region,
                    timezone: data.timezone,
                }
            }
            GeoFormat::IpGeolocation => {
                let data: IpGeolocationResponse = serde_json::from_str(body)?;
                LocationInfo {
                    country_code: data.country_code2,
                    ip: data.ip,
                    city: data.city,
                    region: data.state_prov,
                    timezone: None,
                }
            }
            GeoFormat::IpInfo => {
                let data: IpInfoResponse = serde_json::from_str(body)?;
                LocationInfo {
                    country_code: data.country,
                    ip: data.ip,
                    city: data.city,
                    region: data.region,
                    timezone: None,
                }
            }
        };

        if location.country().is_none() {
            return Err(ProviderError::MissingCountry);
        }
        Ok(location)
    }
}

/// Extract an address from an IP-only service body.
///
/// Accepts `{"ip": ...}`, `{"origin": ...}` or a bare address in plain text.
pub fn parse_ip_body(body: &str) -> Result<String, ProviderError> {
    if let Ok(data) = serde_json::from_str::<IpOnlyResponse>(body) {
        return data
            .ip
            .or(data.origin)
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .ok_or(ProviderError::MissingAddress);
    }

    let text = body.trim();
    if text.is_empty()
        || text.starts_with('{')
        || text.starts_with('<')
        || text.contains(char::is_whitespace)
    {
        return Err(ProviderError::MissingAddress);
    }
    Ok(text.to_string())
}

/// A geolocation service endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoProvider {
    pub url: String,
    pub format: GeoFormat,
}

impl GeoProvider {
    pub fn new(url: impl Into<String>, format: GeoFormat) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }

    /// The public services tried in order when nothing is configured.
    pub fn defaults() -> Vec<GeoProvider> {
        vec![
            GeoProvider::new("https://ipapi.co/json/", GeoFormat::IpApi),
            GeoProvider::new(
                "https://api.ipgeolocation.io/ipgeo?apiKey=free",
                GeoFormat::IpGeolocation,
            ),
            GeoProvider::new("https://ipinfo.io/json", GeoFormat::IpInfo),
        ]
    }
}

impl FromStr for GeoProvider {
    type Err = String;

    /// Parse `format=url`, e.g. `ipinfo=https://ipinfo.io/json`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (format, url) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected format=url, got '{}'", s))?;
        let url = url.trim();
        if url.is_empty() {
            return Err(format!("Missing URL in '{}'", s));
        }
        Ok(GeoProvider::new(url, format.parse()?))
    }
}

/// IP-only services tried after every geolocation service failed.
pub fn default_ip_providers() -> Vec<String> {
    vec![
        "https://api.ipify.org?format=json".to_string(),
        "https://httpbin.org/ip".to_string(),
        "https://icanhazip.com".to_string(),
    ]
}

/// Failure of a single provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response has no country code")]
    MissingCountry,

    #[error("response has no IP address")]
    MissingAddress,
}

/// Network and server-side failures are worth another attempt; a provider
/// that answered with a bad body or a client error will answer the same way.
fn is_retryable(error: &AttemptError<ProviderError>) -> bool {
    match error {
        AttemptError::TimedOut(_) => true,
        AttemptError::Failed(ProviderError::Http(_)) => true,
        AttemptError::Failed(ProviderError::Status(status)) => *status >= 500 || *status == 429,
        AttemptError::Failed(_) => false,
    }
}

/// Location provider backed by public HTTP geolocation services
#[derive(Debug, Clone)]
pub struct HttpLocationProvider {
    client: reqwest::Client,
    geo_providers: Vec<GeoProvider>,
    ip_providers: Vec<String>,
    geo_policy: AttemptPolicy,
    ip_policy: AttemptPolicy,
}

impl HttpLocationProvider {
    pub fn new(
        client: reqwest::Client,
        geo_providers: Vec<GeoProvider>,
        ip_providers: Vec<String>,
    ) -> Self {
        Self {
            client,
            geo_providers,
            ip_providers,
            geo_policy: AttemptPolicy::geo_lookup(),
            ip_policy: AttemptPolicy::ip_lookup(),
        }
    }

    /// Use the same attempt policy for every provider
    pub fn with_policy(mut self, policy: AttemptPolicy) -> Self {
        self.geo_policy = policy.clone();
        self.ip_policy = policy;
        self
    }

    /// Longest a full lookup can take when every provider fails slowly
    pub fn lookup_bound(&self) -> Duration {
        self.geo_policy.worst_case() * self.geo_providers.len() as u32
            + self.ip_policy.worst_case() * self.ip_providers.len() as u32
    }

    async fn fetch_body(&self, url: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }

    async fn fetch_geo(&self, provider: &GeoProvider) -> Result<LocationInfo, ProviderError> {
        let body = self.fetch_body(&provider.url).await?;
        provider.format.parse(&body)
    }

    async fn fetch_ip(&self, url: &str) -> Result<String, ProviderError> {
        let body = self.fetch_body(url).await?;
        parse_ip_body(&body)
    }
}

impl LocationProvider for HttpLocationProvider {
    async fn locate(&self) -> LocationInfo {
        info!("Detecting visitor location (at most {:?})", self.lookup_bound());

        for provider in &self.geo_providers {
            match with_timeout_retry_if(
                &self.geo_policy,
                &provider.url,
                || self.fetch_geo(provider),
                is_retryable,
            )
            .await
            {
                Ok(location) => {
                    info!(
                        "Location detected: {} via {}",
                        location.country().unwrap_or("?"),
                        provider.url
                    );
                    return location;
                }
                Err(e) => warn!("Geolocation provider {} failed: {}", provider.url, e),
            }
        }

        debug!("No geolocation provider answered, trying IP-only providers");

        for url in &self.ip_providers {
            let attempt =
                with_timeout_retry_if(&self.ip_policy, url, || self.fetch_ip(url), is_retryable);
            match attempt.await {
                Ok(ip) => {
                    info!("Only IP address detected via {}", url);
                    return LocationInfo::ip_only(&ip);
                }
                Err(e) => warn!("IP provider {} failed: {}", url, e),
            }
        }

        warn!("All location providers failed, continuing without location");
        LocationInfo::default()
    }
}
