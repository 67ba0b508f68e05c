use crate::i18n::LanguageCatalog;
use crate::location::{default_ip_providers, GeoProvider};
use crate::navigation::hostname_of;
use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Languages
    pub default_language: String,
    pub fallback_language: String,

    // Storage
    pub storage_path: String,
    pub storage_key_prefix: String,

    // Location providers
    pub geo_providers: Vec<GeoProvider>,
    pub ip_providers: Vec<String>,
    pub provider_timeout_ms: u64,
    pub provider_max_attempts: u32,
    pub country_override: Option<String>,

    // Site
    pub site_origin: String,
    pub site_hostname: String,
    pub subpath_host_suffix: String,

    // Client
    pub client_language: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let site_origin = "http://localhost".to_string();
        Self {
            default_language: "ja".to_string(),
            fallback_language: "en".to_string(),
            storage_path: "data/language-preferences.json".to_string(),
            storage_key_prefix: "karumaru".to_string(),
            geo_providers: GeoProvider::defaults(),
            ip_providers: default_ip_providers(),
            provider_timeout_ms: 3000,
            provider_max_attempts: 1,
            country_override: None,
            site_hostname: hostname_of(&site_origin),
            site_origin,
            subpath_host_suffix: "github.io".to_string(),
            client_language: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let site_origin = non_empty_var("SITE_ORIGIN").unwrap_or(defaults.site_origin);

        let geo_providers = match non_empty_var("GEO_PROVIDERS") {
            Some(raw) => parse_list(&raw)
                .map(|entry| entry.parse::<GeoProvider>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()
                .context("GEO_PROVIDERS is invalid")?,
            None => defaults.geo_providers,
        };

        let ip_providers = match non_empty_var("IP_PROVIDERS") {
            Some(raw) => parse_list(&raw).map(str::to_string).collect(),
            None => defaults.ip_providers,
        };

        let config = Self {
            // Languages
            default_language: non_empty_var("DEFAULT_LANGUAGE")
                .unwrap_or(defaults.default_language),
            fallback_language: non_empty_var("FALLBACK_LANGUAGE")
                .unwrap_or(defaults.fallback_language),

            // Storage
            storage_path: non_empty_var("STORAGE_PATH").unwrap_or(defaults.storage_path),
            storage_key_prefix: non_empty_var("STORAGE_KEY_PREFIX")
                .unwrap_or(defaults.storage_key_prefix),

            // Location providers
            geo_providers,
            ip_providers,
            provider_timeout_ms: non_empty_var("PROVIDER_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.provider_timeout_ms),
            provider_max_attempts: non_empty_var("PROVIDER_MAX_ATTEMPTS")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.provider_max_attempts),
            country_override: non_empty_var("COUNTRY_OVERRIDE"),

            // Site
            site_hostname: non_empty_var("SITE_HOSTNAME")
                .unwrap_or_else(|| hostname_of(&site_origin)),
            site_origin,
            subpath_host_suffix: std::env::var("SUBPATH_HOST_SUFFIX")
                .unwrap_or(defaults.subpath_host_suffix),

            // Client
            client_language: non_empty_var("CLIENT_LANGUAGE").or_else(|| non_empty_var("LANG")),
        };

        config.validate(LanguageCatalog::get())?;
        Ok(config)
    }

    /// Check that the configured languages exist in `catalog`
    pub fn validate(&self, catalog: &LanguageCatalog) -> Result<()> {
        if !catalog.contains(&self.default_language) {
            bail!("DEFAULT_LANGUAGE '{}' is not a supported language", self.default_language);
        }
        if !catalog.contains(&self.fallback_language) {
            bail!("FALLBACK_LANGUAGE '{}' is not a supported language", self.fallback_language);
        }
        Ok(())
    }
}
